//! DICOM到FHIR转换命令行工具

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dcm2fhir_admin::{init_logging, AppConfig, ConfigOverrides};
use dcm2fhir_dicom::{DicomFileLoader, PngRenderer};
use dcm2fhir_integration::FhirClient;
use dcm2fhir_mapping::{BatchDriver, CommitMode, FailurePolicy, GraphAggregator, GraphBuilder};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "dcm2fhir")]
#[command(about = "DICOM影像与FHIR资源之间的双向转换工具", version)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// FHIR服务器基础URL，覆盖配置文件
    #[arg(long, global = true)]
    fhir_url: Option<String>,

    /// 日志级别
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 转换目录中的DICOM文件并写入FHIR服务器
    Convert {
        /// DICOM文件目录
        dir: PathBuf,

        /// 单个文件失败时的处理策略
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,

        /// 每个资源只写入一次终态
        #[arg(long)]
        single_write: bool,
    },
    /// 遍历FHIR服务器中的报告并导出为JSON数组
    Export {
        /// 输出文件，默认写到标准输出
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 检查配置并输出生效的配置
    CheckConfig,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    FailFast,
    SkipInvalid,
    ContinueOnError,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::FailFast => FailurePolicy::FailFast,
            PolicyArg::SkipInvalid => FailurePolicy::SkipInvalidDatasets,
            PolicyArg::ContinueOnError => FailurePolicy::ContinueOnError,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        fhir_url: cli.fhir_url.clone(),
        log_level: cli.log_level.clone(),
    };
    let config = AppConfig::load_validated(cli.config.as_deref(), &overrides)?;

    init_logging(&config.logging)?;

    match cli.command {
        Command::Convert {
            dir,
            policy,
            single_write,
        } => convert(&config, &dir, policy.map(Into::into), single_write).await,
        Command::Export { output } => export(&config, output.as_deref()).await,
        Command::CheckConfig => {
            info!("配置有效");
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn convert(
    config: &AppConfig,
    dir: &Path,
    policy: Option<FailurePolicy>,
    single_write: bool,
) -> Result<()> {
    let client = Arc::new(FhirClient::new(config.fhir.client_config())?);
    let commit_mode = if single_write {
        CommitMode::SingleWrite
    } else {
        config.conversion.commit_mode
    };
    let policy = policy.unwrap_or(config.conversion.failure_policy);

    info!("启动转换: 目录 {}, 服务器 {}", dir.display(), client.base_url());

    let builder = GraphBuilder::new(client, Arc::new(PngRenderer::new())).with_commit_mode(commit_mode);
    let driver = BatchDriver::new(builder, Arc::new(DicomFileLoader))
        .with_extensions(&config.conversion.extensions)
        .with_policy(policy);

    let report = match driver.run(dir).await {
        Ok(report) => report,
        Err(e) => {
            error!(kind = %e.kind(), "转换终止: {}", e);
            return Err(e.into());
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_success() {
        anyhow::bail!("{} 个文件处理失败", report.failed.len());
    }
    Ok(())
}

async fn export(config: &AppConfig, output: Option<&Path>) -> Result<()> {
    let client = Arc::new(FhirClient::new(config.fhir.client_config())?);
    let records = GraphAggregator::new(client).collect().await?;
    let json = serde_json::to_string_pretty(&records)?;

    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("无法写入 {}", path.display()))?;
            info!("导出 {} 条记录到 {}", records.len(), path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }
    Ok(())
}
