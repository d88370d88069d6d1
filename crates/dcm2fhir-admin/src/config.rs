//! 配置管理
//!
//! 配置来源按优先级从低到高：内置默认值、TOML配置文件、`DCM2FHIR__` 前缀的环境变量、命令行覆盖。

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use dcm2fhir_integration::{client::FHIR_JSON, FhirClientConfig};
use dcm2fhir_mapping::{batch::DEFAULT_EXTENSION, CommitMode, FailurePolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info};

/// 未指定配置文件时尝试加载的文件（可不存在）
pub const DEFAULT_CONFIG_NAME: &str = "dcm2fhir";
/// 环境变量前缀
pub const ENV_PREFIX: &str = "DCM2FHIR";

/// 完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// FHIR服务器配置
    pub fhir: FhirConfig,
    /// 转换配置
    pub conversion: ConversionConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// FHIR服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FhirConfig {
    /// 基础URL（必填）
    pub base_url: String,
    /// 请求内容类型
    pub content_type: String,
    /// 请求超时秒数，不设置则不超时
    pub timeout_secs: Option<u64>,
}

impl FhirConfig {
    /// 转换为客户端配置
    pub fn client_config(&self) -> FhirClientConfig {
        FhirClientConfig {
            base_url: self.base_url.clone(),
            content_type: self.content_type.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

impl Default for FhirConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            content_type: FHIR_JSON.to_string(),
            timeout_secs: None,
        }
    }
}

/// 转换配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// 批处理的文件扩展名
    pub extensions: Vec<String>,
    /// 资源提交方式
    pub commit_mode: CommitMode,
    /// 单个文件失败时的处理策略
    pub failure_policy: FailurePolicy,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            commit_mode: CommitMode::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或过滤指令，如 `info`、`dcm2fhir_mapping=debug`
    pub level: String,
    /// 日志格式
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// 命令行覆盖项
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub fhir_url: Option<String>,
    pub log_level: Option<String>,
}

impl AppConfig {
    /// 加载配置
    ///
    /// 显式指定的配置文件必须存在；未指定时尝试当前目录下的 `dcm2fhir.toml`。
    pub fn load(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let file = match config_path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("conversion.extensions"),
            )
            .set_override_option("fhir.base_url", overrides.fhir_url.clone())?
            .set_override_option("logging.level", overrides.log_level.clone())?
            .build()
            .context("无法读取配置")?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("配置格式错误")?;

        match config_path {
            Some(path) => info!("配置加载完成: {}", path.display()),
            None => debug!("配置加载完成（默认位置）"),
        }
        Ok(config)
    }

    /// 加载并验证配置
    pub fn load_validated(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let config = Self::load(config_path, overrides)?;
        ConfigValidator::new().validate(&config)?;
        Ok(config)
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&AppConfig) -> Result<()>,
    /// 错误消息
    error_message: &'static str,
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "fhir.base_url",
                validator: |config| {
                    let url = config.fhir.base_url.trim();
                    if url.is_empty() {
                        Err(anyhow::anyhow!("未设置FHIR服务器地址"))
                    } else if !(url.starts_with("http://") || url.starts_with("https://")) {
                        Err(anyhow::anyhow!("地址必须以 http:// 或 https:// 开头: {}", url))
                    } else {
                        Ok(())
                    }
                },
                error_message: "无效的FHIR服务器地址",
            },
            ValidationRule {
                field_path: "fhir.timeout_secs",
                validator: |config| {
                    if config.fhir.timeout_secs == Some(0) {
                        Err(anyhow::anyhow!("超时不能为0"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "无效的请求超时",
            },
            ValidationRule {
                field_path: "conversion.extensions",
                validator: |config| {
                    if config.conversion.extensions.iter().all(|e| e.trim().is_empty()) {
                        Err(anyhow::anyhow!("扩展名列表为空"))
                    } else {
                        Ok(())
                    }
                },
                error_message: "无效的文件扩展名配置",
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &AppConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("配置验证失败 {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("{}: {}", rule.error_message, e));
            }
        }

        debug!("配置验证通过");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
