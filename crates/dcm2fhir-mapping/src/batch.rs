//! 批处理驱动
//!
//! 按文件名顺序逐个处理目录中的DICOM文件，单个文件失败时按失败策略决定是否继续。

use crate::builder::{GraphBuilder, GraphIds};
use chrono::{DateTime, Utc};
use dcm2fhir_core::{ErrorKind, Result};
use dcm2fhir_dicom::DatasetLoader;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 默认处理的文件扩展名
pub const DEFAULT_EXTENSION: &str = "dcm";

/// 单个文件失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// 首个失败即终止
    #[default]
    FailFast,
    /// 跳过解码或映射失败的文件，存储失败仍终止
    SkipInvalidDatasets,
    /// 记录所有失败并继续
    ContinueOnError,
}

impl FailurePolicy {
    /// 某类错误发生后是否继续处理后续文件
    pub fn should_continue(&self, kind: ErrorKind) -> bool {
        match self {
            Self::FailFast => false,
            Self::SkipInvalidDatasets => matches!(kind, ErrorKind::Decode | ErrorKind::Mapping),
            Self::ContinueOnError => true,
        }
    }
}

/// 处理失败的文件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFile {
    pub file: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// 批处理结果
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub directory: String,
    /// 成功处理的文件名，按处理顺序
    pub processed: Vec<String>,
    pub failed: Vec<FailedFile>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 批处理驱动
pub struct BatchDriver {
    builder: GraphBuilder,
    loader: Arc<dyn DatasetLoader>,
    extensions: Vec<String>,
    policy: FailurePolicy,
}

impl BatchDriver {
    pub fn new(builder: GraphBuilder, loader: Arc<dyn DatasetLoader>) -> Self {
        Self {
            builder,
            loader,
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            policy: FailurePolicy::default(),
        }
    }

    /// 设置处理的扩展名（不区分大小写，可带前导 `.`）
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 列出目录中待处理的文件，按文件名排序，不递归
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && self.matches_extension(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    /// 处理目录中的全部文件
    pub async fn run(&self, dir: &Path) -> Result<BatchReport> {
        let started_at = Utc::now();
        let files = self.discover(dir)?;
        info!(
            "开始批处理 {}: {} 个文件, 策略 {:?}, 提交模式 {:?}",
            dir.display(),
            files.len(),
            self.policy,
            self.builder.commit_mode()
        );

        let mut processed = Vec::new();
        let mut failed = Vec::new();

        for path in &files {
            let name = file_name(path);
            match self.process_file(path).await {
                Ok(ids) => {
                    info!("文件 {} 处理完成, 报告 {}", name, ids.report);
                    processed.push(name);
                }
                Err(e) => {
                    let kind = e.kind();
                    error!(file = %name, kind = %kind, "文件处理失败: {}", e);
                    if !self.policy.should_continue(kind) {
                        return Err(e.in_file(name));
                    }
                    warn!("跳过文件 {}", name);
                    failed.push(FailedFile {
                        file: name,
                        kind,
                        message: e.to_string(),
                    });
                }
            }
        }

        let report = BatchReport {
            directory: dir.display().to_string(),
            processed,
            failed,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            "批处理完成: 成功 {}, 失败 {}",
            report.processed.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn process_file(&self, path: &Path) -> Result<GraphIds> {
        let dataset = self.loader.load(path)?;
        self.builder.process(dataset.as_ref()).await
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
