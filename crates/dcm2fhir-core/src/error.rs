//! 错误定义模块

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 转换系统统一错误类型
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("DICOM解码错误: {0}")]
    Decode(String),

    #[error("缺少必需的DICOM属性: {0}")]
    MissingAttribute(String),

    #[error("无效的年龄编码: {0:?}")]
    InvalidAgeCode(String),

    #[error("映射错误: {0}")]
    Mapping(String),

    #[error("资源存储错误: {0}")]
    Store(String),

    #[error("资源存储返回错误状态 {status}: {url}")]
    StoreStatus { status: u16, url: String },

    #[error("图像渲染错误: {0}")]
    Render(String),

    #[error("无效状态转换: {kind} 从 {from}")]
    InvalidStateTransition { kind: String, from: String },

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("处理文件 {file} 失败: {source}")]
    Dataset {
        file: String,
        #[source]
        source: Box<ConvertError>,
    },
}

/// 错误分类，批处理驱动据此决定是否继续
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// 源数据集缺失或格式错误
    Decode,
    /// 数据集到资源的映射失败
    Mapping,
    /// 远程资源存储调用失败
    Store,
    /// 其他错误
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Mapping => "mapping",
            Self::Store => "store",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConvertError {
    /// 获取错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) | Self::MissingAttribute(_) | Self::InvalidAgeCode(_) => {
                ErrorKind::Decode
            }
            Self::Mapping(_) | Self::Render(_) | Self::InvalidStateTransition { .. } => {
                ErrorKind::Mapping
            }
            Self::Store(_) | Self::StoreStatus { .. } => ErrorKind::Store,
            Self::Dataset { source, .. } => source.kind(),
            Self::Config(_) | Self::Serialization(_) | Self::Io(_) => ErrorKind::Other,
        }
    }

    /// 附加文件名上下文
    pub fn in_file(self, file: impl Into<String>) -> Self {
        Self::Dataset {
            file: file.into(),
            source: Box::new(self),
        }
    }
}

/// 转换系统统一结果类型
pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        assert_eq!(ConvertError::MissingAttribute("KVP".into()).kind(), ErrorKind::Decode);
        assert_eq!(ConvertError::InvalidAgeCode("5".into()).kind(), ErrorKind::Decode);
        assert_eq!(ConvertError::Render("bits".into()).kind(), ErrorKind::Mapping);
        assert_eq!(
            ConvertError::StoreStatus { status: 500, url: "http://x/Patient/1".into() }.kind(),
            ErrorKind::Store
        );
        assert_eq!(ConvertError::Config("base_url".into()).kind(), ErrorKind::Other);
    }

    #[test]
    fn test_file_context_keeps_kind() {
        let err = ConvertError::Store("connection refused".into()).in_file("a.dcm");
        assert_eq!(err.kind(), ErrorKind::Store);
        assert!(err.to_string().contains("a.dcm"));
    }
}
