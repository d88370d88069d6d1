//! # dcm2fhir Core
//!
//! DICOM到FHIR转换系统的核心模块，提供统一错误定义、FHIR资源模型和通用推导函数。

pub mod error;
pub mod models;
pub mod utils;

pub use error::{ConvertError, ErrorKind, Result};
pub use models::*;
