//! # FHIR集成模块
//!
//! 提供与外部FHIR资源存储的集成功能，包括：
//! - 资源仓库接口，支持按标识创建或更新、全量获取和按标识搜索
//! - 基于REST的FHIR客户端实现
//! - 内存资源仓库，用于测试和试运行
//! - 按点分路径读取资源字段

pub mod client;
pub mod path;
pub mod repository;

pub use client::{FhirClient, FhirClientConfig};
pub use path::{get_by_path, get_str_by_path};
pub use repository::{InMemoryRepository, ResourceRepository};
