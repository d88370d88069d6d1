//! # DICOM到FHIR映射模块
//!
//! 提供双向映射引擎，包括：
//! - 字段映射表：DICOM属性到观察组件的固定映射
//! - 资源生命周期状态机：管理资源从过渡状态到终态的转换
//! - 资源图构建器：把一个数据集转换为六个相互引用的FHIR资源并写入存储
//! - 资源图遍历器：沿引用链把存储中的资源展开为扁平记录
//! - 批处理驱动：逐个处理目录中的DICOM文件

pub mod batch;
pub mod builder;
pub mod field_table;
pub mod state_machine;
pub mod traversal;

#[cfg(test)]
mod fixtures;

// 重新导出主要类型
pub use batch::{BatchDriver, BatchReport, FailedFile, FailurePolicy};
pub use builder::{GraphBuilder, GraphIds, ResourceGraph};
pub use field_table::{FieldMapping, PIXEL_DATA_COMPONENT, SERIES_PARAMETERS, STUDY_PARAMETERS};
pub use state_machine::{CommitMode, LifecycleStateMachine};
pub use traversal::{GraphAggregator, ReportRecord};
