//! 资源生命周期状态机
//!
//! 每类资源先以过渡状态写入，再推进一步到终态：
//! - Patient: inactive → active
//! - Device: active → inactive
//! - ImagingStudy: registered → available
//! - Observation / DiagnosticReport: registered → final

use dcm2fhir_core::{ConvertError, ResourceKind, ResourceStatus, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 资源提交方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// 先写入过渡状态，再写入终态（两次PUT）
    #[default]
    TwoPhase,
    /// 直接以终态写入（一次PUT）
    SingleWrite,
}

/// 生命周期状态机
#[derive(Debug)]
pub struct LifecycleStateMachine {
    transitions: HashMap<(ResourceKind, ResourceStatus), ResourceStatus>,
}

impl LifecycleStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((ResourceKind::Patient, ResourceStatus::Inactive), ResourceStatus::Active);
        transitions.insert((ResourceKind::Device, ResourceStatus::Active), ResourceStatus::Inactive);
        transitions.insert((ResourceKind::ImagingStudy, ResourceStatus::Registered), ResourceStatus::Available);
        transitions.insert((ResourceKind::Observation, ResourceStatus::Registered), ResourceStatus::Final);
        transitions.insert((ResourceKind::DiagnosticReport, ResourceStatus::Registered), ResourceStatus::Final);

        Self { transitions }
    }

    /// 资源创建时的过渡状态
    pub fn initial_status(kind: ResourceKind) -> ResourceStatus {
        match kind {
            ResourceKind::Patient => ResourceStatus::Inactive,
            ResourceKind::Device => ResourceStatus::Active,
            ResourceKind::ImagingStudy
            | ResourceKind::Observation
            | ResourceKind::DiagnosticReport => ResourceStatus::Registered,
        }
    }

    /// 资源的终态
    pub fn terminal_status(&self, kind: ResourceKind) -> Result<ResourceStatus> {
        self.advance(kind, Self::initial_status(kind))
    }

    /// 推进一步
    pub fn advance(&self, kind: ResourceKind, from: ResourceStatus) -> Result<ResourceStatus> {
        self.transitions
            .get(&(kind, from))
            .copied()
            .ok_or_else(|| ConvertError::InvalidStateTransition {
                kind: kind.to_string(),
                from: from.to_string(),
            })
    }

    /// 是否为终态
    pub fn is_terminal(&self, kind: ResourceKind, status: ResourceStatus) -> bool {
        matches!(self.terminal_status(kind), Ok(terminal) if terminal == status)
    }
}

impl Default for LifecycleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
