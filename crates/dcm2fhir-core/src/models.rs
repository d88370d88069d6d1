//! FHIR资源数据模型定义
//!
//! 仅覆盖建立资源链接所需的字段，不做完整的FHIR结构校验。

use crate::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// LOINC编码系统
pub const LOINC_SYSTEM: &str = "http://loinc.org";
/// DICOM编码系统（模态）
pub const DICOM_SYSTEM: &str = "http://dicom.nema.org/resources/ontology/DCM";
/// 患者年龄扩展
pub const PATIENT_AGE_EXTENSION: &str = "http://hl7.org/fhir/StructureDefinition/patient-age";
/// 患者年龄单位扩展
pub const PATIENT_AGE_UNIT_EXTENSION: &str =
    "http://hl7.org/fhir/StructureDefinition/patient-age-unit";

/// 报告级编码
pub const REPORT_CODE: &str = "36642-7";
pub const REPORT_DISPLAY: &str = "Chest X-ray";
/// 检查级观察编码
pub const STUDY_OBSERVATION_CODE: &str = "65737-9";
/// 序列级观察编码
pub const SERIES_OBSERVATION_CODE: &str = "65737-8";
pub const OBSERVATION_DISPLAY: &str = "Body part examined";

/// 报告内嵌图像的内容类型
pub const PRESENTED_FORM_CONTENT_TYPE: &str = "image/png";

/// FHIR资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Patient,
    Device,
    ImagingStudy,
    Observation,
    DiagnosticReport,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "Patient",
            Self::Device => "Device",
            Self::ImagingStudy => "ImagingStudy",
            Self::Observation => "Observation",
            Self::DiagnosticReport => "DiagnosticReport",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ResourceKind {
    type Error = ConvertError;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "Patient" => Ok(Self::Patient),
            "Device" => Ok(Self::Device),
            "ImagingStudy" => Ok(Self::ImagingStudy),
            "Observation" => Ok(Self::Observation),
            "DiagnosticReport" => Ok(Self::DiagnosticReport),
            _ => Err(ConvertError::Mapping(format!("未知资源类型: {}", value))),
        }
    }
}

/// 资源状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Registered,
    Final,
    Available,
    Active,
    Inactive,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Final => "final",
            Self::Available => "available",
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 性别枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Unknown => "unknown",
        }
    }
}

/// 归一化后的DICOM属性值
///
/// 多值属性保留为有序列表，其余一律为字符串，保证下游只看到原始值或列表。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    List(Vec<String>),
}

impl AttributeValue {
    /// 以单个字符串形式返回，多值按DICOM分隔符 `\` 连接
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join("\\"),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// 资源引用（`Type/id`）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub reference: String,
}

impl Reference {
    pub fn to(kind: ResourceKind, id: &str) -> Self {
        Self {
            reference: format!("{}/{}", kind.as_str(), id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    pub fn new(system: &str, code: impl Into<String>) -> Self {
        Self {
            system: Some(system.to_string()),
            code: code.into(),
            display: None,
        }
    }

    pub fn with_display(mut self, display: &str) -> Self {
        self.display = Some(display.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeableConcept {
    pub coding: Vec<Coding>,
}

impl From<Coding> for CodeableConcept {
    fn from(coding: Coding) -> Self {
        Self { coding: vec![coding] }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    pub url: String,
    pub value_string: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    pub data: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationComponent {
    pub code: CodeableConcept,
    pub value_string: AttributeValue,
}

/// FHIR资源公共行为
pub trait FhirResource: Serialize {
    const KIND: ResourceKind;

    fn id(&self) -> &str;

    fn status(&self) -> ResourceStatus;

    fn set_status(&mut self, status: ResourceStatus);

    /// 指向本资源的引用
    fn reference(&self) -> Reference {
        Reference::to(Self::KIND, self.id())
    }

    /// 序列化为带 `resourceType` 的JSON
    fn to_json(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "resourceType".to_string(),
                Value::String(Self::KIND.as_str().to_string()),
            );
        }
        Ok(value)
    }
}

/// 患者（Subject）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub active: bool,
    pub gender: Gender,
    pub extension: Vec<Extension>,
}

impl FhirResource for Patient {
    const KIND: ResourceKind = ResourceKind::Patient;

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> ResourceStatus {
        if self.active {
            ResourceStatus::Active
        } else {
            ResourceStatus::Inactive
        }
    }

    fn set_status(&mut self, status: ResourceStatus) {
        self.active = status == ResourceStatus::Active;
    }
}

/// 设备（Equipment）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub status: ResourceStatus,
    pub identifier: Vec<Identifier>,
    pub manufacturer: String,
    pub model_number: String,
}

/// 影像检查中的序列摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagingStudySeries {
    pub uid: String,
    pub number: AttributeValue,
    pub modality: Coding,
    pub description: AttributeValue,
    pub body_site: AttributeValue,
}

/// 影像检查（Study）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingStudy {
    pub id: String,
    pub status: ResourceStatus,
    pub subject: Reference,
    pub started: String,
    pub series: Vec<ImagingStudySeries>,
}

/// 观察（检查级或序列级参数）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: String,
    pub status: ResourceStatus,
    pub code: CodeableConcept,
    pub identifier: Vec<Identifier>,
    pub subject: Reference,
    pub derived_from: Vec<Reference>,
    pub component: Vec<ObservationComponent>,
}

/// 诊断报告（Report）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub id: String,
    pub status: ResourceStatus,
    pub code: CodeableConcept,
    pub subject: Reference,
    pub effective_date_time: String,
    pub imaging_study: Vec<Reference>,
    pub result: Vec<Reference>,
    pub presented_form: Vec<Attachment>,
}

macro_rules! status_resource {
    ($ty:ty, $kind:expr) => {
        impl FhirResource for $ty {
            const KIND: ResourceKind = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn status(&self) -> ResourceStatus {
                self.status
            }

            fn set_status(&mut self, status: ResourceStatus) {
                self.status = status;
            }
        }
    };
}

status_resource!(Device, ResourceKind::Device);
status_resource!(ImagingStudy, ResourceKind::ImagingStudy);
status_resource!(Observation, ResourceKind::Observation);
status_resource!(DiagnosticReport, ResourceKind::DiagnosticReport);
