//! 资源图遍历器
//!
//! 从存储中读取最终状态的胸片报告，沿引用链
//! 报告 → 患者 / 观察 → 影像检查 → 设备
//! 展开为扁平记录。观察组件按编码读取，不依赖组件位置。

use crate::field_table::{FieldMapping, SERIES_PARAMETERS, STUDY_PARAMETERS};
use crate::state_machine::LifecycleStateMachine;
use dcm2fhir_core::utils::split_reference;
use dcm2fhir_core::{
    ResourceKind, ResourceStatus, Result, PATIENT_AGE_EXTENSION, PATIENT_AGE_UNIT_EXTENSION,
    REPORT_CODE, SERIES_OBSERVATION_CODE, STUDY_OBSERVATION_CODE,
};
use dcm2fhir_integration::{get_by_path, get_str_by_path, ResourceRepository};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 一份报告展开后的扁平记录
///
/// 无法解析的引用对应的字段保持缺失。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportRecord {
    pub recorded_date: Option<String>,
    #[serde(rename = "sopinstanceUID")]
    pub sop_instance_uid: Option<String>,
    pub image_data: Option<String>,
    pub image_title: Option<String>,
    pub patient_id: Option<String>,
    pub gender: Option<String>,
    pub age: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_unit: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub studyinstanceuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession_number: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub study_description: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seriesinstanceuid: Option<String>,

    /// 观察组件展开的参数，键为记录字段名
    #[serde(flatten)]
    pub parameters: BTreeMap<String, Value>,
}

impl ReportRecord {
    /// 按记录字段名读取参数
    pub fn parameter(&self, field: &str) -> Option<&Value> {
        self.parameters.get(field)
    }

    fn seed(report: &Value) -> Self {
        Self {
            recorded_date: string_at(report, "effectiveDateTime"),
            sop_instance_uid: string_at(report, "id"),
            image_data: string_at(report, "presentedForm.0.data"),
            image_title: string_at(report, "presentedForm.0.title"),
            ..Default::default()
        }
    }
}

/// 资源图遍历器
pub struct GraphAggregator {
    repository: Arc<dyn ResourceRepository>,
    lifecycle: LifecycleStateMachine,
}

impl GraphAggregator {
    pub fn new(repository: Arc<dyn ResourceRepository>) -> Self {
        Self {
            repository,
            lifecycle: LifecycleStateMachine::new(),
        }
    }

    /// 遍历全部报告，按存储返回顺序生成记录
    ///
    /// 获取报告列表失败时整体返回错误，其余引用解析失败只记录警告。
    pub async fn collect(&self) -> Result<Vec<ReportRecord>> {
        let reports = self.repository.fetch_all(ResourceKind::DiagnosticReport).await?;
        let total = reports.len();

        let mut records = Vec::new();
        for report in reports.iter().filter(|r| self.is_final_chest_report(r)) {
            records.push(self.expand(report).await);
        }

        info!("遍历报告 {} 份，生成记录 {} 条", total, records.len());
        Ok(records)
    }

    /// 已到达终态的胸片报告
    fn is_final_chest_report(&self, report: &Value) -> bool {
        let terminal = get_by_path(report, "status")
            .and_then(|status| ResourceStatus::deserialize(status).ok())
            .is_some_and(|status| self.lifecycle.is_terminal(ResourceKind::DiagnosticReport, status));
        terminal && get_str_by_path(report, "code.coding.0.code") == Some(REPORT_CODE)
    }

    async fn expand(&self, report: &Value) -> ReportRecord {
        let mut record = ReportRecord::seed(report);
        debug!("展开报告 {:?}", record.sop_instance_uid);

        if let Some(patient_id) = reference_id(report, "subject.reference") {
            record.patient_id = Some(patient_id.to_string());
            if let Some(patient) = self.resolve(ResourceKind::Patient, patient_id).await {
                record.gender = string_at(&patient, "gender");
                record.age = extension_value(&patient, PATIENT_AGE_EXTENSION);
                record.age_unit = extension_value(&patient, PATIENT_AGE_UNIT_EXTENSION);
            }
        }

        let results = report
            .get("result")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for result in results {
            let Some(observation_id) = reference_id(result, "reference") else {
                continue;
            };
            let Some(observation) = self.resolve(ResourceKind::Observation, observation_id).await
            else {
                continue;
            };

            match get_str_by_path(&observation, "code.coding.0.code") {
                Some(STUDY_OBSERVATION_CODE) => self.expand_study(&observation, &mut record).await,
                Some(SERIES_OBSERVATION_CODE) => {
                    record.seriesinstanceuid = string_at(&observation, "id");
                    flatten_components(&observation, &SERIES_PARAMETERS, &mut record);
                }
                other => debug!("跳过未知观察编码 {:?}: {}", other, observation_id),
            }
        }

        record
    }

    async fn expand_study(&self, observation: &Value, record: &mut ReportRecord) {
        record.studyinstanceuid = string_at(observation, "id");
        record.study_id = string_at(observation, "identifier.0.value");
        flatten_components(observation, &STUDY_PARAMETERS, record);

        let Some(study_id) = reference_id(observation, "derivedFrom.0.reference") else {
            return;
        };
        let Some(study) = self.resolve(ResourceKind::ImagingStudy, study_id).await else {
            return;
        };

        record.accession_number = get_by_path(&study, "series.0.number").cloned();
        record.modality = string_at(&study, "series.0.modality.code");
        record.study_description = get_by_path(&study, "series.0.description").cloned();

        let Some(device_id) = reference_id(&study, "subject.reference") else {
            return;
        };
        if let Some(device) = self.resolve(ResourceKind::Device, device_id).await {
            record.manufacturer = string_at(&device, "manufacturer");
            record.model_number = string_at(&device, "modelNumber");
        }
    }

    /// 按标识解析资源，多个结果时取最后一个
    async fn resolve(&self, kind: ResourceKind, id: &str) -> Option<Value> {
        debug!("解析引用 {}/{}", kind, id);
        match self.repository.search_by_id(kind, id).await {
            Ok(found) => {
                let resolved = found.into_iter().last();
                if resolved.is_none() {
                    warn!("引用的资源不存在: {}/{}", kind, id);
                }
                resolved
            }
            Err(e) => {
                warn!("解析引用 {}/{} 失败: {}", kind, id, e);
                None
            }
        }
    }
}

fn string_at(resource: &Value, path: &str) -> Option<String> {
    get_str_by_path(resource, path).map(str::to_string)
}

/// 引用字段中的资源标识
fn reference_id<'a>(resource: &'a Value, path: &str) -> Option<&'a str> {
    let reference = get_str_by_path(resource, path)?;
    match split_reference(reference) {
        Some((_, id)) => Some(id),
        None => {
            warn!("无法解析的引用: {:?}", reference);
            None
        }
    }
}

fn extension_value(resource: &Value, url: &str) -> Option<String> {
    resource
        .get("extension")?
        .as_array()?
        .iter()
        .find(|ext| get_str_by_path(ext, "url") == Some(url))
        .and_then(|ext| string_at(ext, "valueString"))
}

/// 按组件编码展开到记录
fn flatten_components(observation: &Value, table: &[FieldMapping], record: &mut ReportRecord) {
    let components = observation
        .get("component")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for mapping in table {
        let value = components
            .iter()
            .find(|c| get_str_by_path(c, "code.coding.0.code") == Some(mapping.code))
            .and_then(|c| get_by_path(c, "valueString"));

        match value {
            Some(value) => {
                record
                    .parameters
                    .insert(mapping.record_field.to_string(), value.clone());
            }
            None => debug!("观察缺少组件 {}", mapping.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::fixtures::{dataset_with_ids, parameter_value, sample_dataset, FailingRepository};
    use dcm2fhir_core::ConvertError;
    use dcm2fhir_dicom::PngRenderer;
    use dcm2fhir_integration::InMemoryRepository;
    use serde_json::json;

    async fn populated() -> Arc<InMemoryRepository> {
        let repo = Arc::new(InMemoryRepository::new());
        GraphBuilder::new(repo.clone(), Arc::new(PngRenderer::new()))
            .process(&sample_dataset())
            .await
            .unwrap();
        repo
    }

    #[tokio::test]
    async fn test_round_trip_of_every_field() {
        let repo = populated().await;
        let records = GraphAggregator::new(repo).collect().await.unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.sop_instance_uid.as_deref(), Some("SOP1"));
        assert_eq!(record.recorded_date.as_deref(), Some("2022-06-03"));
        assert_eq!(record.image_title.as_deref(), Some("1.2.840.10008.5.1.4.1.1.2"));
        assert!(record.image_data.is_some());
        assert_eq!(record.patient_id.as_deref(), Some("P1"));
        assert_eq!(record.gender.as_deref(), Some("female"));
        assert_eq!(record.age.as_deref(), Some("45"));
        assert_eq!(record.age_unit.as_deref(), Some("years"));
        assert_eq!(record.studyinstanceuid.as_deref(), Some("S1"));
        assert_eq!(record.study_id.as_deref(), Some("STUDY-1"));
        assert_eq!(record.accession_number, Some(json!("ACC-001")));
        assert_eq!(record.modality.as_deref(), Some("CT"));
        assert_eq!(record.study_description, Some(json!("CHEST PA")));
        assert_eq!(record.manufacturer.as_deref(), Some("ACME Medical"));
        assert_eq!(record.model_number.as_deref(), Some("Scanner 64"));
        assert_eq!(record.seriesinstanceuid.as_deref(), Some("SE1"));

        for mapping in STUDY_PARAMETERS.iter().chain(SERIES_PARAMETERS.iter()) {
            assert_eq!(
                record.parameter(mapping.record_field),
                Some(&parameter_value(mapping.keyword).to_json()),
                "字段 {} 不一致",
                mapping.record_field
            );
        }
        assert_eq!(record.parameters.len(), 43);
        assert!(record.parameter("pixeldata").is_none());
    }

    #[tokio::test]
    async fn test_record_serialization() {
        let repo = populated().await;
        let records = GraphAggregator::new(repo).collect().await.unwrap();
        let json = serde_json::to_value(&records[0]).unwrap();

        assert_eq!(json["sopinstanceUID"], "SOP1");
        assert_eq!(json["scan_mode"], "SliceThickness-value");
        assert_eq!(json["pixelspacing"], json!(["0.683", "0.683"]));
        assert!(json.get("parameters").is_none());
    }

    #[tokio::test]
    async fn test_components_are_read_by_code() {
        let repo = populated().await;
        let mut series = repo.get(ResourceKind::Observation, "SE1").await.unwrap();
        series["component"].as_array_mut().unwrap().reverse();
        repo.upsert(ResourceKind::Observation, "SE1", series).await.unwrap();

        let records = GraphAggregator::new(repo).collect().await.unwrap();
        assert_eq!(records[0].parameter("seriesnumber"), Some(&json!("SeriesNumber-value")));
        assert_eq!(records[0].parameter("rows"), Some(&json!("2")));
    }

    #[tokio::test]
    async fn test_report_filtering() {
        let repo = populated().await;
        repo.upsert(
            ResourceKind::DiagnosticReport,
            "DRAFT",
            json!({"id": "DRAFT", "status": "registered", "code": {"coding": [{"code": REPORT_CODE}]}}),
        )
        .await
        .unwrap();
        repo.upsert(
            ResourceKind::DiagnosticReport,
            "OTHER",
            json!({"id": "OTHER", "status": "final", "code": {"coding": [{"code": "24627-2"}]}}),
        )
        .await
        .unwrap();
        repo.upsert(
            ResourceKind::DiagnosticReport,
            "AMENDED",
            json!({"id": "AMENDED", "status": "amended", "code": {"coding": [{"code": REPORT_CODE}]}}),
        )
        .await
        .unwrap();

        let records = GraphAggregator::new(repo).collect().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sop_instance_uid.as_deref(), Some("SOP1"));
    }

    #[tokio::test]
    async fn test_records_follow_store_order() {
        let repo = Arc::new(InMemoryRepository::new());
        let builder = GraphBuilder::new(repo.clone(), Arc::new(PngRenderer::new()));
        builder.process(&dataset_with_ids("P2", "S2", "SE2", "SOP2")).await.unwrap();
        builder.process(&dataset_with_ids("P1", "S1", "SE1", "SOP1")).await.unwrap();

        let records = GraphAggregator::new(repo).collect().await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.sop_instance_uid.as_deref()).collect();
        assert_eq!(ids, vec![Some("SOP2"), Some("SOP1")]);
        assert_eq!(records[0].patient_id.as_deref(), Some("P2"));
    }

    #[tokio::test]
    async fn test_missing_patient_leaves_fields_absent() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.upsert(
            ResourceKind::DiagnosticReport,
            "SOP9",
            json!({
                "id": "SOP9",
                "status": "final",
                "code": {"coding": [{"code": REPORT_CODE}]},
                "subject": {"reference": "Patient/NOPE"},
                "result": [{"reference": "Observation/GONE"}, {"display": "no reference"}]
            }),
        )
        .await
        .unwrap();

        let records = GraphAggregator::new(repo).collect().await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.patient_id.as_deref(), Some("NOPE"));
        assert!(record.gender.is_none());
        assert!(record.age.is_none());
        assert!(record.studyinstanceuid.is_none());
        assert!(record.recorded_date.is_none());
        assert!(record.parameters.is_empty());

        let json = serde_json::to_value(record).unwrap();
        assert!(json["gender"].is_null());
        assert!(json.get("studyinstanceuid").is_none());
    }

    #[tokio::test]
    async fn test_fetch_failure_is_error() {
        let err = GraphAggregator::new(Arc::new(FailingRepository))
            .collect()
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Store(_)));
    }
}
