//! 资源图构建器
//!
//! 把一个已解码数据集转换为六个相互引用的FHIR资源：
//! Patient、Device、ImagingStudy、检查级Observation、序列级Observation和DiagnosticReport。
//! 先在内存中完整组装资源图（包括图像渲染），再按依赖顺序写入存储，
//! 解码或映射失败时不会留下任何已写入的资源。

use crate::field_table::{FieldMapping, PIXEL_DATA_COMPONENT, SERIES_PARAMETERS, STUDY_PARAMETERS};
use crate::state_machine::{CommitMode, LifecycleStateMachine};
use dcm2fhir_core::utils::{extract_age, gender, study_date};
use dcm2fhir_core::{
    Attachment, AttributeValue, Coding, DiagnosticReport, Device, Extension, FhirResource,
    Identifier, ImagingStudy, ImagingStudySeries, Observation, ObservationComponent, Patient,
    Result, DICOM_SYSTEM, LOINC_SYSTEM, OBSERVATION_DISPLAY, PATIENT_AGE_EXTENSION,
    PATIENT_AGE_UNIT_EXTENSION, REPORT_CODE, REPORT_DISPLAY, SERIES_OBSERVATION_CODE,
    STUDY_OBSERVATION_CODE,
};
use dcm2fhir_dicom::{encode_base64, Dataset, ImageRenderer};
use dcm2fhir_integration::ResourceRepository;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// 一个数据集对应的完整资源图
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceGraph {
    pub patient: Patient,
    pub device: Device,
    pub imaging_study: ImagingStudy,
    pub study_observation: Observation,
    pub series_observation: Observation,
    pub report: DiagnosticReport,
}

impl ResourceGraph {
    pub fn ids(&self) -> GraphIds {
        GraphIds {
            patient: self.patient.id.clone(),
            device: self.device.id.clone(),
            imaging_study: self.imaging_study.id.clone(),
            study_observation: self.study_observation.id.clone(),
            series_observation: self.series_observation.id.clone(),
            report: self.report.id.clone(),
        }
    }
}

/// 资源图中各资源的标识
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphIds {
    pub patient: String,
    pub device: String,
    pub imaging_study: String,
    pub study_observation: String,
    pub series_observation: String,
    pub report: String,
}

/// 资源图构建器
pub struct GraphBuilder {
    repository: Arc<dyn ResourceRepository>,
    renderer: Arc<dyn ImageRenderer>,
    lifecycle: LifecycleStateMachine,
    commit_mode: CommitMode,
}

impl GraphBuilder {
    /// 创建新的构建器，默认两阶段提交
    pub fn new(repository: Arc<dyn ResourceRepository>, renderer: Arc<dyn ImageRenderer>) -> Self {
        Self {
            repository,
            renderer,
            lifecycle: LifecycleStateMachine::new(),
            commit_mode: CommitMode::default(),
        }
    }

    pub fn with_commit_mode(mut self, commit_mode: CommitMode) -> Self {
        self.commit_mode = commit_mode;
        self
    }

    pub fn commit_mode(&self) -> CommitMode {
        self.commit_mode
    }

    /// 转换并写入一个数据集
    pub async fn process(&self, dataset: &dyn Dataset) -> Result<GraphIds> {
        let graph = self.assemble(dataset)?;
        self.persist(graph).await
    }

    /// 在内存中组装资源图，不访问存储
    pub fn assemble(&self, dataset: &dyn Dataset) -> Result<ResourceGraph> {
        let patient = Self::patient(dataset)?;
        let device = Self::device(dataset)?;
        let imaging_study = Self::imaging_study(dataset, &device)?;
        let study_observation = Self::study_observation(dataset, &patient, &imaging_study)?;
        let series_observation = Self::series_observation(dataset, &patient, &study_observation)?;
        let report = self.report(
            dataset,
            &patient,
            &imaging_study,
            &study_observation,
            &series_observation,
        )?;

        Ok(ResourceGraph {
            patient,
            device,
            imaging_study,
            study_observation,
            series_observation,
            report,
        })
    }

    /// 按依赖顺序写入资源图
    pub async fn persist(&self, graph: ResourceGraph) -> Result<GraphIds> {
        let ids = graph.ids();

        self.commit(graph.patient).await?;
        self.commit(graph.device).await?;
        self.commit(graph.imaging_study).await?;
        self.commit(graph.study_observation).await?;
        self.commit(graph.series_observation).await?;
        self.commit(graph.report).await?;

        info!("资源图写入完成: 报告 {}", ids.report);
        Ok(ids)
    }

    /// 按提交方式写入单个资源
    async fn commit<R>(&self, mut resource: R) -> Result<()>
    where
        R: FhirResource + Send + Sync,
    {
        match self.commit_mode {
            CommitMode::TwoPhase => {
                resource.set_status(LifecycleStateMachine::initial_status(R::KIND));
                self.write(&resource).await?;

                let next = self.lifecycle.advance(R::KIND, resource.status())?;
                resource.set_status(next);
                self.write(&resource).await
            }
            CommitMode::SingleWrite => {
                resource.set_status(self.lifecycle.terminal_status(R::KIND)?);
                self.write(&resource).await
            }
        }
    }

    async fn write<R: FhirResource>(&self, resource: &R) -> Result<()> {
        let body = resource.to_json()?;
        self.repository.upsert(R::KIND, resource.id(), body).await?;
        info!("写入 {}/{} 状态 {}", R::KIND, resource.id(), resource.status());
        Ok(())
    }

    fn patient(dataset: &dyn Dataset) -> Result<Patient> {
        let age = extract_age(&dataset.text("PatientAge")?)?;

        Ok(Patient {
            id: dataset.text("PatientID")?,
            active: false,
            gender: gender(&dataset.text("PatientSex")?),
            extension: vec![
                Extension {
                    url: PATIENT_AGE_EXTENSION.to_string(),
                    value_string: age.age.to_string(),
                },
                Extension {
                    url: PATIENT_AGE_UNIT_EXTENSION.to_string(),
                    value_string: age.unit.as_str().to_string(),
                },
            ],
        })
    }

    fn device(dataset: &dyn Dataset) -> Result<Device> {
        Ok(Device {
            id: dataset.text("SOPInstanceUID")?,
            status: LifecycleStateMachine::initial_status(Device::KIND),
            identifier: vec![Identifier {
                value: dataset.text("SOPClassUID")?,
            }],
            manufacturer: dataset.text("Manufacturer")?,
            model_number: dataset.text("ManufacturerModelName")?,
        })
    }

    fn imaging_study(dataset: &dyn Dataset, device: &Device) -> Result<ImagingStudy> {
        let series = ImagingStudySeries {
            uid: dataset.text("SOPInstanceUID")?,
            number: dataset.attribute("AccessionNumber")?,
            modality: Coding::new(DICOM_SYSTEM, dataset.text("Modality")?),
            description: dataset.attribute("StudyDescription")?,
            body_site: dataset.attribute("BodyPartExamined")?,
        };

        Ok(ImagingStudy {
            id: dataset.text("StudyInstanceUID")?,
            status: LifecycleStateMachine::initial_status(ImagingStudy::KIND),
            // 影像检查的主体指向采集设备
            subject: device.reference(),
            started: study_date(&dataset.text("StudyDate")?),
            series: vec![series],
        })
    }

    fn study_observation(
        dataset: &dyn Dataset,
        patient: &Patient,
        imaging_study: &ImagingStudy,
    ) -> Result<Observation> {
        Ok(Observation {
            id: dataset.text("StudyInstanceUID")?,
            status: LifecycleStateMachine::initial_status(Observation::KIND),
            code: Coding::new(LOINC_SYSTEM, STUDY_OBSERVATION_CODE)
                .with_display(OBSERVATION_DISPLAY)
                .into(),
            identifier: vec![Identifier {
                value: dataset.text("StudyID")?,
            }],
            subject: patient.reference(),
            derived_from: vec![imaging_study.reference()],
            component: components(dataset, &STUDY_PARAMETERS)?,
        })
    }

    fn series_observation(
        dataset: &dyn Dataset,
        patient: &Patient,
        study_observation: &Observation,
    ) -> Result<Observation> {
        let mut component = components(dataset, &SERIES_PARAMETERS)?;
        component.push(ObservationComponent {
            code: PIXEL_DATA_COMPONENT.concept(),
            value_string: AttributeValue::Text(encode_base64(&dataset.raw_pixel_data()?)),
        });

        Ok(Observation {
            id: dataset.text("SeriesInstanceUID")?,
            status: LifecycleStateMachine::initial_status(Observation::KIND),
            code: Coding::new(LOINC_SYSTEM, SERIES_OBSERVATION_CODE)
                .with_display(OBSERVATION_DISPLAY)
                .into(),
            identifier: vec![Identifier {
                value: dataset.text("StudyID")?,
            }],
            subject: patient.reference(),
            derived_from: vec![study_observation.reference()],
            component,
        })
    }

    fn report(
        &self,
        dataset: &dyn Dataset,
        patient: &Patient,
        imaging_study: &ImagingStudy,
        study_observation: &Observation,
        series_observation: &Observation,
    ) -> Result<DiagnosticReport> {
        let image = self.renderer.render(&dataset.pixel_buffer()?)?;
        debug!("图像渲染完成: {} 字节(base64)", image.data.len());

        Ok(DiagnosticReport {
            id: dataset.text("SOPInstanceUID")?,
            status: LifecycleStateMachine::initial_status(DiagnosticReport::KIND),
            code: Coding::new(LOINC_SYSTEM, REPORT_CODE)
                .with_display(REPORT_DISPLAY)
                .into(),
            subject: patient.reference(),
            effective_date_time: study_date(&dataset.text("StudyDate")?),
            imaging_study: vec![imaging_study.reference()],
            result: vec![study_observation.reference(), series_observation.reference()],
            presented_form: vec![Attachment {
                content_type: image.content_type.to_string(),
                data: image.data,
                title: dataset.text("SOPClassUID")?,
            }],
        })
    }
}

/// 按映射表顺序生成观察组件，缺失属性即失败
fn components(dataset: &dyn Dataset, table: &[FieldMapping]) -> Result<Vec<ObservationComponent>> {
    table
        .iter()
        .map(|mapping| {
            Ok(ObservationComponent {
                code: mapping.concept(),
                value_string: dataset.attribute(mapping.keyword)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{dataset_with_ids, sample_dataset, sample_pixels, FailingRepository};
    use dcm2fhir_core::{ConvertError, ErrorKind, ResourceKind};
    use dcm2fhir_dicom::PngRenderer;
    use dcm2fhir_integration::InMemoryRepository;

    fn builder(repo: Arc<InMemoryRepository>) -> GraphBuilder {
        GraphBuilder::new(repo, Arc::new(PngRenderer::new()))
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let repo = Arc::new(InMemoryRepository::new());
        let ids = builder(repo.clone()).process(&sample_dataset()).await.unwrap();

        assert_eq!(ids.patient, "P1");
        assert_eq!(ids.imaging_study, "S1");
        assert_eq!(ids.series_observation, "SE1");
        assert_eq!(ids.report, "SOP1");

        let patient = repo.get(ResourceKind::Patient, "P1").await.unwrap();
        assert_eq!(patient["resourceType"], "Patient");
        assert_eq!(patient["active"], true);
        assert_eq!(patient["gender"], "female");
        assert_eq!(patient["extension"][0]["url"], PATIENT_AGE_EXTENSION);
        assert_eq!(patient["extension"][0]["valueString"], "45");
        assert_eq!(patient["extension"][1]["valueString"], "years");

        let device = repo.get(ResourceKind::Device, "SOP1").await.unwrap();
        assert_eq!(device["status"], "inactive");
        assert_eq!(device["modelNumber"], "Scanner 64");

        let study = repo.get(ResourceKind::ImagingStudy, "S1").await.unwrap();
        assert_eq!(study["status"], "available");
        assert_eq!(study["started"], "2022-06-03");
        assert_eq!(study["subject"]["reference"], "Device/SOP1");
        assert_eq!(study["series"][0]["modality"]["code"], "CT");
        assert_eq!(study["series"][0]["number"], "ACC-001");

        let study_obs = repo.get(ResourceKind::Observation, "S1").await.unwrap();
        assert_eq!(study_obs["status"], "final");
        assert_eq!(study_obs["code"]["coding"][0]["code"], STUDY_OBSERVATION_CODE);
        assert_eq!(study_obs["subject"]["reference"], "Patient/P1");
        assert_eq!(study_obs["derivedFrom"][0]["reference"], "ImagingStudy/S1");
        assert_eq!(study_obs["component"].as_array().unwrap().len(), 20);
        assert_eq!(study_obs["component"][1]["valueString"], serde_json::json!(["HELICAL", "AXIAL"]));

        let series_obs = repo.get(ResourceKind::Observation, "SE1").await.unwrap();
        assert_eq!(series_obs["derivedFrom"][0]["reference"], "Observation/S1");
        let components = series_obs["component"].as_array().unwrap();
        assert_eq!(components.len(), 24);
        assert_eq!(components[23]["code"]["coding"][0]["code"], "pixeldata");
        assert_eq!(components[23]["valueString"], encode_base64(&sample_pixels().data));

        let report = repo.get(ResourceKind::DiagnosticReport, "SOP1").await.unwrap();
        assert_eq!(report["status"], "final");
        assert_eq!(report["code"]["coding"][0]["code"], REPORT_CODE);
        assert_eq!(report["effectiveDateTime"], "2022-06-03");
        assert_eq!(report["subject"]["reference"], "Patient/P1");
        assert_eq!(report["imagingStudy"][0]["reference"], "ImagingStudy/S1");
        assert_eq!(report["result"][0]["reference"], "Observation/S1");
        assert_eq!(report["result"][1]["reference"], "Observation/SE1");
        assert_eq!(report["presentedForm"][0]["contentType"], "image/png");
        assert_eq!(report["presentedForm"][0]["title"], "1.2.840.10008.5.1.4.1.1.2");
        assert!(!report["presentedForm"][0]["data"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reprocessing_is_idempotent() {
        let repo = Arc::new(InMemoryRepository::new());
        let builder = builder(repo.clone());

        let first = builder.process(&sample_dataset()).await.unwrap();
        let second = builder.process(&sample_dataset()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.len().await, 6);
        assert_eq!(repo.count(ResourceKind::Observation).await, 2);
        assert_eq!(
            repo.get(ResourceKind::DiagnosticReport, "SOP1").await.unwrap()["status"],
            "final"
        );
    }

    #[tokio::test]
    async fn test_distinct_datasets_share_patient() {
        let repo = Arc::new(InMemoryRepository::new());
        let builder = builder(repo.clone());

        builder.process(&dataset_with_ids("P1", "S1", "SE1", "SOP1")).await.unwrap();
        builder.process(&dataset_with_ids("P1", "S2", "SE2", "SOP2")).await.unwrap();

        assert_eq!(repo.count(ResourceKind::Patient).await, 1);
        assert_eq!(repo.count(ResourceKind::DiagnosticReport).await, 2);
        assert_eq!(repo.count(ResourceKind::Observation).await, 4);
    }

    #[tokio::test]
    async fn test_missing_attribute_writes_nothing() {
        let repo = Arc::new(InMemoryRepository::new());
        let mut dataset = sample_dataset();
        dataset.remove("KVP");

        let err = builder(repo.clone()).process(&dataset).await.unwrap_err();

        assert!(matches!(err, ConvertError::MissingAttribute(ref k) if k == "KVP"));
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(repo.is_empty().await);
        assert_eq!(repo.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_age_fails_dataset() {
        let repo = Arc::new(InMemoryRepository::new());
        let dataset = sample_dataset().with("PatientAge", "Y");

        let err = builder(repo.clone()).process(&dataset).await.unwrap_err();

        assert!(matches!(err, ConvertError::InvalidAgeCode(_)));
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_commit_modes_write_counts() {
        let repo = Arc::new(InMemoryRepository::new());
        builder(repo.clone()).process(&sample_dataset()).await.unwrap();
        assert_eq!(repo.write_count().await, 12);

        let repo = Arc::new(InMemoryRepository::new());
        builder(repo.clone())
            .with_commit_mode(CommitMode::SingleWrite)
            .process(&sample_dataset())
            .await
            .unwrap();
        assert_eq!(repo.write_count().await, 6);
        assert_eq!(repo.get(ResourceKind::Patient, "P1").await.unwrap()["active"], true);
        assert_eq!(
            repo.get(ResourceKind::ImagingStudy, "S1").await.unwrap()["status"],
            "available"
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_store_error() {
        let builder = GraphBuilder::new(Arc::new(FailingRepository), Arc::new(PngRenderer::new()));

        let err = builder.process(&sample_dataset()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
    }

    #[test]
    fn test_assemble_is_pure() {
        let repo = Arc::new(InMemoryRepository::new());
        let graph = builder(repo).assemble(&sample_dataset()).unwrap();

        assert!(!graph.patient.active);
        assert_eq!(graph.report.status, dcm2fhir_core::ResourceStatus::Registered);
        assert_eq!(graph.series_observation.reference().reference, "Observation/SE1");
    }
}
