//! 测试用合成数据集

use crate::field_table::{SERIES_PARAMETERS, STUDY_PARAMETERS};
use async_trait::async_trait;
use dcm2fhir_core::{AttributeValue, ConvertError, ResourceKind, Result};
use dcm2fhir_dicom::{MemoryDataset, PixelBuffer};
use dcm2fhir_integration::ResourceRepository;
use serde_json::Value;

fn list(values: &[&str]) -> AttributeValue {
    AttributeValue::List(values.iter().map(|v| v.to_string()).collect())
}

/// 组件参数的期望值
pub fn parameter_value(keyword: &str) -> AttributeValue {
    match keyword {
        "ImagePositionPatient" => list(&["-175.0", "-180.5", "-12.0"]),
        "ImageOrientationPatient" => list(&["1", "0", "0", "0", "1", "0"]),
        "PixelSpacing" => list(&["0.683", "0.683"]),
        "PatientOrientation" => list(&["L", "P"]),
        "ScanOptions" => list(&["HELICAL", "AXIAL"]),
        "Rows" | "Columns" => AttributeValue::from("2"),
        "SamplesPerPixel" => AttributeValue::from("1"),
        "BitsAllocated" | "BitsStored" => AttributeValue::from("8"),
        "HighBit" => AttributeValue::from("7"),
        "PixelRepresentation" => AttributeValue::from("0"),
        other => AttributeValue::Text(format!("{}-value", other)),
    }
}

/// 2x2灰度像素
pub fn sample_pixels() -> PixelBuffer {
    PixelBuffer {
        rows: 2,
        columns: 2,
        samples_per_pixel: 1,
        bits_allocated: 8,
        signed: false,
        data: vec![0, 85, 170, 255],
    }
}

/// 完整的合成数据集
pub fn sample_dataset() -> MemoryDataset {
    let mut dataset = MemoryDataset::new()
        .with("PatientID", "P1")
        .with("PatientSex", "F")
        .with("PatientAge", "045Y")
        .with("StudyInstanceUID", "S1")
        .with("StudyID", "STUDY-1")
        .with("StudyDate", "20220603")
        .with("StudyDescription", "CHEST PA")
        .with("SeriesInstanceUID", "SE1")
        .with("SOPInstanceUID", "SOP1")
        .with("SOPClassUID", "1.2.840.10008.5.1.4.1.1.2")
        .with("AccessionNumber", "ACC-001")
        .with("Modality", "CT")
        .with("Manufacturer", "ACME Medical")
        .with("ManufacturerModelName", "Scanner 64")
        .with_pixels(sample_pixels());

    for mapping in STUDY_PARAMETERS.iter().chain(SERIES_PARAMETERS.iter()) {
        dataset.set(mapping.keyword, parameter_value(mapping.keyword));
    }
    dataset
}

/// 指定标识的数据集
pub fn dataset_with_ids(patient: &str, study: &str, series: &str, sop: &str) -> MemoryDataset {
    sample_dataset()
        .with("PatientID", patient)
        .with("StudyInstanceUID", study)
        .with("SeriesInstanceUID", series)
        .with("SOPInstanceUID", sop)
}

/// 总是失败的仓库
pub struct FailingRepository;

fn refused() -> ConvertError {
    ConvertError::Store("connection refused".to_string())
}

#[async_trait]
impl ResourceRepository for FailingRepository {
    async fn upsert(&self, _kind: ResourceKind, _id: &str, _resource: Value) -> Result<Value> {
        Err(refused())
    }

    async fn fetch_all(&self, _kind: ResourceKind) -> Result<Vec<Value>> {
        Err(refused())
    }

    async fn search_by_id(&self, _kind: ResourceKind, _id: &str) -> Result<Vec<Value>> {
        Err(refused())
    }
}
