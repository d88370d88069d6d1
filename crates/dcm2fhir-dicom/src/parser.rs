//! DICOM文件数据集
//!
//! 基于dicom-rs读取文件，并把属性值归一化为字符串或字符串列表

use crate::dataset::{Dataset, DatasetLoader, PixelBuffer};
use dcm2fhir_core::{AttributeValue, ConvertError, Result};
use dicom::core::value::{PrimitiveValue, Value};
use dicom::dictionary_std::tags;
use dicom::object::{open_file, DefaultDicomObject, InMemDicomObject};
use dicom_pixeldata::PixelDecoder;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// 由DICOM文件解析得到的数据集
pub struct DicomFileDataset {
    path: PathBuf,
    obj: DefaultDicomObject,
}

impl DicomFileDataset {
    /// 打开DICOM文件
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("开始解析DICOM文件: {:?}", path);

        let obj = open_file(path).map_err(|e| {
            error!("DICOM文件解析失败: {:?}", e);
            ConvertError::Decode(format!("无法解析DICOM文件 {:?}: {}", path, e))
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            obj,
        })
    }
}

impl Dataset for DicomFileDataset {
    fn attribute(&self, keyword: &str) -> Result<AttributeValue> {
        attribute_of(&self.obj, keyword)
    }

    fn raw_pixel_data(&self) -> Result<Vec<u8>> {
        let element = self
            .obj
            .element(tags::PIXEL_DATA)
            .map_err(|_| ConvertError::MissingAttribute("PixelData".to_string()))?;

        match element.value() {
            Value::Primitive(value) => Ok(value.to_bytes().into_owned()),
            // 封装格式：按顺序拼接所有片段
            Value::PixelSequence(sequence) => Ok(sequence
                .fragments()
                .iter()
                .flat_map(|fragment| fragment.iter().copied())
                .collect()),
            Value::Sequence(_) => Err(ConvertError::Decode(
                "PixelData 不应为序列".to_string(),
            )),
        }
    }

    fn pixel_buffer(&self) -> Result<PixelBuffer> {
        let decoded = self.obj.decode_pixel_data().map_err(|e| {
            ConvertError::Decode(format!("像素数据解码失败 {:?}: {}", self.path, e))
        })?;

        let signed = self
            .attribute("PixelRepresentation")
            .map(|value| value.to_text() == "1")
            .unwrap_or(false);

        Ok(PixelBuffer {
            rows: decoded.rows(),
            columns: decoded.columns(),
            samples_per_pixel: decoded.samples_per_pixel(),
            bits_allocated: decoded.bits_allocated(),
            signed,
            data: decoded.data().to_vec(),
        })
    }
}

/// 按关键字读取属性并归一化
pub fn attribute_of(obj: &InMemDicomObject, keyword: &str) -> Result<AttributeValue> {
    let element = obj.element_by_name(keyword).map_err(|_| {
        debug!("未找到标签: {}", keyword);
        ConvertError::MissingAttribute(keyword.to_string())
    })?;

    match element.value() {
        Value::Primitive(value) => Ok(normalize_primitive(value)),
        _ => Err(ConvertError::Decode(format!(
            "标签 {} 不是基本类型值",
            keyword
        ))),
    }
}

/// 多值归一化为有序列表，单值归一化为字符串
pub fn normalize_primitive(value: &PrimitiveValue) -> AttributeValue {
    if value.multiplicity() > 1 {
        AttributeValue::List(
            value
                .to_multi_str()
                .iter()
                .map(|s| clean(s))
                .collect(),
        )
    } else {
        AttributeValue::Text(clean(&value.to_str()))
    }
}

fn clean(s: &str) -> String {
    s.trim_end_matches('\0').trim().to_string()
}

/// DICOM文件加载器
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomFileLoader;

impl DatasetLoader for DicomFileLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn Dataset>> {
        Ok(Box::new(DicomFileDataset::open(path)?))
    }
}
