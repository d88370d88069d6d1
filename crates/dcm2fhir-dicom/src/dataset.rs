//! 已解码数据集抽象

use dcm2fhir_core::{AttributeValue, ConvertError, Result};
use std::collections::HashMap;
use std::path::Path;

/// 解码后的像素缓冲区（单帧或多帧，按行优先排列）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub rows: u32,
    pub columns: u32,
    pub samples_per_pixel: u16,
    pub bits_allocated: u16,
    /// 像素表示为有符号整数
    pub signed: bool,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// 单帧字节数
    pub fn frame_len(&self) -> usize {
        self.rows as usize
            * self.columns as usize
            * self.samples_per_pixel as usize
            * (self.bits_allocated as usize).div_ceil(8)
    }
}

/// 已解码的DICOM数据集
///
/// 按DICOM关键字（如 `PatientID`、`KVP`）访问属性，缺失属性返回
/// [`ConvertError::MissingAttribute`]。
pub trait Dataset: Send + Sync {
    /// 获取归一化后的属性值
    fn attribute(&self, keyword: &str) -> Result<AttributeValue>;

    /// 原始像素数据字节（未解码）
    fn raw_pixel_data(&self) -> Result<Vec<u8>>;

    /// 解码后的像素缓冲区
    fn pixel_buffer(&self) -> Result<PixelBuffer>;

    /// 以字符串形式获取属性
    fn text(&self, keyword: &str) -> Result<String> {
        self.attribute(keyword).map(|value| value.to_text())
    }
}

/// 数据集加载器
pub trait DatasetLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn Dataset>>;
}

/// 内存数据集
///
/// 供已完成解码的调用方和测试使用。
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    attributes: HashMap<String, AttributeValue>,
    pixels: Option<PixelBuffer>,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置属性
    pub fn with(mut self, keyword: &str, value: impl Into<AttributeValue>) -> Self {
        self.set(keyword, value);
        self
    }

    pub fn set(&mut self, keyword: &str, value: impl Into<AttributeValue>) {
        self.attributes.insert(keyword.to_string(), value.into());
    }

    pub fn remove(&mut self, keyword: &str) -> Option<AttributeValue> {
        self.attributes.remove(keyword)
    }

    /// 设置像素数据
    pub fn with_pixels(mut self, pixels: PixelBuffer) -> Self {
        self.pixels = Some(pixels);
        self
    }
}

impl Dataset for MemoryDataset {
    fn attribute(&self, keyword: &str) -> Result<AttributeValue> {
        self.attributes
            .get(keyword)
            .cloned()
            .ok_or_else(|| ConvertError::MissingAttribute(keyword.to_string()))
    }

    fn raw_pixel_data(&self) -> Result<Vec<u8>> {
        self.pixels
            .as_ref()
            .map(|p| p.data.clone())
            .ok_or_else(|| ConvertError::MissingAttribute("PixelData".to_string()))
    }

    fn pixel_buffer(&self) -> Result<PixelBuffer> {
        self.pixels
            .clone()
            .ok_or_else(|| ConvertError::MissingAttribute("PixelData".to_string()))
    }
}
