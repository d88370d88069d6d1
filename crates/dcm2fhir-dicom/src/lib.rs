//! # DICOM数据集模块
//!
//! 提供已解码DICOM数据集的抽象、基于dicom-rs的文件加载、属性值归一化以及像素数据渲染。

pub mod dataset;
pub mod parser;
pub mod render;

pub use dataset::{Dataset, DatasetLoader, MemoryDataset, PixelBuffer};
pub use parser::{DicomFileDataset, DicomFileLoader};
pub use render::{encode_base64, ImageRenderer, PngRenderer, RenderedImage};
