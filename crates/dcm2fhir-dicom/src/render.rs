//! 像素数据渲染
//!
//! 将解码后的像素缓冲区编码为可嵌入报告的PNG图像（base64文本）。

use crate::dataset::PixelBuffer;
use base64::Engine;
use dcm2fhir_core::{ConvertError, Result, PRESENTED_FORM_CONTENT_TYPE};
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// 渲染结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub content_type: &'static str,
    /// base64编码的图像数据
    pub data: String,
}

/// 图像渲染器
pub trait ImageRenderer: Send + Sync {
    fn render(&self, pixels: &PixelBuffer) -> Result<RenderedImage>;
}

/// PNG渲染器，只渲染第一帧
#[derive(Debug, Clone, Copy, Default)]
pub struct PngRenderer;

impl PngRenderer {
    pub fn new() -> Self {
        Self
    }

    fn to_dynamic_image(pixels: &PixelBuffer) -> Result<DynamicImage> {
        let frame_len = pixels.frame_len();
        if frame_len == 0 || pixels.data.len() < frame_len {
            return Err(ConvertError::Render(format!(
                "像素数据长度不足: 需要 {} 字节, 实际 {} 字节",
                frame_len,
                pixels.data.len()
            )));
        }
        let frame = &pixels.data[..frame_len];
        let (width, height) = (pixels.columns, pixels.rows);

        let image = match (pixels.samples_per_pixel, pixels.bits_allocated) {
            (1, 8) => GrayImage::from_raw(width, height, frame.to_vec()).map(DynamicImage::ImageLuma8),
            (1, 16) => {
                let samples: Vec<u16> = frame
                    .chunks_exact(2)
                    .map(|b| {
                        let v = u16::from_le_bytes([b[0], b[1]]);
                        if pixels.signed {
                            (v as i16 as i32 + 32768) as u16
                        } else {
                            v
                        }
                    })
                    .collect();
                ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(width, height, samples)
                    .map(DynamicImage::ImageLuma16)
            }
            (3, 8) => RgbImage::from_raw(width, height, frame.to_vec()).map(DynamicImage::ImageRgb8),
            (spp, bits) => {
                return Err(ConvertError::Render(format!(
                    "不支持的像素格式: samples_per_pixel={}, bits_allocated={}",
                    spp, bits
                )))
            }
        };

        image.ok_or_else(|| ConvertError::Render("像素缓冲区尺寸不匹配".to_string()))
    }
}

impl ImageRenderer for PngRenderer {
    fn render(&self, pixels: &PixelBuffer) -> Result<RenderedImage> {
        debug!(
            "渲染像素数据: {}x{}, {} bits",
            pixels.columns, pixels.rows, pixels.bits_allocated
        );
        let image = Self::to_dynamic_image(pixels)?;

        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| ConvertError::Render(format!("PNG编码失败: {}", e)))?;

        Ok(RenderedImage {
            content_type: PRESENTED_FORM_CONTENT_TYPE,
            data: encode_base64(buffer.get_ref()),
        })
    }
}

/// 标准base64编码
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn decode(data: &str) -> Vec<u8> {
        base64::engine::general_purpose::STANDARD.decode(data).unwrap()
    }

    #[test]
    fn test_render_gray8() {
        let pixels = PixelBuffer {
            rows: 2,
            columns: 2,
            samples_per_pixel: 1,
            bits_allocated: 8,
            signed: false,
            data: vec![0, 64, 128, 255],
        };

        let rendered = PngRenderer::new().render(&pixels).unwrap();
        assert_eq!(rendered.content_type, "image/png");
        assert_eq!(&decode(&rendered.data)[..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_render_signed_gray16() {
        let data: Vec<u8> = [-1000i16, 0, 1000, 2000]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let pixels = PixelBuffer {
            rows: 2,
            columns: 2,
            samples_per_pixel: 1,
            bits_allocated: 16,
            signed: true,
            data,
        };

        let rendered = PngRenderer::new().render(&pixels).unwrap();
        assert_eq!(&decode(&rendered.data)[..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_render_rejects_short_buffer() {
        let pixels = PixelBuffer {
            rows: 4,
            columns: 4,
            samples_per_pixel: 1,
            bits_allocated: 8,
            signed: false,
            data: vec![0; 3],
        };
        assert!(matches!(
            PngRenderer::new().render(&pixels),
            Err(ConvertError::Render(_))
        ));
    }

    #[test]
    fn test_encode_base64() {
        assert_eq!(encode_base64(b"DICM"), "RElDTQ==");
    }
}
