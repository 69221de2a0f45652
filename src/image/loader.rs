use crate::utils::error::ServiceError;
use crate::Result;
use image::{DynamicImage, GenericImageView, ImageFormat};

/// 上传图像的默认大小上限
pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

pub struct ImageLoader;

impl ImageLoader {
    /// 从字节流加载图像
    pub fn from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        Self::from_bytes_with_limit(bytes, MAX_IMAGE_BYTES)
    }

    pub fn from_bytes_with_limit(bytes: &[u8], max_bytes: usize) -> Result<DynamicImage> {
        if bytes.len() > max_bytes {
            return Err(ServiceError::FileTooLarge(max_bytes));
        }

        if bytes.is_empty() {
            return Err(ServiceError::InvalidInput("Empty image file".to_string()));
        }

        if let Some(format) = Self::detect_format(bytes) {
            tracing::debug!("Detected image format: {:?}", format);
        }

        let image = image::load_from_memory(bytes)?;
        let (width, height) = image.dimensions();
        tracing::debug!("Decoded image: {}x{}", width, height);

        Ok(image)
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(8, 6)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn decodes_png() {
        let image = ImageLoader::from_bytes(&png_bytes()).unwrap();
        assert_eq!(image.dimensions(), (8, 6));
    }

    #[test]
    fn malformed_bytes_are_a_decode_error() {
        let err = ImageLoader::from_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ServiceError::ImageDecode(_)));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let err = ImageLoader::from_bytes_with_limit(&png_bytes(), 4).unwrap_err();
        assert!(matches!(err, ServiceError::FileTooLarge(4)));
    }
}
