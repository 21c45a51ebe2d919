use anyhow::{anyhow, Context, Result};
use image::ImageFormat;

/// A decoded frame in packed RGB8 (3 bytes per pixel, row-major).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl DecodedImage {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Turns one reassembled encoded frame into pixels.
///
/// Implementations return an error for data they cannot decode; the caller
/// drops that frame and carries on with the next.
pub trait ImageDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<DecodedImage>;
}

/// Baseline/progressive JPEG decoder backed by the `image` crate.
#[derive(Debug, Default)]
pub struct JpegDecoder;

impl JpegDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl ImageDecoder for JpegDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<DecodedImage> {
        let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
            .context("JPEG decoder: failed to decode frame")?
            .to_rgb8();

        let decoded = DecodedImage {
            width: img.width(),
            height: img.height(),
            rgb: img.into_raw(),
        };
        if decoded.is_empty() {
            return Err(anyhow!("JPEG decoder: frame decoded to an empty image"));
        }
        Ok(decoded)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{ExtendedColorType, Rgb, RgbImage};

    pub(crate) fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 60)
            .encode(img.as_raw(), width, height, ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    #[test]
    fn decodes_jpeg() {
        let jpeg = test_jpeg(16, 8);
        let img = JpegDecoder::new().decode(&jpeg).unwrap();
        assert_eq!((img.width, img.height), (16, 8));
        assert_eq!(img.rgb.len(), 16 * 8 * 3);
    }

    #[test]
    fn rejects_garbage() {
        assert!(JpegDecoder::new().decode(b"not a jpeg").is_err());
    }
}
