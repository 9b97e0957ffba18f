// SPDX-License-Identifier: MPL-2.0

//! JPEG compression of raw frames

use crate::errors::CameraResult;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

/// Compress an RGB image
pub fn encode_rgb(image: &RgbImage, quality: u8) -> CameraResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder.encode_image(image)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_encodes_to_jpeg() {
        let image = RgbImage::from_pixel(8, 8, image::Rgb([128, 64, 32]));
        let jpeg = encode_rgb(&image, 90).unwrap();
        // SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }

    #[test]
    fn test_quality_is_clamped() {
        let image = RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]));
        assert!(encode_rgb(&image, 0).is_ok());
        assert!(encode_rgb(&image, 255).is_ok());
    }
}
