// SPDX-License-Identifier: GPL-3.0-only

//! Test pattern generation for virtual cameras
//!
//! Each camera gets a distinct tint derived from its identifier so frames
//! from different cameras are distinguishable on disk. The phase scrolls the
//! colour bars between frames.

use crate::backends::camera::{CameraFrame, Image, Size};
use crate::constants::capture;
use crate::errors::{CameraError, CameraResult};
use crate::media;
use image::{Rgb, RgbImage};
use std::sync::Arc;
use std::time::Instant;

/// SMPTE-style colour bars (75% intensity)
const BARS: [[u8; 3]; 8] = [
    [191, 191, 191],
    [191, 191, 0],
    [0, 191, 191],
    [0, 191, 0],
    [191, 0, 191],
    [191, 0, 0],
    [0, 0, 191],
    [16, 16, 16],
];

/// FNV-1a hash of the camera identifier
pub fn camera_seed(camera_id: &str) -> u64 {
    camera_id.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

fn pixel(x: u32, y: u32, size: Size, seed: u64, phase: u64) -> [u8; 3] {
    let bar_width = (size.width / BARS.len() as u32).max(1) as u64;
    let bar = ((x as u64 + phase) / bar_width) as usize % BARS.len();
    let mut rgb = BARS[bar];

    // Bottom eighth is a luma ramp, handy for spotting scaling artifacts
    if size.height >= 8 && y >= size.height - size.height / 8 {
        let level = (x as u64 * 255 / size.width.max(1) as u64) as u8;
        rgb = [level; 3];
    }

    for (i, channel) in rgb.iter_mut().enumerate() {
        let tint = ((seed >> (i * 8)) & 0x3f) as u8;
        *channel = channel.saturating_add(tint);
    }
    rgb
}

/// Render the pattern as an RGB image
pub fn render(camera_id: &str, size: Size, phase: u64) -> RgbImage {
    let seed = camera_seed(camera_id);
    RgbImage::from_fn(size.width, size.height, |x, y| {
        Rgb(pixel(x, y, size, seed, phase))
    })
}

/// One preview frame for a surface of `size`
pub fn preview_frame(camera_id: &str, size: Size, sequence: u64) -> CameraFrame {
    let rgb = render(camera_id, size, sequence * 4);
    let mut data = Vec::with_capacity(size.area() as usize * 4);
    for pixel in rgb.pixels() {
        data.extend_from_slice(&[pixel[0], pixel[1], pixel[2], 255]);
    }
    CameraFrame {
        width: size.width,
        height: size.height,
        data: Arc::from(data),
        sequence,
        captured_at: Instant::now(),
    }
}

/// A JPEG still of the test pattern
pub fn still_image(
    camera_id: &str,
    size: Size,
    frame_number: u64,
) -> CameraResult<Image> {
    if size.width == 0 || size.height == 0 {
        return Err(CameraError::CaptureSubmit(format!(
            "invalid still size {}",
            size
        )));
    }

    let rgb = render(camera_id, size, frame_number);
    let data = media::encode_rgb(&rgb, capture::JPEG_QUALITY)?;

    Ok(Image {
        width: size.width,
        height: size.height,
        data: Arc::from(data),
        frame_number,
        captured_at: Instant::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cameras_get_distinct_tints() {
        assert_ne!(camera_seed("0"), camera_seed("2"));
        let size = Size::new(16, 16);
        assert_ne!(render("0", size, 0), render("2", size, 0));
    }

    #[test]
    fn test_preview_frame_is_rgba() {
        let frame = preview_frame("0", Size::new(32, 24), 5);
        assert_eq!(frame.data.len(), 32 * 24 * 4);
        assert_eq!(frame.sequence, 5);
        assert!(frame.data.chunks(4).all(|px| px[3] == 255));
    }

    #[test]
    fn test_jpeg_still_decodes() {
        let still = still_image("1", Size::new(64, 48), 0).unwrap();
        let decoded = image::load_from_memory(&still.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_empty_still_rejected() {
        assert!(still_image("1", Size::new(0, 48), 0).is_err());
    }
}
