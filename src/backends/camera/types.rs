// SPDX-License-Identifier: GPL-3.0-only
// Shared types for the camera hardware abstraction

//! Shared types for camera backends

use super::image_target::ImageTarget;
use super::surface::PreviewSurface;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Direction a camera lens faces relative to the device screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Same side as the display (selfie camera)
    Front,
    /// Opposite side of the display
    #[default]
    Back,
    /// Externally attached (USB, accessory)
    External,
}

impl std::fmt::Display for Facing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Facing::Front => write!(f, "front"),
            Facing::Back => write!(f, "back"),
            Facing::External => write!(f, "external"),
        }
    }
}

/// An enumerated camera: opaque stable identifier plus facing direction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CameraDescriptor {
    pub id: String,
    pub facing: Facing,
}

impl CameraDescriptor {
    pub fn new(id: impl Into<String>, facing: Facing) -> Self {
        Self {
            id: id.into(),
            facing,
        }
    }

    pub fn is_back_facing(&self) -> bool {
        self.facing == Facing::Back
    }
}

/// Pixel dimensions of a stream or surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Number of pixels
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Static properties of one camera as reported by the hardware layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraCharacteristics {
    pub facing: Facing,
    /// Sizes the camera can stream to a preview surface
    pub output_sizes: Vec<Size>,
}

/// One JPEG still delivered into an [`ImageTarget`]
#[derive(Debug, Clone)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    /// Compressed JPEG bytes
    pub data: Arc<[u8]>,
    /// Frame number of the request that produced this image
    pub frame_number: u64,
    pub captured_at: Instant,
}

/// A preview frame presented to a surface (RGBA, tightly packed)
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    pub sequence: u64,
    pub captured_at: Instant,
}

/// Request templates understood by the hardware layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTemplate {
    /// Continuous low-latency streaming
    Preview,
    /// Single high-quality frame
    StillCapture,
}

/// 3A overrides applied on top of a request template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureControls {
    /// Automatic control of focus, exposure and white balance
    pub auto_control: bool,
    /// Continuous-picture autofocus rather than the template's focus mode
    pub continuous_af: bool,
    pub auto_exposure: bool,
    pub auto_white_balance: bool,
    /// Mains flicker compensation
    pub auto_antibanding: bool,
    pub scene_mode: bool,
}

impl CaptureControls {
    /// Full automatic 3A with scene mode off, as used for previews
    pub fn automatic() -> Self {
        Self {
            auto_control: true,
            continuous_af: true,
            auto_exposure: true,
            auto_white_balance: true,
            auto_antibanding: true,
            scene_mode: false,
        }
    }
}

/// A sink a session can stream into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Surface(PreviewSurface),
    Image(ImageTarget),
}

impl OutputTarget {
    /// Size the hardware should produce for this target
    pub fn size(&self) -> Size {
        match self {
            OutputTarget::Surface(surface) => surface.buffer_size(),
            OutputTarget::Image(target) => target.size(),
        }
    }
}

/// A capture or repeating request submitted to a ready session
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub targets: Vec<OutputTarget>,
    /// `None` keeps the template defaults
    pub controls: Option<CaptureControls>,
}

impl CaptureRequest {
    /// Repeating preview request streaming into `surface`
    pub fn preview(surface: PreviewSurface) -> Self {
        Self {
            template: RequestTemplate::Preview,
            targets: vec![OutputTarget::Surface(surface)],
            controls: Some(CaptureControls::automatic()),
        }
    }

    /// Single still capture into `target`
    pub fn still(target: ImageTarget) -> Self {
        Self {
            template: RequestTemplate::StillCapture,
            targets: vec![OutputTarget::Image(target)],
            controls: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_request_controls() {
        let surface = PreviewSurface::new(640, 480);
        let request = CaptureRequest::preview(surface);
        assert_eq!(request.template, RequestTemplate::Preview);
        let controls = request.controls.unwrap();
        assert!(controls.auto_control && controls.continuous_af);
        assert!(controls.auto_exposure && controls.auto_white_balance);
        assert!(controls.auto_antibanding);
        assert!(!controls.scene_mode);
    }

    #[test]
    fn test_still_request_keeps_template_defaults() {
        let target = ImageTarget::new(Size::new(64, 48), 1);
        let request = CaptureRequest::still(target.clone());
        assert_eq!(request.template, RequestTemplate::StillCapture);
        assert!(request.controls.is_none());
        assert_eq!(request.targets, vec![OutputTarget::Image(target)]);
    }

    #[test]
    fn test_facing_serde_lowercase() {
        let json = serde_json::to_string(&Facing::External).unwrap();
        assert_eq!(json, "\"external\"");
        let back: Facing = serde_json::from_str("\"back\"").unwrap();
        assert_eq!(back, Facing::Back);
    }

    #[test]
    fn test_size_aspect() {
        assert!((Size::new(1920, 1080).aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);
        assert_eq!(Size::new(640, 480).to_string(), "640x480");
    }
}
