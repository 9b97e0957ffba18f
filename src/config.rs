// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::{Facing, Size};
use crate::constants::{capture, virtual_rig};
use crate::errors::{CameraError, CameraResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Still capture behaviour
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Capture job deadline in milliseconds
    pub deadline_ms: u64,
    /// Still image width
    pub still_width: u32,
    /// Still image height
    pub still_height: u32,
    /// Resolve as soon as every camera reported; when false the job always
    /// waits for the full deadline
    pub resolve_when_complete: bool,
    /// Tear down previews of the captured cameras for the duration of a job
    pub suspend_previews: bool,
}

impl CaptureSettings {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn still_size(&self) -> Size {
        Size::new(self.still_width, self.still_height)
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            deadline_ms: capture::DEADLINE.as_millis() as u64,
            still_width: capture::STILL_WIDTH,
            still_height: capture::STILL_HEIGHT,
            resolve_when_complete: true,
            suspend_previews: true,
        }
    }
}

/// One simulated camera of the virtual rig
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualCameraConfig {
    /// Camera identifier reported by enumeration
    pub id: String,
    /// Lens facing direction
    pub facing: Facing,
    /// Preview sizes the camera advertises
    pub output_sizes: Vec<Size>,
    /// Report an error instead of opening
    pub fail_open: bool,
    /// Reject every session configuration
    pub fail_configure: bool,
    /// Reject still capture requests
    pub fail_capture: bool,
    /// Simulated open latency
    pub open_delay_ms: u64,
    /// Simulated session configuration latency
    pub configure_delay_ms: u64,
    /// Simulated still capture latency
    pub capture_delay_ms: u64,
}

impl VirtualCameraConfig {
    pub fn new(id: impl Into<String>, facing: Facing) -> Self {
        Self {
            id: id.into(),
            facing,
            ..Self::default()
        }
    }
}

impl Default for VirtualCameraConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            facing: Facing::Back,
            output_sizes: virtual_rig::DEFAULT_OUTPUT_SIZES
                .iter()
                .map(|&size| Size::from(size))
                .collect(),
            fail_open: false,
            fail_configure: false,
            fail_capture: false,
            open_delay_ms: 0,
            configure_delay_ms: 0,
            capture_delay_ms: 0,
        }
    }
}

/// Simulated camera hardware
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualRigConfig {
    /// Whether camera access has been granted
    pub permission_granted: bool,
    /// Preview frame interval in milliseconds
    pub frame_interval_ms: u64,
    /// Cameras in enumeration order
    pub cameras: Vec<VirtualCameraConfig>,
}

impl Default for VirtualRigConfig {
    fn default() -> Self {
        Self {
            permission_granted: true,
            frame_interval_ms: virtual_rig::FRAME_INTERVAL_MS,
            cameras: vec![
                VirtualCameraConfig::new("0", Facing::Back),
                VirtualCameraConfig::new("1", Facing::Front),
                VirtualCameraConfig::new("2", Facing::Back),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture output root (default: ~/Pictures/multicam)
    pub output_dir: Option<PathBuf>,
    /// Still capture behaviour
    pub capture: CaptureSettings,
    /// Simulated camera hardware
    pub rig: VirtualRigConfig,
}

impl Config {
    /// Default location of the config file
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("multicam").join("config.json"))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> CameraResult<Self> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> CameraResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file missing, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CameraError::Config(format!("{}: {}", path.display(), e)))?;
        let config = serde_json::from_str(&contents)?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Save to the default location
    pub fn save(&self) -> CameraResult<PathBuf> {
        let path = Self::path()
            .ok_or_else(|| CameraError::Config("no config directory available".to_string()))?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Write pretty JSON to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> CameraResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CameraError::Config(format!("{}: {}", parent.display(), e)))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| CameraError::Config(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Directory capture jobs are written under
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(crate::storage::default_output_dir)
    }
}
