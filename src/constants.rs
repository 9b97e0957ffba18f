// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Still capture defaults
pub mod capture {
    use super::Duration;

    /// Still capture target width
    pub const STILL_WIDTH: u32 = 1920;

    /// Still capture target height
    pub const STILL_HEIGHT: u32 = 1080;

    /// Images buffered per still target (only the newest is kept)
    pub const STILL_MAX_IMAGES: usize = 1;

    /// Window after which a capture job resolves with whatever arrived
    pub const DEADLINE: Duration = Duration::from_secs(3);

    /// Capture file name prefix, followed by the camera identifier
    pub const FILE_PREFIX: &str = "CAM";

    /// Capture file extension
    pub const FILE_EXTENSION: &str = "jpg";

    /// JPEG quality of generated stills
    pub const JPEG_QUALITY: u8 = 92;

    /// Directory name under the user's pictures directory
    pub const OUTPUT_DIR_NAME: &str = "multicam";
}

/// Preview session tuning
pub mod preview {
    /// Weight of the absolute width difference when picking a preview size.
    /// Keeps aspect ratio the dominant term.
    pub const SIZE_DIFFERENCE_WEIGHT: f32 = 0.1;

    /// Surface size used by the CLI preview when none is given
    pub const DEFAULT_SURFACE_WIDTH: u32 = 640;

    /// Surface size used by the CLI preview when none is given
    pub const DEFAULT_SURFACE_HEIGHT: u32 = 480;
}

/// Background executor settings
pub mod executor {
    /// Name of the dedicated camera thread
    pub const THREAD_NAME: &str = "CameraBackground";
}

/// Virtual camera rig defaults
pub mod virtual_rig {
    /// Interval between generated preview frames
    pub const FRAME_INTERVAL_MS: u64 = 33;

    /// Output sizes advertised by a virtual camera when none are configured
    pub const DEFAULT_OUTPUT_SIZES: &[(u32, u32)] = &[
        (1920, 1080),
        (1280, 720),
        (1440, 1080),
        (640, 480),
        (320, 240),
    ];
}

/// Timing constants
pub mod timing {
    /// Preview frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Poll interval of the CLI preview status loop
    pub const STATUS_POLL_MS: u64 = 500;
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sizes_nonempty() {
        assert!(!virtual_rig::DEFAULT_OUTPUT_SIZES.is_empty());
        assert!(
            virtual_rig::DEFAULT_OUTPUT_SIZES
                .iter()
                .all(|&(w, h)| w > 0 && h > 0)
        );
    }

    #[test]
    fn test_still_is_full_hd() {
        assert_eq!((capture::STILL_WIDTH, capture::STILL_HEIGHT), (1920, 1080));
        assert_eq!(capture::DEADLINE, Duration::from_secs(3));
    }
}
