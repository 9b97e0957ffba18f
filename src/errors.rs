// SPDX-License-Identifier: MPL-2.0

//! Error types for camera orchestration

use std::fmt;

/// Result type alias using CameraError
pub type CameraResult<T> = Result<T, CameraError>;

/// Errors surfaced by the registry, preview sessions, the capture orchestrator
/// and the background executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// Enumeration or characteristics lookup failed (also: no camera permission)
    HardwareQuery(String),
    /// Camera identifier is already owned by another component
    ResourceBusy(String),
    /// Hardware refused to open the device
    DeviceOpen(String),
    /// Hardware rejected the requested session
    SessionConfigure(String),
    /// Capture or repeating request rejected after the session was ready
    CaptureSubmit(String),
    /// Device went away while in use
    Disconnected(String),
    /// Work submitted after the background executor shut down
    SubstrateClosed,
    /// No preview is bound to the surface
    UnknownSurface(u64),
    /// Filesystem errors while persisting captures
    Storage(String),
    /// Configuration could not be read or written
    Config(String),
}

impl CameraError {
    /// Short machine-friendly kind, used in logs and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            CameraError::HardwareQuery(_) => "hardware_query",
            CameraError::ResourceBusy(_) => "resource_busy",
            CameraError::DeviceOpen(_) => "device_open",
            CameraError::SessionConfigure(_) => "session_configure",
            CameraError::CaptureSubmit(_) => "capture_submit",
            CameraError::Disconnected(_) => "disconnected",
            CameraError::SubstrateClosed => "substrate_closed",
            CameraError::UnknownSurface(_) => "unknown_surface",
            CameraError::Storage(_) => "storage",
            CameraError::Config(_) => "config",
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::HardwareQuery(msg) => write!(f, "Hardware query failed: {}", msg),
            CameraError::ResourceBusy(id) => write!(f, "Camera {} is already in use", id),
            CameraError::DeviceOpen(msg) => write!(f, "Failed to open camera: {}", msg),
            CameraError::SessionConfigure(msg) => {
                write!(f, "Session configuration failed: {}", msg)
            }
            CameraError::CaptureSubmit(msg) => write!(f, "Capture request rejected: {}", msg),
            CameraError::Disconnected(id) => write!(f, "Camera {} disconnected", id),
            CameraError::SubstrateClosed => write!(f, "Camera background executor is shut down"),
            CameraError::UnknownSurface(id) => write!(f, "No preview bound to surface {}", id),
            CameraError::Storage(msg) => write!(f, "Storage error: {}", msg),
            CameraError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CameraError {}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        CameraError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CameraError {
    fn from(err: serde_json::Error) -> Self {
        CameraError::Config(err.to_string())
    }
}

impl From<image::ImageError> for CameraError {
    fn from(err: image::ImageError) -> Self {
        CameraError::Storage(format!("image encoding: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_message_names_camera() {
        let err = CameraError::ResourceBusy("cam0".to_string());
        assert_eq!(err.to_string(), "Camera cam0 is already in use");
        assert_eq!(err.kind(), "resource_busy");
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CameraError = io.into();
        assert!(matches!(err, CameraError::Storage(_)));
    }
}
