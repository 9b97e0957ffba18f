// SPDX-License-Identifier: MPL-2.0

//! Camera hardware abstraction
//!
//! The hardware layer is callback driven: opening a camera, configuring a
//! session and submitting requests all complete asynchronously, with results
//! posted onto the [`CameraExecutor`] handed in by the caller.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ Preview sessions / Capture   │  ← state machines driven by callbacks
//! └──────────────┬───────────────┘
//!                │ DeviceLeases (one owner per camera id)
//!                ▼
//! ┌──────────────────────────────┐
//! │      CameraHal trait         │  ← open → configure → request → close
//! └──────────────┬───────────────┘
//!                ▼
//!        ┌──────────────┐
//!        │ Virtual rig  │  ← concrete implementation
//!        └──────────────┘
//! ```
//!
//! Every callback runs on the executor, never inline inside the call that
//! registered it. Implementations must uphold this: the state machines hold
//! their own locks while calling into the hardware layer.

pub mod executor;
pub mod image_target;
pub mod lease;
pub mod registry;
pub mod surface;
pub mod types;

pub use executor::CameraExecutor;
pub use image_target::ImageTarget;
pub use lease::{DeviceHandle, DeviceLease, DeviceLeases, LeaseOwner};
pub use registry::{CameraEnumeration, DeviceRegistry, filter_back_facing};
pub use surface::{PreviewSurface, SurfaceId};
pub use types::*;

use crate::errors::CameraResult;
use std::sync::Arc;

/// Callback invoked on the executor for every hardware event
pub type Listener<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Device lifecycle events
pub enum DeviceEvent {
    /// The device is open and exclusively ours
    Opened(Box<dyn HalDevice>),
    /// The device went away (unplugged, evicted by a higher priority client)
    Disconnected,
    /// Opening failed, or a fatal device error occurred
    Error(String),
}

/// Session configuration outcome
pub enum SessionEvent {
    /// The session accepted its targets and is ready for requests
    Configured(Box<dyn HalSession>),
    ConfigureFailed(String),
}

/// Per-request progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Started { frame_number: u64 },
    Completed { frame_number: u64 },
    Failed { frame_number: u64, reason: String },
}

impl std::fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceEvent::Opened(device) => write!(f, "Opened({})", device.id()),
            DeviceEvent::Disconnected => write!(f, "Disconnected"),
            DeviceEvent::Error(msg) => write!(f, "Error({})", msg),
        }
    }
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Configured(_) => write!(f, "Configured"),
            SessionEvent::ConfigureFailed(msg) => write!(f, "ConfigureFailed({})", msg),
        }
    }
}

/// Entry point into the camera hardware
pub trait CameraHal: Send + Sync {
    /// Identifiers of every camera the hardware knows about
    ///
    /// Fails with `HardwareQuery` when the camera service is unavailable or
    /// camera access has not been granted.
    fn camera_ids(&self) -> CameraResult<Vec<String>>;

    /// Static properties of one camera
    fn characteristics(&self, camera_id: &str) -> CameraResult<CameraCharacteristics>;

    /// Start opening a camera
    ///
    /// The outcome arrives on `executor` through `listener`: `Opened` on
    /// success, `Error` on failure. The same listener later receives
    /// `Disconnected`/`Error` for the open device.
    fn open_camera(
        &self,
        camera_id: &str,
        executor: &CameraExecutor,
        listener: Listener<DeviceEvent>,
    ) -> CameraResult<()>;
}

/// An open camera device
pub trait HalDevice: Send + Sync {
    fn id(&self) -> &str;

    /// Negotiate a session streaming into `targets`
    ///
    /// Creating a new session closes any previous session of this device.
    fn create_session(
        &self,
        targets: Vec<OutputTarget>,
        executor: &CameraExecutor,
        listener: Listener<SessionEvent>,
    ) -> CameraResult<()>;

    /// Close the device and its session. Idempotent.
    fn close(&self);
}

/// A configured capture session
pub trait HalSession: Send + Sync {
    /// Stream `request` continuously until stopped; returns the sequence id
    fn set_repeating_request(
        &self,
        request: CaptureRequest,
        listener: Option<Listener<CaptureEvent>>,
    ) -> CameraResult<u64>;

    /// Submit one request; returns its frame number
    fn capture(
        &self,
        request: CaptureRequest,
        listener: Option<Listener<CaptureEvent>>,
    ) -> CameraResult<u64>;

    fn stop_repeating(&self) -> CameraResult<()>;

    /// Abort outstanding work and close the session. Idempotent.
    fn close(&self);
}
