// SPDX-License-Identifier: MPL-2.0

//! Multicam - concurrent preview and still capture across several cameras
//!
//! This library drives any number of callback-driven camera devices in
//! parallel: it keeps live previews bound to the right camera across surface
//! lifecycle events and fans a single "capture" out to every back-facing
//! camera, collecting whatever arrives before a deadline.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera hardware abstraction, executor, leases and the
//!   virtual camera rig
//! - [`pipelines`]: Preview session state machines and the capture orchestrator
//! - [`service`]: The command surface tying everything together
//! - [`media`]: JPEG encoding
//! - [`config`]: User configuration handling
//! - [`storage`]: Capture output layout
//!
//! # Example
//!
//! ```ignore
//! let config = multicam::Config::load()?;
//! let (service, _rig) = multicam::CameraService::with_virtual_rig(&config);
//! let report = service.capture_all().await?;
//! for path in report.paths() {
//!     println!("{}", path.display());
//! }
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use backends::camera::{CameraDescriptor, Facing, PreviewSurface, Size};
pub use config::Config;
pub use errors::{CameraError, CameraResult};
pub use pipelines::photo::CaptureReport;
pub use pipelines::preview::{PreviewState, PreviewStatus};
pub use service::CameraService;
