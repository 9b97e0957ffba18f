// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera rig
//!
//! A software implementation of the camera hardware layer. Cameras are
//! described by [`VirtualRigConfig`]; each one produces colour bar frames and
//! can be told to fail at open, configure or capture time, or to respond
//! slowly. The rig enforces the same exclusivity a real camera stack does:
//! a second open of an already open camera reports an error.
//!
//! # Architecture
//!
//! ```text
//! VirtualRig ──open──▶ VirtualDevice ──configure──▶ VirtualSession
//!     │                     │                           │
//!     │                     └── close() ◀───────────────┤ repeating tick
//!     └── history: Opened / SessionConfigured / StillCaptured / Closed
//! ```
//!
//! All completions are posted onto the caller's executor, never run inline.

pub mod pattern;

use crate::backends::camera::{
    CameraCharacteristics, CameraExecutor, CameraHal, CaptureEvent, CaptureRequest, DeviceEvent,
    HalDevice, HalSession, Listener, OutputTarget, SessionEvent,
};
use crate::config::{VirtualCameraConfig, VirtualRigConfig};
use crate::constants::timing;
use crate::errors::{CameraError, CameraResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Observable rig activity, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RigEvent {
    Opened(String),
    SessionConfigured(String),
    StillCaptured(String),
    Closed(String),
    Disconnected(String),
}

/// Bookkeeping for a device that is currently open
struct OpenDevice {
    device: Arc<DeviceShared>,
    executor: CameraExecutor,
    listener: Listener<DeviceEvent>,
}

/// State shared between the rig and the objects it hands out
struct RigState {
    frame_interval: Duration,
    open: Mutex<HashMap<String, OpenDevice>>,
    history: Mutex<Vec<RigEvent>>,
}

impl RigState {
    fn record(&self, event: RigEvent) {
        trace!(?event, "Rig event");
        self.history.lock().unwrap().push(event);
    }
}

/// Simulated multi-camera hardware
pub struct VirtualRig {
    config: VirtualRigConfig,
    permission_granted: AtomicBool,
    state: Arc<RigState>,
}

impl VirtualRig {
    pub fn new(config: VirtualRigConfig) -> Self {
        info!(
            cameras = config.cameras.len(),
            permission = config.permission_granted,
            "Creating virtual camera rig"
        );
        Self {
            permission_granted: AtomicBool::new(config.permission_granted),
            state: Arc::new(RigState {
                frame_interval: Duration::from_millis(config.frame_interval_ms.max(1)),
                open: Mutex::new(HashMap::new()),
                history: Mutex::new(Vec::new()),
            }),
            config,
        }
    }

    pub fn config(&self) -> &VirtualRigConfig {
        &self.config
    }

    /// Grant or revoke camera access
    pub fn set_permission_granted(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::Release);
    }

    pub fn is_open(&self, camera_id: &str) -> bool {
        self.state.open.lock().unwrap().contains_key(camera_id)
    }

    /// Number of cameras currently open
    pub fn open_count(&self) -> usize {
        self.state.open.lock().unwrap().len()
    }

    /// Everything the rig has done so far
    pub fn history(&self) -> Vec<RigEvent> {
        self.state.history.lock().unwrap().clone()
    }

    /// Simulate the camera going away underneath its owner
    ///
    /// Returns false if the camera was not open.
    pub fn disconnect(&self, camera_id: &str) -> bool {
        let Some(entry) = self.state.open.lock().unwrap().remove(camera_id) else {
            return false;
        };

        warn!(camera_id, "Simulating camera disconnect");
        entry.device.shutdown();
        self.state.record(RigEvent::Disconnected(camera_id.to_string()));

        let listener = entry.listener;
        if let Err(e) = entry.executor.execute(move || listener(DeviceEvent::Disconnected)) {
            debug!(error = %e, "Disconnect notification dropped");
        }
        true
    }

    fn check_permission(&self) -> CameraResult<()> {
        if self.permission_granted.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CameraError::HardwareQuery(
                "camera permission not granted".to_string(),
            ))
        }
    }

    fn camera(&self, camera_id: &str) -> Option<&VirtualCameraConfig> {
        self.config.cameras.iter().find(|c| c.id == camera_id)
    }
}

impl CameraHal for VirtualRig {
    fn camera_ids(&self) -> CameraResult<Vec<String>> {
        self.check_permission()?;
        Ok(self.config.cameras.iter().map(|c| c.id.clone()).collect())
    }

    fn characteristics(&self, camera_id: &str) -> CameraResult<CameraCharacteristics> {
        self.check_permission()?;
        let camera = self
            .camera(camera_id)
            .ok_or_else(|| CameraError::HardwareQuery(format!("unknown camera {}", camera_id)))?;
        Ok(CameraCharacteristics {
            facing: camera.facing,
            output_sizes: camera.output_sizes.clone(),
        })
    }

    fn open_camera(
        &self,
        camera_id: &str,
        executor: &CameraExecutor,
        listener: Listener<DeviceEvent>,
    ) -> CameraResult<()> {
        self.check_permission()?;
        let camera = self
            .camera(camera_id)
            .cloned()
            .ok_or_else(|| CameraError::DeviceOpen(format!("unknown camera {}", camera_id)))?;

        debug!(camera_id, delay_ms = camera.open_delay_ms, "Opening virtual camera");

        let state = Arc::clone(&self.state);
        let device_executor = executor.clone();
        let delay = Duration::from_millis(camera.open_delay_ms);
        executor.execute_after(delay, move || {
            if camera.fail_open {
                warn!(camera_id = %camera.id, "Injected open failure");
                listener(DeviceEvent::Error(format!(
                    "camera {} failed to open",
                    camera.id
                )));
                return;
            }

            let device = {
                let mut open = state.open.lock().unwrap();
                if open.contains_key(&camera.id) {
                    drop(open);
                    listener(DeviceEvent::Error(format!("camera {} is in use", camera.id)));
                    return;
                }
                let device = Arc::new(DeviceShared {
                    camera: camera.clone(),
                    rig: Arc::clone(&state),
                    closed: AtomicBool::new(false),
                    session: Mutex::new(None),
                });
                open.insert(
                    camera.id.clone(),
                    OpenDevice {
                        device: Arc::clone(&device),
                        executor: device_executor.clone(),
                        listener: Arc::clone(&listener),
                    },
                );
                device
            };

            state.record(RigEvent::Opened(camera.id.clone()));
            info!(camera_id = %camera.id, "Virtual camera opened");
            listener(DeviceEvent::Opened(Box::new(VirtualDevice { shared: device })));
        })
    }
}

struct DeviceShared {
    camera: VirtualCameraConfig,
    rig: Arc<RigState>,
    closed: AtomicBool,
    session: Mutex<Option<Arc<SessionShared>>>,
}

impl DeviceShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the device and its session; false if already stopped
    fn shutdown(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(session) = self.session.lock().unwrap().take() {
            session.close();
        }
        true
    }
}

/// An open virtual camera
pub struct VirtualDevice {
    shared: Arc<DeviceShared>,
}

impl HalDevice for VirtualDevice {
    fn id(&self) -> &str {
        &self.shared.camera.id
    }

    fn create_session(
        &self,
        targets: Vec<OutputTarget>,
        executor: &CameraExecutor,
        listener: Listener<SessionEvent>,
    ) -> CameraResult<()> {
        let camera_id = self.shared.camera.id.clone();
        if self.shared.is_closed() {
            return Err(CameraError::SessionConfigure(format!(
                "camera {} is closed",
                camera_id
            )));
        }
        if targets.is_empty() {
            return Err(CameraError::SessionConfigure(
                "no output targets".to_string(),
            ));
        }

        let session = Arc::new(SessionShared {
            camera: self.shared.camera.clone(),
            rig: Arc::clone(&self.shared.rig),
            targets,
            closed: AtomicBool::new(false),
            repeating: AtomicU64::new(0),
            next_sequence: AtomicU64::new(0),
            next_frame: AtomicU64::new(0),
        });
        if let Some(previous) = self
            .shared
            .session
            .lock()
            .unwrap()
            .replace(Arc::clone(&session))
        {
            debug!(camera_id = %camera_id, "Replacing previous session");
            previous.close();
        }

        let device = Arc::clone(&self.shared);
        let session_executor = executor.clone();
        let delay = Duration::from_millis(self.shared.camera.configure_delay_ms);
        executor.execute_after(delay, move || {
            if device.is_closed() || session.is_closed() {
                listener(SessionEvent::ConfigureFailed(
                    "device closed before configuration completed".to_string(),
                ));
                return;
            }
            if device.camera.fail_configure {
                warn!(camera_id = %device.camera.id, "Injected configure failure");
                listener(SessionEvent::ConfigureFailed(format!(
                    "camera {} rejected the stream configuration",
                    device.camera.id
                )));
                return;
            }
            device
                .rig
                .record(RigEvent::SessionConfigured(device.camera.id.clone()));
            listener(SessionEvent::Configured(Box::new(VirtualSession {
                shared: session,
                executor: session_executor,
            })));
        })
    }

    fn close(&self) {
        if !self.shared.shutdown() {
            return;
        }
        let id = self.shared.camera.id.clone();
        {
            let mut open = self.shared.rig.open.lock().unwrap();
            // A reopened camera belongs to someone else
            if open
                .get(&id)
                .is_some_and(|entry| Arc::ptr_eq(&entry.device, &self.shared))
            {
                open.remove(&id);
            }
        }
        self.shared.rig.record(RigEvent::Closed(id.clone()));
        debug!(camera_id = %id, "Virtual camera closed");
    }
}

struct SessionShared {
    camera: VirtualCameraConfig,
    rig: Arc<RigState>,
    targets: Vec<OutputTarget>,
    closed: AtomicBool,
    /// Sequence id of the active repeating request, 0 when none
    repeating: AtomicU64,
    next_sequence: AtomicU64,
    next_frame: AtomicU64,
}

impl SessionShared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.repeating.store(0, Ordering::Release);
    }

    fn check_request(&self, request: &CaptureRequest) -> CameraResult<()> {
        if self.is_closed() {
            return Err(CameraError::CaptureSubmit(format!(
                "session of camera {} is closed",
                self.camera.id
            )));
        }
        if request.targets.is_empty() {
            return Err(CameraError::CaptureSubmit(
                "request has no targets".to_string(),
            ));
        }
        if let Some(unknown) = request.targets.iter().find(|t| !self.targets.contains(t)) {
            return Err(CameraError::CaptureSubmit(format!(
                "target {:?} is not part of the session",
                unknown
            )));
        }
        Ok(())
    }

    /// Fill every target of `request` with one frame
    fn produce(&self, request: &CaptureRequest, frame_number: u64) -> CameraResult<()> {
        for target in &request.targets {
            match target {
                OutputTarget::Surface(surface) => {
                    let frame =
                        pattern::preview_frame(&self.camera.id, surface.buffer_size(), frame_number);
                    surface.present(frame);
                }
                OutputTarget::Image(target) => {
                    let image = pattern::still_image(
                        &self.camera.id,
                        target.size(),
                        frame_number,
                    )?;
                    target.queue_image(image);
                }
            }
        }
        Ok(())
    }
}

/// A configured virtual capture session
pub struct VirtualSession {
    shared: Arc<SessionShared>,
    executor: CameraExecutor,
}

fn repeating_tick(
    session: Arc<SessionShared>,
    executor: CameraExecutor,
    request: CaptureRequest,
    listener: Option<Listener<CaptureEvent>>,
    sequence: u64,
) {
    if session.is_closed() || session.repeating.load(Ordering::Acquire) != sequence {
        return;
    }

    let frame_number = session.next_frame.fetch_add(1, Ordering::AcqRel);
    if let Some(listener) = &listener {
        listener(CaptureEvent::Started { frame_number });
    }
    let outcome = session.produce(&request, frame_number);
    if let Some(listener) = &listener {
        listener(match outcome {
            Ok(()) => CaptureEvent::Completed { frame_number },
            Err(e) => CaptureEvent::Failed {
                frame_number,
                reason: e.to_string(),
            },
        });
    }
    if frame_number % timing::FRAME_LOG_INTERVAL == 0 {
        trace!(camera_id = %session.camera.id, frame_number, "Preview frame");
    }

    let interval = session.rig.frame_interval;
    let next_executor = executor.clone();
    if let Err(e) = executor.execute_after(interval, move || {
        repeating_tick(session, next_executor, request, listener, sequence)
    }) {
        debug!(error = %e, "Repeating request stopped with executor");
    }
}

impl HalSession for VirtualSession {
    fn set_repeating_request(
        &self,
        request: CaptureRequest,
        listener: Option<Listener<CaptureEvent>>,
    ) -> CameraResult<u64> {
        self.shared.check_request(&request)?;
        let sequence = self.shared.next_sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.repeating.store(sequence, Ordering::Release);
        debug!(camera_id = %self.shared.camera.id, sequence, "Repeating request started");

        let session = Arc::clone(&self.shared);
        let executor = self.executor.clone();
        self.executor.execute(move || {
            repeating_tick(session, executor, request, listener, sequence)
        })?;
        Ok(sequence)
    }

    fn capture(
        &self,
        request: CaptureRequest,
        listener: Option<Listener<CaptureEvent>>,
    ) -> CameraResult<u64> {
        self.shared.check_request(&request)?;
        if self.shared.camera.fail_capture {
            warn!(camera_id = %self.shared.camera.id, "Injected capture failure");
            return Err(CameraError::CaptureSubmit(format!(
                "camera {} rejected the still request",
                self.shared.camera.id
            )));
        }

        let frame_number = self.shared.next_frame.fetch_add(1, Ordering::AcqRel);
        let session = Arc::clone(&self.shared);
        let delay = Duration::from_millis(self.shared.camera.capture_delay_ms);
        self.executor.execute_after(delay, move || {
            let notify = |event| {
                if let Some(listener) = &listener {
                    listener(event);
                }
            };
            if session.is_closed() {
                notify(CaptureEvent::Failed {
                    frame_number,
                    reason: "session closed".to_string(),
                });
                return;
            }
            notify(CaptureEvent::Started { frame_number });
            match session.produce(&request, frame_number) {
                Ok(()) => {
                    session
                        .rig
                        .record(RigEvent::StillCaptured(session.camera.id.clone()));
                    notify(CaptureEvent::Completed { frame_number });
                }
                Err(e) => notify(CaptureEvent::Failed {
                    frame_number,
                    reason: e.to_string(),
                }),
            }
        })?;
        Ok(frame_number)
    }

    fn stop_repeating(&self) -> CameraResult<()> {
        self.shared.repeating.store(0, Ordering::Release);
        Ok(())
    }

    fn close(&self) {
        self.shared.close();
    }
}
