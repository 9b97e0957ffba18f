// SPDX-License-Identifier: GPL-3.0-only

//! Live preview sessions
//!
//! One [`PreviewSession`] drives one surface through
//! `Idle → Opening → Configuring → Streaming → Closed`. Every input (surface
//! lifecycle, camera selection, suspend/resume) is queued on the camera
//! executor and handled there, as are all hardware callbacks, so the state
//! machine only ever runs on one thread.
//!
//! Hardware callbacks carry the attempt number they were registered under.
//! Any teardown bumps the attempt, which turns late callbacks from a
//! previous device or session into no-ops that only close what they carry.
//! An open that is still in flight when the session moves on keeps its
//! lease until it completes, so the next open for the same surface waits
//! for it instead of racing it.

pub mod sizing;

pub use sizing::choose_optimal_size;

use crate::backends::camera::{
    CameraExecutor, CameraHal, CaptureRequest, DeviceEvent, DeviceHandle, DeviceLease,
    DeviceLeases, HalSession, LeaseOwner, Listener, OutputTarget, PreviewSurface, SessionEvent,
    Size, SurfaceId,
};
use crate::errors::{CameraError, CameraResult};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Lifecycle of a preview session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewState {
    /// No surface or no camera selected
    Idle,
    /// Waiting for the camera to open
    Opening,
    /// Waiting for the session to accept the surface
    Configuring,
    /// Repeating request running
    Streaming,
    /// Torn down, by request or after an error
    Closed,
}

impl std::fmt::Display for PreviewState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PreviewState::Idle => "idle",
            PreviewState::Opening => "opening",
            PreviewState::Configuring => "configuring",
            PreviewState::Streaming => "streaming",
            PreviewState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Snapshot published after every handled event
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewStatus {
    pub state: PreviewState,
    pub camera_id: Option<String>,
    /// Buffer size negotiated for the current session
    pub preview_size: Option<Size>,
    /// True while a camera is open or being opened for this surface
    pub holds_camera: bool,
    pub suspended: bool,
    /// Why the session last ended up `Closed`
    pub error: Option<CameraError>,
}

impl Default for PreviewStatus {
    fn default() -> Self {
        Self {
            state: PreviewState::Idle,
            camera_id: None,
            preview_size: None,
            holds_camera: false,
            suspended: false,
            error: None,
        }
    }
}

/// An open request the hardware has not answered yet
struct PendingOpen {
    attempt: u64,
    lease: DeviceLease,
}

struct PreviewInner {
    surface: Option<PreviewSurface>,
    camera_id: Option<String>,
    suspended: bool,
    released: bool,
    state: PreviewState,
    attempt: u64,
    opening: Option<PendingOpen>,
    device: Option<DeviceHandle>,
    session: Option<Box<dyn HalSession>>,
    preview_size: Option<Size>,
    last_error: Option<CameraError>,
}

struct PreviewShared {
    executor: CameraExecutor,
    hal: Arc<dyn CameraHal>,
    leases: DeviceLeases,
    inner: Mutex<PreviewInner>,
    status: watch::Sender<PreviewStatus>,
}

/// Handle to one surface's preview state machine
#[derive(Clone)]
pub struct PreviewSession {
    shared: Arc<PreviewShared>,
}

impl PreviewSession {
    pub fn new(executor: CameraExecutor, hal: Arc<dyn CameraHal>, leases: DeviceLeases) -> Self {
        let (status, _) = watch::channel(PreviewStatus::default());
        Self {
            shared: Arc::new(PreviewShared {
                executor,
                hal,
                leases,
                inner: Mutex::new(PreviewInner {
                    surface: None,
                    camera_id: None,
                    suspended: false,
                    released: false,
                    state: PreviewState::Idle,
                    attempt: 0,
                    opening: None,
                    device: None,
                    session: None,
                    preview_size: None,
                    last_error: None,
                }),
                status,
            }),
        }
    }

    /// The rendering layer created (or replaced) the surface
    pub fn surface_created(&self, surface: PreviewSurface) -> CameraResult<()> {
        self.submit(move |shared, inner| {
            if inner.surface.as_ref().is_some_and(|s| *s != surface) {
                debug!(surface_id = surface.id(), "Surface replaced");
                shared.teardown(inner);
            }
            inner.surface = Some(surface);
            shared.reconcile(inner);
        })
    }

    /// The surface was resized
    ///
    /// While the camera is still opening the new geometry is simply picked up
    /// once it opens. A configured or streaming session is recreated.
    pub fn surface_changed(&self, width: u32, height: u32) -> CameraResult<()> {
        self.submit(move |shared, inner| {
            let Some(surface) = inner.surface.clone() else {
                debug!(width, height, "Geometry change without a surface, ignoring");
                return;
            };
            let unchanged = surface.geometry() == Size::new(width, height);
            surface.set_geometry(width, height);

            match inner.state {
                PreviewState::Opening => {
                    debug!(surface_id = surface.id(), width, height, "Geometry changed while opening");
                }
                PreviewState::Configuring | PreviewState::Streaming if unchanged => {}
                PreviewState::Configuring | PreviewState::Streaming => {
                    shared.teardown(inner);
                    shared.reconcile(inner);
                }
                PreviewState::Idle | PreviewState::Closed => shared.reconcile(inner),
            }
        })
    }

    /// Select the camera to preview; the current one is released first
    pub fn set_camera_id(&self, camera_id: impl Into<String>) -> CameraResult<()> {
        let camera_id = camera_id.into();
        self.submit(move |shared, inner| {
            if inner.camera_id.as_deref() == Some(camera_id.as_str()) {
                return;
            }
            info!(camera_id = %camera_id, "Switching preview camera");
            shared.teardown(inner);
            inner.camera_id = Some(camera_id);
            shared.reconcile(inner);
        })
    }

    /// The rendering layer destroyed the surface
    pub fn surface_destroyed(&self) -> CameraResult<()> {
        self.submit(|shared, inner| {
            shared.teardown(inner);
            inner.surface = None;
            shared.set_state(inner, PreviewState::Closed);
        })
    }

    /// Give the camera back while keeping the binding
    pub fn suspend(&self) -> CameraResult<()> {
        self.submit(|shared, inner| {
            if inner.suspended {
                return;
            }
            inner.suspended = true;
            shared.teardown(inner);
            shared.set_state(inner, PreviewState::Closed);
        })
    }

    /// Reopen the camera after [`suspend`](Self::suspend)
    pub fn resume(&self) -> CameraResult<()> {
        self.submit(|shared, inner| {
            if !inner.suspended {
                return;
            }
            inner.suspended = false;
            shared.reconcile(inner);
        })
    }

    /// Tear everything down for good; later events are ignored
    pub fn release(&self) -> CameraResult<()> {
        self.submit(|shared, inner| {
            shared.teardown(inner);
            inner.surface = None;
            inner.released = true;
            shared.set_state(inner, PreviewState::Closed);
        })
    }

    pub fn status(&self) -> PreviewStatus {
        self.shared.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewStatus> {
        self.shared.status.subscribe()
    }

    /// Wait until the published status satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> CameraResult<PreviewStatus>
    where
        F: FnMut(&PreviewStatus) -> bool,
    {
        let mut rx = self.subscribe();
        let status = rx
            .wait_for(|status| predicate(status))
            .await
            .map_err(|_| CameraError::SubstrateClosed)?;
        Ok(status.clone())
    }

    pub fn surface(&self) -> Option<PreviewSurface> {
        self.shared.inner.lock().unwrap().surface.clone()
    }

    pub fn surface_id(&self) -> Option<SurfaceId> {
        self.surface().map(|s| s.id())
    }

    fn submit<F>(&self, task: F) -> CameraResult<()>
    where
        F: FnOnce(&Arc<PreviewShared>, &mut PreviewInner) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.shared.executor.execute(move || {
            let mut inner = shared.inner.lock().unwrap();
            if inner.released {
                return;
            }
            task(&shared, &mut inner);
            shared.publish(&inner);
        })
    }
}

impl std::fmt::Debug for PreviewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSession")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl PreviewShared {
    fn set_state(&self, inner: &mut PreviewInner, state: PreviewState) {
        if inner.state != state {
            debug!(
                camera_id = inner.camera_id.as_deref().unwrap_or("-"),
                from = %inner.state,
                to = %state,
                "Preview state"
            );
            inner.state = state;
        }
    }

    fn publish(&self, inner: &PreviewInner) {
        let status = PreviewStatus {
            state: inner.state,
            camera_id: inner.camera_id.clone(),
            preview_size: inner.preview_size,
            holds_camera: inner.device.is_some() || inner.opening.is_some(),
            suspended: inner.suspended,
            error: inner.last_error.clone(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn fail(&self, inner: &mut PreviewInner, error: CameraError) {
        warn!(
            camera_id = inner.camera_id.as_deref().unwrap_or("-"),
            error = %error,
            "Preview failed"
        );
        inner.last_error = Some(error);
        self.set_state(inner, PreviewState::Closed);
    }

    /// Stop the session, close the device, then invalidate pending callbacks
    fn teardown(&self, inner: &mut PreviewInner) {
        if let Some(session) = inner.session.take() {
            if let Err(e) = session.stop_repeating() {
                debug!(error = %e, "Stopping repeating request failed");
            }
            session.close();
        }
        // Closes the device before its lease is released
        drop(inner.device.take());
        inner.preview_size = None;
        inner.attempt += 1;
    }

    /// Start opening if everything a preview needs is in place
    fn reconcile(self: &Arc<Self>, inner: &mut PreviewInner) {
        if inner.released || inner.suspended || inner.device.is_some() {
            return;
        }
        let (Some(surface), Some(camera_id)) = (inner.surface.clone(), inner.camera_id.clone())
        else {
            return;
        };
        if !surface.is_valid() {
            debug!(surface_id = surface.id(), "Surface not valid yet");
            return;
        }
        if inner.opening.is_some() {
            // Resumes once the previous open completes
            self.set_state(inner, PreviewState::Opening);
            return;
        }

        inner.attempt += 1;
        let attempt = inner.attempt;
        inner.last_error = None;

        let lease = match self
            .leases
            .acquire(&camera_id, LeaseOwner::Preview(surface.id()))
        {
            Ok(lease) => lease,
            Err(e) => {
                self.fail(inner, e);
                return;
            }
        };
        self.set_state(inner, PreviewState::Opening);

        let weak = Arc::downgrade(self);
        let listener: Listener<DeviceEvent> = Arc::new(move |event: DeviceEvent| match weak.upgrade() {
            Some(shared) => shared.on_device_event(attempt, event),
            None => {
                if let DeviceEvent::Opened(device) = event {
                    device.close();
                }
            }
        });
        match self.hal.open_camera(&camera_id, &self.executor, listener) {
            Ok(()) => {
                inner.opening = Some(PendingOpen { attempt, lease })
            }
            Err(e) => {
                drop(lease);
                self.fail(inner, e);
            }
        }
    }

    fn on_device_event(self: &Arc<Self>, attempt: u64, event: DeviceEvent) {
        let mut inner = self.inner.lock().unwrap();
        let pending = inner
            .opening
            .as_ref()
            .is_some_and(|open| open.attempt == attempt);

        match event {
            DeviceEvent::Opened(device) => {
                if !pending {
                    device.close();
                    return;
                }
                let Some(open) = inner.opening.take() else {
                    return;
                };
                let handle = DeviceHandle::new(open.lease, device);
                if attempt != inner.attempt || inner.released {
                    debug!(camera_id = %handle.camera_id(), "Discarding superseded camera open");
                    drop(handle);
                    self.reconcile(&mut inner);
                } else {
                    self.configure(&mut inner, handle, attempt);
                }
            }
            DeviceEvent::Error(reason) if pending => {
                let camera_id = inner.camera_id.clone().unwrap_or_default();
                inner.opening = None;
                if attempt == inner.attempt {
                    self.fail(
                        &mut inner,
                        CameraError::DeviceOpen(format!("{}: {}", camera_id, reason)),
                    );
                } else {
                    self.reconcile(&mut inner);
                }
            }
            DeviceEvent::Disconnected if pending => {
                let camera_id = inner.camera_id.clone().unwrap_or_default();
                inner.opening = None;
                if attempt == inner.attempt {
                    self.fail(&mut inner, CameraError::Disconnected(camera_id));
                } else {
                    self.reconcile(&mut inner);
                }
            }
            DeviceEvent::Error(reason) => self.device_lost(&mut inner, attempt, Some(reason)),
            DeviceEvent::Disconnected => self.device_lost(&mut inner, attempt, None),
        }
        self.publish(&inner);
    }

    /// The open device went away or hit a fatal error
    fn device_lost(&self, inner: &mut PreviewInner, attempt: u64, reason: Option<String>) {
        if attempt != inner.attempt || inner.device.is_none() {
            return;
        }
        let camera_id = inner.camera_id.clone().unwrap_or_default();
        if let Some(reason) = reason {
            warn!(camera_id = %camera_id, reason = %reason, "Camera error while previewing");
        }
        self.teardown(inner);
        self.fail(inner, CameraError::Disconnected(camera_id));
    }

    fn configure(self: &Arc<Self>, inner: &mut PreviewInner, handle: DeviceHandle, attempt: u64) {
        let Some(surface) = inner.surface.clone() else {
            return;
        };
        let sizes = match self.hal.characteristics(handle.camera_id()) {
            Ok(characteristics) => characteristics.output_sizes,
            Err(e) => {
                drop(handle);
                self.fail(inner, e);
                return;
            }
        };
        let geometry = surface.geometry();
        let Some(size) = choose_optimal_size(&sizes, geometry.width, geometry.height) else {
            drop(handle);
            self.fail(
                inner,
                CameraError::SessionConfigure("camera reports no output sizes".to_string()),
            );
            return;
        };

        debug!(
            camera_id = %handle.camera_id(),
            surface = %geometry,
            preview = %size,
            "Chose preview size"
        );
        surface.set_fixed_size(size);
        inner.preview_size = Some(size);
        self.set_state(inner, PreviewState::Configuring);

        let weak: Weak<PreviewShared> = Arc::downgrade(self);
        let listener: Listener<SessionEvent> = Arc::new(move |event: SessionEvent| match weak.upgrade() {
            Some(shared) => shared.on_session_event(attempt, event),
            None => {
                if let SessionEvent::Configured(session) = event {
                    session.close();
                }
            }
        });
        match handle.device().create_session(
            vec![OutputTarget::Surface(surface)],
            &self.executor,
            listener,
        ) {
            Ok(()) => inner.device = Some(handle),
            Err(e) => {
                drop(handle);
                inner.preview_size = None;
                self.fail(inner, e);
            }
        }
    }

    fn on_session_event(self: &Arc<Self>, attempt: u64, event: SessionEvent) {
        let mut inner = self.inner.lock().unwrap();
        let current = attempt == inner.attempt && inner.state == PreviewState::Configuring;

        match event {
            SessionEvent::Configured(session) => {
                let Some(surface) = inner.surface.clone().filter(|_| current) else {
                    session.close();
                    return;
                };
                match session.set_repeating_request(CaptureRequest::preview(surface), None) {
                    Ok(sequence) => {
                        debug!(sequence, "Preview repeating request submitted");
                        inner.session = Some(session);
                        self.set_state(&mut inner, PreviewState::Streaming);
                    }
                    Err(e) => {
                        session.close();
                        self.teardown(&mut inner);
                        self.fail(&mut inner, e);
                    }
                }
            }
            SessionEvent::ConfigureFailed(reason) => {
                if !current {
                    return;
                }
                self.teardown(&mut inner);
                self.fail(&mut inner, CameraError::SessionConfigure(reason));
            }
        }
        self.publish(&inner);
    }
}

impl Drop for PreviewShared {
    fn drop(&mut self) {
        let inner = match self.inner.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(session) = inner.session.take() {
            session.close();
        }
        inner.device.take();
    }
}
