// SPDX-License-Identifier: MPL-2.0

//! Simultaneous still capture from every back-facing camera
//!
//! ```text
//! capture_all ──▶ enumerate back cameras ──▶ CaptureJob + deadline timer
//!                                                 │
//!        ┌────────────────────┬───────────────────┤ one slot per camera
//!        ▼                    ▼                   ▼
//!   lease → open        lease → open        lease → open
//!   configure target    configure target    configure target
//!   still request       still request       still request
//!   save JPEG           (failure: logged)   (no image before deadline)
//!        │                    │                   │
//!        └────────────────────┴─────────▶ CaptureReport (resolved once)
//! ```
//!
//! Each camera runs its own pipeline of hardware callbacks and owns its own
//! result slot, so one camera failing never affects the others. Only the
//! enumeration step rejects a job. Hardware callbacks hold the job weakly: once
//! the deadline has passed, or the executor shut down, the job is dropped and
//! every camera it still held is closed.

pub mod job;

pub use job::{CaptureJob, CaptureReport, DeviceOutcome, Resolution};

use crate::backends::camera::{
    CameraDescriptor, CameraExecutor, CameraHal, CaptureEvent, CaptureRequest, DeviceEvent,
    DeviceHandle, DeviceLease, DeviceLeases, DeviceRegistry, HalSession, Image, ImageTarget,
    LeaseOwner, Listener, OutputTarget, SessionEvent, Size,
};
use crate::config::CaptureSettings;
use crate::constants::capture;
use crate::errors::{CameraError, CameraResult};
use crate::storage;
use chrono::Local;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runs capture jobs against the hardware layer
pub struct CaptureOrchestrator {
    executor: CameraExecutor,
    hal: Arc<dyn CameraHal>,
    registry: DeviceRegistry,
    leases: DeviceLeases,
    settings: CaptureSettings,
    output_dir: PathBuf,
}

impl CaptureOrchestrator {
    pub fn new(
        executor: CameraExecutor,
        hal: Arc<dyn CameraHal>,
        leases: DeviceLeases,
        settings: CaptureSettings,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            executor,
            registry: DeviceRegistry::new(Arc::clone(&hal)),
            hal,
            leases,
            settings,
            output_dir,
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Capture one still from every back-facing camera
    ///
    /// Resolves with an empty report right away when there are no
    /// back-facing cameras. Fails only if enumeration fails.
    pub async fn capture_all(&self) -> CameraResult<CaptureReport> {
        let registry = self.registry.clone();
        let cameras = self.executor.run(move || registry.back_facing()).await??;
        self.capture(cameras).await
    }

    /// Capture one still from each of `cameras`
    pub async fn capture(&self, cameras: Vec<CameraDescriptor>) -> CameraResult<CaptureReport> {
        let job_id = Uuid::new_v4();
        if cameras.is_empty() {
            info!(job_id = %job_id, "No back-facing cameras, nothing to capture");
            return Ok(CaptureReport::empty(job_id));
        }

        let timestamp = storage::job_timestamp(Local::now());
        let directory = storage::job_dir(&self.output_dir, &timestamp, job_id);
        if let Err(e) = storage::create_job_dir(&directory) {
            // Every camera will fail to save and be reported as such
            warn!(job_id = %job_id, error = %e, "Could not create capture job directory");
        }
        let ids: Vec<String> = cameras.into_iter().map(|c| c.id).collect();
        info!(
            job_id = %job_id,
            cameras = ?ids,
            deadline_ms = self.settings.deadline_ms,
            directory = %directory.display(),
            "Starting capture job"
        );

        let (job, report) = CaptureJob::new(
            job_id,
            ids.clone(),
            directory,
            timestamp,
            self.settings.resolve_when_complete,
        );
        let fanout = Arc::new(Fanout {
            job,
            executor: self.executor.clone(),
            hal: Arc::clone(&self.hal),
            leases: self.leases.clone(),
            still_size: self.settings.still_size(),
            slots: Mutex::new(HashMap::new()),
        });

        let deadline = Arc::clone(&fanout);
        self.executor
            .execute_after(self.settings.deadline(), move || deadline.deadline_reached())?;

        for camera_id in ids {
            let fanout = Arc::clone(&fanout);
            self.executor.execute(move || fanout.start_camera(camera_id))?;
        }
        drop(fanout);

        // Dropped unresolved only if the executor shut down under the job
        report.await.map_err(|_| CameraError::SubstrateClosed)
    }
}

impl std::fmt::Debug for CaptureOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureOrchestrator")
            .field("settings", &self.settings)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

/// Lease of a camera whose open is in flight, shared with the open listener
type PendingLease = Arc<Mutex<Option<DeviceLease>>>;

/// Hardware held by one camera's slot
enum Slot {
    Opening {
        lease: PendingLease,
    },
    Configuring {
        handle: DeviceHandle,
        target: ImageTarget,
    },
    Capturing {
        session: Box<dyn HalSession>,
        handle: DeviceHandle,
        target: ImageTarget,
    },
}

impl Slot {
    /// Close in reverse open order: session, device (then lease), target
    fn release(self) {
        match self {
            Slot::Opening { lease } => {
                let taken = lease.lock().unwrap().take();
                drop(taken);
            }
            Slot::Configuring { handle, target } => {
                drop(handle);
                target.close();
            }
            Slot::Capturing {
                session,
                handle,
                target,
            } => {
                session.close();
                drop(handle);
                target.close();
            }
        }
    }
}

/// Per-job state shared by all camera callbacks
struct Fanout {
    job: CaptureJob,
    executor: CameraExecutor,
    hal: Arc<dyn CameraHal>,
    leases: DeviceLeases,
    still_size: Size,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Fanout {
    fn take_slot(&self, camera_id: &str) -> Option<Slot> {
        self.slots.lock().unwrap().remove(camera_id)
    }

    fn put_slot(&self, camera_id: &str, slot: Slot) {
        self.slots.lock().unwrap().insert(camera_id.to_string(), slot);
    }

    fn fail(&self, camera_id: &str, error: CameraError) {
        warn!(
            job_id = %self.job.id(),
            camera_id,
            error = %error,
            "Camera excluded from capture"
        );
        self.job.record(camera_id, DeviceOutcome::Failed(error));
    }

    fn start_camera(self: Arc<Self>, camera_id: String) {
        if self.job.is_resolved() {
            return;
        }
        let lease = match self
            .leases
            .acquire(&camera_id, LeaseOwner::Capture(self.job.id()))
        {
            Ok(lease) => lease,
            Err(e) => {
                self.fail(&camera_id, e);
                return;
            }
        };
        let pending: PendingLease = Arc::new(Mutex::new(Some(lease)));
        self.put_slot(
            &camera_id,
            Slot::Opening {
                lease: Arc::clone(&pending),
            },
        );

        let weak = Arc::downgrade(&self);
        let id = camera_id.clone();
        let listener: Listener<DeviceEvent> =
            Arc::new(move |event: DeviceEvent| match weak.upgrade() {
                Some(fanout) => fanout.on_device_event(&id, event),
                None => abandon_open(&id, &pending, event),
            });
        if let Err(e) = self.hal.open_camera(&camera_id, &self.executor, listener) {
            if let Some(slot) = self.take_slot(&camera_id) {
                slot.release();
            }
            self.fail(&camera_id, e);
        }
    }

    fn on_device_event(self: &Arc<Self>, camera_id: &str, event: DeviceEvent) {
        match event {
            DeviceEvent::Opened(device) => {
                let lease = match self.take_slot(camera_id) {
                    Some(Slot::Opening { lease }) => {
                        let taken = lease.lock().unwrap().take();
                        taken
                    }
                    other => {
                        if let Some(slot) = other {
                            self.put_slot(camera_id, slot);
                        }
                        None
                    }
                };
                let Some(lease) = lease else {
                    device.close();
                    return;
                };
                let handle = DeviceHandle::new(lease, device);
                if self.job.is_resolved() {
                    debug!(camera_id, "Camera opened after the job resolved, closing");
                    return;
                }
                self.configure(camera_id, handle);
            }
            DeviceEvent::Error(reason) => {
                if let Some(slot) = self.take_slot(camera_id) {
                    slot.release();
                }
                self.fail(
                    camera_id,
                    CameraError::DeviceOpen(format!("{}: {}", camera_id, reason)),
                );
            }
            DeviceEvent::Disconnected => {
                if let Some(slot) = self.take_slot(camera_id) {
                    slot.release();
                }
                self.fail(camera_id, CameraError::Disconnected(camera_id.to_string()));
            }
        }
    }

    fn configure(self: &Arc<Self>, camera_id: &str, handle: DeviceHandle) {
        let target = ImageTarget::new(self.still_size, capture::STILL_MAX_IMAGES);
        let weak = Arc::downgrade(self);
        let id = camera_id.to_string();
        target.set_on_image_available(&self.executor, move |target| {
            if let Some(fanout) = weak.upgrade() {
                fanout.on_image_available(&id, target);
            }
        });

        let weak = Arc::downgrade(self);
        let id = camera_id.to_string();
        let listener: Listener<SessionEvent> =
            Arc::new(move |event: SessionEvent| match weak.upgrade() {
                Some(fanout) => fanout.on_session_event(&id, event),
                None => {
                    if let SessionEvent::Configured(session) = event {
                        session.close();
                    }
                }
            });
        match handle.device().create_session(
            vec![OutputTarget::Image(target.clone())],
            &self.executor,
            listener,
        ) {
            Ok(()) => self.put_slot(camera_id, Slot::Configuring { handle, target }),
            Err(e) => {
                Slot::Configuring { handle, target }.release();
                self.fail(camera_id, e);
            }
        }
    }

    fn on_session_event(self: &Arc<Self>, camera_id: &str, event: SessionEvent) {
        match event {
            SessionEvent::Configured(session) => {
                let (handle, target) = match self.take_slot(camera_id) {
                    Some(Slot::Configuring { handle, target }) => (handle, target),
                    other => {
                        if let Some(slot) = other {
                            self.put_slot(camera_id, slot);
                        }
                        session.close();
                        return;
                    }
                };

                let weak: Weak<Fanout> = Arc::downgrade(self);
                let id = camera_id.to_string();
                let listener: Listener<CaptureEvent> = Arc::new(move |event: CaptureEvent| {
                    if let Some(fanout) = weak.upgrade() {
                        fanout.on_capture_event(&id, event);
                    }
                });
                match session.capture(CaptureRequest::still(target.clone()), Some(listener)) {
                    Ok(frame_number) => {
                        debug!(camera_id, frame_number, "Still request submitted");
                        self.put_slot(
                            camera_id,
                            Slot::Capturing {
                                session,
                                handle,
                                target,
                            },
                        );
                    }
                    Err(e) => {
                        Slot::Capturing {
                            session,
                            handle,
                            target,
                        }
                        .release();
                        self.fail(camera_id, e);
                    }
                }
            }
            SessionEvent::ConfigureFailed(reason) => {
                if let Some(slot) = self.take_slot(camera_id) {
                    slot.release();
                }
                self.fail(camera_id, CameraError::SessionConfigure(reason));
            }
        }
    }

    fn on_capture_event(&self, camera_id: &str, event: CaptureEvent) {
        if let CaptureEvent::Failed {
            frame_number,
            reason,
        } = event
        {
            if let Some(slot) = self.take_slot(camera_id) {
                slot.release();
            }
            self.fail(
                camera_id,
                CameraError::CaptureSubmit(format!("frame {}: {}", frame_number, reason)),
            );
        }
    }

    fn on_image_available(&self, camera_id: &str, target: &ImageTarget) {
        let Some(image) = target.acquire_latest_image() else {
            return;
        };
        // The image is ours; the camera can go
        if let Some(slot) = self.take_slot(camera_id) {
            slot.release();
        }
        if self.job.is_resolved() {
            debug!(camera_id, "Image arrived after the job resolved, dropping");
            return;
        }

        match self.save(camera_id, &image) {
            Ok(path) => {
                self.job.record(camera_id, DeviceOutcome::Saved(path));
            }
            Err(e) => self.fail(camera_id, e),
        }
    }

    fn save(&self, camera_id: &str, image: &Image) -> CameraResult<PathBuf> {
        storage::write_capture(
            self.job.directory(),
            camera_id,
            self.job.timestamp(),
            &image.data,
        )
    }

    /// Resolve with what has arrived and give back every configured camera
    fn deadline_reached(&self) {
        if self.job.resolve(Resolution::DeadlineReached) {
            let missing: Vec<String> = self
                .slots
                .lock()
                .unwrap()
                .keys()
                .cloned()
                .collect();
            if !missing.is_empty() {
                info!(job_id = %self.job.id(), cameras = ?missing, "Deadline reached before these cameras delivered");
            }
        }

        // Opens still in flight close themselves when they complete
        let abandoned: Vec<Slot> = {
            let mut slots = self.slots.lock().unwrap();
            let ids: Vec<String> = slots
                .iter()
                .filter(|(_, slot)| !matches!(slot, Slot::Opening { .. }))
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| slots.remove(id)).collect()
        };
        for slot in abandoned {
            slot.release();
        }
    }
}

impl Drop for Fanout {
    fn drop(&mut self) {
        let slots = match self.slots.get_mut() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (camera_id, slot) in slots.drain() {
            // A pending open leaves its lease to the open listener
            if matches!(slot, Slot::Opening { .. }) {
                continue;
            }
            debug!(camera_id = %camera_id, "Releasing camera of a dropped capture job");
            slot.release();
        }
    }
}

/// An open completed after its job was dropped: close the camera, then free the lease
fn abandon_open(camera_id: &str, pending: &PendingLease, event: DeviceEvent) {
    let lease = pending.lock().unwrap().take();
    match (event, lease) {
        (DeviceEvent::Opened(device), Some(lease)) => {
            debug!(camera_id, "Camera opened after its capture job ended, closing");
            drop(DeviceHandle::new(lease, device));
        }
        (DeviceEvent::Opened(device), None) => device.close(),
        _ => {}
    }
}
