// SPDX-License-Identifier: GPL-3.0-only

//! Camera service
//!
//! The command surface the UI layer talks to. The service owns the camera
//! executor, the lease table shared by previews and capture jobs, one
//! preview session per bound surface, and the capture orchestrator.
//! Thread-safe and cheap to clone.

use crate::backends::camera::{
    CameraExecutor, CameraHal, DeviceLeases, DeviceRegistry, Facing, PreviewSurface, Size,
    SurfaceId,
};
use crate::backends::virtual_camera::VirtualRig;
use crate::config::{CaptureSettings, Config};
use crate::constants::executor::THREAD_NAME;
use crate::errors::{CameraError, CameraResult};
use crate::pipelines::photo::{CaptureOrchestrator, CaptureReport};
use crate::pipelines::preview::{PreviewSession, PreviewStatus};
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// One enumerated camera with its static properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    pub id: String,
    pub facing: Facing,
    pub output_sizes: Vec<Size>,
}

/// Multi-camera preview and capture service
#[derive(Clone)]
pub struct CameraService {
    executor: CameraExecutor,
    hal: Arc<dyn CameraHal>,
    registry: DeviceRegistry,
    leases: DeviceLeases,
    orchestrator: Arc<CaptureOrchestrator>,
    previews: Arc<Mutex<HashMap<SurfaceId, PreviewSession>>>,
    settings: CaptureSettings,
}

impl CameraService {
    /// Start the camera executor and wire everything to `hal`
    pub fn new(hal: Arc<dyn CameraHal>, config: &Config) -> Self {
        let executor = CameraExecutor::start(THREAD_NAME);
        let leases = DeviceLeases::new();
        let orchestrator = CaptureOrchestrator::new(
            executor.clone(),
            Arc::clone(&hal),
            leases.clone(),
            config.capture.clone(),
            config.output_dir(),
        );
        info!(
            output_dir = %orchestrator.output_dir().display(),
            deadline_ms = config.capture.deadline_ms,
            "Camera service started"
        );

        Self {
            executor,
            registry: DeviceRegistry::new(Arc::clone(&hal)),
            hal,
            leases,
            orchestrator: Arc::new(orchestrator),
            previews: Arc::new(Mutex::new(HashMap::new())),
            settings: config.capture.clone(),
        }
    }

    /// Service backed by a virtual rig built from `config.rig`
    pub fn with_virtual_rig(config: &Config) -> (Self, Arc<VirtualRig>) {
        let rig = Arc::new(VirtualRig::new(config.rig.clone()));
        let service = Self::new(Arc::clone(&rig) as Arc<dyn CameraHal>, config);
        (service, rig)
    }

    pub fn executor(&self) -> &CameraExecutor {
        &self.executor
    }

    pub fn leases(&self) -> &DeviceLeases {
        &self.leases
    }

    /// Identifiers of every back-facing camera, in enumeration order
    pub async fn enumerate_back_cameras(&self) -> CameraResult<Vec<String>> {
        let registry = self.registry.clone();
        let cameras = self.executor.run(move || registry.back_facing()).await??;
        Ok(cameras.into_iter().map(|c| c.id).collect())
    }

    /// Every camera with facing and supported preview sizes
    pub async fn describe_cameras(&self) -> CameraResult<Vec<CameraInfo>> {
        let registry = self.registry.clone();
        let hal = Arc::clone(&self.hal);
        self.executor
            .run(move || -> CameraResult<Vec<CameraInfo>> {
                let enumeration = registry.enumerate()?;
                enumeration
                    .ids()
                    .iter()
                    .map(|id| -> CameraResult<CameraInfo> {
                        let characteristics = hal.characteristics(id)?;
                        Ok(CameraInfo {
                            id: id.clone(),
                            facing: characteristics.facing,
                            output_sizes: characteristics.output_sizes,
                        })
                    })
                    .collect()
            })
            .await?
    }

    /// Stream `camera_id` into `surface`
    ///
    /// Binding an already bound surface switches its camera.
    pub fn bind_preview(
        &self,
        surface: &PreviewSurface,
        camera_id: &str,
    ) -> CameraResult<PreviewSession> {
        let mut previews = self.previews.lock().unwrap();
        if let Some(preview) = previews.get(&surface.id()) {
            preview.set_camera_id(camera_id)?;
            return Ok(preview.clone());
        }

        info!(surface_id = surface.id(), camera_id, "Binding preview");
        let preview = PreviewSession::new(
            self.executor.clone(),
            Arc::clone(&self.hal),
            self.leases.clone(),
        );
        preview.surface_created(surface.clone())?;
        preview.set_camera_id(camera_id)?;
        previews.insert(surface.id(), preview.clone());
        Ok(preview)
    }

    /// Switch the camera shown on a bound surface
    pub fn set_preview_camera(&self, surface_id: SurfaceId, camera_id: &str) -> CameraResult<()> {
        self.preview(surface_id)
            .ok_or(CameraError::UnknownSurface(surface_id))?
            .set_camera_id(camera_id)
    }

    /// Forward a geometry change from the rendering layer
    pub fn surface_changed(&self, surface_id: SurfaceId, width: u32, height: u32) -> CameraResult<()> {
        self.preview(surface_id)
            .ok_or(CameraError::UnknownSurface(surface_id))?
            .surface_changed(width, height)
    }

    /// The rendering layer destroyed the surface; the binding is dropped
    pub fn surface_destroyed(&self, surface_id: SurfaceId) -> CameraResult<()> {
        let preview = self
            .previews
            .lock()
            .unwrap()
            .remove(&surface_id)
            .ok_or(CameraError::UnknownSurface(surface_id))?;
        preview.surface_destroyed()?;
        preview.release()
    }

    /// Stop previewing into a surface and release its camera
    pub fn unbind_preview(&self, surface_id: SurfaceId) -> CameraResult<()> {
        let Some(preview) = self.previews.lock().unwrap().remove(&surface_id) else {
            debug!(surface_id, "Unbind of unknown surface ignored");
            return Ok(());
        };
        info!(surface_id, "Unbinding preview");
        preview.release()
    }

    pub fn preview(&self, surface_id: SurfaceId) -> Option<PreviewSession> {
        self.previews.lock().unwrap().get(&surface_id).cloned()
    }

    pub fn preview_status(&self, surface_id: SurfaceId) -> Option<PreviewStatus> {
        self.preview(surface_id).map(|p| p.status())
    }

    /// Surfaces with a bound preview
    pub fn bound_surfaces(&self) -> Vec<SurfaceId> {
        let mut ids: Vec<_> = self.previews.lock().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Capture one still from every back-facing camera
    ///
    /// With `suspend_previews` set, previews of the captured cameras give
    /// their camera up for the duration of the job and resume afterwards.
    /// Otherwise a camera held by a preview is reported busy and left out.
    pub async fn capture_all(&self) -> CameraResult<CaptureReport> {
        if !self.settings.suspend_previews {
            return self.orchestrator.capture_all().await;
        }

        let registry = self.registry.clone();
        let cameras = self.executor.run(move || registry.back_facing()).await??;
        let back: HashSet<&str> = cameras.iter().map(|c| c.id.as_str()).collect();

        let suspended: Vec<PreviewSession> = self
            .previews
            .lock()
            .unwrap()
            .values()
            .filter(|p| {
                p.status()
                    .camera_id
                    .as_deref()
                    .is_some_and(|id| back.contains(id))
            })
            .cloned()
            .collect();

        if !suspended.is_empty() {
            debug!(count = suspended.len(), "Suspending previews for capture");
            for preview in &suspended {
                preview.suspend()?;
            }
            try_join_all(
                suspended
                    .iter()
                    .map(|preview| preview.wait_for(|status| !status.holds_camera)),
            )
            .await?;
        }

        let result = self.orchestrator.capture(cameras).await;

        for preview in &suspended {
            if let Err(e) = preview.resume() {
                warn!(error = %e, "Failed to resume preview after capture");
            }
        }
        result
    }

    /// Release every preview and stop the executor
    ///
    /// Queued work finishes first; capture jobs still waiting on their
    /// deadline resolve with `SubstrateClosed`.
    pub async fn shutdown(&self) {
        let previews: Vec<PreviewSession> = self
            .previews
            .lock()
            .unwrap()
            .drain()
            .map(|(_, preview)| preview)
            .collect();
        for preview in previews {
            if let Err(e) = preview.release() {
                debug!(error = %e, "Preview release skipped");
            }
        }

        let executor = self.executor.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || executor.shutdown()).await {
            warn!(error = %e, "Camera executor shutdown task failed");
        }
        info!("Camera service stopped");
    }
}

impl std::fmt::Debug for CameraService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraService")
            .field("executor", &self.executor)
            .field("leases", &self.leases)
            .field("bound_surfaces", &self.bound_surfaces())
            .finish_non_exhaustive()
    }
}
