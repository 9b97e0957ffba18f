// SPDX-License-Identifier: GPL-3.0-only

//! Drawable preview surfaces
//!
//! A [`PreviewSurface`] stands in for an on-screen tile owned by the rendering
//! layer. The rendering layer sets its geometry and validity; the preview
//! session pins the buffer size it negotiated with the camera; the hardware
//! layer presents frames into it.

use super::types::{CameraFrame, Size};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Identifier of a surface, unique for the lifetime of the process
pub type SurfaceId = u64;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

struct SurfaceInner {
    id: SurfaceId,
    geometry: Mutex<Size>,
    fixed_size: Mutex<Option<Size>>,
    valid: AtomicBool,
    frame_count: AtomicU64,
    latest_frame: Mutex<Option<CameraFrame>>,
}

/// Shared handle to one drawable surface
#[derive(Clone)]
pub struct PreviewSurface {
    inner: Arc<SurfaceInner>,
}

impl PreviewSurface {
    /// Create a valid surface with the given on-screen geometry
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(SurfaceInner {
                id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
                geometry: Mutex::new(Size::new(width, height)),
                fixed_size: Mutex::new(None),
                valid: AtomicBool::new(true),
                frame_count: AtomicU64::new(0),
                latest_frame: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.inner.id
    }

    /// On-screen geometry as last reported by the rendering layer
    pub fn geometry(&self) -> Size {
        *self.inner.geometry.lock().unwrap()
    }

    pub fn set_geometry(&self, width: u32, height: u32) {
        *self.inner.geometry.lock().unwrap() = Size::new(width, height);
    }

    /// Buffer size pinned by the streaming session, if any
    pub fn fixed_size(&self) -> Option<Size> {
        *self.inner.fixed_size.lock().unwrap()
    }

    pub fn set_fixed_size(&self, size: Size) {
        *self.inner.fixed_size.lock().unwrap() = Some(size);
    }

    /// Size frames are produced at: the pinned buffer size, else the geometry
    pub fn buffer_size(&self) -> Size {
        self.fixed_size().unwrap_or_else(|| self.geometry())
    }

    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::Acquire)
    }

    /// Mark the surface as gone; frames presented afterwards are dropped
    pub fn invalidate(&self) {
        self.inner.valid.store(false, Ordering::Release);
        self.inner.latest_frame.lock().unwrap().take();
    }

    /// Display a frame. Returns false when the surface is no longer valid.
    pub fn present(&self, frame: CameraFrame) -> bool {
        if !self.is_valid() {
            return false;
        }
        *self.inner.latest_frame.lock().unwrap() = Some(frame);
        self.inner.frame_count.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Number of frames presented since creation
    pub fn frame_count(&self) -> u64 {
        self.inner.frame_count.load(Ordering::Relaxed)
    }

    pub fn latest_frame(&self) -> Option<CameraFrame> {
        self.inner.latest_frame.lock().unwrap().clone()
    }
}

impl PartialEq for PreviewSurface {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for PreviewSurface {}

impl std::fmt::Debug for PreviewSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSurface")
            .field("id", &self.inner.id)
            .field("geometry", &self.geometry())
            .field("fixed_size", &self.fixed_size())
            .field("valid", &self.is_valid())
            .finish()
    }
}
