// SPDX-License-Identifier: GPL-3.0-only

//! Single-purpose image sinks for still capture
//!
//! An [`ImageTarget`] receives JPEG stills of a fixed size and buffers at
//! most `max_images` images; older images are dropped as newer ones
//! arrive. The availability listener always runs on the executor it was
//! registered with.

use super::executor::CameraExecutor;
use super::types::{Image, Size};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

type AvailabilityListener = Arc<dyn Fn(&ImageTarget) + Send + Sync>;

struct TargetInner {
    size: Size,
    max_images: usize,
    queue: Mutex<VecDeque<Image>>,
    listener: Mutex<Option<(CameraExecutor, AvailabilityListener)>>,
    closed: AtomicBool,
}

/// Buffer sink receiving images from a configured session
#[derive(Clone)]
pub struct ImageTarget {
    inner: Arc<TargetInner>,
}

impl ImageTarget {
    pub fn new(size: Size, max_images: usize) -> Self {
        Self {
            inner: Arc::new(TargetInner {
                size,
                max_images: max_images.max(1),
                queue: Mutex::new(VecDeque::new()),
                listener: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn size(&self) -> Size {
        self.inner.size
    }

    /// Register the callback fired (on `executor`) for every queued image
    pub fn set_on_image_available<F>(&self, executor: &CameraExecutor, listener: F)
    where
        F: Fn(&ImageTarget) + Send + Sync + 'static,
    {
        *self.inner.listener.lock().unwrap() = Some((executor.clone(), Arc::new(listener)));
    }

    /// Hand an image to the target (called by the hardware layer)
    ///
    /// Returns false if the target is closed and the image was dropped.
    pub fn queue_image(&self, image: Image) -> bool {
        if self.is_closed() {
            trace!(frame = image.frame_number, "Image target closed, dropping image");
            return false;
        }

        {
            let mut queue = self.inner.queue.lock().unwrap();
            queue.push_back(image);
            while queue.len() > self.inner.max_images {
                queue.pop_front();
            }
        }

        let listener = self.inner.listener.lock().unwrap().clone();
        if let Some((executor, listener)) = listener {
            let target = self.clone();
            if let Err(e) = executor.execute(move || {
                if !target.is_closed() {
                    listener(&target);
                }
            }) {
                debug!(error = %e, "Could not deliver image availability");
            }
        }
        true
    }

    /// Take the newest image, discarding any older ones
    pub fn acquire_latest_image(&self) -> Option<Image> {
        let mut queue = self.inner.queue.lock().unwrap();
        let latest = queue.pop_back();
        queue.clear();
        latest
    }

    pub fn pending_images(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Drop buffered images and the listener. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.queue.lock().unwrap().clear();
        self.inner.listener.lock().unwrap().take();
    }
}

impl PartialEq for ImageTarget {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ImageTarget {}

impl std::fmt::Debug for ImageTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageTarget")
            .field("size", &self.inner.size)
            .field("max_images", &self.inner.max_images)
            .field("closed", &self.is_closed())
            .finish()
    }
}
