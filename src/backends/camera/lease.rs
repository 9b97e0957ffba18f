// SPDX-License-Identifier: GPL-3.0-only

//! Exclusive ownership of camera identifiers
//!
//! A camera can only be opened by one owner at a time. Owners acquire a
//! [`DeviceLease`] before asking the hardware to open a camera; a second
//! acquisition for the same identifier fails immediately with
//! [`CameraError::ResourceBusy`]. Leases are released on drop, so every exit
//! path (error, timeout, teardown) gives the identifier back.

use super::HalDevice;
use super::surface::SurfaceId;
use crate::errors::{CameraError, CameraResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};
use uuid::Uuid;

/// Who currently owns a camera identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseOwner {
    /// A preview session bound to a surface
    Preview(SurfaceId),
    /// A still capture job
    Capture(Uuid),
}

impl std::fmt::Display for LeaseOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeaseOwner::Preview(surface) => write!(f, "preview surface {}", surface),
            LeaseOwner::Capture(job) => write!(f, "capture job {}", job),
        }
    }
}

/// System-wide table of held camera identifiers
#[derive(Clone, Default)]
pub struct DeviceLeases {
    held: Arc<Mutex<HashMap<String, LeaseOwner>>>,
}

impl DeviceLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `camera_id` for `owner`, failing fast if anyone already holds it
    pub fn acquire(&self, camera_id: &str, owner: LeaseOwner) -> CameraResult<DeviceLease> {
        let mut held = self.held.lock().unwrap();
        if let Some(current) = held.get(camera_id) {
            debug!(camera_id, owner = %owner, holder = %current, "Camera lease refused");
            return Err(CameraError::ResourceBusy(camera_id.to_string()));
        }
        held.insert(camera_id.to_string(), owner);
        trace!(camera_id, owner = %owner, "Camera lease acquired");

        Ok(DeviceLease {
            camera_id: camera_id.to_string(),
            owner,
            leases: self.clone(),
        })
    }

    pub fn is_held(&self, camera_id: &str) -> bool {
        self.held.lock().unwrap().contains_key(camera_id)
    }

    pub fn owner_of(&self, camera_id: &str) -> Option<LeaseOwner> {
        self.held.lock().unwrap().get(camera_id).copied()
    }

    /// Number of identifiers currently held
    pub fn held_count(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    fn release(&self, camera_id: &str, owner: LeaseOwner) {
        let mut held = self.held.lock().unwrap();
        if held.get(camera_id) == Some(&owner) {
            held.remove(camera_id);
            trace!(camera_id, owner = %owner, "Camera lease released");
        }
    }
}

impl std::fmt::Debug for DeviceLeases {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLeases")
            .field("held", &*self.held.lock().unwrap())
            .finish()
    }
}

/// Move-only claim on one camera identifier, released on drop
#[derive(Debug)]
pub struct DeviceLease {
    camera_id: String,
    owner: LeaseOwner,
    leases: DeviceLeases,
}

impl DeviceLease {
    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn owner(&self) -> LeaseOwner {
        self.owner
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.leases.release(&self.camera_id, self.owner);
    }
}

/// An open camera together with the lease that entitles its owner to it
///
/// Dropping the handle closes the device first and then releases the lease,
/// so the identifier is never handed out while the hardware is still open.
pub struct DeviceHandle {
    device: Box<dyn HalDevice>,
    lease: DeviceLease,
}

impl DeviceHandle {
    pub fn new(lease: DeviceLease, device: Box<dyn HalDevice>) -> Self {
        Self { device, lease }
    }

    pub fn camera_id(&self) -> &str {
        self.lease.camera_id()
    }

    pub fn owner(&self) -> LeaseOwner {
        self.lease.owner()
    }

    pub fn device(&self) -> &dyn HalDevice {
        self.device.as_ref()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        debug!(camera_id = %self.lease.camera_id(), owner = %self.lease.owner(), "Closing camera device");
        self.device.close();
        // `lease` drops after this body returns
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("camera_id", &self.camera_id())
            .field("owner", &self.owner())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy() {
        let leases = DeviceLeases::new();
        let first = leases.acquire("cam0", LeaseOwner::Preview(1)).unwrap();
        let second = leases.acquire("cam0", LeaseOwner::Capture(Uuid::new_v4()));
        assert_eq!(
            second.unwrap_err(),
            CameraError::ResourceBusy("cam0".to_string())
        );
        assert_eq!(leases.owner_of("cam0"), Some(LeaseOwner::Preview(1)));
        drop(first);
        assert!(!leases.is_held("cam0"));
    }

    #[test]
    fn test_distinct_ids_do_not_conflict() {
        let leases = DeviceLeases::new();
        let _a = leases.acquire("cam0", LeaseOwner::Preview(1)).unwrap();
        let _b = leases.acquire("cam1", LeaseOwner::Preview(1)).unwrap();
        assert_eq!(leases.held_count(), 2);
    }

    #[test]
    fn test_reacquire_after_release() {
        let leases = DeviceLeases::new();
        {
            let _lease = leases.acquire("cam0", LeaseOwner::Preview(3)).unwrap();
        }
        let lease = leases.acquire("cam0", LeaseOwner::Preview(4)).unwrap();
        assert_eq!(lease.owner(), LeaseOwner::Preview(4));
    }
}
