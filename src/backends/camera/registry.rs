// SPDX-License-Identifier: GPL-3.0-only

//! Camera enumeration and facing classification

use super::CameraHal;
use super::types::{CameraDescriptor, Size};
use crate::errors::{CameraError, CameraResult};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read-only view over the hardware's camera list
#[derive(Clone)]
pub struct DeviceRegistry {
    hal: Arc<dyn CameraHal>,
}

impl DeviceRegistry {
    pub fn new(hal: Arc<dyn CameraHal>) -> Self {
        Self { hal }
    }

    /// Snapshot the camera identifiers
    ///
    /// Facing directions are read lazily while iterating the snapshot. No
    /// retry is attempted on failure.
    pub fn enumerate(&self) -> CameraResult<CameraEnumeration> {
        let raw_ids = self.hal.camera_ids().map_err(as_query_error)?;

        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(raw_ids.len());
        for id in raw_ids {
            if seen.insert(id.clone()) {
                ids.push(id);
            } else {
                warn!(camera_id = %id, "Duplicate camera id in enumeration, ignoring");
            }
        }

        debug!(count = ids.len(), "Enumerated cameras");
        Ok(CameraEnumeration {
            hal: Arc::clone(&self.hal),
            ids,
        })
    }

    /// Every back-facing camera, in enumeration order
    pub fn back_facing(&self) -> CameraResult<Vec<CameraDescriptor>> {
        let enumeration = self.enumerate()?;
        let cameras = filter_back_facing(enumeration.iter()).collect::<CameraResult<Vec<_>>>()?;
        info!(count = cameras.len(), "Found back-facing cameras");
        Ok(cameras)
    }

    /// Preview output sizes supported by a camera
    pub fn output_sizes(&self, camera_id: &str) -> CameraResult<Vec<Size>> {
        self.hal
            .characteristics(camera_id)
            .map(|c| c.output_sizes)
            .map_err(as_query_error)
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry").finish_non_exhaustive()
    }
}

/// Restartable snapshot of enumerated camera identifiers
pub struct CameraEnumeration {
    hal: Arc<dyn CameraHal>,
    ids: Vec<String>,
}

impl CameraEnumeration {
    /// Lazily resolve each identifier into a descriptor
    pub fn iter(&self) -> Descriptors<'_> {
        Descriptors {
            hal: self.hal.as_ref(),
            ids: self.ids.iter(),
        }
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<'a> IntoIterator for &'a CameraEnumeration {
    type Item = CameraResult<CameraDescriptor>;
    type IntoIter = Descriptors<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator reading one camera's facing direction per step
pub struct Descriptors<'a> {
    hal: &'a dyn CameraHal,
    ids: std::slice::Iter<'a, String>,
}

impl Iterator for Descriptors<'_> {
    type Item = CameraResult<CameraDescriptor>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        Some(
            self.hal
                .characteristics(id)
                .map(|c| CameraDescriptor::new(id.clone(), c.facing))
                .map_err(as_query_error),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

/// Keep back-facing descriptors; errors pass through untouched
pub fn filter_back_facing<I>(descriptors: I) -> impl Iterator<Item = CameraResult<CameraDescriptor>>
where
    I: IntoIterator<Item = CameraResult<CameraDescriptor>>,
{
    descriptors.into_iter().filter(|result| match result {
        Ok(descriptor) => descriptor.is_back_facing(),
        Err(_) => true,
    })
}

fn as_query_error(err: CameraError) -> CameraError {
    match err {
        CameraError::HardwareQuery(_) => err,
        other => CameraError::HardwareQuery(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::Facing;
    use crate::backends::virtual_camera::VirtualRig;
    use crate::config::{VirtualCameraConfig, VirtualRigConfig};

    fn rig(cameras: Vec<VirtualCameraConfig>) -> Arc<VirtualRig> {
        Arc::new(VirtualRig::new(VirtualRigConfig {
            cameras,
            ..VirtualRigConfig::default()
        }))
    }

    #[test]
    fn test_enumeration_is_restartable() {
        let registry = DeviceRegistry::new(rig(vec![
            VirtualCameraConfig::new("0", Facing::Back),
            VirtualCameraConfig::new("1", Facing::Front),
        ]));
        let enumeration = registry.enumerate().unwrap();
        let first: Vec<_> = enumeration.iter().map(|d| d.unwrap().id).collect();
        let second: Vec<_> = enumeration.iter().map(|d| d.unwrap().id).collect();
        assert_eq!(first, vec!["0", "1"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_filter_keeps_back_and_errors() {
        let input = vec![
            Ok(CameraDescriptor::new("a", Facing::Back)),
            Ok(CameraDescriptor::new("b", Facing::Front)),
            Err(CameraError::HardwareQuery("gone".to_string())),
            Ok(CameraDescriptor::new("c", Facing::External)),
            Ok(CameraDescriptor::new("d", Facing::Back)),
        ];
        let out: Vec<_> = filter_back_facing(input).collect();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].as_ref().unwrap().id, "a");
        assert!(out[1].is_err());
        assert_eq!(out[2].as_ref().unwrap().id, "d");
    }

    #[test]
    fn test_duplicate_ids_collapse() {
        let registry = DeviceRegistry::new(rig(vec![
            VirtualCameraConfig::new("0", Facing::Back),
            VirtualCameraConfig::new("0", Facing::Back),
        ]));
        assert_eq!(registry.enumerate().unwrap().len(), 1);
    }

    #[test]
    fn test_permission_denied_is_query_error() {
        let hal = rig(vec![VirtualCameraConfig::new("0", Facing::Back)]);
        hal.set_permission_granted(false);
        let registry = DeviceRegistry::new(hal);
        assert!(matches!(
            registry.back_facing(),
            Err(CameraError::HardwareQuery(_))
        ));
    }
}
