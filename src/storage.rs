// SPDX-License-Identifier: MPL-2.0

//! Capture output layout
//!
//! Every capture job writes into its own directory named after the job's
//! timestamp plus a short random suffix. Files inside are named by camera
//! identifier and the same timestamp, so two jobs can never collide.

use crate::constants::capture;
use crate::errors::{CameraError, CameraResult};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// `~/Pictures/multicam`, or `./multicam` without a pictures directory
pub fn default_output_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(capture::OUTPUT_DIR_NAME)
}

/// Millisecond resolution job timestamp
pub fn job_timestamp(time: DateTime<Local>) -> String {
    time.format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Private directory of one capture job under `root`
pub fn job_dir(root: &Path, timestamp: &str, job_id: Uuid) -> PathBuf {
    let suffix = job_id.simple().to_string();
    root.join(format!("{}_{}", timestamp, &suffix[..8]))
}

pub fn create_job_dir(dir: &Path) -> CameraResult<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| CameraError::Storage(format!("{}: {}", dir.display(), e)))?;
    debug!(path = %dir.display(), "Created capture job directory");
    Ok(())
}

/// Encode an opaque camera identifier into file name safe characters
///
/// ASCII letters, digits and `-` are kept; every other byte, `_` included,
/// becomes `_` followed by two hex digits. Distinct identifiers therefore
/// never share a file name.
pub fn escape_camera_id(camera_id: &str) -> String {
    let mut escaped = String::with_capacity(camera_id.len());
    for byte in camera_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("_{:02X}", byte));
        }
    }
    escaped
}

pub fn capture_file_name(camera_id: &str, timestamp: &str) -> String {
    format!(
        "{}{}_{}.{}",
        capture::FILE_PREFIX,
        escape_camera_id(camera_id),
        timestamp,
        capture::FILE_EXTENSION
    )
}

/// Persist one camera's still into the job directory
pub fn write_capture(
    dir: &Path,
    camera_id: &str,
    timestamp: &str,
    bytes: &[u8],
) -> CameraResult<PathBuf> {
    let path = dir.join(capture_file_name(camera_id, timestamp));
    std::fs::write(&path, bytes)
        .map_err(|e| CameraError::Storage(format!("{}: {}", path.display(), e)))?;
    info!(camera_id, path = %path.display(), bytes = bytes.len(), "Saved capture");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_has_milliseconds() {
        let time = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(job_timestamp(time), "20240309_140507_042");
    }

    #[test]
    fn test_escape_camera_id() {
        assert_eq!(escape_camera_id("0"), "0");
        assert_eq!(escape_camera_id("usb:1/video0"), "usb_3A1_2Fvideo0");
        assert_eq!(escape_camera_id("back-wide_2"), "back-wide_5F2");
        assert_eq!(escape_camera_id(""), "");
    }

    #[test]
    fn test_similar_ids_get_distinct_files() {
        let ids = ["usb:1", "usb_1", "usb 1", "usb1", "usb_3A1", ""];
        let names: std::collections::HashSet<String> = ids
            .iter()
            .map(|id| capture_file_name(id, "20240309_140507_042"))
            .collect();
        assert_eq!(names.len(), ids.len());
    }

    #[test]
    fn test_file_name_embeds_id_and_timestamp() {
        assert_eq!(
            capture_file_name("2", "20240309_140507_042"),
            "CAM2_20240309_140507_042.jpg"
        );
    }

    #[test]
    fn test_job_dirs_do_not_collide() {
        let root = tempfile::tempdir().unwrap();
        let a = job_dir(root.path(), "20240309_140507_042", Uuid::new_v4());
        let b = job_dir(root.path(), "20240309_140507_042", Uuid::new_v4());
        assert_ne!(a, b);
        create_job_dir(&a).unwrap();
        create_job_dir(&b).unwrap();
        assert!(a.is_dir() && b.is_dir());

        let path = write_capture(&a, "0", "20240309_140507_042", b"jpeg").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"jpeg");
    }

    #[test]
    fn test_unwritable_root_is_storage_error() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let dir = job_dir(&file, "t", Uuid::new_v4());
        let err = create_job_dir(&dir).unwrap_err();
        assert!(matches!(err, CameraError::Storage(_)));
        let err = write_capture(&dir, "0", "t", b"jpeg").unwrap_err();
        assert!(matches!(err, CameraError::Storage(_)));
    }
}
