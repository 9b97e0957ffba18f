// SPDX-License-Identifier: MPL-2.0

//! Integration tests for simultaneous still capture against the virtual rig

use multicam::config::VirtualCameraConfig;
use multicam::pipelines::photo::Resolution;
use multicam::{CameraError, CameraService, Config, Facing};
use std::path::Path;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn test_config(output: &Path, cameras: Vec<VirtualCameraConfig>) -> Config {
    let mut config = Config::default();
    config.output_dir = Some(output.to_path_buf());
    config.capture.deadline_ms = 2000;
    config.capture.still_width = 64;
    config.capture.still_height = 48;
    config.rig.frame_interval_ms = 5;
    config.rig.cameras = cameras;
    config
}

fn back(id: &str) -> VirtualCameraConfig {
    VirtualCameraConfig::new(id, Facing::Back)
}

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < WAIT {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_failing_camera_does_not_block_the_others() {
    let output = tempfile::tempdir().unwrap();
    let mut broken = back("1");
    broken.fail_configure = true;
    let config = test_config(
        output.path(),
        vec![back("0"), broken, back("2"), VirtualCameraConfig::new("3", Facing::Front)],
    );
    let (service, rig) = CameraService::with_virtual_rig(&config);

    let report = tokio::time::timeout(WAIT, service.capture_all())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.cameras, vec!["0", "1", "2"]);
    assert_eq!(report.resolution, Resolution::Completed);
    assert_eq!(report.saved.keys().collect::<Vec<_>>(), vec!["0", "2"]);
    assert!(matches!(
        report.failed.get("1"),
        Some(CameraError::SessionConfigure(_))
    ));
    assert!(report.missing().is_empty());

    let directory = report.directory.clone().unwrap();
    assert!(directory.starts_with(output.path()));
    for path in report.paths() {
        assert!(path.starts_with(&directory));
        let bytes = std::fs::read(&path).unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
    let name = report.paths()[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("CAM0_"), "unexpected file name {}", name);

    assert!(eventually(|| rig.open_count() == 0).await);
    assert!(eventually(|| service.leases().held_count() == 0).await);
    service.shutdown().await;
}

#[tokio::test]
async fn test_no_back_cameras_resolves_empty() {
    let output = tempfile::tempdir().unwrap();
    let config = test_config(
        output.path(),
        vec![VirtualCameraConfig::new("1", Facing::Front)],
    );
    let (service, rig) = CameraService::with_virtual_rig(&config);

    let report = service.capture_all().await.unwrap();
    assert!(report.cameras.is_empty());
    assert!(report.paths().is_empty());
    assert!(report.directory.is_none());
    assert_eq!(report.resolution, Resolution::Completed);
    assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 0);
    assert!(rig.history().is_empty());

    service.shutdown().await;
}

#[tokio::test]
async fn test_missing_permission_rejects_capture() {
    let output = tempfile::tempdir().unwrap();
    let config = test_config(output.path(), vec![back("0")]);
    let (service, rig) = CameraService::with_virtual_rig(&config);
    rig.set_permission_granted(false);

    let err = service.enumerate_back_cameras().await.unwrap_err();
    assert!(matches!(err, CameraError::HardwareQuery(_)));
    let err = service.capture_all().await.unwrap_err();
    assert!(matches!(err, CameraError::HardwareQuery(_)));

    rig.set_permission_granted(true);
    assert_eq!(service.enumerate_back_cameras().await.unwrap(), vec!["0"]);
    service.shutdown().await;
}

#[tokio::test]
async fn test_slow_camera_is_left_out_at_deadline() {
    let output = tempfile::tempdir().unwrap();
    let mut slow = back("2");
    slow.capture_delay_ms = 1500;
    let mut config = test_config(output.path(), vec![back("0"), slow]);
    config.capture.deadline_ms = 200;
    let (service, rig) = CameraService::with_virtual_rig(&config);

    let report = tokio::time::timeout(WAIT, service.capture_all())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.resolution, Resolution::DeadlineReached);
    assert_eq!(report.saved.keys().collect::<Vec<_>>(), vec!["0"]);
    assert_eq!(report.missing(), vec!["2"]);
    assert!(report.elapsed >= Duration::from_millis(200));

    // The slow camera is given back once the deadline passes
    assert!(eventually(|| !rig.is_open("2")).await);
    assert!(eventually(|| !service.leases().is_held("2")).await);
    service.shutdown().await;
}

#[tokio::test]
async fn test_wait_full_deadline() {
    let output = tempfile::tempdir().unwrap();
    let mut config = test_config(output.path(), vec![back("0"), back("1")]);
    config.capture.deadline_ms = 300;
    config.capture.resolve_when_complete = false;
    let (service, _rig) = CameraService::with_virtual_rig(&config);

    let report = service.capture_all().await.unwrap();
    assert_eq!(report.resolution, Resolution::DeadlineReached);
    assert!(report.elapsed >= Duration::from_millis(300));
    assert_eq!(report.paths().len(), 2);
    service.shutdown().await;
}

#[tokio::test]
async fn test_capture_rejection_is_per_camera() {
    let output = tempfile::tempdir().unwrap();
    let mut rejecting = back("0");
    rejecting.fail_capture = true;
    let mut unopenable = back("1");
    unopenable.fail_open = true;
    let config = test_config(output.path(), vec![rejecting, unopenable, back("2")]);
    let (service, _rig) = CameraService::with_virtual_rig(&config);

    let report = service.capture_all().await.unwrap();
    assert_eq!(report.resolution, Resolution::Completed);
    assert!(matches!(
        report.failed.get("0"),
        Some(CameraError::CaptureSubmit(_))
    ));
    assert!(matches!(
        report.failed.get("1"),
        Some(CameraError::DeviceOpen(_))
    ));
    assert_eq!(report.saved.keys().collect::<Vec<_>>(), vec!["2"]);
    service.shutdown().await;
}

#[tokio::test]
async fn test_overlapping_jobs_do_not_share_cameras() {
    let output = tempfile::tempdir().unwrap();
    let mut slow = back("0");
    slow.capture_delay_ms = 300;
    let config = test_config(output.path(), vec![slow]);
    let (service, _rig) = CameraService::with_virtual_rig(&config);

    let first = service.capture_all();
    let second = async {
        assert!(eventually(|| service.leases().is_held("0")).await);
        service.capture_all().await
    };
    let (first, second) = tokio::join!(first, second);

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.paths().len(), 1);
    assert!(matches!(
        second.failed.get("0"),
        Some(CameraError::ResourceBusy(_))
    ));
    assert_ne!(first.directory, second.directory);
    service.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_mid_capture_resolves_job() {
    let output = tempfile::tempdir().unwrap();
    let mut slow = back("0");
    slow.capture_delay_ms = 5000;
    let mut config = test_config(output.path(), vec![slow]);
    config.capture.deadline_ms = 3000;
    let (service, rig) = CameraService::with_virtual_rig(&config);

    let capture = service.capture_all();
    let stop = async {
        assert!(eventually(|| rig.is_open("0")).await);
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.shutdown().await;
    };
    let (result, ()) = tokio::time::timeout(WAIT, async { tokio::join!(capture, stop) })
        .await
        .expect("capture job never resolved after shutdown");

    assert_eq!(result.unwrap_err(), CameraError::SubstrateClosed);
    assert_eq!(rig.open_count(), 0);
    assert!(!service.leases().is_held("0"));
}

#[tokio::test]
async fn test_similar_ids_save_to_separate_files() {
    let output = tempfile::tempdir().unwrap();
    let config = test_config(output.path(), vec![back("usb:1"), back("usb_1")]);
    let (service, _rig) = CameraService::with_virtual_rig(&config);

    let report = service.capture_all().await.unwrap();
    let paths = report.paths();
    assert_eq!(paths.len(), 2);
    assert_ne!(paths[0], paths[1]);
    for path in &paths {
        assert!(path.is_file(), "{} missing", path.display());
    }
    service.shutdown().await;
}

#[tokio::test]
async fn test_unwritable_output_fails_each_camera() {
    let output = tempfile::tempdir().unwrap();
    let file = output.path().join("not-a-dir");
    std::fs::write(&file, b"x").unwrap();
    let config = test_config(&file, vec![back("0"), back("2")]);
    let (service, rig) = CameraService::with_virtual_rig(&config);

    let report = service.capture_all().await.unwrap();
    assert_eq!(report.resolution, Resolution::Completed);
    assert!(report.paths().is_empty());
    for camera_id in ["0", "2"] {
        assert!(matches!(
            report.failed.get(camera_id),
            Some(CameraError::Storage(_))
        ));
    }
    assert!(eventually(|| rig.open_count() == 0).await);
    service.shutdown().await;
}
