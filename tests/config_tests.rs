// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use multicam::Config;
use multicam::Facing;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.capture.deadline_ms, 3000);
    assert!(
        config.capture.resolve_when_complete,
        "Jobs should resolve early once every camera reported"
    );
    assert!(config.capture.suspend_previews);
    assert!(config.output_dir.is_none());
}

#[test]
fn test_default_rig_has_two_back_cameras() {
    let config = Config::default();
    let back: Vec<&str> = config
        .rig
        .cameras
        .iter()
        .filter(|c| c.facing == Facing::Back)
        .map(|c| c.id.as_str())
        .collect();
    assert_eq!(back, vec!["0", "2"]);
}

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.output_dir = Some(dir.path().join("out"));
    config.capture.deadline_ms = 750;
    config.rig.cameras[1].configure_delay_ms = 40;
    config.rig.cameras[0].fail_capture = true;
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
    assert_eq!(loaded, Config::default());
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{ "capture": { "deadline_ms": 500 }, "rig": { "cameras": [ { "id": "wide" } ] } }"#,
    )
    .unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.capture.deadline_ms, 500);
    assert_eq!(loaded.capture.still_width, 1920);
    assert_eq!(loaded.rig.cameras.len(), 1);
    assert_eq!(loaded.rig.cameras[0].id, "wide");
    assert_eq!(loaded.rig.cameras[0].facing, Facing::Back);
    assert!(!loaded.rig.cameras[0].output_sizes.is_empty());
    assert!(loaded.rig.permission_granted);
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert_eq!(err.kind(), "config");
}

#[test]
fn test_explicit_output_dir_wins() {
    let mut config = Config::default();
    config.output_dir = Some("/tmp/multicam-test".into());
    assert_eq!(config.output_dir(), std::path::PathBuf::from("/tmp/multicam-test"));
}
