// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use multicam::Size;
use multicam::constants::{app_info, capture, preview, virtual_rig};
use multicam::pipelines::preview::choose_optimal_size;

#[test]
fn test_default_sizes_cover_common_aspects() {
    let sizes: Vec<Size> = virtual_rig::DEFAULT_OUTPUT_SIZES
        .iter()
        .map(|&size| Size::from(size))
        .collect();

    // Both a 16:9 and a 4:3 surface should find an exact aspect match
    let wide = choose_optimal_size(&sizes, 1280, 720).unwrap();
    assert_eq!(wide.width * 9, wide.height * 16);

    let classic = choose_optimal_size(&sizes, 640, 480).unwrap();
    assert_eq!(classic.width * 3, classic.height * 4);
}

#[test]
fn test_cli_surface_matches_an_advertised_size() {
    let default_surface = (
        preview::DEFAULT_SURFACE_WIDTH,
        preview::DEFAULT_SURFACE_HEIGHT,
    );
    assert!(virtual_rig::DEFAULT_OUTPUT_SIZES.contains(&default_surface));
}

#[test]
fn test_size_difference_weight_is_fractional() {
    assert!(preview::SIZE_DIFFERENCE_WEIGHT > 0.0);
    assert!(preview::SIZE_DIFFERENCE_WEIGHT < 1.0);
}

#[test]
fn test_capture_file_naming() {
    assert!(!capture::FILE_PREFIX.is_empty());
    assert_eq!(capture::FILE_EXTENSION, "jpg");
    assert!(capture::JPEG_QUALITY > 0 && capture::JPEG_QUALITY <= 100);
    assert_eq!(capture::STILL_MAX_IMAGES, 1);
}

#[test]
fn test_version_is_embedded() {
    let version = app_info::version();
    assert!(!version.is_empty());
    assert_eq!(version, version.trim());
    assert!(!version.starts_with('v'));
}
