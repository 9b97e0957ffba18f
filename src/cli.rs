// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Capturing from every back-facing camera at once
//! - Streaming previews into virtual surfaces
//! - Locating and initializing the config file

use multicam::backends::camera::PreviewSurface;
use multicam::constants::timing;
use multicam::pipelines::photo::Resolution;
use multicam::{CameraService, Config};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

/// List all available cameras
pub fn list_cameras(config_path: Option<&Path>) -> CliResult {
    let config = load_config(config_path)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(list_cameras_async(&config))
}

async fn list_cameras_async(config: &Config) -> CliResult {
    let (service, _rig) = CameraService::with_virtual_rig(config);
    let cameras = service.describe_cameras().await;
    service.shutdown().await;
    let cameras = cameras?;

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for camera in &cameras {
        let marker = if camera.facing == multicam::Facing::Back {
            "*"
        } else {
            " "
        };
        println!("  {} [{}] {}", marker, camera.id, camera.facing);

        let sizes: Vec<String> = camera
            .output_sizes
            .iter()
            .take(4)
            .map(|size| size.to_string())
            .collect();
        if !sizes.is_empty() {
            println!("        Sizes: {}", sizes.join(", "));
        }
    }
    println!();
    println!("  * captured by 'multicam capture'");
    Ok(())
}

/// Capture one still from every back-facing camera
pub fn capture(
    config_path: Option<&Path>,
    output: Option<PathBuf>,
    deadline_ms: Option<u64>,
    wait_full: bool,
) -> CliResult {
    let mut config = load_config(config_path)?;
    if let Some(output) = output {
        config.output_dir = Some(output);
    }
    if let Some(deadline_ms) = deadline_ms {
        config.capture.deadline_ms = deadline_ms;
    }
    if wait_full {
        config.capture.resolve_when_complete = false;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(capture_async(&config))
}

async fn capture_async(config: &Config) -> CliResult {
    let (service, _rig) = CameraService::with_virtual_rig(config);
    println!("Capturing...");
    let report = service.capture_all().await;
    service.shutdown().await;
    let report = report?;

    if report.cameras.is_empty() {
        println!("No back-facing cameras found.");
        return Ok(());
    }

    for path in report.paths() {
        println!("Photo saved: {}", path.display());
    }
    for (camera_id, error) in &report.failed {
        println!("Camera {} failed: {}", camera_id, error);
    }
    for camera_id in report.missing() {
        println!("Camera {} did not deliver before the deadline", camera_id);
    }
    let how = match report.resolution {
        Resolution::Completed => "all cameras reported",
        Resolution::DeadlineReached => "deadline reached",
    };
    println!(
        "{}/{} saved in {} ms ({})",
        report.saved.len(),
        report.cameras.len(),
        report.elapsed.as_millis(),
        how
    );
    Ok(())
}

/// Stream every back-facing camera into its own virtual surface
pub fn preview(config_path: Option<&Path>, seconds: u64, width: u32, height: u32) -> CliResult {
    let config = load_config(config_path)?;

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(preview_async(&config, &stop_flag, seconds, width, height))
}

async fn preview_async(
    config: &Config,
    stop_flag: &AtomicBool,
    seconds: u64,
    width: u32,
    height: u32,
) -> CliResult {
    let (service, _rig) = CameraService::with_virtual_rig(config);
    let cameras = match service.enumerate_back_cameras().await {
        Ok(cameras) => cameras,
        Err(e) => {
            service.shutdown().await;
            return Err(e.into());
        }
    };
    if cameras.is_empty() {
        println!("No back-facing cameras found.");
        service.shutdown().await;
        return Ok(());
    }

    let mut surfaces = Vec::new();
    for camera_id in &cameras {
        let surface = PreviewSurface::new(width, height);
        service.bind_preview(&surface, camera_id)?;
        surfaces.push(surface);
    }

    println!("Previewing {} camera(s)... (press Ctrl+C to stop early)", cameras.len());
    let start = Instant::now();
    let target_duration = Duration::from_secs(seconds);
    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        tokio::time::sleep(Duration::from_millis(timing::STATUS_POLL_MS)).await;
    }

    for surface in &surfaces {
        let Some(status) = service.preview_status(surface.id()) else {
            continue;
        };
        let size = status
            .preview_size
            .map(|size| size.to_string())
            .unwrap_or_else(|| "-".to_string());
        print!(
            "  camera {}: {} at {}, {} frames",
            status.camera_id.as_deref().unwrap_or("-"),
            status.state,
            size,
            surface.frame_count()
        );
        match status.error {
            Some(error) => println!(" ({})", error),
            None => println!(),
        }
    }

    service.shutdown().await;
    Ok(())
}

/// Print the config location, optionally writing the defaults
pub fn show_config(config_path: Option<&Path>, init: bool) -> CliResult {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::path().ok_or("No config directory available")?,
    };

    if init && !path.exists() {
        Config::default().save_to(&path)?;
        println!("Wrote default config: {}", path.display());
    } else {
        println!("{}", path.display());
    }
    Ok(())
}
