// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use multicam::constants::{app_info, preview};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "multicam")]
#[command(about = "Concurrent preview and still capture across several cameras")]
#[command(version = app_info::version())]
#[command(subcommand_required = false)]
struct Cli {
    /// Config file (default: ~/.config/multicam/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Take one photo with every back-facing camera
    Capture {
        /// Output directory (default: ~/Pictures/multicam)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Capture deadline in milliseconds
        #[arg(short, long)]
        deadline_ms: Option<u64>,

        /// Always wait for the full deadline
        #[arg(long)]
        wait_full: bool,
    },

    /// Preview every back-facing camera into virtual surfaces
    Preview {
        /// How long to stream for
        #[arg(short, long, default_value = "5")]
        seconds: u64,

        /// Surface width
        #[arg(long, default_value_t = preview::DEFAULT_SURFACE_WIDTH)]
        width: u32,

        /// Surface height
        #[arg(long, default_value_t = preview::DEFAULT_SURFACE_HEIGHT)]
        height: u32,
    },

    /// Show the config file location
    Config {
        /// Write the default config if none exists
        #[arg(long)]
        init: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=multicam=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config;

    match cli.command {
        None | Some(Commands::List) => cli::list_cameras(config_path.as_deref()),
        Some(Commands::Capture {
            output,
            deadline_ms,
            wait_full,
        }) => cli::capture(config_path.as_deref(), output, deadline_ms, wait_full),
        Some(Commands::Preview {
            seconds,
            width,
            height,
        }) => cli::preview(config_path.as_deref(), seconds, width, height),
        Some(Commands::Config { init }) => cli::show_config(config_path.as_deref(), init),
    }
}
