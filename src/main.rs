// SPDX-License-Identifier: GPL-3.0-only

use camfx::backends::camera::types::{CameraConfig, CameraSource};
use camfx::backends::virtual_camera::RetryPolicy;
use camfx::config::DaemonConfig;
use camfx::constants::{camera, pipeline};
use clap::{Parser, Subcommand};
use std::process::ExitCode;

mod cli;

#[derive(Parser)]
#[command(name = "camfx")]
#[command(about = "Virtual camera with live video effects")]
#[command(version = camfx::constants::app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish the processed camera as a virtual camera
    Start {
        /// Camera index or device path
        #[arg(short, long, default_value = "0")]
        device: String,

        #[arg(long, default_value_t = camera::DEFAULT_WIDTH)]
        width: u32,

        #[arg(long, default_value_t = camera::DEFAULT_HEIGHT)]
        height: u32,

        #[arg(long, default_value_t = camera::DEFAULT_FPS)]
        fps: u32,

        /// Name of the published virtual camera
        #[arg(short, long, default_value = pipeline::DEFAULT_PUBLISHED_NAME)]
        name: String,

        /// Serve the D-Bus control interface
        #[arg(long)]
        dbus: bool,

        /// Show processed frames in the terminal
        #[arg(long)]
        preview: bool,

        /// Open the camera right away
        #[arg(long)]
        camera_on: bool,
    },

    /// Watch the published virtual camera in the terminal
    PreviewVirtual {
        #[arg(short, long, default_value = pipeline::DEFAULT_PUBLISHED_NAME)]
        name: String,

        /// Attempts to attach before giving up
        #[arg(long, default_value_t = camfx::constants::retry::MAX_ATTEMPTS)]
        attempts: u32,
    },

    /// Run effects on a camera and show the result in the terminal
    ///
    /// Nothing is published; the effect chain is local to this process.
    PreviewCamera {
        /// Camera index or device path
        #[arg(short, long, default_value = "0")]
        device: String,

        #[arg(long, default_value_t = camera::DEFAULT_WIDTH)]
        width: u32,

        #[arg(long, default_value_t = camera::DEFAULT_HEIGHT)]
        height: u32,

        #[arg(long, default_value_t = camera::DEFAULT_FPS)]
        fps: u32,

        /// Effect to apply, if any
        effect: Option<String>,

        /// Parameters as key=value
        params: Vec<String>,
    },

    /// List cameras and their modes
    ListDevices,

    /// Replace the effect chain with one effect
    SetEffect {
        /// blur, replace, brightness, beautify, autoframe or gaze-correct
        effect: String,
        /// Parameters as key=value
        params: Vec<String>,
    },

    /// Add an effect, or update it if already in the chain
    AddEffect {
        effect: String,
        /// Parameters as key=value
        params: Vec<String>,
    },

    /// Remove an effect by position or by type
    RemoveEffect {
        #[arg(long, conflicts_with = "effect")]
        index: Option<i32>,
        #[arg(long)]
        effect: Option<String>,
    },

    /// Show the current effect chain
    GetEffects,

    /// Change one parameter of an effect in the chain
    UpdateParam {
        effect: String,
        param: String,
        value: String,
    },

    /// Open the camera
    CameraStart,

    /// Close the camera (black frames are published)
    CameraStop,

    /// Show whether the camera is open and its configuration
    CameraStatus,

    /// Switch camera, resolution or frame rate
    CameraConfig {
        #[arg(short, long, default_value = "0")]
        device: String,
        #[arg(long, default_value_t = camera::DEFAULT_WIDTH)]
        width: u32,
        #[arg(long, default_value_t = camera::DEFAULT_HEIGHT)]
        height: u32,
        #[arg(long, default_value_t = camera::DEFAULT_FPS)]
        fps: u32,
    },
}

fn main() -> ExitCode {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camfx=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("camfx=info,warn")),
        )
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start {
            device,
            width,
            height,
            fps,
            name,
            dbus,
            preview,
            camera_on,
        } => cli::start(DaemonConfig {
            source: CameraSource::new(device),
            width,
            height,
            fps,
            name,
            dbus,
            preview,
            start_camera: camera_on,
        }),
        Commands::PreviewVirtual { name, attempts } => cli::preview_virtual(
            &name,
            RetryPolicy {
                max_attempts: attempts.max(1),
                ..RetryPolicy::default()
            },
        ),
        Commands::PreviewCamera {
            device,
            width,
            height,
            fps,
            effect,
            params,
        } => cli::preview_camera(
            CameraConfig {
                source: CameraSource::new(device),
                width,
                height,
                fps,
            },
            effect.as_deref(),
            &params,
        ),
        Commands::ListDevices => cli::list_devices(),
        Commands::SetEffect { effect, params } => cli::set_effect(&effect, &params),
        Commands::AddEffect { effect, params } => cli::add_effect(&effect, &params),
        Commands::RemoveEffect { index, effect } => cli::remove_effect(index, effect.as_deref()),
        Commands::GetEffects => cli::get_effects(),
        Commands::UpdateParam {
            effect,
            param,
            value,
        } => cli::update_param(&effect, &param, &value),
        Commands::CameraStart => cli::camera_start(),
        Commands::CameraStop => cli::camera_stop(),
        Commands::CameraStatus => cli::camera_status(),
        Commands::CameraConfig {
            device,
            width,
            height,
            fps,
        } => cli::camera_config(&device, width, height, fps),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
