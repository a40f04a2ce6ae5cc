// SPDX-License-Identifier: GPL-3.0-only

//! camfx - a virtual camera with live video effects
//!
//! Frames from a physical camera run through a runtime-mutable effect chain
//! and are republished as a PipeWire video source that other applications
//! can use as a camera.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Physical camera session and the PipeWire virtual camera adapters
//! - [`effects`]: Effect chain, its controller and the effect kernels
//! - [`pipelines`]: The per-frame processing loop
//! - [`control`]: Remote control service and its D-Bus transport
//! - [`preview`]: Terminal preview
//! - [`config`]: Daemon configuration
//!
//! # Example
//!
//! ```ignore
//! // Publish camera 0 as "camfx" with remote control enabled:
//! // camfx start --dbus --camera-on
//! // camfx add-effect blur strength=31
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod control;
pub mod effects;
pub mod errors;
pub mod pipelines;
pub mod preview;

// Re-export commonly used types
pub use backends::camera::types::{CameraConfig, Frame};
pub use config::DaemonConfig;
pub use effects::{EffectController, EffectKind, EffectParams};
pub use errors::{AppError, AppResult};
