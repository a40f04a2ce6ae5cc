// SPDX-License-Identifier: GPL-3.0-only

//! Physical camera backend
//!
//! ```text
//! ┌─────────────────────┐
//! │  Processing loop    │
//! └──────────┬──────────┘
//!            │ tick / publish / pace
//!            ▼
//! ┌─────────────────────┐
//! │   CameraSession     │  ← Closed/Open state, config, output restart
//! └──────────┬──────────┘
//!            │
//!     ┌──────┴───────┐
//!     ▼              ▼
//! ┌────────┐   ┌────────────┐
//! │ Opener │   │ Capability │  ← V4L2 capture pipeline, cached mode probe
//! └────────┘   └────────────┘
//! ```

pub mod capture;
pub mod probe;
pub mod session;
pub mod types;

pub use capture::{V4l2Camera, V4l2Opener};
pub use probe::{CapabilityCache, CapabilityProbe, V4l2Probe};
pub use session::{CameraSession, Tick};
pub use types::*;

use crate::errors::CameraResult;

/// An open camera handle
///
/// Dropping the handle releases the device.
pub trait FrameSource: Send {
    /// Read the next frame as packed RGB at the configured size
    fn read(&mut self) -> CameraResult<Frame>;
}

/// Opens camera handles for a [`CameraConfig`]
pub trait CameraOpener: Send + Sync {
    /// Open the configured source; does not retry
    fn open(&self, config: &CameraConfig) -> CameraResult<Box<dyn FrameSource>>;
}
