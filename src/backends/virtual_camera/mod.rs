// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera adapters for PipeWire
//!
//! ```text
//!   Processing loop (RGB frames)
//!        │
//!        ▼
//! ┌──────────────────┐
//! │ OutputAdapter    │  ← appsrc → videoconvert → pipewiresink
//! └──────────────────┘
//!        │  PipeWire graph ("camfx", Video/Source)
//!        ▼
//! ┌──────────────────┐
//! │ InputAdapter     │  ← pipewiresrc → videoconvert → appsink
//! └──────────────────┘
//!        │  FrameQueue (capacity 2, most recent wins)
//!        ▼
//!   Preview consumer
//! ```

mod discovery;
mod frame_queue;
mod input;
mod output;
mod retry;

pub use discovery::{NodeDirectory, NodeInfo, NodeTarget, PwDump, discover, parse_pw_dump};
pub use frame_queue::FrameQueue;
pub use input::InputAdapter;
pub use output::{OutputAdapter, PipeWireOutputFactory, check_session_manager};
pub use retry::RetryPolicy;

use crate::errors::OutputResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters of a published virtual camera
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Name the source is published under
    pub name: String,
}

/// Destination for processed frames
///
/// Implemented by [`OutputAdapter`]. Each instance is driven by one thread
/// at a time.
pub trait FrameSink: Send {
    /// Push one packed RGB buffer of exactly `width * height * 3` bytes
    fn send(&mut self, data: &[u8]) -> OutputResult<()>;

    /// Time left in the current frame period; the caller sleeps it off
    fn next_frame_delay(&mut self) -> Duration;

    fn config(&self) -> &OutputConfig;

    /// Idempotent teardown
    fn cleanup(&mut self);
}

/// Creates frame sinks; the camera session rebuilds its sink on reconfigure
pub trait OutputFactory: Send + Sync {
    fn create(&self, config: &OutputConfig) -> OutputResult<Box<dyn FrameSink>>;
}
