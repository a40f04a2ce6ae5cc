// SPDX-License-Identifier: GPL-3.0-only

//! Frame processing pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌────────────────┐
//! │ Camera frame │ ──▶ │  Processing loop  │ ──▶ │ Virtual camera │
//! │  (RGB, V4L2) │     │  - chain snapshot │     │  (PipeWire)    │
//! │  or black    │     │  - lazy segmenter │     │                │
//! │              │     │  - pacing         │ ──▶ │ Local preview  │
//! └──────────────┘     └───────────────────┘     └────────────────┘
//! ```
//!
//! - [`processing`]: the per-frame orchestrator and the local camera preview

pub mod processing;

pub use processing::{
    FrameProcessor, LoopAction, PreviewSink, ProcessingLoop, SegmenterFactory, run_camera_preview,
};
