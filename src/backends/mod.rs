// SPDX-License-Identifier: GPL-3.0-only

//! Backend layer for camera capture and virtual camera publishing
//!
//! This module provides platform-specific backend implementations for:
//! - Camera capture via V4L2 and GStreamer
//! - Virtual camera output and input via PipeWire
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Processing loop               │
//! └────────────────────┬────────────────────────┘
//!                      │
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                  │
//! │  ┌─────────────┐    ┌──────────────────┐    │
//! │  │   Camera    │    │ Virtual Camera   │    │
//! │  │   (V4L2)    │    │   (PipeWire)     │    │
//! │  └─────────────┘    └──────────────────┘    │
//! │         └── shared GStreamer helpers ──┘    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: Camera session, capture and capability probing
//! - [`virtual_camera`]: Virtual camera sink and source adapters
//! - [`gst`]: Pipeline start-up and sample conversion shared by both

pub mod camera;
pub mod gst;
pub mod virtual_camera;
