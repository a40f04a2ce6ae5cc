// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::types::{CameraConfig, CameraSource};
use crate::constants::{camera, pipeline};
use serde::{Deserialize, Serialize};

/// Settings for one `camfx start` run
///
/// Built from the command line every time; nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Camera index or device path
    pub source: CameraSource,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Name the virtual camera is published under
    pub name: String,
    /// Serve the remote control interface on the session bus
    pub dbus: bool,
    /// Show processed frames in the terminal
    pub preview: bool,
    /// Open the camera immediately instead of waiting for a remote start
    pub start_camera: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            source: CameraSource::default(),
            width: camera::DEFAULT_WIDTH,
            height: camera::DEFAULT_HEIGHT,
            fps: camera::DEFAULT_FPS,
            name: pipeline::DEFAULT_PUBLISHED_NAME.to_string(),
            dbus: false,
            preview: false,
            start_camera: false,
        }
    }
}

impl DaemonConfig {
    pub fn camera(&self) -> CameraConfig {
        CameraConfig {
            source: self.source.clone(),
            width: self.width,
            height: self.height,
            fps: self.fps,
        }
    }

    /// Reject settings no pipeline can run with
    pub fn validate(&self) -> Result<(), String> {
        self.camera().validate()?;
        if self.name.trim().is_empty() {
            return Err("virtual camera name must not be empty".into());
        }
        Ok(())
    }
}
