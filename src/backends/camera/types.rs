// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for camera capture and frame hand-off

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::camera;

/// Pixel layout of a 3-byte-per-pixel frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Red, green, blue (the layout used everywhere inside camfx)
    #[default]
    Rgb24,
    /// Blue, green, red
    Bgr24,
}

impl PixelFormat {
    /// GStreamer caps format string
    pub fn gst_name(&self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "RGB",
            PixelFormat::Bgr24 => "BGR",
        }
    }
}

/// A raw video frame
///
/// Frames are plain values: `width * height * 3` tightly packed bytes with no
/// row padding. They are cloned at every hand-off between threads.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Frame {
    /// Byte length of a packed 3-channel frame of the given size
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }

    /// Wrap an RGB buffer, returning `None` if its length does not match
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == Self::expected_len(width, height)).then_some(Self {
            width,
            height,
            format: PixelFormat::Rgb24,
            data,
        })
    }

    /// All-zero RGB frame
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgb24,
            data: vec![0; Self::expected_len(width, height)],
        }
    }

    /// Convert to RGB channel order, swapping channels if needed
    pub fn into_rgb(mut self) -> Self {
        if self.format == PixelFormat::Bgr24 {
            for px in self.data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            self.format = PixelFormat::Rgb24;
        }
        self
    }

    /// Read the pixel at (x, y), clamped to the frame bounds
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if self.width == 0 || self.height == 0 {
            return [0, 0, 0];
        }
        let x = x.min(self.width - 1) as usize;
        let y = y.min(self.height - 1) as usize;
        let idx = (y * self.width as usize + x) * 3;
        match self.data.get(idx..idx + 3) {
            Some(px) => [px[0], px[1], px[2]],
            None => [0, 0, 0],
        }
    }

    /// Borrow the frame as an `image` buffer (copies the data)
    pub fn to_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Build a frame from an `image` buffer
    pub fn from_image(img: image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Rgb24,
            data: img.into_raw(),
        }
    }
}

/// Identifier of a physical camera: an index (`0` for `/dev/video0`) or a device path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraSource(String);

impl CameraSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as given
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Device node path for this source
    pub fn device_path(&self) -> String {
        match self.0.parse::<u32>() {
            Ok(index) => format!("/dev/video{}", index),
            Err(_) => self.0.clone(),
        }
    }
}

impl Default for CameraSource {
    fn default() -> Self {
        Self("0".to_string())
    }
}

impl fmt::Display for CameraSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The (source, width, height, fps) tuple owned by a camera session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub source: CameraSource,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: CameraSource::default(),
            width: camera::DEFAULT_WIDTH,
            height: camera::DEFAULT_HEIGHT,
            fps: camera::DEFAULT_FPS,
        }
    }
}

impl CameraConfig {
    /// Reject modes no capture pipeline should be asked for
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!("invalid resolution {}x{}", self.width, self.height));
        }
        if self.width > camera::MAX_WIDTH || self.height > camera::MAX_HEIGHT {
            return Err(format!(
                "resolution {}x{} exceeds {}x{}",
                self.width,
                self.height,
                camera::MAX_WIDTH,
                camera::MAX_HEIGHT
            ));
        }
        if !(1..=camera::MAX_FPS).contains(&self.fps) {
            return Err(format!("frame rate must be between 1 and {}", camera::MAX_FPS));
        }
        if self.source.as_str().trim().is_empty() {
            return Err("camera source must not be empty".into());
        }
        Ok(())
    }
}

impl fmt::Display for CameraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{} @ {}fps",
            self.source, self.width, self.height, self.fps
        )
    }
}

/// A camera listed by the capability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Device path
    pub id: String,
    /// Human-readable label, e.g. "Integrated Camera (/dev/video0)"
    pub label: String,
}

/// One supported resolution and its frame rates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraMode {
    pub width: u32,
    pub height: u32,
    /// Frame rates, highest first
    pub fps: Vec<u32>,
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rates: Vec<String> = self.fps.iter().map(|r| r.to_string()).collect();
        write!(f, "{}x{} @ {} fps", self.width, self.height, rates.join("/"))
    }
}
