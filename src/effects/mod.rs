// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame video effects
//!
//! Effects are configured with an open map of named parameters
//! ([`EffectParams`]) and kept in an ordered [`EffectChain`] with at most one
//! entry per [`EffectKind`]. The [`EffectController`] guards the chain for
//! concurrent mutation and hands out snapshots to the processing loop.
//!
//! Parameters are parsed into the typed [`EffectSettings`] enum before an
//! effect runs, so each kernel receives validated values.

mod chain;
mod collaborators;
mod controller;
mod instance;
mod kernels;
mod settings;

pub use chain::{ChainEntry, EffectChain, receives_mask};
pub use collaborators::{CenterWeightedSegmenter, FaceLocator, Segmenter, SkinToneFaceLocator};
pub use controller::EffectController;
pub use instance::EffectInstance;
pub use settings::{AutoFrameSettings, Background, EffectSettings};

use crate::backends::camera::types::Frame;
use crate::errors::EffectError;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The closed set of effect kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectKind {
    Blur,
    Replace,
    Brightness,
    Beautify,
    AutoFrame,
    GazeCorrect,
}

impl EffectKind {
    pub const ALL: [EffectKind; 6] = [
        EffectKind::Blur,
        EffectKind::Replace,
        EffectKind::Brightness,
        EffectKind::Beautify,
        EffectKind::AutoFrame,
        EffectKind::GazeCorrect,
    ];

    /// Name used on the command line and over D-Bus
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectKind::Blur => "blur",
            EffectKind::Replace => "replace",
            EffectKind::Brightness => "brightness",
            EffectKind::Beautify => "beautify",
            EffectKind::AutoFrame => "autoframe",
            EffectKind::GazeCorrect => "gaze-correct",
        }
    }

    /// Human-readable class name reported by `GetCurrentEffects`
    pub fn display_name(&self) -> &'static str {
        match self {
            EffectKind::Blur => "BackgroundBlur",
            EffectKind::Replace => "BackgroundReplace",
            EffectKind::Brightness => "BrightnessAdjustment",
            EffectKind::Beautify => "FaceBeautification",
            EffectKind::AutoFrame => "AutoFraming",
            EffectKind::GazeCorrect => "EyeGazeCorrection",
        }
    }

    /// Kinds that always consume the segmentation mask
    pub fn is_mask_dependent(&self) -> bool {
        matches!(self, EffectKind::Blur | EffectKind::Replace)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectKind {
    type Err = EffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blur" => Ok(EffectKind::Blur),
            "replace" => Ok(EffectKind::Replace),
            "brightness" => Ok(EffectKind::Brightness),
            "beautify" => Ok(EffectKind::Beautify),
            "autoframe" => Ok(EffectKind::AutoFrame),
            "gaze-correct" => Ok(EffectKind::GazeCorrect),
            other => Err(EffectError::UnknownKind(other.to_string())),
        }
    }
}

/// A single effect parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    /// In-memory image (used for background replacement)
    Image(Arc<Frame>),
}

impl ParamValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Integers are accepted where floats are expected
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            ParamValue::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a command-line value: integer, then float, then boolean, else text
    pub fn parse_loose(s: &str) -> Self {
        if let Ok(v) = s.parse::<i64>() {
            ParamValue::Int(v)
        } else if let Ok(v) = s.parse::<f64>() {
            ParamValue::Float(v)
        } else if let Ok(v) = s.parse::<bool>() {
            ParamValue::Bool(v)
        } else {
            ParamValue::Text(s.to_string())
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
            ParamValue::Image(img) => write!(f, "<image {}x{}>", img.width, img.height),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// Named effect parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectParams(BTreeMap<String, ParamValue>);

impl EffectParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Copy of `self` with every key from `overrides` replacing its own
    pub fn merged(&self, overrides: &EffectParams) -> EffectParams {
        let mut merged = self.0.clone();
        for (k, v) in &overrides.0 {
            merged.insert(k.clone(), v.clone());
        }
        EffectParams(merged)
    }
}

impl FromIterator<(String, ParamValue)> for EffectParams {
    fn from_iter<T: IntoIterator<Item = (String, ParamValue)>>(iter: T) -> Self {
        EffectParams(iter.into_iter().collect())
    }
}

/// An effect kind with its parameters
///
/// Replaced wholesale on update; never mutated after it is published in a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectConfig {
    pub kind: EffectKind,
    pub params: EffectParams,
}

impl EffectConfig {
    pub fn new(kind: EffectKind, params: EffectParams) -> Self {
        Self { kind, params }
    }

    /// Whether this config sets `face_only=true`
    pub fn face_only(&self) -> bool {
        self.params
            .get("face_only")
            .and_then(ParamValue::as_bool)
            .unwrap_or(false)
    }
}

/// Single-channel foreground confidence in [0, 1], one value per pixel
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl Mask {
    /// Mask with every pixel set to `value`
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value.clamp(0.0, 1.0); width as usize * height as usize],
        }
    }

    pub fn at(&self, x: u32, y: u32) -> f32 {
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
            .unwrap_or(0.0)
    }

    /// Error unless the mask covers exactly the frame
    pub fn check_matches(&self, frame: &Frame) -> Result<(), EffectError> {
        if self.width != frame.width || self.height != frame.height {
            return Err(EffectError::MaskSizeMismatch {
                width: frame.width,
                height: frame.height,
                mask_width: self.width,
                mask_height: self.height,
            });
        }
        Ok(())
    }
}

/// Face bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BoundingBox {
    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.w as f32 / 2.0,
            self.y as f32 + self.h as f32 / 2.0,
        )
    }

    /// Clip to a frame of the given size
    pub fn clamped(&self, width: u32, height: u32) -> BoundingBox {
        let x = self.x.min(width.saturating_sub(1));
        let y = self.y.min(height.saturating_sub(1));
        BoundingBox {
            x,
            y,
            w: self.w.min(width - x),
            h: self.h.min(height - y),
        }
    }
}
