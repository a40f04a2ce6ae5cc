// SPDX-License-Identifier: GPL-3.0-only

//! Typed, validated effect settings
//!
//! Every effect runs from an [`EffectSettings`] variant parsed out of the
//! merged parameter map. Absent keys take their defaults; present keys must
//! have the right type and lie in range.

use super::{EffectKind, EffectParams, ParamValue};
use crate::backends::camera::types::Frame;
use crate::constants::effects as defaults;
use crate::errors::EffectError;
use std::sync::Arc;

/// Replacement background source
#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    Path(String),
    Image(Arc<Frame>),
}

/// Auto-framing parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoFrameSettings {
    pub padding: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

/// Parsed parameters for one effect, one variant per kind
#[derive(Debug, Clone, PartialEq)]
pub enum EffectSettings {
    Blur {
        /// Odd kernel size
        strength: u32,
    },
    Replace {
        background: Background,
    },
    Brightness {
        brightness: i32,
        contrast: f64,
        face_only: bool,
    },
    Beautify {
        smoothness: u32,
    },
    AutoFrame(AutoFrameSettings),
    GazeCorrect {
        strength: f64,
    },
}

impl EffectSettings {
    /// Parse and validate `params` for `kind`
    pub fn parse(kind: EffectKind, params: &EffectParams) -> Result<Self, EffectError> {
        let reader = Reader { kind, params };
        let settings = match kind {
            EffectKind::Blur => {
                let strength = reader.int(
                    "strength",
                    defaults::BLUR_STRENGTH_DEFAULT,
                    defaults::BLUR_STRENGTH_MIN,
                    defaults::BLUR_STRENGTH_MAX,
                )?;
                if strength % 2 == 0 {
                    return Err(reader.invalid("strength", "must be a positive odd integer"));
                }
                EffectSettings::Blur {
                    strength: strength as u32,
                }
            }
            EffectKind::Replace => {
                let background = match params.get("background") {
                    Some(ParamValue::Text(path)) if !path.is_empty() => {
                        Background::Path(path.clone())
                    }
                    Some(ParamValue::Image(img)) => Background::Image(Arc::clone(img)),
                    Some(_) => {
                        return Err(reader.invalid("background", "expected a file path or image"));
                    }
                    None => return Err(reader.invalid("background", "is required")),
                };
                EffectSettings::Replace { background }
            }
            EffectKind::Brightness => EffectSettings::Brightness {
                brightness: reader.int(
                    "brightness",
                    defaults::BRIGHTNESS_DEFAULT,
                    defaults::BRIGHTNESS_MIN,
                    defaults::BRIGHTNESS_MAX,
                )? as i32,
                contrast: reader.float(
                    "contrast",
                    defaults::CONTRAST_DEFAULT,
                    defaults::CONTRAST_MIN,
                    defaults::CONTRAST_MAX,
                )?,
                face_only: reader.bool("face_only", false)?,
            },
            EffectKind::Beautify => EffectSettings::Beautify {
                smoothness: reader.int(
                    "smoothness",
                    defaults::SMOOTHNESS_DEFAULT,
                    defaults::SMOOTHNESS_MIN,
                    defaults::SMOOTHNESS_MAX,
                )? as u32,
            },
            EffectKind::AutoFrame => {
                let padding = reader.float("padding", defaults::PADDING_DEFAULT, 0.0, f64::MAX)?;
                let min_zoom =
                    reader.float("min_zoom", defaults::MIN_ZOOM_DEFAULT, 1.0, f64::MAX)?;
                let max_zoom =
                    reader.float("max_zoom", defaults::MAX_ZOOM_DEFAULT, 1.0, f64::MAX)?;
                if max_zoom < min_zoom {
                    return Err(reader.invalid("max_zoom", "must not be less than min_zoom"));
                }
                EffectSettings::AutoFrame(AutoFrameSettings {
                    padding,
                    min_zoom,
                    max_zoom,
                })
            }
            EffectKind::GazeCorrect => EffectSettings::GazeCorrect {
                strength: reader.float("strength", defaults::GAZE_STRENGTH_DEFAULT, 0.0, 1.0)?,
            },
        };
        Ok(settings)
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            EffectSettings::Blur { .. } => EffectKind::Blur,
            EffectSettings::Replace { .. } => EffectKind::Replace,
            EffectSettings::Brightness { .. } => EffectKind::Brightness,
            EffectSettings::Beautify { .. } => EffectKind::Beautify,
            EffectSettings::AutoFrame(_) => EffectKind::AutoFrame,
            EffectSettings::GazeCorrect { .. } => EffectKind::GazeCorrect,
        }
    }
}

struct Reader<'a> {
    kind: EffectKind,
    params: &'a EffectParams,
}

impl Reader<'_> {
    fn invalid(&self, name: &str, reason: impl Into<String>) -> EffectError {
        EffectError::InvalidParameter {
            kind: self.kind.to_string(),
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    fn int(&self, name: &str, default: i64, min: i64, max: i64) -> Result<i64, EffectError> {
        let Some(value) = self.params.get(name) else {
            return Ok(default);
        };
        let v = value
            .as_i64()
            .ok_or_else(|| self.invalid(name, format!("expected an integer, got {}", value)))?;
        if !(min..=max).contains(&v) {
            return Err(self.invalid(name, format!("{} is outside {}..={}", v, min, max)));
        }
        Ok(v)
    }

    fn float(&self, name: &str, default: f64, min: f64, max: f64) -> Result<f64, EffectError> {
        let Some(value) = self.params.get(name) else {
            return Ok(default);
        };
        let v = value
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.invalid(name, format!("expected a number, got {}", value)))?;
        if v < min || v > max {
            return Err(self.invalid(name, format!("{} is out of range", v)));
        }
        Ok(v)
    }

    fn bool(&self, name: &str, default: bool) -> Result<bool, EffectError> {
        match self.params.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| self.invalid(name, format!("expected a boolean, got {}", value))),
        }
    }
}
