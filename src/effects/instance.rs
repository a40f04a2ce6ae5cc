// SPDX-License-Identifier: GPL-3.0-only

//! Effect instances
//!
//! An instance is built once per chain slot from the slot's config and holds
//! whatever state the effect keeps between frames: the decoded replacement
//! background, the face tracker used for temporal smoothing.

use super::collaborators::{FaceLocator, SkinToneFaceLocator};
use super::kernels;
use super::settings::{Background, EffectSettings};
use super::{EffectConfig, EffectKind, Mask};
use crate::backends::camera::types::Frame;
use crate::errors::EffectError;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Per-slot effect state, dispatched by kind
pub enum EffectInstance {
    Blur,
    Replace {
        /// Background decoded at configuration time, with the path it came from
        source: Option<(String, Arc<Frame>)>,
        /// Background resized to the last seen frame size
        fitted: Mutex<Option<Arc<Frame>>>,
    },
    Brightness,
    Beautify(Mutex<Box<dyn FaceLocator>>),
    AutoFrame(Mutex<Box<dyn FaceLocator>>),
    GazeCorrect(Mutex<Box<dyn FaceLocator>>),
}

impl std::fmt::Debug for EffectInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EffectInstance({})", self.kind())
    }
}

impl EffectInstance {
    /// Validate `config` and build the instance for its kind
    pub fn build(config: &EffectConfig) -> Result<Self, EffectError> {
        Self::build_with(config, || Box::new(SkinToneFaceLocator::new()))
    }

    /// Like [`EffectInstance::build`], with face-driven kinds using locators
    /// from `make_locator`
    pub fn build_with(
        config: &EffectConfig,
        make_locator: impl Fn() -> Box<dyn FaceLocator>,
    ) -> Result<Self, EffectError> {
        let settings = EffectSettings::parse(config.kind, &config.params)?;
        let instance = match settings {
            EffectSettings::Blur { .. } => EffectInstance::Blur,
            EffectSettings::Replace { background } => {
                let source = match background {
                    Background::Path(path) => {
                        let frame = load_background(&path)?;
                        Some((path, Arc::new(frame)))
                    }
                    Background::Image(_) => None,
                };
                EffectInstance::Replace {
                    source,
                    fitted: Mutex::new(None),
                }
            }
            EffectSettings::Brightness { .. } => EffectInstance::Brightness,
            EffectSettings::Beautify { .. } => EffectInstance::Beautify(Mutex::new(make_locator())),
            EffectSettings::AutoFrame(_) => EffectInstance::AutoFrame(Mutex::new(make_locator())),
            EffectSettings::GazeCorrect { .. } => {
                EffectInstance::GazeCorrect(Mutex::new(make_locator()))
            }
        };
        debug!(kind = %config.kind, "Built effect instance");
        Ok(instance)
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            EffectInstance::Blur => EffectKind::Blur,
            EffectInstance::Replace { .. } => EffectKind::Replace,
            EffectInstance::Brightness => EffectKind::Brightness,
            EffectInstance::Beautify(_) => EffectKind::Beautify,
            EffectInstance::AutoFrame(_) => EffectKind::AutoFrame,
            EffectInstance::GazeCorrect(_) => EffectKind::GazeCorrect,
        }
    }

    /// Run the effect on one frame
    ///
    /// Mask-dependent effects pass the frame through unchanged when no mask
    /// is supplied.
    pub fn apply(
        &self,
        settings: &EffectSettings,
        frame: Frame,
        mask: Option<&Mask>,
    ) -> Result<Frame, EffectError> {
        match (self, settings) {
            (EffectInstance::Blur, EffectSettings::Blur { strength }) => match mask {
                Some(mask) => kernels::background_blur(&frame, mask, *strength),
                None => Ok(frame),
            },
            (EffectInstance::Replace { source, fitted }, EffectSettings::Replace { background }) => {
                let Some(mask) = mask else {
                    return Ok(frame);
                };
                let bg = Self::resolve_background(source, fitted, background, &frame)?;
                kernels::background_replace(&frame, mask, &bg)
            }
            (
                EffectInstance::Brightness,
                EffectSettings::Brightness {
                    brightness,
                    contrast,
                    ..
                },
            ) => kernels::brightness_contrast(&frame, mask, *brightness, *contrast),
            (EffectInstance::Beautify(locator), EffectSettings::Beautify { smoothness }) => {
                match locator.lock().locate(&frame, true) {
                    Some(bbox) => kernels::beautify(&frame, bbox, *smoothness),
                    None => Ok(frame),
                }
            }
            (EffectInstance::AutoFrame(locator), EffectSettings::AutoFrame(s)) => {
                let bbox = locator.lock().locate(&frame, true);
                kernels::auto_frame(&frame, bbox, s)
            }
            (EffectInstance::GazeCorrect(locator), EffectSettings::GazeCorrect { strength }) => {
                match locator.lock().locate(&frame, true) {
                    Some(bbox) => Ok(kernels::gaze_correct(&frame, bbox, *strength)),
                    None => Ok(frame),
                }
            }
            (instance, settings) => Err(EffectError::InvalidParameter {
                kind: instance.kind().to_string(),
                name: "kind".into(),
                reason: format!("settings for {} given", settings.kind()),
            }),
        }
    }

    fn resolve_background(
        source: &Option<(String, Arc<Frame>)>,
        fitted: &Mutex<Option<Arc<Frame>>>,
        background: &Background,
        frame: &Frame,
    ) -> Result<Arc<Frame>, EffectError> {
        let original = match (background, source) {
            (Background::Path(path), Some((loaded_path, img))) if path == loaded_path => {
                Arc::clone(img)
            }
            // overridden per frame; not cached
            (Background::Path(path), _) => {
                let img = load_background(path)?;
                return Ok(Arc::new(kernels::fit_background(
                    &img,
                    frame.width,
                    frame.height,
                )?));
            }
            (Background::Image(img), _) => Arc::clone(img),
        };

        let mut cache = fitted.lock();
        if let Some(bg) = cache.as_ref()
            && bg.width == frame.width
            && bg.height == frame.height
            && matches!(background, Background::Path(_))
        {
            return Ok(Arc::clone(bg));
        }
        let bg = Arc::new(kernels::fit_background(
            &original,
            frame.width,
            frame.height,
        )?);
        *cache = Some(Arc::clone(&bg));
        Ok(bg)
    }
}

fn load_background(path: &str) -> Result<Frame, EffectError> {
    let img = image::open(path).map_err(|e| EffectError::BackgroundLoad {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    let rgb = img.to_rgb8();
    info!(path, width = rgb.width(), height = rgb.height(), "Loaded background image");
    Ok(Frame::from_image(rgb))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{BoundingBox, EffectParams};

    /// Always reports the same face, or none
    struct FixedFace(Option<BoundingBox>);

    impl FaceLocator for FixedFace {
        fn locate(&mut self, _frame: &Frame, _smooth: bool) -> Option<BoundingBox> {
            self.0
        }
    }

    fn striped(width: u32, height: u32) -> Frame {
        let data = (0..height)
            .flat_map(|y| std::iter::repeat_n((y * 5) as u8, width as usize * 3))
            .collect();
        Frame::from_rgb(width, height, data).unwrap()
    }

    #[test]
    fn test_missing_background_file_fails_at_build() {
        let config = EffectConfig::new(
            EffectKind::Replace,
            EffectParams::new().with("background", "/nonexistent/camfx-bg.png"),
        );
        assert!(matches!(
            EffectInstance::build(&config),
            Err(EffectError::BackgroundLoad { .. })
        ));
    }

    #[test]
    fn test_in_memory_background() {
        let bg = Arc::new(Frame::from_rgb(2, 2, vec![50; 12]).unwrap());
        let mut params = EffectParams::new();
        params.insert("background", crate::effects::ParamValue::Image(Arc::clone(&bg)));
        let config = EffectConfig::new(EffectKind::Replace, params);
        let instance = EffectInstance::build(&config).unwrap();
        let settings = EffectSettings::parse(EffectKind::Replace, &config.params).unwrap();

        let frame = Frame::black(4, 4);
        let out = instance
            .apply(&settings, frame, Some(&Mask::filled(4, 4, 0.0)))
            .unwrap();
        assert!(out.data.iter().all(|&b| b == 50));
    }

    #[test]
    fn test_blur_without_mask_passes_through() {
        let config = EffectConfig::new(EffectKind::Blur, EffectParams::new());
        let instance = EffectInstance::build(&config).unwrap();
        let settings = EffectSettings::parse(EffectKind::Blur, &config.params).unwrap();
        let frame = Frame::from_rgb(2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(instance.apply(&settings, frame.clone(), None).unwrap(), frame);
    }

    #[test]
    fn test_face_kinds_use_supplied_locator() {
        let face = BoundingBox {
            x: 0,
            y: 0,
            w: 40,
            h: 40,
        };
        let frame = striped(40, 40);
        let config = EffectConfig::new(
            EffectKind::GazeCorrect,
            EffectParams::new().with("strength", 1.0),
        );
        let settings = EffectSettings::parse(EffectKind::GazeCorrect, &config.params).unwrap();

        let found = EffectInstance::build_with(&config, || Box::new(FixedFace(Some(face)))).unwrap();
        assert_ne!(found.apply(&settings, frame.clone(), None).unwrap(), frame);

        let missing = EffectInstance::build_with(&config, || Box::new(FixedFace(None))).unwrap();
        assert_eq!(missing.apply(&settings, frame.clone(), None).unwrap(), frame);
    }
}
