// SPDX-License-Identifier: GPL-3.0-only

//! Mask and face-box producers
//!
//! The processing loop only sees the [`Segmenter`] and [`FaceLocator`]
//! traits. The implementations here are lightweight heuristics; a
//! model-backed producer can be swapped in behind the same traits.

use super::{BoundingBox, Mask};
use crate::backends::camera::types::Frame;
use crate::constants::effects::{FACE_SMOOTHING, MASK_FEATHER};
use tracing::debug;

/// Produces a person-segmentation mask for a frame
pub trait Segmenter: Send {
    /// Mask with the frame's dimensions and values in [0, 1]
    fn mask(&mut self, frame: &Frame) -> Mask;
}

/// Locates the primary face in a frame
pub trait FaceLocator: Send {
    /// Face bounding box, optionally smoothed against previous calls
    fn locate(&mut self, frame: &Frame, smooth: bool) -> Option<BoundingBox>;
}

/// Elliptical, centre-weighted subject mask with a feathered edge
///
/// Approximates a person sitting in front of a webcam. The mask is cached
/// per frame size.
#[derive(Debug, Default)]
pub struct CenterWeightedSegmenter {
    cached: Option<Mask>,
}

impl CenterWeightedSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn build(width: u32, height: u32) -> Mask {
        let cx = width as f32 / 2.0;
        let cy = height as f32 * 0.6;
        let rx = (width as f32 * 0.32).max(1.0);
        let ry = (height as f32 * 0.55).max(1.0);

        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let dx = (x as f32 + 0.5 - cx) / rx;
                let dy = (y as f32 + 0.5 - cy) / ry;
                let dist = (dx * dx + dy * dy).sqrt();
                // 1 inside, 0 outside, linear ramp across the feather band
                let v = ((1.0 + MASK_FEATHER - dist) / (2.0 * MASK_FEATHER)).clamp(0.0, 1.0);
                data.push(v);
            }
        }
        Mask {
            width,
            height,
            data,
        }
    }
}

impl Segmenter for CenterWeightedSegmenter {
    fn mask(&mut self, frame: &Frame) -> Mask {
        match &self.cached {
            Some(mask) if mask.width == frame.width && mask.height == frame.height => mask.clone(),
            _ => {
                debug!(
                    width = frame.width,
                    height = frame.height,
                    "Building segmentation mask"
                );
                let mask = Self::build(frame.width, frame.height);
                self.cached = Some(mask.clone());
                mask
            }
        }
    }
}

/// Finds the largest skin-toned region using YCbCr thresholds
#[derive(Debug, Default)]
pub struct SkinToneFaceLocator {
    previous: Option<(f32, f32, f32, f32)>,
}

const SAMPLE_STEP: u32 = 4;
/// Minimum share of sampled pixels that must be skin-toned
const MIN_SKIN_FRACTION: f32 = 0.01;

impl SkinToneFaceLocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_skin([r, g, b]: [u8; 3]) -> bool {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
        let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        (77.0..=127.0).contains(&cb) && (133.0..=173.0).contains(&cr)
    }

    fn detect(frame: &Frame) -> Option<(f32, f32, f32, f32)> {
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);
        let mut hits = 0u32;
        let mut samples = 0u32;

        // Faces sit in the upper part of the frame
        let max_row = (frame.height * 3 / 4).max(1);
        for y in (0..max_row).step_by(SAMPLE_STEP as usize) {
            for x in (0..frame.width).step_by(SAMPLE_STEP as usize) {
                samples += 1;
                if Self::is_skin(frame.pixel(x, y)) {
                    hits += 1;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }

        if samples == 0 || (hits as f32) < samples as f32 * MIN_SKIN_FRACTION {
            return None;
        }
        Some((
            min_x as f32,
            min_y as f32,
            (max_x - min_x + SAMPLE_STEP) as f32,
            (max_y - min_y + SAMPLE_STEP) as f32,
        ))
    }
}

impl FaceLocator for SkinToneFaceLocator {
    fn locate(&mut self, frame: &Frame, smooth: bool) -> Option<BoundingBox> {
        let detected = Self::detect(frame)?;
        let current = match (smooth, self.previous) {
            (true, Some(prev)) => {
                let a = FACE_SMOOTHING;
                (
                    prev.0 + a * (detected.0 - prev.0),
                    prev.1 + a * (detected.1 - prev.1),
                    prev.2 + a * (detected.2 - prev.2),
                    prev.3 + a * (detected.3 - prev.3),
                )
            }
            _ => detected,
        };
        self.previous = Some(current);

        let bbox = BoundingBox {
            x: current.0.max(0.0) as u32,
            y: current.1.max(0.0) as u32,
            w: current.2.max(1.0) as u32,
            h: current.3.max(1.0) as u32,
        };
        Some(bbox.clamped(frame.width, frame.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_patch(width: u32, height: u32, patch: (u32, u32, u32, u32)) -> Frame {
        let mut frame = Frame::black(width, height);
        let (px, py, pw, ph) = patch;
        for y in py..py + ph {
            for x in px..px + pw {
                let idx = ((y * width + x) * 3) as usize;
                // typical skin tone
                frame.data[idx..idx + 3].copy_from_slice(&[224, 172, 140]);
            }
        }
        frame
    }

    #[test]
    fn test_mask_matches_frame_and_range() {
        let frame = Frame::black(64, 48);
        let mask = CenterWeightedSegmenter::new().mask(&frame);
        assert_eq!((mask.width, mask.height), (64, 48));
        assert!(mask.data.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(mask.at(32, 30), 1.0);
        assert_eq!(mask.at(0, 0), 0.0);
    }

    #[test]
    fn test_locator_finds_skin_patch() {
        let frame = frame_with_patch(64, 64, (16, 8, 16, 20));
        let bbox = SkinToneFaceLocator::new().locate(&frame, false).unwrap();
        assert_eq!((bbox.x, bbox.y), (16, 8));
        assert!(bbox.w >= 16 && bbox.h >= 20);
    }

    #[test]
    fn test_locator_returns_none_without_skin() {
        let frame = Frame::black(64, 64);
        assert!(SkinToneFaceLocator::new().locate(&frame, true).is_none());
    }

    #[test]
    fn test_smoothing_moves_partway() {
        let mut locator = SkinToneFaceLocator::new();
        locator.locate(&frame_with_patch(64, 64, (0, 0, 16, 16)), true);
        let bbox = locator
            .locate(&frame_with_patch(64, 64, (32, 0, 16, 16)), true)
            .unwrap();
        assert!(bbox.x > 0 && bbox.x < 32);
    }
}
