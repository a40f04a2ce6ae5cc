// SPDX-License-Identifier: GPL-3.0-only

//! Pixel kernels for each effect kind
//!
//! All kernels take and return packed RGB frames of identical size.

use super::settings::AutoFrameSettings;
use super::{BoundingBox, Mask};
use crate::backends::camera::types::Frame;
use crate::errors::EffectError;
use image::imageops::{self, FilterType};

fn to_image(frame: &Frame) -> Result<image::RgbImage, EffectError> {
    frame.to_image().ok_or_else(|| {
        EffectError::InvalidFrame(format!(
            "{} bytes for {}x{}",
            frame.data.len(),
            frame.width,
            frame.height
        ))
    })
}

/// Gaussian sigma for an odd kernel size (same relation OpenCV uses)
pub fn sigma_for_kernel(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// `out = fg * m + bg * (1 - m)` per pixel
pub fn blend(fg: &Frame, bg: &Frame, mask: &Mask) -> Frame {
    let mut out = fg.clone();
    for (i, (px, bpx)) in out
        .data
        .chunks_exact_mut(3)
        .zip(bg.data.chunks_exact(3))
        .enumerate()
    {
        let m = mask.data.get(i).copied().unwrap_or(0.0);
        for c in 0..3 {
            let v = px[c] as f32 * m + bpx[c] as f32 * (1.0 - m);
            px[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Blur the background, keeping the masked subject sharp
pub fn background_blur(frame: &Frame, mask: &Mask, strength: u32) -> Result<Frame, EffectError> {
    mask.check_matches(frame)?;
    let blurred = imageops::blur(&to_image(frame)?, sigma_for_kernel(strength));
    Ok(blend(frame, &Frame::from_image(blurred), mask))
}

/// Resize `background` to the frame size
pub fn fit_background(background: &Frame, width: u32, height: u32) -> Result<Frame, EffectError> {
    if background.width == width && background.height == height {
        return Ok(background.clone());
    }
    let img = to_image(background)?;
    Ok(Frame::from_image(imageops::resize(
        &img,
        width,
        height,
        FilterType::Triangle,
    )))
}

/// Composite the masked subject over a background of the frame's size
pub fn background_replace(
    frame: &Frame,
    mask: &Mask,
    background: &Frame,
) -> Result<Frame, EffectError> {
    mask.check_matches(frame)?;
    if background.width != frame.width || background.height != frame.height {
        return Err(EffectError::InvalidFrame(
            "background does not match frame size".into(),
        ));
    }
    Ok(blend(frame, background, mask))
}

/// `out = clamp(pixel * contrast + brightness)`, blended by mask when one is given
pub fn brightness_contrast(
    frame: &Frame,
    mask: Option<&Mask>,
    brightness: i32,
    contrast: f64,
) -> Result<Frame, EffectError> {
    if let Some(mask) = mask {
        mask.check_matches(frame)?;
    }
    let mut out = frame.clone();
    for (i, px) in out.data.chunks_exact_mut(3).enumerate() {
        let m = mask.map_or(1.0, |m| m.data.get(i).copied().unwrap_or(0.0) as f64);
        for c in px.iter_mut() {
            let orig = *c as f64;
            let adjusted = (orig * contrast + brightness as f64).clamp(0.0, 255.0);
            *c = (orig + (adjusted - orig) * m).round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

/// Smooth the skin inside the face box with an elliptical, feathered weight
pub fn beautify(frame: &Frame, bbox: BoundingBox, smoothness: u32) -> Result<Frame, EffectError> {
    let bbox = bbox.clamped(frame.width, frame.height);
    if bbox.w < 2 || bbox.h < 2 {
        return Ok(frame.clone());
    }
    let img = to_image(frame)?;
    let region = imageops::crop_imm(&img, bbox.x, bbox.y, bbox.w, bbox.h).to_image();
    let smoothed = imageops::blur(&region, smoothness as f32 / 2.0);

    let mut out = frame.clone();
    let (cx, cy) = (bbox.w as f32 / 2.0, bbox.h as f32 / 2.0);
    for ry in 0..bbox.h {
        for rx in 0..bbox.w {
            let dx = (rx as f32 - cx) / cx;
            let dy = (ry as f32 - cy) / cy;
            let weight = (1.0 - (dx * dx + dy * dy).sqrt()).clamp(0.0, 1.0) * 0.8;
            if weight == 0.0 {
                continue;
            }
            let idx = (((bbox.y + ry) * frame.width + bbox.x + rx) * 3) as usize;
            let s = smoothed.get_pixel(rx, ry).0;
            for c in 0..3 {
                let o = out.data[idx + c] as f32;
                out.data[idx + c] = (o + (s[c] as f32 - o) * weight).round() as u8;
            }
        }
    }
    Ok(out)
}

/// Crop around the face with padding and scale back to the frame size
///
/// Without a face the frame is zoomed to `min_zoom` around its centre.
pub fn auto_frame(
    frame: &Frame,
    bbox: Option<BoundingBox>,
    settings: &AutoFrameSettings,
) -> Result<Frame, EffectError> {
    let (fw, fh) = (frame.width as f64, frame.height as f64);
    let (center, zoom) = match bbox {
        Some(b) => {
            let (cx, cy) = b.center();
            let padded_w = b.w as f64 * (1.0 + 2.0 * settings.padding);
            let padded_h = b.h as f64 * (1.0 + 2.0 * settings.padding);
            let zoom = (fw / padded_w.max(1.0)).min(fh / padded_h.max(1.0));
            ((cx as f64, cy as f64), zoom)
        }
        None => ((fw / 2.0, fh / 2.0), settings.min_zoom),
    };
    let zoom = zoom.clamp(settings.min_zoom, settings.max_zoom);
    if (zoom - 1.0).abs() < f64::EPSILON {
        return Ok(frame.clone());
    }

    let crop_w = (fw / zoom).round().max(1.0);
    let crop_h = (fh / zoom).round().max(1.0);
    let x = (center.0 - crop_w / 2.0).clamp(0.0, fw - crop_w) as u32;
    let y = (center.1 - crop_h / 2.0).clamp(0.0, fh - crop_h) as u32;

    let img = to_image(frame)?;
    let crop = imageops::crop_imm(&img, x, y, crop_w as u32, crop_h as u32).to_image();
    Ok(Frame::from_image(imageops::resize(
        &crop,
        frame.width,
        frame.height,
        FilterType::Triangle,
    )))
}

/// Shift the eye band of the face box upward by up to `h / 20` pixels
pub fn gaze_correct(frame: &Frame, bbox: BoundingBox, strength: f64) -> Frame {
    let bbox = bbox.clamped(frame.width, frame.height);
    let shift = (strength * bbox.h as f64 / 20.0).round() as u32;
    let mut out = frame.clone();
    if shift == 0 {
        return out;
    }

    let band_top = bbox.y + bbox.h / 5;
    let band_bottom = (bbox.y + bbox.h / 2).min(frame.height);
    let row_bytes = frame.width as usize * 3;
    for y in band_top..band_bottom {
        let src_y = (y + shift).min(frame.height - 1);
        let dst = y as usize * row_bytes + bbox.x as usize * 3;
        let src = src_y as usize * row_bytes + bbox.x as usize * 3;
        let len = bbox.w as usize * 3;
        out.data[dst..dst + len].copy_from_slice(&frame.data[src..src + len]);
    }
    out
}
