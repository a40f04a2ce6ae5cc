// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer helpers shared by the capture and virtual camera pipelines

use crate::backends::camera::types::{Frame, PixelFormat};
use gstreamer::prelude::*;
use gstreamer_video::VideoInfo;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Why a pipeline did not reach PLAYING
#[derive(Debug, Clone, PartialEq)]
pub enum StartFailure {
    /// An error was posted on the bus or the state change failed
    Error {
        message: String,
        /// The element reported the device as busy
        busy: bool,
        /// The element reported the resource as missing
        not_found: bool,
        state: gstreamer::State,
    },
    /// Timed out while still in `state`
    Timeout { state: gstreamer::State },
}

/// Pop the first error on `bus`, logging warnings on the way
pub fn take_bus_error(bus: &gstreamer::Bus) -> Option<(String, bool, bool)> {
    while let Some(msg) = bus.pop_filtered(&[
        gstreamer::MessageType::Error,
        gstreamer::MessageType::Warning,
    ]) {
        match msg.view() {
            gstreamer::MessageView::Error(err) => {
                let error = err.error();
                let busy = error.matches(gstreamer::ResourceError::Busy);
                let not_found = error.matches(gstreamer::ResourceError::NotFound);
                let message = match err.debug() {
                    Some(debug) => format!("{} ({})", error, debug),
                    None => error.to_string(),
                };
                return Some((message, busy, not_found));
            }
            gstreamer::MessageView::Warning(w) => {
                warn!(warning = %w.error(), "Pipeline warning");
            }
            _ => {}
        }
    }
    None
}

/// Set `pipeline` to PLAYING and poll until it gets there
///
/// Checks the bus on every tick. Never waits longer than `timeout`.
pub fn start_pipeline(
    pipeline: &gstreamer::Pipeline,
    bus: Option<&gstreamer::Bus>,
    timeout: Duration,
    poll: Duration,
) -> Result<(), StartFailure> {
    let bus_error = |state| {
        bus.and_then(take_bus_error)
            .map(|(message, busy, not_found)| StartFailure::Error {
                message,
                busy,
                not_found,
                state,
            })
    };

    match pipeline.set_state(gstreamer::State::Playing) {
        Ok(gstreamer::StateChangeSuccess::Async) => {}
        Ok(_) => return Ok(()),
        Err(_) => {
            return Err(
                bus_error(gstreamer::State::Null).unwrap_or(StartFailure::Error {
                    message: "failed to set pipeline to PLAYING".into(),
                    busy: false,
                    not_found: false,
                    state: gstreamer::State::Null,
                }),
            );
        }
    }

    let deadline = Instant::now() + timeout;
    let mut current = gstreamer::State::Null;
    while Instant::now() < deadline {
        if let Some(failure) = bus_error(current) {
            return Err(failure);
        }
        let (result, state, pending) =
            pipeline.state(gstreamer::ClockTime::from_mseconds(poll.as_millis() as u64));
        current = state;
        if result.is_err() {
            return Err(bus_error(current).unwrap_or(StartFailure::Error {
                message: "pipeline failed to change state".into(),
                busy: false,
                not_found: false,
                state: current,
            }));
        }
        if state == gstreamer::State::Playing {
            return Ok(());
        }
        debug!(?state, ?pending, "Waiting for pipeline to reach PLAYING");
    }

    Err(StartFailure::Timeout { state: current })
}

/// Copy a packed 3-byte-per-pixel sample into a [`Frame`], dropping row padding
pub fn frame_from_sample(sample: &gstreamer::Sample) -> Option<Frame> {
    let buffer = sample.buffer()?;
    let caps = sample.caps()?;
    let info = VideoInfo::from_caps(caps).ok()?;

    let format = match info.format() {
        gstreamer_video::VideoFormat::Rgb => PixelFormat::Rgb24,
        gstreamer_video::VideoFormat::Bgr => PixelFormat::Bgr24,
        other => {
            warn!(?other, "Unexpected sample format");
            return None;
        }
    };

    let width = info.width();
    let height = info.height();
    if width == 0 || height == 0 {
        return None;
    }
    let stride = info.stride()[0] as usize;
    let row = width as usize * 3;
    let map = buffer.map_readable().ok()?;
    let src = map.as_slice();
    if stride < row || src.len() < stride * (height as usize - 1) + row {
        return None;
    }

    let mut data = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        data.extend_from_slice(&src[y * stride..y * stride + row]);
    }

    Some(Frame {
        width,
        height,
        format,
        data,
    })
}
