// SPDX-License-Identifier: GPL-3.0-only

//! Physical camera capture through GStreamer
//!
//! `v4l2src → decodebin → videoconvert → videoscale → videorate → RGB caps → appsink`.
//! Frames are pulled synchronously by the processing loop.

use super::types::{CameraConfig, Frame, PixelFormat};
use super::{CameraOpener, FrameSource};
use crate::backends::gst::{self, StartFailure};
use crate::constants::{pipeline, timing};
use crate::errors::{CameraError, CameraResult};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use std::path::Path;
use tracing::{debug, info, warn};

/// Build the capture pipeline description for `config`
pub fn pipeline_description(device_path: &str, config: &CameraConfig) -> String {
    format!(
        "v4l2src device={device} ! decodebin ! videoconvert ! videoscale ! videorate ! \
         video/x-raw,format={format},width={w},height={h},framerate={fps}/1 ! \
         appsink name=sink sync=false max-buffers={buffers} drop=true",
        device = device_path,
        format = PixelFormat::default().gst_name(),
        w = config.width,
        h = config.height,
        fps = config.fps,
        buffers = pipeline::MAX_BUFFERS,
    )
}

/// An open V4L2 camera
pub struct V4l2Camera {
    device_path: String,
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
}

impl V4l2Camera {
    pub fn open(config: &CameraConfig) -> CameraResult<Self> {
        let device_path = config.source.device_path();
        info!(device = %device_path, width = config.width, height = config.height, fps = config.fps, "Opening camera");

        if !Path::new(&device_path).exists() {
            return Err(CameraError::NotFound(device_path));
        }

        gstreamer::init().map_err(|e| CameraError::Open(format!("GStreamer init failed: {}", e)))?;

        let description = pipeline_description(&device_path, config);
        debug!(pipeline = %description, "Launching capture pipeline");
        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| CameraError::Open(e.to_string()))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| CameraError::Open("capture description is not a pipeline".into()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Open("Failed to get appsink".into()))?
            .dynamic_cast::<AppSink>()
            .map_err(|_| CameraError::Open("Failed to cast appsink".into()))?;

        let bus = pipeline.bus();
        if let Err(failure) = gst::start_pipeline(
            &pipeline,
            bus.as_ref(),
            timing::CAMERA_START_TIMEOUT,
            timing::STATE_POLL_INTERVAL,
        ) {
            shut_down(&pipeline, &device_path);
            return Err(match failure {
                StartFailure::Error { busy: true, .. } => CameraError::Busy(device_path),
                StartFailure::Error {
                    not_found: true, ..
                } => CameraError::NotFound(device_path),
                StartFailure::Error { message, .. } => CameraError::Open(message),
                StartFailure::Timeout { state } => CameraError::Open(format!(
                    "camera did not start (state: {:?})",
                    state
                )),
            });
        }

        info!(device = %device_path, "Camera opened");
        Ok(Self {
            device_path,
            pipeline,
            appsink,
        })
    }
}

impl FrameSource for V4l2Camera {
    fn read(&mut self) -> CameraResult<Frame> {
        let timeout = gstreamer::ClockTime::from_mseconds(
            timing::CAMERA_READ_TIMEOUT.as_millis() as u64,
        );
        let sample = self.appsink.try_pull_sample(timeout).ok_or_else(|| {
            if self.appsink.is_eos() {
                CameraError::Read("end of stream".into())
            } else {
                CameraError::Read("no frame within timeout".into())
            }
        })?;
        gst::frame_from_sample(&sample)
            .map(Frame::into_rgb)
            .ok_or_else(|| CameraError::Read("unreadable sample".into()))
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        debug!(device = %self.device_path, "Releasing camera");
        shut_down(&self.pipeline, &self.device_path);
    }
}

/// Drive `pipeline` to Null; `false` (and a warning) if the change was refused
fn shut_down(pipeline: &gstreamer::Pipeline, device_path: &str) -> bool {
    match pipeline.set_state(gstreamer::State::Null) {
        Ok(_) => true,
        Err(e) => {
            warn!(device = %device_path, ?e, "Failed to set capture pipeline to Null");
            false
        }
    }
}

/// Opens cameras with [`V4l2Camera`]
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2Opener;

impl CameraOpener for V4l2Opener {
    fn open(&self, config: &CameraConfig) -> CameraResult<Box<dyn FrameSource>> {
        Ok(Box::new(V4l2Camera::open(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::CameraSource;

    #[test]
    fn test_pipeline_description() {
        let config = CameraConfig {
            source: CameraSource::new("1"),
            width: 640,
            height: 480,
            fps: 15,
        };
        let desc = pipeline_description(&config.source.device_path(), &config);
        assert!(desc.starts_with("v4l2src device=/dev/video1 "));
        assert!(desc.contains("format=RGB,width=640,height=480,framerate=15/1"));
        assert!(desc.ends_with("drop=true"));
    }

    #[test]
    fn test_missing_device_is_not_found() {
        let config = CameraConfig {
            source: CameraSource::new("/dev/camfx-missing-video"),
            ..CameraConfig::default()
        };
        assert_eq!(
            V4l2Camera::open(&config).err(),
            Some(CameraError::NotFound("/dev/camfx-missing-video".into()))
        );
    }

    #[test]
    fn test_shut_down_reaches_null() {
        if gstreamer::init().is_err() {
            return;
        }
        let Ok(element) = gstreamer::parse::launch("fakesrc ! fakesink") else {
            return;
        };
        let pipeline = element.downcast::<gstreamer::Pipeline>().unwrap();
        pipeline.set_state(gstreamer::State::Paused).ok();
        assert!(shut_down(&pipeline, "/dev/video0"));
        assert_eq!(pipeline.current_state(), gstreamer::State::Null);
    }
}
