// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera output via PipeWire
//!
//! Builds a pipeline that:
//! 1. Receives packed RGB frames from the processing loop (via appsrc)
//! 2. Converts format as needed (via videoconvert)
//! 3. Publishes them as a named PipeWire video source (via pipewiresink)

use super::{FrameSink, OutputConfig, OutputFactory};
use crate::backends::gst::{self, StartFailure};
use crate::backends::camera::types::{Frame, PixelFormat};
use crate::constants::{pipeline, timing};
use crate::errors::{OutputError, OutputResult};
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);

const WIREPLUMBER_HINT: &str =
    "Make sure the PipeWire session manager is running: systemctl --user start wireplumber";

/// Remediation text for a start that stalled in `state`
fn start_guidance(state: gstreamer::State) -> String {
    match state {
        gstreamer::State::Playing | gstreamer::State::Paused => format!(
            "pipewiresink could not connect to PipeWire. {}",
            WIREPLUMBER_HINT
        ),
        _ => format!(
            "The pipeline never prerolled; check that PipeWire is running (systemctl --user status pipewire). {}",
            WIREPLUMBER_HINT
        ),
    }
}

/// Pipeline resources for one open-to-closed cycle
struct OutputPipeline {
    pipeline: gstreamer::Pipeline,
    appsrc: AppSrc,
    bus: Option<gstreamer::Bus>,
}

impl OutputPipeline {
    fn build(config: &OutputConfig) -> OutputResult<Self> {
        gstreamer::init().map_err(|e| OutputError::Init(format!("GStreamer init failed: {}", e)))?;

        let pipeline = gstreamer::Pipeline::new();

        let make = |factory: &str, name: &str| {
            gstreamer::ElementFactory::make(factory)
                .name(name)
                .build()
                .map_err(|e| OutputError::Init(format!("Failed to create {}: {}", factory, e)))
        };

        let appsrc = make("appsrc", "camfx_src")?;
        let videoconvert = make("videoconvert", "camfx_convert")?;
        let pipewiresink = make("pipewiresink", "camfx_sink")?;

        let appsrc = appsrc
            .downcast::<AppSrc>()
            .map_err(|_| OutputError::Init("Failed to downcast to AppSrc".into()))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", PixelFormat::default().gst_name())
            .field("width", config.width as i32)
            .field("height", config.height as i32)
            .field("framerate", gstreamer::Fraction::new(config.fps as i32, 1))
            .build();

        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gstreamer::Format::Time);
        appsrc.set_is_live(true);
        appsrc.set_do_timestamp(true);

        // "provide" mode publishes a source node other applications can open
        pipewiresink.set_property_from_str("mode", "provide");
        let stream_props = gstreamer::Structure::builder("props")
            .field("media.class", pipeline::MEDIA_CLASS)
            .field("media.role", pipeline::MEDIA_ROLE)
            .field("media.name", config.name.as_str())
            .field("node.name", config.name.as_str())
            .field("node.description", config.name.as_str())
            .build();
        pipewiresink.set_property("stream-properties", &stream_props);

        pipeline
            .add_many([appsrc.upcast_ref(), &videoconvert, &pipewiresink])
            .map_err(|e| OutputError::Init(format!("Failed to add elements: {}", e)))?;
        gstreamer::Element::link_many([appsrc.upcast_ref(), &videoconvert, &pipewiresink])
            .map_err(|e| OutputError::Init(format!("Failed to link elements: {}", e)))?;

        let bus = pipeline.bus();
        Ok(Self {
            pipeline,
            appsrc,
            bus,
        })
    }

    fn start(&self) -> OutputResult<()> {
        gst::start_pipeline(
            &self.pipeline,
            self.bus.as_ref(),
            timing::OUTPUT_START_TIMEOUT,
            timing::STATE_POLL_INTERVAL,
        )
        .map_err(|failure| match failure {
            StartFailure::Error { message, state, .. } => OutputError::StateChange {
                message,
                guidance: start_guidance(state),
            },
            StartFailure::Timeout { state } => OutputError::StartTimeout {
                state: format!("{:?}", state),
                guidance: start_guidance(state),
            },
        })
    }

    fn teardown(mut self) {
        if let Err(e) = self.appsrc.end_of_stream() {
            debug!(?e, "EOS not accepted during teardown");
        }
        if let Some(bus) = self.bus.take() {
            bus.set_flushing(true);
        }
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            error!(?e, "Failed to set virtual camera pipeline to Null");
        }
    }
}

/// Publishes frames as a PipeWire virtual camera
pub struct OutputAdapter {
    config: OutputConfig,
    handle: Option<OutputPipeline>,
    last_tick: Option<Instant>,
}

impl OutputAdapter {
    /// Build and start the output pipeline
    ///
    /// Failures are surfaced immediately; a misconfigured publish target is
    /// not retried.
    pub fn new(config: OutputConfig) -> OutputResult<Self> {
        info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            name = %config.name,
            "Creating virtual camera output"
        );
        check_session_manager();

        let mut adapter = Self {
            handle: Some(OutputPipeline::build(&config)?),
            config,
            last_tick: None,
        };
        if let Err(e) = adapter.handle.as_ref().map_or(Ok(()), OutputPipeline::start) {
            error!(error = %e, "Virtual camera output failed to start");
            adapter.cleanup();
            return Err(e);
        }

        info!(name = %adapter.config.name, "Virtual camera output started");
        Ok(adapter)
    }

    /// Adapter without a pipeline, as left after cleanup
    #[cfg(test)]
    pub(crate) fn detached(config: OutputConfig) -> Self {
        Self {
            config,
            handle: None,
            last_tick: None,
        }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.fps.max(1) as f64)
    }

    /// Push one packed RGB frame
    pub fn send(&mut self, data: &[u8]) -> OutputResult<()> {
        let expected = Frame::expected_len(self.config.width, self.config.height);
        if data.len() != expected {
            return Err(OutputError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        let handle = self.handle.as_ref().ok_or(OutputError::Closed)?;

        let mut buffer = gstreamer::Buffer::with_size(expected)
            .map_err(|e| OutputError::Push(format!("Failed to create buffer: {}", e)))?;
        {
            let buffer_ref = buffer
                .get_mut()
                .ok_or_else(|| OutputError::Push("Failed to get mutable buffer".into()))?;
            buffer_ref.set_duration(gstreamer::ClockTime::from_nseconds(
                self.frame_duration().as_nanos() as u64,
            ));
            let mut map = buffer_ref
                .map_writable()
                .map_err(|e| OutputError::Push(format!("Failed to map buffer: {}", e)))?;
            map.copy_from_slice(data);
        }

        match handle.appsrc.push_buffer(buffer) {
            Ok(_) => {
                let count = FRAME_COUNTER.fetch_add(1, Ordering::Relaxed);
                if count % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(frame = count, "Virtual camera frames pushed");
                }
                Ok(())
            }
            Err(gstreamer::FlowError::Flushing) => Err(OutputError::Flushing),
            Err(gstreamer::FlowError::Eos) => Err(OutputError::Eos),
            Err(e) => Err(OutputError::Push(format!("{:?}", e))),
        }
    }

    /// What remains of `1/fps` since the previous call
    ///
    /// The next period is counted from the moment that wait ends, so a
    /// caller may sleep it off after releasing any locks.
    pub fn next_frame_delay(&mut self) -> Duration {
        let now = Instant::now();
        let delay = match self.last_tick {
            Some(last) => self.frame_duration().saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        };
        self.last_tick = Some(now + delay);
        delay
    }

    /// Stop the pipeline and release it; safe to call repeatedly
    pub fn cleanup(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(name = %self.config.name, "Tearing down virtual camera output");
            handle.teardown();
            info!(name = %self.config.name, "Virtual camera output stopped");
        }
        self.last_tick = None;
    }
}

impl FrameSink for OutputAdapter {
    fn send(&mut self, data: &[u8]) -> OutputResult<()> {
        OutputAdapter::send(self, data)
    }

    fn next_frame_delay(&mut self) -> Duration {
        OutputAdapter::next_frame_delay(self)
    }

    fn config(&self) -> &OutputConfig {
        &self.config
    }

    fn cleanup(&mut self) {
        OutputAdapter::cleanup(self)
    }
}

impl Drop for OutputAdapter {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Creates [`OutputAdapter`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct PipeWireOutputFactory;

impl OutputFactory for PipeWireOutputFactory {
    fn create(&self, config: &OutputConfig) -> OutputResult<Box<dyn FrameSink>> {
        Ok(Box::new(OutputAdapter::new(config.clone())?))
    }
}

/// Warn when PipeWire or its session manager looks unavailable
///
/// Only logs; the pipeline start reports the actual failure.
pub fn check_session_manager() {
    if gstreamer::init().is_ok() && gstreamer::ElementFactory::find("pipewiresink").is_none() {
        warn!("pipewiresink element not found; install the GStreamer PipeWire plugin");
    }

    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));
    let socket = std::path::Path::new(&runtime_dir).join("pipewire-0");
    if !socket.exists() {
        warn!(socket = %socket.display(), "PipeWire socket not found; is PipeWire running?");
    }

    if !wireplumber_running() {
        warn!("WirePlumber does not appear to be running. {}", WIREPLUMBER_HINT);
    }
}

fn wireplumber_running() -> bool {
    let systemd = std::process::Command::new("systemctl")
        .args(["--user", "is-active", "wireplumber"])
        .output();
    if let Ok(output) = systemd
        && String::from_utf8_lossy(&output.stdout).trim() == "active"
    {
        return true;
    }
    std::process::Command::new("pgrep")
        .args(["-x", "wireplumber"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OutputConfig {
        OutputConfig {
            width: 4,
            height: 2,
            fps: 50,
            name: "camfx-test".into(),
        }
    }

    #[test]
    fn test_send_rejects_wrong_size() {
        let mut adapter = OutputAdapter::detached(config());
        assert_eq!(
            adapter.send(&[0; 23]),
            Err(OutputError::SizeMismatch {
                expected: 24,
                actual: 23
            })
        );
    }

    #[test]
    fn test_send_after_cleanup_reports_closed() {
        let mut adapter = OutputAdapter::detached(config());
        assert_eq!(adapter.send(&[0; 24]), Err(OutputError::Closed));
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut adapter = OutputAdapter::detached(config());
        adapter.cleanup();
        assert!(adapter.is_closed());
        adapter.cleanup();
        assert!(adapter.is_closed());
    }

    #[test]
    fn test_frame_delay_counts_from_end_of_wait() {
        let mut adapter = OutputAdapter::detached(config());
        assert_eq!(adapter.next_frame_delay(), Duration::ZERO);
        let first = adapter.next_frame_delay();
        assert!(first > Duration::from_millis(15));
        // Without sleeping, the following period has not started yet
        let second = adapter.next_frame_delay();
        assert!(second >= first);
        assert!(second > Duration::from_millis(15));
    }

    #[test]
    fn test_guidance_mentions_session_manager() {
        assert!(start_guidance(gstreamer::State::Paused).contains("wireplumber"));
    }
}
