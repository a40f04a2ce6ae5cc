// SPDX-License-Identifier: GPL-3.0-only

//! Reading a published virtual camera back from PipeWire
//!
//! Pipeline: pipewiresrc → videoconvert → appsink (RGB). The appsink
//! callback runs on the streaming thread and only touches the frame queue.

use super::discovery::{NodeDirectory, NodeInfo, NodeTarget, PwDump, discover};
use super::frame_queue::FrameQueue;
use super::retry::RetryPolicy;
use crate::backends::camera::types::{Frame, PixelFormat};
use crate::backends::gst::{self, StartFailure};
use crate::constants::{pipeline, timing};
use crate::errors::{InputError, InputResult};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);

struct InputPipeline {
    pipeline: gstreamer::Pipeline,
    appsink: AppSink,
    bus: Option<gstreamer::Bus>,
}

impl InputPipeline {
    fn build(node: &NodeInfo, queue: Arc<FrameQueue>) -> InputResult<Self> {
        gstreamer::init()
            .map_err(|e| InputError::Pipeline(format!("GStreamer init failed: {}", e)))?;

        let make = |factory: &str| {
            gstreamer::ElementFactory::make(factory)
                .build()
                .map_err(|e| InputError::Pipeline(format!("Failed to create {}: {}", factory, e)))
        };
        let source = make("pipewiresrc")?;
        let convert = make("videoconvert")?;
        let appsink = make("appsink")?
            .dynamic_cast::<AppSink>()
            .map_err(|_| InputError::Pipeline("Failed to cast appsink".into()))?;

        match node.target() {
            NodeTarget::Serial(serial) => source.set_property("target-object", serial.to_string()),
            NodeTarget::NodeName(name) | NodeTarget::MediaName(name) => {
                source.set_property("target-object", name)
            }
            NodeTarget::Id(id) => source.set_property("path", id.to_string()),
        }
        source.set_property("do-timestamp", true);

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", PixelFormat::default().gst_name())
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_property("sync", false);
        appsink.set_property("max-buffers", pipeline::MAX_BUFFERS);
        appsink.set_property("drop", true);

        appsink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let frame_num = FRAME_COUNTER.fetch_add(1, Ordering::Relaxed);
                    let sample = appsink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                    match gst::frame_from_sample(&sample) {
                        Some(frame) => {
                            if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                                debug!(
                                    frame = frame_num,
                                    width = frame.width,
                                    height = frame.height,
                                    "Virtual camera frame received"
                                );
                            }
                            queue.push(frame.into_rgb());
                        }
                        None => {
                            if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                                warn!(frame = frame_num, "Dropping unreadable sample");
                            }
                        }
                    }
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        let pipeline = gstreamer::Pipeline::new();
        pipeline
            .add_many([&source, &convert, appsink.upcast_ref()])
            .map_err(|e| InputError::Pipeline(format!("Failed to add elements: {}", e)))?;
        gstreamer::Element::link_many([&source, &convert, appsink.upcast_ref()])
            .map_err(|e| InputError::Pipeline(format!("Failed to link elements: {}", e)))?;

        let bus = pipeline.bus();
        Ok(Self {
            pipeline,
            appsink,
            bus,
        })
    }

    fn start(&self) -> InputResult<()> {
        gst::start_pipeline(
            &self.pipeline,
            self.bus.as_ref(),
            timing::INPUT_START_TIMEOUT,
            timing::STATE_POLL_INTERVAL,
        )
        .map_err(|failure| match failure {
            StartFailure::Error { message, .. } => InputError::Pipeline(message),
            StartFailure::Timeout { state } => InputError::Pipeline(format!(
                "timed out waiting for PLAYING (state: {:?})",
                state
            )),
        })
    }

    fn pull(&self) -> Option<Frame> {
        let timeout = gstreamer::ClockTime::from_mseconds(
            timing::MANUAL_PULL_TIMEOUT.as_millis() as u64,
        );
        let sample = self.appsink.try_pull_sample(timeout)?;
        gst::frame_from_sample(&sample).map(Frame::into_rgb)
    }

    fn teardown(mut self) {
        if let Some(bus) = self.bus.take() {
            bus.set_flushing(true);
        }
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            error!(?e, "Failed to set input pipeline to Null");
        }
    }
}

/// Consumer side of a published virtual camera
///
/// Each preview consumer owns its own adapter; adapters are not shared.
pub struct InputAdapter {
    name: String,
    node: Option<NodeInfo>,
    queue: Arc<FrameQueue>,
    handle: Option<InputPipeline>,
}

impl InputAdapter {
    /// Find the source called `name` with `pw-dump` and attach to it
    pub fn open(name: &str, policy: RetryPolicy) -> InputResult<Self> {
        Self::open_with(&PwDump, name, policy)
    }

    /// Attach using the given node directory, retrying per `policy`
    pub fn open_with(
        directory: &dyn NodeDirectory,
        name: &str,
        policy: RetryPolicy,
    ) -> InputResult<Self> {
        info!(name, attempts = policy.max_attempts, "Attaching to virtual camera");
        let queue = Arc::new(FrameQueue::new());

        let (node, handle) = policy.run("attach virtual camera", |attempt| {
            let node = discover(directory, name)?;
            let handle = InputPipeline::build(&node, Arc::clone(&queue))?;
            match handle.start() {
                Ok(()) => Ok((node, handle)),
                Err(e) => {
                    debug!(attempt, error = %e, "Input pipeline failed to start");
                    handle.teardown();
                    Err(e)
                }
            }
        })?;

        info!(name, id = node.id, "Attached to virtual camera");
        Ok(Self {
            name: name.to_string(),
            node: Some(node),
            queue,
            handle: Some(handle),
        })
    }

    /// Adapter without a pipeline, fed only through its queue
    #[cfg(test)]
    pub(crate) fn detached(name: &str) -> Self {
        Self {
            name: name.to_string(),
            node: None,
            queue: Arc::new(FrameQueue::new()),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node(&self) -> Option<&NodeInfo> {
        self.node.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    /// Latest frame, if one arrives within a short bounded wait
    ///
    /// Falls back to one manual pull from the sink before reporting no frame.
    pub fn read(&self) -> Option<Frame> {
        self.queue
            .pop_timeout(timing::QUEUE_WAIT)
            .or_else(|| self.handle.as_ref().and_then(InputPipeline::pull))
    }

    /// Stop the pipeline and drop queued frames; safe to call repeatedly
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(name = %self.name, "Releasing virtual camera input");
            handle.teardown();
        }
        self.queue.clear();
    }

    #[cfg(test)]
    pub(crate) fn queue(&self) -> &FrameQueue {
        &self.queue
    }
}

impl Drop for InputAdapter {
    fn drop(&mut self) {
        self.release();
    }
}
