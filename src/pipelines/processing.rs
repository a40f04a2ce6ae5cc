// SPDX-License-Identifier: GPL-3.0-only

//! The frame processing loop
//!
//! One iteration per frame tick: take a frame from the camera session (or a
//! black frame while it is closed), run the effect chain snapshot over it,
//! publish the result and pace to the output frame rate. Per-frame failures
//! never end the loop; only the stop signal does.
//!
//! [`run_camera_preview`] drives the same [`FrameProcessor`] straight from a
//! camera into a [`PreviewSink`] without publishing anything.

use crate::backends::camera::types::Frame;
use crate::backends::camera::{CameraSession, FrameSource, Tick};
use crate::constants::{camera, timing};
use crate::effects::{CenterWeightedSegmenter, EffectController, EffectParams, Segmenter};
use crate::errors::{AppResult, CameraError, OutputError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, info, warn};

/// Action returned by one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Local display of processed frames
pub trait PreviewSink: Send {
    fn show(&mut self, frame: &Frame) -> std::io::Result<()>;
}

/// Builds the segmentation collaborator on first use
pub type SegmenterFactory = Box<dyn Fn() -> Box<dyn Segmenter> + Send>;

/// Applies the current effect chain to frames
///
/// The segmenter is created the first time a chain needs a mask and kept
/// afterwards.
pub struct FrameProcessor {
    effects: Arc<EffectController>,
    segmenter: Option<Box<dyn Segmenter>>,
    make_segmenter: SegmenterFactory,
}

impl FrameProcessor {
    pub fn new(effects: Arc<EffectController>) -> Self {
        Self {
            effects,
            segmenter: None,
            make_segmenter: Box::new(|| Box::new(CenterWeightedSegmenter::new())),
        }
    }

    pub fn with_segmenter(mut self, factory: SegmenterFactory) -> Self {
        self.make_segmenter = factory;
        self
    }

    pub fn has_segmenter(&self) -> bool {
        self.segmenter.is_some()
    }

    fn ensure_segmenter(&mut self) -> &mut dyn Segmenter {
        let factory = &self.make_segmenter;
        self.segmenter
            .get_or_insert_with(|| {
                info!("Creating segmentation collaborator");
                factory()
            })
            .as_mut()
    }

    /// Run the chain snapshot over `frame`, passing it through on error
    pub fn process(&mut self, frame: Frame) -> Frame {
        let chain = self.effects.snapshot();
        if chain.is_empty() {
            return frame;
        }

        let mask = if chain.needs_mask() {
            Some(self.ensure_segmenter().mask(&frame))
        } else {
            None
        };

        match chain.apply(frame.clone(), mask.as_ref(), &EffectParams::new()) {
            Ok(processed) => processed,
            Err(e) => {
                warn!(error = %e, "Effect chain failed, passing frame through");
                frame
            }
        }
    }
}

pub struct ProcessingLoop {
    session: Arc<CameraSession>,
    processor: FrameProcessor,
    preview: Option<Box<dyn PreviewSink>>,
    stop_signal: Arc<AtomicBool>,
    frame_count: u64,
}

impl ProcessingLoop {
    pub fn new(session: Arc<CameraSession>, effects: Arc<EffectController>) -> Self {
        Self {
            session,
            processor: FrameProcessor::new(effects),
            preview: None,
            stop_signal: Arc::new(AtomicBool::new(false)),
            frame_count: 0,
        }
    }

    pub fn with_segmenter(mut self, factory: SegmenterFactory) -> Self {
        self.processor = self.processor.with_segmenter(factory);
        self
    }

    pub fn with_preview(mut self, preview: Box<dyn PreviewSink>) -> Self {
        self.preview = Some(preview);
        self
    }

    /// Flag that ends the loop after the current iteration
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    pub fn has_segmenter(&self) -> bool {
        self.processor.has_segmenter()
    }

    pub fn has_preview(&self) -> bool {
        self.preview.is_some()
    }

    /// Run one iteration
    pub fn step(&mut self) -> LoopAction {
        if self.stop_signal.load(Ordering::SeqCst) {
            return LoopAction::Stop;
        }

        let frame = match self.session.tick() {
            Tick::Inactive(black) => {
                if let Err(e) = self.session.publish(&black) {
                    self.log_publish_error(&e);
                }
                thread::sleep(timing::INACTIVE_TICK);
                return LoopAction::Continue;
            }
            Tick::ReadFailed(_) => {
                thread::sleep(timing::READ_RETRY_DELAY);
                return LoopAction::Continue;
            }
            Tick::Frame(frame) => frame,
        };

        let processed = self.processor.process(frame);

        if let Err(e) = self.session.publish(&processed) {
            self.log_publish_error(&e);
        }
        self.session.pace();

        if let Some(preview) = self.preview.as_mut()
            && let Err(e) = preview.show(&processed)
        {
            warn!(error = %e, "Preview failed, disabling it");
            self.preview = None;
        }

        self.frame_count += 1;
        if self.frame_count % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(frame = self.frame_count, "Processed frames");
        }
        LoopAction::Continue
    }

    fn log_publish_error(&self, e: &OutputError) {
        match e {
            OutputError::Flushing | OutputError::Eos => debug!(error = %e, "Output not accepting frames"),
            _ => warn!(error = %e, "Failed to publish frame"),
        }
    }

    /// Loop until stopped, then stop the camera and tear down the output
    pub fn run(mut self) {
        info!("Processing loop started");
        while self.step() == LoopAction::Continue {}
        info!(frames = self.frame_count, "Processing loop stopping");
        self.session.shutdown();
    }
}

/// Show processed camera frames until `stop` is set
///
/// The camera paces the loop. Returns the number of frames shown. Fails when
/// the preview cannot draw or after
/// [`camera::MAX_CONSECUTIVE_READ_FAILURES`] failed reads in a row.
pub fn run_camera_preview(
    mut source: Box<dyn FrameSource>,
    mut processor: FrameProcessor,
    mut preview: Box<dyn PreviewSink>,
    stop: Arc<AtomicBool>,
) -> AppResult<u64> {
    let mut shown: u64 = 0;
    let mut failures: u32 = 0;

    while !stop.load(Ordering::SeqCst) {
        let frame = match source.read() {
            Ok(frame) => {
                failures = 0;
                frame
            }
            Err(e) => {
                failures += 1;
                debug!(failures, error = %e, "Camera read failed");
                if failures >= camera::MAX_CONSECUTIVE_READ_FAILURES {
                    warn!(failures, "Too many consecutive read failures, ending preview");
                    return Err(CameraError::Read(e.to_string()).into());
                }
                thread::sleep(timing::READ_RETRY_DELAY);
                continue;
            }
        };

        preview.show(&processor.process(frame))?;
        shown += 1;
        if shown % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(frame = shown, "Previewed frames");
        }
    }

    info!(frames = shown, "Camera preview stopped");
    Ok(shown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::SourceInfo;
    use crate::backends::camera::{CameraConfig, CameraMode, CameraOpener, CapabilityProbe, FrameSource};
    use crate::backends::virtual_camera::{FrameSink, OutputConfig, OutputFactory};
    use crate::effects::{EffectKind, Mask};
    use crate::errors::{CameraError, CameraResult, OutputResult};
    use parking_lot::Mutex;
    use std::time::Duration;

    struct Gray;

    impl FrameSource for Gray {
        fn read(&mut self) -> CameraResult<Frame> {
            Ok(Frame::from_rgb(2, 2, vec![100; 12]).unwrap())
        }
    }

    struct Opener;

    impl CameraOpener for Opener {
        fn open(&self, _config: &CameraConfig) -> CameraResult<Box<dyn FrameSource>> {
            Ok(Box::new(Gray))
        }
    }

    struct Recorder {
        config: OutputConfig,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl FrameSink for Recorder {
        fn send(&mut self, data: &[u8]) -> OutputResult<()> {
            self.sent.lock().push(data.to_vec());
            Ok(())
        }
        fn next_frame_delay(&mut self) -> Duration {
            Duration::ZERO
        }
        fn config(&self) -> &OutputConfig {
            &self.config
        }
        fn cleanup(&mut self) {}
    }

    struct Outputs(Arc<Mutex<Vec<Vec<u8>>>>);

    impl OutputFactory for Outputs {
        fn create(&self, config: &OutputConfig) -> OutputResult<Box<dyn FrameSink>> {
            Ok(Box::new(Recorder {
                config: config.clone(),
                sent: Arc::clone(&self.0),
            }))
        }
    }

    struct NoProbe;

    impl CapabilityProbe for NoProbe {
        fn list_sources(&self) -> Vec<SourceInfo> {
            Vec::new()
        }
        fn probe_modes(&self, source: &str) -> CameraResult<Vec<CameraMode>> {
            Err(CameraError::NotFound(source.into()))
        }
    }

    struct Solid(f32);

    impl Segmenter for Solid {
        fn mask(&mut self, frame: &Frame) -> Mask {
            Mask::filled(frame.width, frame.height, self.0)
        }
    }

    struct BrokenPreview;

    impl PreviewSink for BrokenPreview {
        fn show(&mut self, _frame: &Frame) -> std::io::Result<()> {
            Err(std::io::Error::other("terminal gone"))
        }
    }

    fn setup() -> (ProcessingLoop, Arc<Mutex<Vec<Vec<u8>>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let session = CameraSession::new(
            CameraConfig {
                width: 2,
                height: 2,
                ..CameraConfig::default()
            },
            "camfx",
            Arc::new(Opener),
            Arc::new(Outputs(Arc::clone(&sent))),
            Arc::new(NoProbe),
        )
        .unwrap();
        let effects = Arc::new(EffectController::new());
        (
            ProcessingLoop::new(Arc::new(session), effects),
            sent,
        )
    }

    #[test]
    fn test_inactive_publishes_black() {
        let (mut processing, sent) = setup();
        assert_eq!(processing.step(), LoopAction::Continue);
        assert_eq!(sent.lock().as_slice(), &[vec![0u8; 12]]);
    }

    #[test]
    fn test_segmenter_created_only_when_needed() {
        let (processing, _sent) = setup();
        let mut processing = processing.with_segmenter(Box::new(|| Box::new(Solid(1.0))));
        processing.session.start().unwrap();

        processing.step();
        assert!(!processing.has_segmenter());

        processing
            .processor
            .effects
            .add_or_update(EffectKind::Blur, EffectParams::new())
            .unwrap();
        processing.step();
        assert!(processing.has_segmenter());
    }

    #[test]
    fn test_effect_error_passes_frame_through() {
        let (processing, sent) = setup();
        // Mask of the wrong size makes the blur entry fail
        let mut processing =
            processing.with_segmenter(Box::new(|| Box::new(WrongSize)));
        processing.session.start().unwrap();
        processing
            .processor
            .effects
            .add_or_update(EffectKind::Blur, EffectParams::new())
            .unwrap();

        assert_eq!(processing.step(), LoopAction::Continue);
        assert_eq!(sent.lock().last(), Some(&vec![100u8; 12]));
    }

    struct WrongSize;

    impl Segmenter for WrongSize {
        fn mask(&mut self, _frame: &Frame) -> Mask {
            Mask::filled(1, 1, 0.0)
        }
    }

    #[test]
    fn test_preview_failure_disables_preview() {
        let (processing, sent) = setup();
        let mut processing = processing.with_preview(Box::new(BrokenPreview));
        processing.session.start().unwrap();

        assert_eq!(processing.step(), LoopAction::Continue);
        assert!(!processing.has_preview());
        assert_eq!(processing.step(), LoopAction::Continue);
        assert_eq!(sent.lock().len(), 2);
    }

    #[test]
    fn test_stop_signal_ends_loop() {
        let (mut processing, _sent) = setup();
        processing.stop_signal().store(true, Ordering::SeqCst);
        assert_eq!(processing.step(), LoopAction::Stop);
    }

    /// Records what it shows and raises `stop` after `limit` frames
    struct Collect {
        shown: Arc<Mutex<Vec<Frame>>>,
        stop: Arc<AtomicBool>,
        limit: usize,
    }

    impl PreviewSink for Collect {
        fn show(&mut self, frame: &Frame) -> std::io::Result<()> {
            let mut shown = self.shown.lock();
            shown.push(frame.clone());
            if shown.len() >= self.limit {
                self.stop.store(true, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[test]
    fn test_camera_preview_applies_chain() {
        let effects = Arc::new(EffectController::new());
        effects
            .add_or_update(EffectKind::Brightness, EffectParams::new().with("brightness", 50))
            .unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let shown = Arc::new(Mutex::new(Vec::new()));

        let count = run_camera_preview(
            Box::new(Gray),
            FrameProcessor::new(effects),
            Box::new(Collect {
                shown: Arc::clone(&shown),
                stop: Arc::clone(&stop),
                limit: 3,
            }),
            stop,
        )
        .unwrap();

        assert_eq!(count, 3);
        let shown = shown.lock();
        assert_eq!(shown.len(), 3);
        assert!(shown.iter().all(|frame| frame.data.iter().all(|&v| v > 100)));
    }

    struct Unplugged;

    impl FrameSource for Unplugged {
        fn read(&mut self) -> CameraResult<Frame> {
            Err(CameraError::Read("device gone".into()))
        }
    }

    #[test]
    fn test_camera_preview_gives_up_on_dead_camera() {
        let stop = Arc::new(AtomicBool::new(false));
        let result = run_camera_preview(
            Box::new(Unplugged),
            FrameProcessor::new(Arc::new(EffectController::new())),
            Box::new(BrokenPreview),
            stop,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_camera_preview_surfaces_draw_failure() {
        let stop = Arc::new(AtomicBool::new(false));
        let result = run_camera_preview(
            Box::new(Gray),
            FrameProcessor::new(Arc::new(EffectController::new())),
            Box::new(BrokenPreview),
            stop,
        );
        assert!(matches!(result, Err(crate::errors::AppError::Io(_))));
    }
}
