// SPDX-License-Identifier: GPL-3.0-only

//! Camera session: device lifecycle, configuration and output restart
//!
//! The device handle, the configuration and the output adapter live in one
//! [`SessionState`] behind one mutex. Compound operations such as
//! [`CameraSession::reconfigure`] call the `*_locked` helpers while already
//! holding the guard, so the output never publishes one resolution while the
//! device streams another.
//!
//! Blocking work happens outside the guard. [`CameraSession::tick`] takes the
//! device out of its slot for the read and puts it back afterwards; anything
//! that needs to close the device waits on `device_returned` until it is back.
//! [`CameraSession::pace`] asks the output for the remaining frame budget and
//! sleeps after releasing the lock.

use super::probe::{CapabilityCache, CapabilityProbe};
use super::types::{CameraConfig, CameraMode, Frame, SourceInfo};
use super::{CameraOpener, FrameSource};
use crate::backends::virtual_camera::{FrameSink, OutputConfig, OutputFactory};
use crate::constants::camera;
use crate::control::ControlEvent;
use crate::errors::{AppResult, CameraError, CameraResult, OutputError, OutputResult};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Outcome of one session tick
#[derive(Debug)]
pub enum Tick {
    /// A frame from the open device
    Frame(Frame),
    /// The session is closed; black frame at the configured size
    Inactive(Frame),
    /// The device is open but the read failed
    ReadFailed(CameraError),
}

enum DeviceSlot {
    Closed,
    Idle(Box<dyn FrameSource>),
    /// Checked out by a tick that is reading without the lock
    Reading,
}

impl DeviceSlot {
    fn is_open(&self) -> bool {
        !matches!(self, DeviceSlot::Closed)
    }
}

struct SessionState {
    config: CameraConfig,
    device: DeviceSlot,
    output: Option<Box<dyn FrameSink>>,
    read_failures: u32,
}

pub struct CameraSession {
    state: Mutex<SessionState>,
    device_returned: Condvar,
    opener: Arc<dyn CameraOpener>,
    outputs: Arc<dyn OutputFactory>,
    capabilities: CapabilityCache,
    published_name: String,
    events: Option<broadcast::Sender<ControlEvent>>,
}

impl CameraSession {
    /// Create a closed session and publish its output at the configured size
    ///
    /// Output construction failures are returned as-is; they are not retried.
    pub fn new(
        config: CameraConfig,
        published_name: impl Into<String>,
        opener: Arc<dyn CameraOpener>,
        outputs: Arc<dyn OutputFactory>,
        probe: Arc<dyn CapabilityProbe>,
    ) -> OutputResult<Self> {
        let published_name = published_name.into();
        let output = outputs.create(&output_config(&config, &published_name))?;
        info!(%config, name = %published_name, "Camera session ready");
        Ok(Self {
            state: Mutex::new(SessionState {
                config,
                device: DeviceSlot::Closed,
                output: Some(output),
                read_failures: 0,
            }),
            device_returned: Condvar::new(),
            opener,
            outputs,
            capabilities: CapabilityCache::new(probe),
            published_name,
            events: None,
        })
    }

    /// Emit state and config changes on `events`
    pub fn with_events(mut self, events: broadcast::Sender<ControlEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: ControlEvent) {
        if let Some(tx) = &self.events {
            // No subscribers is fine
            let _ = tx.send(event);
        }
    }

    /// Wait until no tick holds the device outside the lock
    fn settle(&self, state: &mut MutexGuard<'_, SessionState>) {
        while matches!(state.device, DeviceSlot::Reading) {
            self.device_returned.wait(state);
        }
    }

    /// Open the configured source; a no-op when already open
    pub fn start(&self) -> CameraResult<()> {
        let opened = {
            let mut state = self.state.lock();
            self.start_locked(&mut state)?
        };
        if opened {
            self.emit(ControlEvent::CameraStateChanged(true));
        }
        Ok(())
    }

    fn start_locked(&self, state: &mut SessionState) -> CameraResult<bool> {
        if state.device.is_open() {
            return Ok(false);
        }
        match self.opener.open(&state.config) {
            Ok(device) => {
                info!(config = %state.config, "Camera started");
                state.device = DeviceSlot::Idle(device);
                state.read_failures = 0;
                Ok(true)
            }
            Err(e) => {
                warn!(config = %state.config, error = %e, "Camera failed to start");
                Err(e)
            }
        }
    }

    /// Release the device; safe to call when already closed
    ///
    /// Waits for an in-flight read to return so the device is closed when
    /// this returns.
    pub fn stop(&self) {
        let closed = {
            let mut state = self.state.lock();
            self.settle(&mut state);
            Self::stop_locked(&mut state)
        };
        if closed {
            self.emit(ControlEvent::CameraStateChanged(false));
        }
    }

    fn stop_locked(state: &mut SessionState) -> bool {
        state.read_failures = 0;
        match std::mem::replace(&mut state.device, DeviceSlot::Closed) {
            DeviceSlot::Idle(device) => {
                drop(device);
                info!(source = %state.config.source, "Camera stopped");
                true
            }
            // The reading tick drops the device when it finds the slot closed
            DeviceSlot::Reading => true,
            DeviceSlot::Closed => false,
        }
    }

    /// Whether the device is open
    pub fn is_active(&self) -> bool {
        self.state.lock().device.is_open()
    }

    pub fn camera_config(&self) -> CameraConfig {
        self.state.lock().config.clone()
    }

    /// Configuration of the current output, if one is running
    pub fn output_config(&self) -> Option<OutputConfig> {
        self.state
            .lock()
            .output
            .as_ref()
            .map(|output| output.config().clone())
    }

    /// Name the output is published under
    pub fn published_name(&self) -> &str {
        &self.published_name
    }

    /// Switch to `new` and restart the output at the new size
    ///
    /// The device is reopened only if it was open before. If no output can be
    /// built for `new`, the previous config and output are restored and the
    /// output error is returned.
    pub fn reconfigure(&self, new: CameraConfig) -> AppResult<()> {
        let mut events = Vec::new();
        let result: AppResult<()> = {
            let mut state = self.state.lock();
            self.settle(&mut state);
            let was_open = Self::stop_locked(&mut state);
            let old = std::mem::replace(&mut state.config, new);
            info!(from = %old, to = %state.config, was_open, "Reconfiguring camera");

            match self.rebuild_output_locked(&mut state) {
                Ok(()) => {
                    if old.source != state.config.source {
                        self.capabilities.invalidate(old.source.as_str());
                    }
                    events.push(ControlEvent::CameraConfigChanged(state.config.clone()));
                    let reopened = if was_open {
                        self.start_locked(&mut state)
                    } else {
                        Ok(false)
                    };
                    if was_open && !matches!(reopened, Ok(true)) {
                        events.push(ControlEvent::CameraStateChanged(false));
                    }
                    reopened.map(|_| ()).map_err(Into::into)
                }
                Err(e) => {
                    warn!(error = %e, restoring = %old, "Output rejected new config, rolling back");
                    state.config = old;
                    if let Err(e) = self.rebuild_output_locked(&mut state) {
                        error!(error = %e, "Failed to restore previous virtual camera output");
                    }
                    let reopened = was_open && matches!(self.start_locked(&mut state), Ok(true));
                    if was_open && !reopened {
                        events.push(ControlEvent::CameraStateChanged(false));
                    }
                    Err(e.into())
                }
            }
        };

        for event in events {
            self.emit(event);
        }
        result
    }

    /// Replace the output with one built for the current config
    fn rebuild_output_locked(&self, state: &mut SessionState) -> OutputResult<()> {
        if let Some(mut output) = state.output.take() {
            output.cleanup();
        }
        let output = self
            .outputs
            .create(&output_config(&state.config, &self.published_name))
            .inspect_err(|e| {
                error!(error = %e, config = %state.config, "Failed to build virtual camera output")
            })?;
        state.output = Some(output);
        Ok(())
    }

    /// Cameras known to the capability cache
    pub fn list_sources(&self) -> Vec<SourceInfo> {
        self.capabilities.list_sources()
    }

    /// Modes of `source`, probed once and then cached
    pub fn get_modes(&self, source: &str) -> CameraResult<Vec<CameraMode>> {
        self.capabilities.get_modes(source)
    }

    /// Produce the next frame to process
    ///
    /// The read runs without the session lock. Closes the device after
    /// [`camera::MAX_CONSECUTIVE_READ_FAILURES`] failed reads in a row.
    pub fn tick(&self) -> Tick {
        let mut device = {
            let mut state = self.state.lock();
            self.settle(&mut state);
            match std::mem::replace(&mut state.device, DeviceSlot::Reading) {
                DeviceSlot::Idle(device) => device,
                closed => {
                    state.device = closed;
                    return Tick::Inactive(Frame::black(state.config.width, state.config.height));
                }
            }
        };

        let result = device.read();

        let (tick, escalated) = {
            let mut state = self.state.lock();
            if !matches!(state.device, DeviceSlot::Reading) {
                // Closed while reading
                drop(device);
                self.device_returned.notify_all();
                return Tick::Inactive(Frame::black(state.config.width, state.config.height));
            }
            state.device = DeviceSlot::Idle(device);
            self.device_returned.notify_all();

            match result {
                Ok(frame) => {
                    state.read_failures = 0;
                    (Tick::Frame(frame), false)
                }
                Err(e) => {
                    state.read_failures += 1;
                    debug!(failures = state.read_failures, error = %e, "Camera read failed");
                    let escalated = state.read_failures >= camera::MAX_CONSECUTIVE_READ_FAILURES;
                    if escalated {
                        warn!(
                            failures = state.read_failures,
                            "Too many consecutive read failures, closing camera"
                        );
                        Self::stop_locked(&mut state);
                    }
                    (Tick::ReadFailed(e), escalated)
                }
            }
        };
        if escalated {
            self.emit(ControlEvent::CameraStateChanged(false));
        }
        tick
    }

    /// Push `frame` to the output
    pub fn publish(&self, frame: &Frame) -> OutputResult<()> {
        match self.state.lock().output.as_mut() {
            Some(output) => output.send(&frame.data),
            None => Err(OutputError::Closed),
        }
    }

    /// Sleep out the output's frame budget without holding the lock
    pub fn pace(&self) {
        let delay = self
            .state
            .lock()
            .output
            .as_mut()
            .map(|output| output.next_frame_delay());
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            std::thread::sleep(delay);
        }
    }

    /// Stop the device, then tear down the output
    pub fn shutdown(&self) {
        self.stop();
        if let Some(mut output) = self.state.lock().output.take() {
            output.cleanup();
            info!("Virtual camera output closed");
        }
    }
}

fn output_config(config: &CameraConfig, name: &str) -> OutputConfig {
    OutputConfig {
        width: config.width,
        height: config.height,
        fps: config.fps,
        name: name.to_string(),
    }
}
