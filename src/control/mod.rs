// SPDX-License-Identifier: GPL-3.0-only

//! Remote control of the effect chain and the camera session
//!
//! [`ControlService`] is the transport-independent surface: every call
//! reports success as a `bool`, logs failures, and broadcasts a
//! [`ControlEvent`] for each change. [`dbus`] exposes it on the session bus.

pub mod dbus;

use crate::backends::camera::types::{CameraConfig, CameraMode, CameraSource, SourceInfo};
use crate::backends::camera::CameraSession;
use crate::effects::{EffectController, EffectKind, EffectParams, ParamValue};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

/// What happened to the effect chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectAction {
    Set,
    Add,
    Update,
    Remove,
    Clear,
}

impl EffectAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectAction::Set => "set",
            EffectAction::Add => "add",
            EffectAction::Update => "update",
            EffectAction::Remove => "remove",
            EffectAction::Clear => "clear",
        }
    }
}

impl fmt::Display for EffectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change notification
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// `kind` is `None` for [`EffectAction::Clear`]
    EffectChanged {
        action: EffectAction,
        kind: Option<EffectKind>,
        params: EffectParams,
    },
    CameraStateChanged(bool),
    CameraConfigChanged(CameraConfig),
}

/// Channel carrying [`ControlEvent`]s to every transport
pub fn event_channel() -> broadcast::Sender<ControlEvent> {
    broadcast::channel(crate::constants::dbus::EVENT_CHANNEL_CAPACITY).0
}

pub struct ControlService {
    effects: Arc<EffectController>,
    session: Arc<CameraSession>,
    events: broadcast::Sender<ControlEvent>,
}

impl ControlService {
    pub fn new(
        effects: Arc<EffectController>,
        session: Arc<CameraSession>,
        events: broadcast::Sender<ControlEvent>,
    ) -> Self {
        Self {
            effects,
            session,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.events.subscribe()
    }

    fn effect_changed(&self, action: EffectAction, kind: Option<EffectKind>, params: EffectParams) {
        let _ = self.events.send(ControlEvent::EffectChanged {
            action,
            kind,
            params,
        });
    }

    fn parse_kind(kind: &str) -> Option<EffectKind> {
        kind.parse::<EffectKind>()
            .inspect_err(|e| warn!(error = %e, "Rejected control request"))
            .ok()
    }

    /// Replace the chain with a single effect
    pub fn set_effect(&self, kind: &str, params: EffectParams) -> bool {
        let Some(kind) = Self::parse_kind(kind) else {
            return false;
        };
        match self.effects.set(kind, params.clone()) {
            Ok(()) => {
                self.effect_changed(EffectAction::Set, Some(kind), params);
                true
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Error setting effect");
                false
            }
        }
    }

    /// Append an effect, or update the existing entry of the same kind
    pub fn add_effect(&self, kind: &str, params: EffectParams) -> bool {
        let Some(kind) = Self::parse_kind(kind) else {
            return false;
        };
        match self.effects.add_or_update(kind, params.clone()) {
            Ok(updated) => {
                let action = if updated {
                    EffectAction::Update
                } else {
                    EffectAction::Add
                };
                self.effect_changed(action, Some(kind), params);
                true
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Error adding effect");
                false
            }
        }
    }

    /// Remove by position; an index outside the chain is a successful no-op
    pub fn remove_effect(&self, index: i32) -> bool {
        let removed = usize::try_from(index)
            .ok()
            .and_then(|index| self.effects.remove(index));
        if let Some(kind) = removed {
            self.effect_changed(EffectAction::Remove, Some(kind), EffectParams::new());
        }
        true
    }

    /// Returns `false` when the chain has no entry of `kind`
    pub fn remove_effect_by_kind(&self, kind: &str) -> bool {
        let Some(kind) = Self::parse_kind(kind) else {
            return false;
        };
        let removed = self.effects.remove_by_kind(kind);
        if removed {
            self.effect_changed(EffectAction::Remove, Some(kind), EffectParams::new());
        }
        removed
    }

    pub fn clear_chain(&self) -> bool {
        self.effects.clear();
        self.effect_changed(EffectAction::Clear, None, EffectParams::new());
        true
    }

    pub fn get_current_effects(&self) -> Vec<(EffectKind, EffectParams)> {
        self.effects.current_effects()
    }

    pub fn update_effect_parameter(&self, kind: &str, name: &str, value: ParamValue) -> bool {
        let Some(kind) = Self::parse_kind(kind) else {
            return false;
        };
        match self.effects.update_parameter(kind, name, value.clone()) {
            Ok(_) => {
                self.effect_changed(
                    EffectAction::Update,
                    Some(kind),
                    EffectParams::new().with(name, value),
                );
                true
            }
            Err(e) => {
                warn!(kind = %kind, param = name, error = %e, "Error updating parameter");
                false
            }
        }
    }

    /// Open the camera; `true` if it is open afterwards
    pub fn start_camera(&self) -> bool {
        match self.session.start() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Error starting camera");
                false
            }
        }
    }

    pub fn stop_camera(&self) -> bool {
        self.session.stop();
        true
    }

    pub fn get_camera_state(&self) -> bool {
        self.session.is_active()
    }

    pub fn get_camera_config(&self) -> CameraConfig {
        self.session.camera_config()
    }

    /// Switch source or mode; `false` leaves the previous config running
    pub fn apply_camera_config(&self, source: &str, width: u32, height: u32, fps: u32) -> bool {
        let config = CameraConfig {
            source: CameraSource::new(source),
            width,
            height,
            fps,
        };
        if let Err(reason) = config.validate() {
            warn!(%config, %reason, "Rejected camera config");
            return false;
        }
        match self.session.reconfigure(config) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Error applying camera config");
                false
            }
        }
    }

    pub fn list_cameras(&self) -> Vec<SourceInfo> {
        self.session.list_sources()
    }

    /// Modes of `source`; empty when it cannot be queried
    pub fn get_camera_modes(&self, source: &str) -> Vec<CameraMode> {
        self.session
            .get_modes(source)
            .inspect_err(|e| warn!(source, error = %e, "Error querying camera modes"))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::{CameraOpener, CapabilityProbe, FrameSource};
    use crate::backends::virtual_camera::{FrameSink, OutputConfig, OutputFactory};
    use crate::errors::{CameraError, CameraResult, OutputResult};
    use std::time::Duration;

    struct NoCamera;

    impl CameraOpener for NoCamera {
        fn open(&self, config: &CameraConfig) -> CameraResult<Box<dyn FrameSource>> {
            Err(CameraError::NotFound(config.source.device_path()))
        }
    }

    struct Null(OutputConfig);

    impl FrameSink for Null {
        fn send(&mut self, _data: &[u8]) -> OutputResult<()> {
            Ok(())
        }
        fn next_frame_delay(&mut self) -> Duration {
            Duration::ZERO
        }
        fn config(&self) -> &OutputConfig {
            &self.0
        }
        fn cleanup(&mut self) {}
    }

    struct Outputs;

    impl OutputFactory for Outputs {
        fn create(&self, config: &OutputConfig) -> OutputResult<Box<dyn FrameSink>> {
            Ok(Box::new(Null(config.clone())))
        }
    }

    struct OneCamera;

    impl CapabilityProbe for OneCamera {
        fn list_sources(&self) -> Vec<SourceInfo> {
            vec![SourceInfo {
                id: "/dev/video0".into(),
                label: "Test Camera (/dev/video0)".into(),
            }]
        }
        fn probe_modes(&self, source: &str) -> CameraResult<Vec<CameraMode>> {
            if source != "/dev/video0" {
                return Err(CameraError::NotFound(source.to_string()));
            }
            Ok(vec![CameraMode {
                width: 640,
                height: 480,
                fps: vec![30, 15],
            }])
        }
    }

    fn service() -> (ControlService, broadcast::Receiver<ControlEvent>) {
        let events = event_channel();
        let rx = events.subscribe();
        let session = CameraSession::new(
            CameraConfig::default(),
            "camfx",
            Arc::new(NoCamera),
            Arc::new(Outputs),
            Arc::new(OneCamera),
        )
        .unwrap()
        .with_events(events.clone());
        let service = ControlService::new(
            Arc::new(EffectController::new()),
            Arc::new(session),
            events,
        );
        (service, rx)
    }

    #[test]
    fn test_add_then_update_actions() {
        let (service, mut rx) = service();
        assert!(service.add_effect("blur", EffectParams::new()));
        assert!(service.add_effect("blur", EffectParams::new().with("strength", 9)));

        let actions: Vec<EffectAction> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|e| match e {
                ControlEvent::EffectChanged { action, .. } => Some(action),
                _ => None,
            })
            .collect();
        assert_eq!(actions, vec![EffectAction::Add, EffectAction::Update]);
    }

    #[test]
    fn test_invalid_requests_report_false() {
        let (service, _rx) = service();
        assert!(!service.add_effect("sepia", EffectParams::new()));
        assert!(!service.add_effect("blur", EffectParams::new().with("strength", 4)));
        assert!(!service.update_effect_parameter("blur", "strength", ParamValue::Int(5)));
        assert!(!service.remove_effect_by_kind("blur"));
        assert!(service.get_current_effects().is_empty());
    }

    #[test]
    fn test_remove_out_of_range_is_noop() {
        let (service, _rx) = service();
        assert!(service.add_effect("brightness", EffectParams::new()));
        assert!(service.remove_effect(7));
        assert!(service.remove_effect(-1));
        assert_eq!(service.get_current_effects().len(), 1);
    }

    #[test]
    fn test_camera_failures_report_false() {
        let (service, _rx) = service();
        assert!(!service.start_camera());
        assert!(!service.get_camera_state());
        assert!(service.stop_camera());
        assert!(!service.apply_camera_config("0", 0, 480, 30));
    }

    #[test]
    fn test_apply_camera_config_emits_change() {
        let (service, mut rx) = service();
        assert!(service.apply_camera_config("1", 640, 480, 15));
        let config = service.get_camera_config();
        assert_eq!((config.width, config.height, config.fps), (640, 480, 15));
        assert_eq!(
            rx.try_recv().unwrap(),
            ControlEvent::CameraConfigChanged(config)
        );
    }

    #[test]
    fn test_oversized_camera_config_rejected() {
        let (service, mut rx) = service();
        let before = service.get_camera_config();
        assert!(!service.apply_camera_config("0", 100_000, 480, 30));
        assert!(!service.apply_camera_config("0", 640, 100_000, 30));
        assert!(!service.apply_camera_config("0", 640, 480, 10_000));
        assert_eq!(service.get_camera_config(), before);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_camera_listing_uses_cache() {
        let (service, _rx) = service();
        assert_eq!(service.list_cameras().len(), 1);
        let modes = service.get_camera_modes("0");
        assert_eq!(modes.len(), 1);
        assert_eq!(modes[0].fps, vec![30, 15]);
        assert!(service.get_camera_modes("/dev/video9").is_empty());
    }
}
