// SPDX-License-Identifier: GPL-3.0-only

//! `org.camfx.Control1` on the session bus
//!
//! The server runs on its own thread with a small tokio runtime. Method
//! handlers hand work to the blocking pool because camera operations can
//! wait on device and pipeline start-up. Every [`ControlEvent`] is re-emitted
//! as a D-Bus signal.

use super::{ControlEvent, ControlService};
use crate::constants::dbus::{INTERFACE_NAME, OBJECT_PATH, SERVICE_NAME};
use crate::backends::camera::types::CameraMode;
use crate::effects::{EffectKind, EffectParams, ParamValue};
use crate::errors::ControlError;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedValue, Value};

/// Parameter dictionary as carried on the bus (`a{sv}`)
pub type ValueMap = HashMap<String, OwnedValue>;

/// Convert a bus value to an effect parameter
///
/// Integers of any width become [`ParamValue::Int`], doubles
/// [`ParamValue::Float`]. Variants are unwrapped. Other types are rejected.
pub fn param_from_value(value: &Value<'_>) -> Option<ParamValue> {
    match value {
        Value::U8(v) => Some(ParamValue::Int((*v).into())),
        Value::I16(v) => Some(ParamValue::Int((*v).into())),
        Value::U16(v) => Some(ParamValue::Int((*v).into())),
        Value::I32(v) => Some(ParamValue::Int((*v).into())),
        Value::U32(v) => Some(ParamValue::Int((*v).into())),
        Value::I64(v) => Some(ParamValue::Int(*v)),
        Value::U64(v) => i64::try_from(*v).ok().map(ParamValue::Int),
        Value::F64(v) => Some(ParamValue::Float(*v)),
        Value::Bool(v) => Some(ParamValue::Bool(*v)),
        Value::Str(s) => Some(ParamValue::Text(s.to_string())),
        Value::Value(inner) => param_from_value(inner),
        _ => None,
    }
}

/// Convert an effect parameter to a bus value; in-memory images have no bus form
pub fn value_from_param(param: &ParamValue) -> Option<OwnedValue> {
    let value = match param {
        ParamValue::Int(v) => Value::from(*v),
        ParamValue::Float(v) => Value::from(*v),
        ParamValue::Bool(v) => Value::from(*v),
        ParamValue::Text(s) => Value::from(s.as_str()),
        ParamValue::Image(_) => return None,
    };
    value.try_to_owned().ok()
}

pub fn params_from_map(map: &ValueMap) -> EffectParams {
    map.iter()
        .filter_map(|(name, value)| match param_from_value(value) {
            Some(param) => Some((name.clone(), param)),
            None => {
                warn!(param = %name, signature = %value.value_signature(), "Ignoring unsupported parameter type");
                None
            }
        })
        .collect()
}

pub fn map_from_params(params: &EffectParams) -> ValueMap {
    params
        .iter()
        .filter_map(|(name, param)| value_from_param(param).map(|v| (name.clone(), v)))
        .collect()
}

/// Chain entries as `(type, display name, config)`
pub fn describe_effects(effects: &[(EffectKind, EffectParams)]) -> Vec<(String, String, ValueMap)> {
    effects
        .iter()
        .map(|(kind, params)| {
            (
                kind.as_str().to_string(),
                kind.display_name().to_string(),
                map_from_params(params),
            )
        })
        .collect()
}

/// Modes as `(width, height, frame rates)`
fn describe_modes(modes: Vec<CameraMode>) -> Vec<(u32, u32, Vec<u32>)> {
    modes
        .into_iter()
        .map(|mode| (mode.width, mode.height, mode.fps))
        .collect()
}

async fn unblock<T, F>(service: &Arc<ControlService>, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&ControlService) -> T + Send + 'static,
{
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .inspect_err(|e| error!(error = %e, "Control call failed"))
        .ok()
}

/// The object served at [`OBJECT_PATH`]
pub struct ControlObject {
    service: Arc<ControlService>,
}

#[zbus::interface(name = "org.camfx.Control1")]
impl ControlObject {
    async fn set_effect(&self, effect_type: String, config: ValueMap) -> bool {
        let params = params_from_map(&config);
        unblock(&self.service, move |s| s.set_effect(&effect_type, params))
            .await
            .unwrap_or(false)
    }

    async fn add_effect(&self, effect_type: String, config: ValueMap) -> bool {
        let params = params_from_map(&config);
        unblock(&self.service, move |s| s.add_effect(&effect_type, params))
            .await
            .unwrap_or(false)
    }

    async fn remove_effect(&self, index: i32) -> bool {
        self.service.remove_effect(index)
    }

    async fn remove_effect_by_type(&self, effect_type: String) -> bool {
        self.service.remove_effect_by_kind(&effect_type)
    }

    async fn clear_chain(&self) -> bool {
        self.service.clear_chain()
    }

    async fn get_current_effects(&self) -> Vec<(String, String, ValueMap)> {
        describe_effects(&self.service.get_current_effects())
    }

    async fn update_effect_parameter(
        &self,
        effect_type: String,
        parameter: String,
        value: OwnedValue,
    ) -> bool {
        let Some(value) = param_from_value(&value) else {
            warn!(param = %parameter, "Unsupported parameter value type");
            return false;
        };
        unblock(&self.service, move |s| {
            s.update_effect_parameter(&effect_type, &parameter, value)
        })
        .await
        .unwrap_or(false)
    }

    async fn start_camera(&self) -> bool {
        unblock(&self.service, ControlService::start_camera)
            .await
            .unwrap_or(false)
    }

    async fn stop_camera(&self) -> bool {
        unblock(&self.service, ControlService::stop_camera)
            .await
            .unwrap_or(false)
    }

    async fn get_camera_state(&self) -> bool {
        self.service.get_camera_state()
    }

    async fn get_camera_config(&self) -> (String, u32, u32, u32) {
        let config = self.service.get_camera_config();
        (
            config.source.to_string(),
            config.width,
            config.height,
            config.fps,
        )
    }

    async fn apply_camera_config(&self, source: String, width: u32, height: u32, fps: u32) -> bool {
        unblock(&self.service, move |s| {
            s.apply_camera_config(&source, width, height, fps)
        })
        .await
        .unwrap_or(false)
    }

    /// Cameras as `(device path, label)`
    async fn list_cameras(&self) -> Vec<(String, String)> {
        unblock(&self.service, |s| {
            s.list_cameras()
                .into_iter()
                .map(|info| (info.id, info.label))
                .collect()
        })
        .await
        .unwrap_or_default()
    }

    async fn get_camera_modes(&self, source: String) -> Vec<(u32, u32, Vec<u32>)> {
        unblock(&self.service, move |s| describe_modes(s.get_camera_modes(&source)))
            .await
            .unwrap_or_default()
    }

    #[zbus(signal)]
    async fn effect_changed(
        emitter: &SignalEmitter<'_>,
        action: &str,
        effect_type: &str,
        config: ValueMap,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    async fn camera_state_changed(emitter: &SignalEmitter<'_>, is_active: bool)
    -> zbus::Result<()>;

    #[zbus(signal)]
    async fn camera_config_changed(
        emitter: &SignalEmitter<'_>,
        source: &str,
        width: u32,
        height: u32,
        fps: u32,
    ) -> zbus::Result<()>;
}

async fn emit(emitter: &SignalEmitter<'_>, event: &ControlEvent) -> zbus::Result<()> {
    match event {
        ControlEvent::EffectChanged {
            action,
            kind,
            params,
        } => {
            let kind = kind.map(|k| k.to_string()).unwrap_or_default();
            ControlObject::effect_changed(emitter, action.as_str(), &kind, map_from_params(params))
                .await
        }
        ControlEvent::CameraStateChanged(active) => {
            ControlObject::camera_state_changed(emitter, *active).await
        }
        ControlEvent::CameraConfigChanged(config) => {
            ControlObject::camera_config_changed(
                emitter,
                config.source.as_str(),
                config.width,
                config.height,
                config.fps,
            )
            .await
        }
    }
}

async fn forward_events(connection: zbus::Connection, mut events: broadcast::Receiver<ControlEvent>) {
    let iface = match connection
        .object_server()
        .interface::<_, ControlObject>(OBJECT_PATH)
        .await
    {
        Ok(iface) => iface,
        Err(e) => {
            error!(error = %e, "Control object missing, not forwarding signals");
            return;
        }
    };

    loop {
        match events.recv().await {
            Ok(event) => {
                debug!(?event, "Emitting signal");
                if let Err(e) = emit(iface.signal_emitter(), &event).await {
                    warn!(error = %e, "Failed to emit signal");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Signal forwarding fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Running D-Bus server; dropping it stops the server thread
pub struct DbusServer {
    thread_handle: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl DbusServer {
    /// Claim [`SERVICE_NAME`] and serve `service` until dropped
    ///
    /// Returns once the name is owned, or with the connection error.
    pub fn start(service: Arc<ControlService>) -> Result<Self, ControlError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("camfx-dbus")
            .enable_all()
            .build()
            .map_err(|e| ControlError::Runtime(e.to_string()))?;

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), ControlError>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let events = service.subscribe();

        let thread_handle = std::thread::Builder::new()
            .name("camfx-dbus".into())
            .spawn(move || {
                runtime.block_on(async move {
                    let connection = match connect(service).await {
                        Ok(connection) => {
                            let _ = ready_tx.send(Ok(()));
                            connection
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    tokio::select! {
                        _ = shutdown_rx => debug!("D-Bus server shutting down"),
                        _ = forward_events(connection, events) => {}
                    }
                });
            })
            .map_err(|e| ControlError::Runtime(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    service = SERVICE_NAME,
                    interface = INTERFACE_NAME,
                    path = OBJECT_PATH,
                    "D-Bus service started"
                );
                Ok(Self {
                    thread_handle: Some(thread_handle),
                    shutdown: Some(shutdown_tx),
                })
            }
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Err(_) => Err(ControlError::Runtime("D-Bus thread exited".into())),
        }
    }
}

async fn connect(service: Arc<ControlService>) -> Result<zbus::Connection, ControlError> {
    let connection = zbus::connection::Builder::session()?
        .name(SERVICE_NAME)?
        .serve_at(OBJECT_PATH, ControlObject { service })?
        .build()
        .await?;
    Ok(connection)
}

impl Drop for DbusServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread_handle.take()
            && handle.join().is_err()
        {
            warn!("D-Bus thread panicked");
        }
    }
}

/// Client side of [`INTERFACE_NAME`]
#[zbus::proxy(
    interface = "org.camfx.Control1",
    default_service = "org.camfx.Control1",
    default_path = "/org/camfx/Control1"
)]
pub trait Camfx {
    fn set_effect(&self, effect_type: &str, config: ValueMap) -> zbus::Result<bool>;

    fn add_effect(&self, effect_type: &str, config: ValueMap) -> zbus::Result<bool>;

    fn remove_effect(&self, index: i32) -> zbus::Result<bool>;

    fn remove_effect_by_type(&self, effect_type: &str) -> zbus::Result<bool>;

    fn clear_chain(&self) -> zbus::Result<bool>;

    fn get_current_effects(&self) -> zbus::Result<Vec<(String, String, ValueMap)>>;

    fn update_effect_parameter(
        &self,
        effect_type: &str,
        parameter: &str,
        value: &Value<'_>,
    ) -> zbus::Result<bool>;

    fn start_camera(&self) -> zbus::Result<bool>;

    fn stop_camera(&self) -> zbus::Result<bool>;

    fn get_camera_state(&self) -> zbus::Result<bool>;

    fn get_camera_config(&self) -> zbus::Result<(String, u32, u32, u32)>;

    fn apply_camera_config(
        &self,
        source: &str,
        width: u32,
        height: u32,
        fps: u32,
    ) -> zbus::Result<bool>;

    fn list_cameras(&self) -> zbus::Result<Vec<(String, String)>>;

    fn get_camera_modes(&self, source: &str) -> zbus::Result<Vec<(u32, u32, Vec<u32>)>>;
}

/// Connect to a running daemon
pub async fn client() -> Result<CamfxProxy<'static>, ControlError> {
    let connection = zbus::Connection::session().await?;
    Ok(CamfxProxy::new(&connection).await?)
}
