// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Running the virtual camera daemon
//! - Previewing a camera with effects, without publishing
//! - Previewing the published virtual camera
//! - Listing cameras and their modes
//! - Controlling a running daemon over D-Bus

use camfx::backends::camera::{
    CameraConfig, CameraOpener, CameraSession, CapabilityCache, V4l2Opener, V4l2Probe,
};
use camfx::backends::virtual_camera::{PipeWireOutputFactory, RetryPolicy};
use camfx::config::DaemonConfig;
use camfx::control::dbus::{self, CamfxProxy, DbusServer, ValueMap};
use camfx::control::{ControlService, event_channel};
use camfx::effects::{EffectController, EffectKind, EffectParams, ParamValue};
use camfx::errors::{AppError, AppResult, ControlError};
use camfx::pipelines::{FrameProcessor, ProcessingLoop, run_camera_preview};
use camfx::preview::{TerminalPreview, run_virtual_preview};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use zbus::zvariant::Value;

/// Run the daemon until Ctrl+C
pub fn start(config: DaemonConfig) -> AppResult<()> {
    config.validate().map_err(AppError::Config)?;
    gstreamer::init().map_err(|e| AppError::Config(format!("GStreamer init failed: {}", e)))?;

    let events = event_channel();
    let effects = Arc::new(EffectController::new());
    let session = Arc::new(
        CameraSession::new(
            config.camera(),
            config.name.clone(),
            Arc::new(V4l2Opener),
            Arc::new(PipeWireOutputFactory),
            Arc::new(V4l2Probe),
        )?
        .with_events(events.clone()),
    );

    println!(
        "Publishing virtual camera '{}' at {}x{} @ {}fps",
        session.published_name(),
        config.width,
        config.height,
        config.fps
    );

    if config.start_camera {
        match session.start() {
            Ok(()) => println!("Camera {} started", config.source),
            Err(e) => {
                warn!(error = %e, "Camera did not start; sending black frames");
                println!("Camera not started: {}", e);
            }
        }
    } else {
        println!("Camera is off; start it with 'camfx camera-start'");
    }

    let service = Arc::new(ControlService::new(
        Arc::clone(&effects),
        Arc::clone(&session),
        events,
    ));
    let _dbus = if config.dbus {
        let server = DbusServer::start(service)?;
        println!("D-Bus control available at {}", camfx::constants::dbus::SERVICE_NAME);
        Some(server)
    } else {
        None
    };

    let mut processing = ProcessingLoop::new(session, effects);
    let stop = processing.stop_signal();
    stop_on_interrupt(Arc::clone(&stop))?;

    if config.preview {
        match TerminalPreview::new(&config.name, Arc::clone(&stop)) {
            Ok(preview) => processing = processing.with_preview(Box::new(preview)),
            Err(e) => warn!(error = %e, "Terminal preview unavailable"),
        }
    }

    processing.run();
    println!("Stopped.");
    Ok(())
}

fn stop_on_interrupt(stop: Arc<AtomicBool>) -> AppResult<()> {
    ctrlc::set_handler(move || {
        info!("Interrupt received, shutting down");
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|e| AppError::Config(format!("Failed to install Ctrl+C handler: {}", e)))
}

/// Run `effect` on a camera and show the result in the terminal
///
/// The effect chain lives in this process only; nothing is published.
pub fn preview_camera(config: CameraConfig, effect: Option<&str>, params: &[String]) -> AppResult<()> {
    config.validate().map_err(AppError::Config)?;

    let effects = Arc::new(EffectController::new());
    match effect {
        Some(kind) => effects.set(kind.parse::<EffectKind>()?, parse_params(params)?)?,
        None if !params.is_empty() => {
            return Err(AppError::Config("parameters given without an effect".into()));
        }
        None => {}
    }

    gstreamer::init().map_err(|e| AppError::Config(format!("GStreamer init failed: {}", e)))?;
    let source = V4l2Opener.open(&config)?;

    let stop = Arc::new(AtomicBool::new(false));
    stop_on_interrupt(Arc::clone(&stop))?;
    let preview = TerminalPreview::camera(&config.source.device_path(), Arc::clone(&stop))?;

    let shown = run_camera_preview(source, FrameProcessor::new(effects), Box::new(preview), stop)?;
    println!("Previewed {} frames from {}.", shown, config.source);
    Ok(())
}

/// Watch the published virtual camera in the terminal
pub fn preview_virtual(name: &str, policy: RetryPolicy) -> AppResult<()> {
    gstreamer::init().map_err(|e| AppError::Config(format!("GStreamer init failed: {}", e)))?;
    run_virtual_preview(name, policy)
}

/// List cameras with their modes
pub fn list_devices() -> AppResult<()> {
    let cache = CapabilityCache::new(Arc::new(V4l2Probe));
    let sources = cache.list_sources();

    if sources.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for source in &sources {
        println!("  {}", source.label);
        match cache.get_modes(&source.id) {
            Ok(modes) => {
                for mode in modes {
                    println!("      {}", mode);
                }
            }
            Err(e) => println!("      (modes unavailable: {})", e),
        }
        println!();
    }
    Ok(())
}

/// Parse `key=value` pairs; values are typed loosely (int, float, bool, text)
pub fn parse_params(pairs: &[String]) -> AppResult<EffectParams> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), ParamValue::parse_loose(v.trim())))
                .ok_or_else(|| AppError::Config(format!("expected key=value, got '{}'", pair)))
        })
        .collect()
}

/// Check the kind locally so typos fail before reaching the bus
fn check_kind(kind: &str) -> AppResult<()> {
    kind.parse::<EffectKind>()?;
    Ok(())
}

fn runtime() -> AppResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ControlError::Runtime(e.to_string()).into())
}

/// Run one client call against the daemon
fn with_client<T, F>(call: F) -> AppResult<T>
where
    F: AsyncFnOnce(&CamfxProxy<'static>) -> zbus::Result<T>,
{
    runtime()?.block_on(async {
        let proxy = dbus::client().await.map_err(|e| {
            AppError::Control(ControlError::Rejected(format!(
                "{}. Is 'camfx start --dbus' running?",
                e
            )))
        })?;
        let value = call(&proxy).await.map_err(ControlError::from)?;
        Ok::<T, AppError>(value)
    })
}

fn report(ok: bool, what: &str) -> AppResult<()> {
    if ok {
        println!("{}", what);
        Ok(())
    } else {
        Err(ControlError::Rejected(format!("{} failed; see daemon log", what)).into())
    }
}

pub fn set_effect(kind: &str, params: &[String]) -> AppResult<()> {
    check_kind(kind)?;
    let config: ValueMap = dbus::map_from_params(&parse_params(params)?);
    let ok = with_client(async |p| p.set_effect(kind, config).await)?;
    report(ok, &format!("Effect set: {}", kind))
}

pub fn add_effect(kind: &str, params: &[String]) -> AppResult<()> {
    check_kind(kind)?;
    let config: ValueMap = dbus::map_from_params(&parse_params(params)?);
    let ok = with_client(async |p| p.add_effect(kind, config).await)?;
    report(ok, &format!("Effect added: {}", kind))
}

pub fn remove_effect(index: Option<i32>, kind: Option<&str>) -> AppResult<()> {
    match (index, kind) {
        (Some(index), None) => {
            let ok = with_client(async |p| p.remove_effect(index).await)?;
            report(ok, &format!("Removed effect at index {}", index))
        }
        (None, Some(kind)) => {
            check_kind(kind)?;
            let ok = with_client(async |p| p.remove_effect_by_type(kind).await)?;
            if ok {
                println!("Removed effect: {}", kind);
            } else {
                println!("No {} effect in chain", kind);
            }
            Ok(())
        }
        _ => Err(AppError::Config(
            "give exactly one of --index or --effect".into(),
        )),
    }
}

pub fn get_effects() -> AppResult<()> {
    let effects = with_client(async |p| p.get_current_effects().await)?;
    if effects.is_empty() {
        println!("Effect chain is empty.");
        return Ok(());
    }
    for (index, (kind, name, config)) in effects.iter().enumerate() {
        let mut params: Vec<String> = dbus::params_from_map(config)
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        params.sort();
        println!("  [{}] {} ({}) {}", index, kind, name, params.join(" "));
    }
    Ok(())
}

pub fn update_param(kind: &str, name: &str, value: &str) -> AppResult<()> {
    check_kind(kind)?;
    let param = ParamValue::parse_loose(value);
    let value = dbus::value_from_param(&param)
        .ok_or_else(|| AppError::Config(format!("unsupported value '{}'", value)))?;
    let ok = with_client(async |p| {
        p.update_effect_parameter(kind, name, &Value::from(value)).await
    })?;
    report(ok, &format!("Updated {}.{} = {}", kind, name, param))
}

pub fn camera_start() -> AppResult<()> {
    let ok = with_client(async |p| p.start_camera().await)?;
    report(ok, "Camera started")
}

pub fn camera_stop() -> AppResult<()> {
    let ok = with_client(async |p| p.stop_camera().await)?;
    report(ok, "Camera stopped")
}

pub fn camera_status() -> AppResult<()> {
    let (active, (source, width, height, fps)) = with_client(async |p| {
        Ok((p.get_camera_state().await?, p.get_camera_config().await?))
    })?;
    println!(
        "Camera {}: {} {}x{} @ {}fps",
        if active { "on" } else { "off" },
        source,
        width,
        height,
        fps
    );
    Ok(())
}

pub fn camera_config(source: &str, width: u32, height: u32, fps: u32) -> AppResult<()> {
    let ok = with_client(async |p| p.apply_camera_config(source, width, height, fps).await)?;
    report(
        ok,
        &format!("Camera config applied: {} {}x{} @ {}fps", source, width, height, fps),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params_types() {
        let params = parse_params(&[
            "strength=9".to_string(),
            "contrast=1.5".to_string(),
            "face_only=true".to_string(),
            "background=/tmp/bg.png".to_string(),
        ])
        .unwrap();
        assert_eq!(params.get("strength"), Some(&ParamValue::Int(9)));
        assert_eq!(params.get("contrast"), Some(&ParamValue::Float(1.5)));
        assert_eq!(params.get("face_only"), Some(&ParamValue::Bool(true)));
        assert_eq!(
            params.get("background"),
            Some(&ParamValue::Text("/tmp/bg.png".into()))
        );
    }

    #[test]
    fn test_parse_params_rejects_bare_word() {
        assert!(parse_params(&["strength".to_string()]).is_err());
    }
}
