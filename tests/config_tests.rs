// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the daemon configuration

use camfx::DaemonConfig;
use camfx::backends::camera::CameraSource;

#[test]
fn test_config_default() {
    let config = DaemonConfig::default();

    assert_eq!(config.source, CameraSource::new("0"));
    assert_eq!((config.width, config.height, config.fps), (1280, 720, 30));
    assert_eq!(config.name, "camfx");
    assert!(!config.start_camera, "Camera should start closed by default");
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_camera_view() {
    let config = DaemonConfig {
        source: CameraSource::new("1"),
        width: 640,
        height: 480,
        fps: 15,
        ..DaemonConfig::default()
    };

    let camera = config.camera();
    assert_eq!(camera.source, CameraSource::new("1"));
    assert_eq!((camera.width, camera.height, camera.fps), (640, 480, 15));
}

#[test]
fn test_config_rejects_unusable_values() {
    let zero_width = DaemonConfig {
        width: 0,
        ..DaemonConfig::default()
    };
    let zero_fps = DaemonConfig {
        fps: 0,
        ..DaemonConfig::default()
    };
    let oversized = DaemonConfig {
        width: 100_000,
        ..DaemonConfig::default()
    };
    let blank_name = DaemonConfig {
        name: "  ".into(),
        ..DaemonConfig::default()
    };

    assert!(zero_width.validate().is_err());
    assert!(zero_fps.validate().is_err());
    assert!(oversized.validate().is_err());
    assert!(blank_name.validate().is_err());
}

#[test]
fn test_config_serialization() {
    let config = DaemonConfig {
        source: CameraSource::new("/dev/video2"),
        dbus: true,
        ..DaemonConfig::default()
    };

    let json = serde_json::to_string(&config).unwrap();
    let parsed: DaemonConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}
