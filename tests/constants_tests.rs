// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for application constants

use camfx::constants::{camera, dbus, effects, queue, retry, timing};

#[test]
fn test_fallback_mode_is_common() {
    let (width, height, fps) = camera::FALLBACK_MODE;
    assert_eq!((width, height), (640, 480));
    assert!(camera::COMMON_FRAMERATES.contains(&fps));
}

#[test]
fn test_common_framerates_descending() {
    assert!(
        camera::COMMON_FRAMERATES.windows(2).all(|w| w[0] > w[1]),
        "Frame rates are listed highest first"
    );
}

#[test]
fn test_effect_ranges_contain_defaults() {
    assert!((effects::BRIGHTNESS_MIN..=effects::BRIGHTNESS_MAX).contains(&effects::BRIGHTNESS_DEFAULT));
    assert!((effects::CONTRAST_MIN..=effects::CONTRAST_MAX).contains(&effects::CONTRAST_DEFAULT));
    assert!(
        (effects::SMOOTHNESS_MIN..=effects::SMOOTHNESS_MAX).contains(&effects::SMOOTHNESS_DEFAULT)
    );
    assert!(effects::MIN_ZOOM_DEFAULT <= effects::MAX_ZOOM_DEFAULT);
}

#[test]
fn test_queue_and_retry_bounds() {
    assert_eq!(queue::CAPACITY, 2);
    assert!(retry::MAX_ATTEMPTS >= 1);
    assert!(timing::INPUT_START_TIMEOUT >= timing::OUTPUT_START_TIMEOUT);
}

#[test]
fn test_dbus_names_match() {
    assert_eq!(dbus::SERVICE_NAME, dbus::INTERFACE_NAME);
    assert!(dbus::OBJECT_PATH.starts_with('/'));
    assert_eq!(dbus::OBJECT_PATH.replace('/', ".").trim_start_matches('.'), dbus::SERVICE_NAME);
}

#[test]
fn test_version_starts_with_package_version() {
    let version = camfx::constants::app_info::version();
    if std::env::var("CAMFX_VERSION").is_err() {
        assert!(version.starts_with(env!("CARGO_PKG_VERSION")), "version {}", version);
    }
    assert!(!version.is_empty());
}
