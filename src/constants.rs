// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Camera defaults used when the command line does not specify a mode
pub mod camera {
    /// Default capture width
    pub const DEFAULT_WIDTH: u32 = 1280;

    /// Default capture height
    pub const DEFAULT_HEIGHT: u32 = 720;

    /// Default target frame rate
    pub const DEFAULT_FPS: u32 = 30;

    /// Largest accepted capture size (8K UHD)
    pub const MAX_WIDTH: u32 = 7680;
    pub const MAX_HEIGHT: u32 = 4320;

    /// Highest accepted frame rate
    pub const MAX_FPS: u32 = 240;

    /// Frame rates offered when a device does not report any
    pub const COMMON_FRAMERATES: &[u32] = &[60, 30, 24, 15];

    /// Mode reported when probing finds nothing usable
    pub const FALLBACK_MODE: (u32, u32, u32) = (640, 480, 30);

    /// Consecutive read failures after which an open camera is closed
    pub const MAX_CONSECUTIVE_READ_FAILURES: u32 = 60;

    /// sysfs directory holding V4L2 device names
    pub const SYSFS_VIDEO4LINUX: &str = "/sys/class/video4linux";
}

/// GStreamer pipeline settings
pub mod pipeline {
    /// Maximum buffers queued in appsink (older frames are dropped)
    pub const MAX_BUFFERS: u32 = 1;

    /// PipeWire media class of the published node
    pub const MEDIA_CLASS: &str = "Video/Source";

    /// PipeWire media role of the published node
    pub const MEDIA_ROLE: &str = "Camera";

    /// Default name the virtual camera is published under
    pub const DEFAULT_PUBLISHED_NAME: &str = "camfx";
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Frame logging interval (log every N frames)
    pub const FRAME_LOG_INTERVAL: u64 = 300;

    /// Bounded wait for the output pipeline to reach PLAYING
    pub const OUTPUT_START_TIMEOUT: Duration = Duration::from_secs(5);

    /// Poll interval while waiting for an asynchronous state change
    pub const STATE_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Bounded wait for the input pipeline to reach PLAYING
    pub const INPUT_START_TIMEOUT: Duration = Duration::from_secs(10);

    /// Bounded wait for the physical camera pipeline to reach PLAYING
    pub const CAMERA_START_TIMEOUT: Duration = Duration::from_secs(5);

    /// Bounded wait for one camera frame
    pub const CAMERA_READ_TIMEOUT: Duration = Duration::from_millis(500);

    /// Sleep between ticks while the camera is off
    pub const INACTIVE_TICK: Duration = Duration::from_millis(33);

    /// Sleep after a failed camera read
    pub const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

    /// Bounded wait for the frame queue in the input adapter
    pub const QUEUE_WAIT: Duration = Duration::from_millis(50);

    /// Bounded wait for a manual pull when the queue is empty
    pub const MANUAL_PULL_TIMEOUT: Duration = Duration::from_millis(10);
}

/// Input adapter retry policy defaults
pub mod retry {
    use super::Duration;

    /// Attempts made before giving up
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Delay after the first failed attempt; later delays grow linearly
    pub const BASE_DELAY: Duration = Duration::from_millis(500);
}

/// Frame queue settings
pub mod queue {
    /// Frames retained between producer and consumer
    pub const CAPACITY: usize = 2;
}

/// Remote control names
pub mod dbus {
    /// Well-known bus name
    pub const SERVICE_NAME: &str = "org.camfx.Control1";

    /// Object path of the control object
    pub const OBJECT_PATH: &str = "/org/camfx/Control1";

    /// Interface name
    pub const INTERFACE_NAME: &str = "org.camfx.Control1";

    /// Capacity of the change notification channel
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;
}

/// Default and limit values for effect parameters
pub mod effects {
    /// Blur kernel size
    pub const BLUR_STRENGTH_DEFAULT: i64 = 25;
    pub const BLUR_STRENGTH_MIN: i64 = 3;
    pub const BLUR_STRENGTH_MAX: i64 = 51;

    /// Brightness offset
    pub const BRIGHTNESS_DEFAULT: i64 = 0;
    pub const BRIGHTNESS_MIN: i64 = -100;
    pub const BRIGHTNESS_MAX: i64 = 100;

    /// Contrast factor
    pub const CONTRAST_DEFAULT: f64 = 1.0;
    pub const CONTRAST_MIN: f64 = 0.5;
    pub const CONTRAST_MAX: f64 = 2.0;

    /// Beautify smoothing radius
    pub const SMOOTHNESS_DEFAULT: i64 = 5;
    pub const SMOOTHNESS_MIN: i64 = 1;
    pub const SMOOTHNESS_MAX: i64 = 15;

    /// Auto-framing
    pub const PADDING_DEFAULT: f64 = 0.3;
    pub const MIN_ZOOM_DEFAULT: f64 = 1.0;
    pub const MAX_ZOOM_DEFAULT: f64 = 2.0;

    /// Gaze correction strength
    pub const GAZE_STRENGTH_DEFAULT: f64 = 0.5;

    /// Smoothing factor applied to successive face boxes (weight of the new box)
    pub const FACE_SMOOTHING: f32 = 0.4;

    /// Width of the soft edge on generated masks, as a fraction of the radius
    pub const MASK_FEATHER: f32 = 0.15;
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
