// SPDX-License-Identifier: GPL-3.0-only

//! Error types for camfx
//!
//! Each layer has its own error enum and `Result` alias. [`AppError`] wraps
//! them all for the command-line entry points.

use thiserror::Error;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
/// Result type for effect chain operations
pub type EffectResult<T> = Result<T, EffectError>;
/// Result type for physical camera operations
pub type CameraResult<T> = Result<T, CameraError>;
/// Result type for the virtual camera output adapter
pub type OutputResult<T> = Result<T, OutputError>;
/// Result type for the virtual camera input adapter
pub type InputResult<T> = Result<T, InputError>;

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Effect error: {0}")]
    Effect(#[from] EffectError),
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("Virtual camera output error: {0}")]
    Output(#[from] OutputError),
    #[error("Virtual camera input error: {0}")]
    Input(#[from] InputError),
    #[error("Control error: {0}")]
    Control(#[from] ControlError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Effect configuration and processing errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EffectError {
    /// Effect kind string is not one of the known kinds
    #[error("Unknown effect type: {0}")]
    UnknownKind(String),
    /// A parameter failed validation; the chain is left unchanged
    #[error("Invalid parameter '{name}' for {kind}: {reason}")]
    InvalidParameter {
        kind: String,
        name: String,
        reason: String,
    },
    /// The chain has no entry of the requested kind
    #[error("Effect type '{0}' not found in chain")]
    NotFound(String),
    /// Mask dimensions differ from the frame
    #[error("Mask size {mask_width}x{mask_height} does not match frame {width}x{height}")]
    MaskSizeMismatch {
        width: u32,
        height: u32,
        mask_width: u32,
        mask_height: u32,
    },
    /// Replacement background could not be loaded
    #[error("Failed to load background image '{path}': {reason}")]
    BackgroundLoad { path: String, reason: String },
    /// Frame buffer does not have the expected shape
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Physical camera errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CameraError {
    /// Camera is busy or in use by another process
    #[error("Camera {0} is busy")]
    Busy(String),
    /// Camera device does not exist
    #[error("Camera {0} not found")]
    NotFound(String),
    /// Camera could not be opened for another reason
    #[error("Failed to open camera: {0}")]
    Open(String),
    /// Reading a frame failed
    #[error("Failed to read frame: {0}")]
    Read(String),
    /// Capability probing failed
    #[error("Failed to probe camera capabilities: {0}")]
    Probe(String),
}

/// Virtual camera output errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OutputError {
    /// Pipeline could not be built
    #[error("Failed to create virtual camera pipeline: {0}")]
    Init(String),
    /// Pipeline did not reach the running state in time
    #[error("Virtual camera did not start within the timeout (state: {state}). {guidance}")]
    StartTimeout { state: String, guidance: String },
    /// Pipeline reported an error while starting
    #[error("Virtual camera pipeline error: {message}. {guidance}")]
    StateChange { message: String, guidance: String },
    /// Buffer length differs from width * height * 3
    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    /// Pipeline is flushing, usually during shutdown
    #[error("Virtual camera pipeline is flushing")]
    Flushing,
    /// Pipeline reached end-of-stream
    #[error("Virtual camera pipeline reached end of stream")]
    Eos,
    /// Any other push failure
    #[error("Failed to push frame: {0}")]
    Push(String),
    /// Adapter was already cleaned up
    #[error("Virtual camera output is closed")]
    Closed,
}

/// Virtual camera input errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    /// No published video source with the given name exists
    #[error("Virtual camera '{0}' not found. Make sure 'camfx start' is running.")]
    NotFound(String),
    /// Querying the media bus failed
    #[error("Failed to query PipeWire nodes: {0}")]
    Discovery(String),
    /// Pipeline creation or start failed
    #[error("Failed to attach to virtual camera: {0}")]
    Pipeline(String),
    /// All retry attempts failed with a transient error
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
    /// Adapter was already released
    #[error("Virtual camera input is closed")]
    Closed,
}

impl InputError {
    /// Whether the error means the source does not exist (as opposed to being busy)
    pub fn is_not_found(&self) -> bool {
        matches!(self, InputError::NotFound(_))
    }
}

/// Remote control transport errors
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("D-Bus error: {0}")]
    Bus(#[from] zbus::Error),
    #[error("D-Bus value error: {0}")]
    Value(#[from] zbus::zvariant::Error),
    #[error("Request rejected by camfx: {0}")]
    Rejected(String),
    #[error("Failed to start control runtime: {0}")]
    Runtime(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_mismatch_message() {
        let err = OutputError::SizeMismatch {
            expected: 2_764_800,
            actual: 100,
        };
        assert_eq!(
            err.to_string(),
            "Frame size mismatch: expected 2764800 bytes, got 100"
        );
    }

    #[test]
    fn test_app_error_wraps_layers() {
        let err: AppError = EffectError::NotFound("blur".into()).into();
        assert!(err.to_string().contains("Effect type 'blur' not found in chain"));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(InputError::NotFound("camfx".into()).is_not_found());
        assert!(!InputError::Pipeline("busy".into()).is_not_found());
    }
}
