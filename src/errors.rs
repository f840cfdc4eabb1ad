// SPDX-License-Identifier: MPL-2.0

//! Error types for the capture and recording pipeline
//!
//! Each layer has its own error enum. [`AppError`] is what the session
//! delegate finally sees.

use std::path::PathBuf;
use thiserror::Error;

pub use crate::backends::camera::types::{DeviceError, DeviceResult};
pub use crate::backends::segmentation::FilterError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type for container backends
pub type SinkResult<T> = Result<T, SinkError>;

/// Result type for encoder operations
pub type EncoderResult<T> = Result<T, EncoderError>;

/// Main application error type
#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("Camera error: {0}")]
    Device(#[from] DeviceError),
    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("Recording failed: {0}")]
    Recording(#[from] RecordingFailedError),
    #[error("Task error: {0}")]
    Task(#[from] TaskError),
    #[error("Photo error: {0}")]
    Photo(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors raised by a container backend (muxer + encoder + file)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// Codec, dimensions or frame rate not supported by the backend
    #[error("Unsupported configuration: {0}")]
    Unsupported(String),
    /// Output could not be created
    #[error("Failed to create output: {0}")]
    Create(String),
    /// Backend failed while running
    #[error("Pipeline error: {0}")]
    Pipeline(String),
    /// Container could not be finalized
    #[error("Failed to finalize output: {0}")]
    Finalize(String),
}

/// Errors from `Encoder::initialize`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncoderInitError {
    #[error("Invalid render target: {0}")]
    InvalidTarget(String),
    #[error("Cannot prepare destination {}: {reason}", path.display())]
    Destination { path: PathBuf, reason: String },
    #[error("Encoder session already in progress")]
    SessionInProgress,
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Encoder lifecycle calls made out of order
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum EncoderStateError {
    #[error("Encoder not initialized")]
    NotInitialized,
    #[error("Encoder session not started")]
    NotStarted,
    #[error("Encoder session already started")]
    AlreadyStarted,
    #[error("Encoder already finished")]
    Finished,
}

/// Any failure of an encoder operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncoderError {
    #[error(transparent)]
    Init(#[from] EncoderInitError),
    #[error(transparent)]
    State(#[from] EncoderStateError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Failures of the serialized task queue itself
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// The worker has shut down and will not run the task
    #[error("Task queue closed")]
    QueueClosed,
    /// The task panicked on the worker
    #[error("Task panicked: {0}")]
    Panicked(String),
}

/// A recording that could not produce an artifact
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordingFailedError {
    #[error("No frames were recorded")]
    NoFrames,
    #[error("No first frame snapshot")]
    NoFirstFrame,
    #[error("Not recording")]
    NotRecording,
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl From<EncoderStateError> for RecordingFailedError {
    fn from(e: EncoderStateError) -> Self {
        RecordingFailedError::Encoder(e.into())
    }
}

impl From<SinkError> for RecordingFailedError {
    fn from(e: SinkError) -> Self {
        RecordingFailedError::Encoder(e.into())
    }
}

impl From<SinkError> for AppError {
    fn from(e: SinkError) -> Self {
        AppError::Encoder(e.into())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_conversion() {
        let err: RecordingFailedError = EncoderStateError::NotStarted.into();
        assert_eq!(
            err,
            RecordingFailedError::Encoder(EncoderError::State(EncoderStateError::NotStarted))
        );
        let app: AppError = err.into();
        assert!(app.to_string().contains("not started"));
    }

    #[test]
    fn test_destination_display_includes_path() {
        let err = EncoderInitError::Destination {
            path: PathBuf::from("/tmp/x.mp4"),
            reason: "read-only".into(),
        };
        assert!(err.to_string().contains("/tmp/x.mp4"));
    }
}
