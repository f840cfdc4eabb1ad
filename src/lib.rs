// SPDX-License-Identifier: MPL-2.0

//! camkit - real-time camera capture and recording pipeline
//!
//! Frames pushed by a capture source are optionally segmented and composited
//! against a background, shown on a preview sink, and, while recording,
//! appended to a video container through a strictly ordered worker.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`app`]: capture controller and pipeline state machine
//! - [`backends`]: capture source and segmentation backend abstraction
//! - [`pipelines`]: filter stage and video recording pipeline
//! - [`config`]: user configuration handling
//! - [`storage`]: temporary recording paths and artifact persistence
//!
//! # Example
//!
//! ```ignore
//! let (controller, mut events) = CaptureController::new(source, recorder, backend, preview, settings);
//! controller.restart_capture_session().await;
//! controller.record_video_tapped().await;
//! ```

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod storage;

// Re-export commonly used types
pub use app::{CaptureController, CaptureSettings, PipelineState, SessionEvent};
pub use backends::camera::types::{Frame, Timestamp, VideoFilter};
pub use config::Config;
pub use constants::BitratePreset;
pub use errors::{AppError, AppResult};
pub use pipelines::video::{Artifact, RecordingController, RenderTarget};
