// SPDX-License-Identifier: MPL-2.0

//! Capture source abstraction
//!
//! Physical device configuration lives outside this crate. The pipeline only
//! needs what a capture source must provide when it calls into, or is called
//! by, the recording core:
//!
//! ```text
//! ┌──────────────────────┐   push callback (capture thread)
//! │    CaptureSource     │ ───────────────────────────────▶ CaptureController
//! │  - start / stop      │
//! │  - timestamp origin  │ ◀─── gates "start recording"
//! │  - switch / torch    │
//! └──────────────────────┘
//! ```

pub mod frame_loop;
pub mod test_pattern;
pub mod types;

pub use test_pattern::TestPatternSource;
pub use types::*;

use std::sync::Arc;

/// Callback invoked on the capture thread for every delivered frame
pub type FrameCallback = Arc<dyn Fn(Frame) + Send + Sync>;

/// A live camera session as seen by the recording core
///
/// Frames are pushed through the callback installed by [`CaptureSource::start`]
/// on a thread owned by the source. Implementations must not call the
/// callback from inside `start` or `stop`.
pub trait CaptureSource: Send + Sync {
    /// Start (or restart) the session and begin delivering frames
    ///
    /// Returning `Ok` is the readiness signal; an error is the failure signal.
    fn start(&self, on_frame: FrameCallback) -> DeviceResult<()>;

    /// Stop delivering frames. Stopping a stopped session is a no-op.
    fn stop(&self);

    /// Whether frames are currently being delivered
    fn is_running(&self) -> bool;

    /// Current time of the session's synchronization clock
    ///
    /// `None` when no clock is available, in which case recording cannot start.
    fn timestamp_origin(&self) -> Option<Timestamp>;

    /// Switch between front and back cameras
    fn switch_camera(&self) -> DeviceResult<()> {
        Err(DeviceError::NotAvailable(
            "camera switching not supported".into(),
        ))
    }

    /// Toggle the torch, returning the new mode
    fn toggle_torch(&self) -> DeviceResult<TorchMode> {
        Err(DeviceError::TorchFailed("torch not supported".into()))
    }
}
