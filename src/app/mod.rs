// SPDX-License-Identifier: GPL-3.0-only

//! Capture session coordination
//!
//! - [`state`]: pipeline state machine
//! - [`controller`]: wires capture, filtering, preview and recording
//! - [`preview`]: presentation sink for processed frames
//! - [`events`]: notifications for the UI collaborator

pub mod controller;
pub mod events;
pub mod preview;
pub mod state;

pub use controller::{CaptureController, CaptureSettings};
pub use events::{EventReceiver, EventSender, SessionEvent};
pub use preview::{ChannelPresentationSink, NullPresentationSink, PresentationSink};
pub use state::{CaptureStateMachine, PipelineState};
