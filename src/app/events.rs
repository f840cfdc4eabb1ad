// SPDX-License-Identifier: GPL-3.0-only

//! Notifications for the UI collaborator

use crate::errors::AppError;
use crate::pipelines::video::Artifact;
use tokio::sync::mpsc;

/// What the capture controller reports back
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Capture session running and recorder prepared
    ReadyToRecord,
    RecordingStarted,
    /// PNG-encoded still of the latest preview frame
    PhotoCaptured { png: Vec<u8> },
    VideoCaptured { artifact: Artifact },
    /// Terminal failure for the current session
    Failed(AppError),
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
