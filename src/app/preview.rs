// SPDX-License-Identifier: GPL-3.0-only

//! Presentation sink for processed preview frames

use crate::backends::camera::types::Frame;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// Receives the latest preview frame
///
/// Push only. A sink that cannot take a frame right now just skips it.
pub trait PresentationSink: Send + Sync {
    /// Returns whether the frame was taken
    fn present(&self, frame: Frame) -> bool;
}

/// Sink that discards every frame
#[derive(Debug, Default)]
pub struct NullPresentationSink;

impl PresentationSink for NullPresentationSink {
    fn present(&self, _frame: Frame) -> bool {
        false
    }
}

/// Forwards frames over a bounded channel, dropping them when it is full
pub struct ChannelPresentationSink {
    sender: mpsc::Sender<Frame>,
    skipped: AtomicU64,
}

impl ChannelPresentationSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                skipped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Frames skipped because the receiver was busy or gone
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

impl PresentationSink for ChannelPresentationSink {
    fn present(&self, frame: Frame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                let n = self.skipped.fetch_add(1, Ordering::Relaxed) + 1;
                if n % 100 == 1 {
                    debug!(skipped = n, reason = %e, "Preview frame skipped");
                }
                false
            }
        }
    }
}
