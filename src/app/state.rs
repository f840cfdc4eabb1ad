// SPDX-License-Identifier: GPL-3.0-only

//! Capture pipeline state machine
//!
//! ```text
//!                 ready + prepared
//! Initializing ────────────────────▶ ReadyToRecord ──start──▶ Recording
//!      │  ▲                                                     │ stop /
//!      │  └──────────── artifact delivered ◀─── Saving ◀────────┘ screen hidden
//!      │ failure                                  │ no artifact
//!      ▼                                          ▼
//!     Idle ◀──────────── any failure ──────────── Idle
//! ```
//!
//! Requests that do not apply to the current state are ignored. The machine
//! never retries on its own.

use crate::backends::camera::types::Timestamp;
use tracing::{debug, info};

/// Externally observable pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Initializing,
    Idle,
    ReadyToRecord,
    Recording,
    Saving,
}

impl PipelineState {
    pub fn is_recording(&self) -> bool {
        matches!(self, PipelineState::Recording)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Initializing => "initializing",
            PipelineState::Idle => "idle",
            PipelineState::ReadyToRecord => "readyToRecord",
            PipelineState::Recording => "recording",
            PipelineState::Saving => "saving",
        };
        f.write_str(name)
    }
}

/// Transition rules for [`PipelineState`]
#[derive(Debug, Default)]
pub struct CaptureStateMachine {
    state: PipelineState,
    /// Set while a start has been accepted but the recorder has not confirmed
    start_pending: bool,
}

impl CaptureStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn set(&mut self, to: PipelineState) {
        if self.state != to {
            debug!(from = %self.state, to = %to, "Pipeline state transition");
            self.state = to;
        }
    }

    /// A capture session is being (re)started
    pub fn restart(&mut self) {
        self.start_pending = false;
        self.set(PipelineState::Initializing);
    }

    /// Capture session is ready and the recorder was prepared
    ///
    /// Returns whether the state changed.
    pub fn session_ready(&mut self) -> bool {
        if self.state != PipelineState::Initializing {
            debug!(state = %self.state, "Ignoring session ready outside initialization");
            return false;
        }
        self.set(PipelineState::ReadyToRecord);
        true
    }

    /// Any failure: camera setup, torch, switch or recorder
    pub fn fail(&mut self) {
        self.start_pending = false;
        self.set(PipelineState::Idle);
    }

    /// User asked to start recording
    ///
    /// Returns the origin to start the recorder at if the request is accepted.
    /// Rejected silently when not ready, already starting, or when the
    /// session has no synchronization clock.
    pub fn request_start(&mut self, clock: Option<Timestamp>) -> Option<Timestamp> {
        if self.state != PipelineState::ReadyToRecord || self.start_pending {
            debug!(state = %self.state, "Ignoring start request");
            return None;
        }
        let Some(origin) = clock else {
            info!("No synchronization clock, cannot start recording");
            return None;
        };
        self.start_pending = true;
        Some(origin)
    }

    /// Recorder confirmed the session started
    pub fn recording_started(&mut self) -> bool {
        if !self.start_pending {
            return false;
        }
        self.start_pending = false;
        self.set(PipelineState::Recording);
        true
    }

    /// User or visibility change asked to stop
    ///
    /// Returns whether the recorder should be stopped.
    pub fn request_stop(&mut self) -> bool {
        if self.state != PipelineState::Recording {
            debug!(state = %self.state, "Ignoring stop request");
            return false;
        }
        self.set(PipelineState::Saving);
        true
    }

    /// Artifact delivered; next session starts from initialization
    pub fn saved(&mut self) {
        if self.state == PipelineState::Saving {
            self.set(PipelineState::Initializing);
        }
    }

    /// Saving produced no artifact
    pub fn save_failed(&mut self) {
        if self.state == PipelineState::Saving {
            self.set(PipelineState::Idle);
        }
    }

    /// Photos may be taken in any state except while saving
    pub fn can_take_photo(&self) -> bool {
        self.state != PipelineState::Saving
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> CaptureStateMachine {
        let mut sm = CaptureStateMachine::new();
        assert!(sm.session_ready());
        sm
    }

    #[test]
    fn test_happy_path() {
        let mut sm = ready();
        assert_eq!(sm.state(), PipelineState::ReadyToRecord);

        let origin = sm.request_start(Some(Timestamp::from_millis(5)));
        assert_eq!(origin, Some(Timestamp::from_millis(5)));
        assert!(sm.recording_started());
        assert_eq!(sm.state(), PipelineState::Recording);

        assert!(sm.request_stop());
        assert_eq!(sm.state(), PipelineState::Saving);
        sm.saved();
        assert_eq!(sm.state(), PipelineState::Initializing);
    }

    #[test]
    fn test_stop_ignored_when_idle_or_initializing() {
        let mut sm = CaptureStateMachine::new();
        assert!(!sm.request_stop());
        assert_eq!(sm.state(), PipelineState::Initializing);

        sm.fail();
        assert!(!sm.request_stop());
        assert_eq!(sm.state(), PipelineState::Idle);
    }

    #[test]
    fn test_start_ignored_while_recording() {
        let mut sm = ready();
        sm.request_start(Some(Timestamp::ZERO));
        sm.recording_started();
        assert_eq!(sm.request_start(Some(Timestamp::ZERO)), None);
        assert_eq!(sm.state(), PipelineState::Recording);
    }

    #[test]
    fn test_start_without_clock_rejected() {
        let mut sm = ready();
        assert_eq!(sm.request_start(None), None);
        assert_eq!(sm.state(), PipelineState::ReadyToRecord);
        assert!(!sm.recording_started());
    }

    #[test]
    fn test_duplicate_start_while_pending() {
        let mut sm = ready();
        assert!(sm.request_start(Some(Timestamp::ZERO)).is_some());
        assert!(sm.request_start(Some(Timestamp::ZERO)).is_none());
    }

    #[test]
    fn test_failure_resets_from_any_state() {
        let mut sm = ready();
        sm.request_start(Some(Timestamp::ZERO));
        sm.recording_started();
        sm.fail();
        assert_eq!(sm.state(), PipelineState::Idle);
        assert!(!sm.session_ready());
    }

    #[test]
    fn test_save_failure_goes_idle() {
        let mut sm = ready();
        sm.request_start(Some(Timestamp::ZERO));
        sm.recording_started();
        sm.request_stop();
        assert!(!sm.can_take_photo());
        sm.save_failed();
        assert_eq!(sm.state(), PipelineState::Idle);
    }
}
