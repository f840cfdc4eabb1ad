// SPDX-License-Identifier: GPL-3.0-only

//! Capture controller
//!
//! Ties the capture source, filter stage, preview sink and recorder together
//! and owns the [`CaptureStateMachine`]. Frames arrive on the source's
//! capture thread through [`CaptureController::handle_frame`]; user actions
//! arrive as async calls and are serialized against each other. Outcomes are
//! reported as [`SessionEvent`]s.

use super::events::{EventReceiver, EventSender, SessionEvent, event_channel};
use super::preview::PresentationSink;
use super::state::{CaptureStateMachine, PipelineState};
use crate::backends::camera::types::{DeviceError, Frame, TorchMode, VideoFilter};
use crate::backends::camera::{CaptureSource, FrameCallback};
use crate::backends::segmentation::FilterBackend;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::AppError;
use crate::pipelines::filter::{Background, FilterStage, FrameBlender};
use crate::pipelines::video::{RecordingController, RenderTarget, SinkFactory};
use crate::storage::encode_png;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, info, warn};

/// How frames are processed for a session
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub target: RenderTarget,
    pub filter: VideoFilter,
    /// Mirror the preview (not the recording) left/right
    pub mirror_preview: bool,
}

struct Inner<F: SinkFactory> {
    source: Arc<dyn CaptureSource>,
    recorder: RecordingController<F>,
    target: RenderTarget,
    preview_stage: FilterStage,
    record_stage: FilterStage,
    preview: Arc<dyn PresentationSink>,
    events: EventSender,
    state: Mutex<CaptureStateMachine>,
    /// Serializes user actions
    actions: tokio::sync::Mutex<()>,
    latest_preview: Mutex<Option<Frame>>,
    frames_seen: AtomicU64,
}

/// Coordinator owning the capture pipeline state
pub struct CaptureController<F: SinkFactory> {
    inner: Arc<Inner<F>>,
}

impl<F: SinkFactory> Clone for CaptureController<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: SinkFactory> CaptureController<F> {
    pub fn new(
        source: Arc<dyn CaptureSource>,
        recorder: RecordingController<F>,
        backend: Arc<dyn FilterBackend>,
        preview: Arc<dyn PresentationSink>,
        settings: CaptureSettings,
    ) -> (Self, EventReceiver) {
        let (events, receiver) = event_channel();
        let blender = FrameBlender::new(Background::Matte);
        let inner = Inner {
            source,
            recorder,
            target: settings.target,
            preview_stage: FilterStage::new(settings.filter, Arc::clone(&backend), blender)
                .with_mirror(settings.mirror_preview),
            record_stage: FilterStage::new(settings.filter, backend, blender),
            preview,
            events,
            state: Mutex::new(CaptureStateMachine::new()),
            actions: tokio::sync::Mutex::new(()),
            latest_preview: Mutex::new(None),
            frames_seen: AtomicU64::new(0),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            receiver,
        )
    }

    pub fn state(&self) -> PipelineState {
        self.inner.with_state(|sm| sm.state())
    }

    /// Start (or restart) the capture session and prepare the recorder
    pub async fn restart_capture_session(&self) {
        let _guard = self.inner.actions.lock().await;
        self.inner.restart().await;
    }

    /// Start recording when ready, stop when recording, otherwise ignore
    ///
    /// A delivered artifact lives at the temporary recording path until the
    /// next [`restart_capture_session`](Self::restart_capture_session), which
    /// prepares the recorder again and overwrites it.
    pub async fn record_video_tapped(&self) {
        let _guard = self.inner.actions.lock().await;
        match self.state() {
            PipelineState::ReadyToRecord => self.inner.start_recording().await,
            PipelineState::Recording => self.inner.stop_recording().await,
            state => debug!(state = %state, "Record tapped with nothing to do"),
        }
    }

    /// Capture the latest preview frame as a PNG
    ///
    /// Returns whether a photo was taken. Ignored while saving and before the
    /// first frame has arrived.
    pub async fn take_picture_tapped(&self) -> bool {
        if !self.inner.with_state(|sm| sm.can_take_photo()) {
            debug!("Ignoring photo request while saving");
            return false;
        }
        let Some(frame) = self
            .inner
            .latest_preview
            .lock()
            .ok()
            .and_then(|f| f.clone())
        else {
            debug!("No preview frame to capture");
            return false;
        };

        let encoded = tokio::task::spawn_blocking(move || encode_png(&frame)).await;
        match encoded {
            Ok(Ok(png)) => {
                info!(bytes = png.len(), "Photo captured");
                self.inner.emit(SessionEvent::PhotoCaptured { png });
                true
            }
            Ok(Err(e)) => {
                self.inner.emit(SessionEvent::Failed(e));
                false
            }
            Err(e) => {
                self.inner
                    .emit(SessionEvent::Failed(AppError::Photo(e.to_string())));
                false
            }
        }
    }

    /// Switch between front and back cameras and restart the session
    ///
    /// Ignored while recording or saving.
    pub async fn switch_camera(&self) {
        let _guard = self.inner.actions.lock().await;
        if matches!(
            self.state(),
            PipelineState::Recording | PipelineState::Saving
        ) {
            debug!("Ignoring camera switch during recording");
            return;
        }
        match self.inner.source.switch_camera() {
            Ok(()) => self.inner.restart().await,
            Err(e) => {
                self.inner.fail(e.into()).await;
            }
        }
    }

    /// Toggle the torch, returning the new mode on success
    pub async fn switch_torch(&self) -> Option<TorchMode> {
        let _guard = self.inner.actions.lock().await;
        match self.inner.source.toggle_torch() {
            Ok(mode) => {
                info!(torch = ?mode, "Torch toggled");
                Some(mode)
            }
            Err(e) => {
                self.inner.fail(e.into()).await;
                None
            }
        }
    }

    /// The view went away: finish any recording and stop the camera
    pub async fn screen_hidden(&self) {
        let _guard = self.inner.actions.lock().await;
        info!("Screen hidden, stopping capture");
        self.inner.stop_recording().await;
        if self.inner.recorder.abort().await {
            warn!("Discarded a recording that was still open");
        }
        self.inner.source.stop();
    }

    /// The capture source failed outside of an action
    ///
    /// Any recording in progress is discarded and the state goes to idle.
    pub fn report_session_failure(&self, error: DeviceError) {
        // The recorder teardown is queued before this returns
        drop(self.inner.fail(error.into()));
    }

    /// Capture-thread entry point for every delivered frame
    pub fn handle_frame(&self, frame: Frame) {
        self.inner.handle_frame(frame);
    }

    /// Callback to install on a [`CaptureSource`]
    pub fn frame_callback(&self) -> FrameCallback {
        Inner::frame_callback(&self.inner)
    }
}

impl<F: SinkFactory> Inner<F> {
    fn with_state<T>(&self, f: impl FnOnce(&mut CaptureStateMachine) -> T) -> T {
        match self.state.lock() {
            Ok(mut sm) => f(&mut sm),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("No listener for session events");
        }
    }

    /// Go idle, discard any open recording and report `error`
    ///
    /// The returned future resolves once the recorder has been cleared.
    fn fail(&self, error: AppError) -> BoxFuture<'static, bool> {
        error!(error = %error, "Capture session failed");
        self.with_state(|sm| sm.fail());
        let cleared = self.recorder.abort();
        self.emit(SessionEvent::Failed(error));
        cleared
    }

    fn frame_callback(this: &Arc<Self>) -> FrameCallback {
        let weak: Weak<Self> = Arc::downgrade(this);
        Arc::new(move |frame| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_frame(frame);
            }
        })
    }

    fn handle_frame(&self, frame: Frame) {
        let count = self.frames_seen.fetch_add(1, Ordering::Relaxed);
        if count % FRAME_LOG_INTERVAL == 0 {
            debug!(frame = count, timestamp = %frame.timestamp, "Capture frames received");
        }

        let preview = self.preview_stage.process(frame.clone(), false);
        if let Ok(mut latest) = self.latest_preview.lock() {
            *latest = Some(preview.clone());
        }
        self.preview.present(preview);

        if self.recorder.is_recording() {
            let at = frame.timestamp;
            let recorded = self.record_stage.process(frame, true);
            self.recorder.record_frame(recorded, at);
        }
    }

    async fn restart(self: &Arc<Self>) {
        self.with_state(|sm| sm.restart());
        self.source.stop();
        if let Err(e) = self.source.start(Self::frame_callback(self)) {
            self.fail(e.into()).await;
            return;
        }
        self.prepare_next().await;
    }

    async fn prepare_next(&self) {
        if self.with_state(|sm| sm.state()) != PipelineState::Initializing {
            return;
        }
        match self.recorder.prepare(self.target.clone()).await {
            Ok(()) => {
                if self.with_state(|sm| sm.session_ready()) {
                    self.emit(SessionEvent::ReadyToRecord);
                }
            }
            Err(e) => {
                self.fail(e).await;
            }
        }
    }

    async fn start_recording(&self) {
        let clock = self.source.timestamp_origin();
        let Some(origin) = self.with_state(|sm| sm.request_start(clock)) else {
            return;
        };
        match self.recorder.begin_recording(origin).await {
            Ok(()) => {
                if self.with_state(|sm| sm.recording_started()) {
                    self.emit(SessionEvent::RecordingStarted);
                }
            }
            Err(e) => {
                self.fail(e).await;
            }
        }
    }

    async fn stop_recording(&self) {
        if !self.with_state(|sm| sm.request_stop()) {
            return;
        }
        match self.recorder.stop_recording().await {
            Ok(artifact) => {
                self.with_state(|sm| sm.saved());
                self.emit(SessionEvent::VideoCaptured { artifact });
            }
            Err(e) => {
                warn!(error = %e, "Recording produced no artifact");
                self.with_state(|sm| sm.save_failed());
                self.emit(SessionEvent::Failed(AppError::Recording(e)));
            }
        }
    }
}
