// SPDX-License-Identifier: MPL-2.0

//! Recording controller
//!
//! Every encoder call goes through one [`SerializedTaskQueue`], so the
//! encoder observes `initialize → start → append* → finish` in that order
//! no matter which threads the calls come from:
//!
//! ```text
//! action thread:   prepare ─────────── begin_recording ─────────────── stop_recording
//!                     │ barrier              │ barrier                       │ barrier
//! capture thread:     │          record_frame│ record_frame  record_frame    │
//!                     ▼                      ▼     │ detached     │          ▼
//! queue worker:   initialize ────────────── start ─ append ─────── append ── finish
//! ```
//!
//! Each operation is submitted when the method is called. The returned
//! future only waits for the result, so dropping it does not cancel or
//! reorder anything.

use super::encoder::{AppendOutcome, Encoder, FinishedSession};
use super::sink::{RenderTarget, SinkFactory};
use super::task_queue::SerializedTaskQueue;
use crate::backends::camera::types::{Frame, Timestamp};
use crate::errors::{AppError, AppResult, EncoderError, RecordingFailedError, TaskError};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A finished recording handed to the persistence collaborator
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    /// Last frame timestamp minus the session origin
    pub duration: Duration,
    pub frame_count: u64,
    /// Frames dropped under backpressure
    pub dropped_frames: u64,
    /// First recorded frame
    pub thumbnail: Frame,
}

/// Drives an [`Encoder`] through its lifecycle on a serialized worker
pub struct RecordingController<F: SinkFactory> {
    queue: SerializedTaskQueue<Encoder<F>>,
    /// Set between `begin_recording` and `stop_recording` calls
    session_open: Arc<AtomicBool>,
    /// Set once `start` has completed on the worker, cleared when stop is requested
    accepting: Arc<AtomicBool>,
}

impl<F: SinkFactory> RecordingController<F> {
    pub fn new(encoder: Encoder<F>) -> Result<Self, TaskError> {
        Ok(Self {
            queue: SerializedTaskQueue::new("recorder", encoder)?,
            session_open: Arc::new(AtomicBool::new(false)),
            accepting: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Whether frames are currently being accepted
    pub fn is_recording(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Whether a session was begun and has not been stopped or aborted
    pub fn has_session(&self) -> bool {
        self.session_open.load(Ordering::SeqCst)
    }

    /// Initialize the encoder for `target`
    pub fn prepare(&self, target: RenderTarget) -> BoxFuture<'static, AppResult<()>> {
        debug!(path = %target.path.display(), "Preparing recorder");
        let handle = self.queue.submit_barrier(move |encoder| encoder.initialize(target));
        async move {
            handle.await?.map_err(|e| AppError::Encoder(e.into()))?;
            info!("Recorder ready");
            Ok(())
        }
        .boxed()
    }

    /// Start the encoder session at `source_time`
    pub fn begin_recording(&self, source_time: Timestamp) -> BoxFuture<'static, AppResult<()>> {
        self.session_open.store(true, Ordering::SeqCst);
        let accepting = Arc::clone(&self.accepting);
        let session_open = Arc::clone(&self.session_open);

        let open = Arc::clone(&self.session_open);
        let handle = self.queue.submit_barrier(move |encoder| {
            let result = encoder.start(source_time);
            // An abort may have closed the session before this ran
            if result.is_ok() && open.load(Ordering::SeqCst) {
                accepting.store(true, Ordering::SeqCst);
            }
            result
        });

        async move {
            let result: AppResult<()> = match handle.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(AppError::Encoder(e)),
                Err(e) => Err(AppError::Task(e)),
            };
            match &result {
                Ok(()) => info!(origin = %source_time, "Recording started"),
                Err(e) => {
                    warn!(error = %e, "Failed to start recording");
                    session_open.store(false, Ordering::SeqCst);
                }
            }
            result
        }
        .boxed()
    }

    /// Queue `frame` for appending at `at`
    ///
    /// Never blocks. Returns `false` when the frame was rejected because no
    /// session is accepting frames.
    pub fn record_frame(&self, frame: Frame, at: Timestamp) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            return false;
        }
        self.queue.submit_detached(move |encoder| {
            match encoder.append(&frame, at) {
                Ok(AppendOutcome::Appended) | Ok(AppendOutcome::Dropped(_)) => {}
                // Stop raced ahead of this frame
                Err(EncoderError::State(e)) => debug!(error = %e, "Frame arrived outside session"),
                Err(e) => warn!(error = %e, "Failed to append frame"),
            }
        })
    }

    /// Finish the session and hand back the artifact
    ///
    /// Frames already queued are flushed first. A second stop, or a stop with
    /// no session, fails with [`RecordingFailedError::NotRecording`].
    pub fn stop_recording(&self) -> BoxFuture<'static, Result<Artifact, RecordingFailedError>> {
        if !self.session_open.swap(false, Ordering::SeqCst) {
            return async { Err(RecordingFailedError::NotRecording) }.boxed();
        }
        self.accepting.store(false, Ordering::SeqCst);

        let handle = self
            .queue
            .submit_barrier(|encoder| encoder.finish().map_err(RecordingFailedError::from).and_then(into_artifact));

        async move {
            let artifact = handle.await??;
            info!(
                path = %artifact.path.display(),
                frames = artifact.frame_count,
                dropped = artifact.dropped_frames,
                duration_ms = artifact.duration.as_millis() as u64,
                "Recording finished"
            );
            Ok(artifact)
        }
        .boxed()
    }

    /// Close any open session and delete its output
    ///
    /// Resolves to whether a session was open. The teardown is queued when
    /// this is called, so work submitted afterwards (a new `prepare`) always
    /// sees a finished encoder even if the future is dropped.
    pub fn abort(&self) -> BoxFuture<'static, bool> {
        if !self.session_open.swap(false, Ordering::SeqCst) {
            return async { false }.boxed();
        }
        self.accepting.store(false, Ordering::SeqCst);
        let accepting = Arc::clone(&self.accepting);

        let handle = self.queue.submit_barrier(move |encoder| {
            accepting.store(false, Ordering::SeqCst);
            match encoder.finish() {
                Ok(finished) => remove_output(&finished.path),
                Err(e) => debug!(error = %e, "Aborted session had nothing to finish"),
            }
        });

        async move {
            match handle.await {
                Ok(()) => info!("Recording aborted"),
                Err(e) => warn!(error = %e, "Failed to abort recording"),
            }
            true
        }
        .boxed()
    }
}

fn remove_output(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!(path = %path.display(), error = %e, "Could not remove discarded recording");
    }
}

/// Turn a finished session into an artifact, discarding empty output
fn into_artifact(finished: FinishedSession) -> Result<Artifact, RecordingFailedError> {
    let discard = |reason: RecordingFailedError| -> Result<Artifact, RecordingFailedError> {
        remove_output(&finished.path);
        Err(reason)
    };

    if finished.frame_count == 0 {
        return discard(RecordingFailedError::NoFrames);
    }
    let Some(thumbnail) = finished.first_frame.clone() else {
        return discard(RecordingFailedError::NoFirstFrame);
    };
    if finished.dropped_frames > 0 {
        debug!(dropped = finished.dropped_frames, "Frames dropped during recording");
    }

    Ok(Artifact {
        path: finished.path,
        duration: finished.duration,
        frame_count: finished.frame_count,
        dropped_frames: finished.dropped_frames,
        thumbnail,
    })
}
