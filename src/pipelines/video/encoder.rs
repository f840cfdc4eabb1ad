// SPDX-License-Identifier: GPL-3.0-only

//! Pooled-buffer video encoder
//!
//! ```text
//! Uninitialized ──initialize──▶ Initialized ──start──▶ Started ──finish──▶ Finished
//!       ▲                                                                     │
//!       └──────────────────────── initialize (next session) ◀─────────────────┘
//! ```
//!
//! The encoder never queues frames. If the sink is saturated, the pool is
//! exhausted, or the timestamp would not advance the output timeline, the
//! frame is dropped and counted.

use super::pool::PixelBufferPool;
use super::sink::{RenderTarget, SinkFactory, VideoSink};
use crate::backends::camera::types::{Frame, PixelFormat, Timestamp};
use crate::constants::recording::POOL_CAPACITY;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::{EncoderInitError, EncoderResult, EncoderStateError};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle phase of an [`Encoder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderPhase {
    Uninitialized,
    Initialized,
    Started,
    Finished,
}

/// Why a frame was not appended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Sink reported it is not ready for more data
    NotReady,
    /// Every pooled buffer is in flight
    PoolExhausted,
    /// Timestamp precedes the session origin
    BeforeOrigin,
    /// Timestamp does not advance past the previous frame
    NotMonotonic,
    /// Frame has no pixels to scale from
    EmptyFrame,
}

/// Result of a successful `append` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    Dropped(DropReason),
}

/// Mutable state of one recording, alive from `initialize` to `finish`
pub struct RecordingSession<K> {
    target: RenderTarget,
    sink: K,
    pool: PixelBufferPool,
    origin: Option<Timestamp>,
    last_timestamp: Option<Timestamp>,
    first_frame: Option<Frame>,
    appended: u64,
    dropped: u64,
}

impl<K> RecordingSession<K> {
    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn has_started(&self) -> bool {
        self.origin.is_some()
    }

    pub fn appended(&self) -> u64 {
        self.appended
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// What `finish` hands back
#[derive(Debug, Clone)]
pub struct FinishedSession {
    pub path: PathBuf,
    pub frame_count: u64,
    pub dropped_frames: u64,
    /// Last appended timestamp minus the session origin
    pub duration: Duration,
    pub first_frame: Option<Frame>,
}

/// Encoder driving a [`VideoSink`] through one session at a time
pub struct Encoder<F: SinkFactory> {
    factory: F,
    phase: EncoderPhase,
    session: Option<RecordingSession<F::Sink>>,
    pool_capacity: usize,
}

impl<F: SinkFactory> Encoder<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            phase: EncoderPhase::Uninitialized,
            session: None,
            pool_capacity: POOL_CAPACITY,
        }
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity.max(1);
        self
    }

    pub fn phase(&self) -> EncoderPhase {
        self.phase
    }

    pub fn session(&self) -> Option<&RecordingSession<F::Sink>> {
        self.session.as_ref()
    }

    /// Open a new container for `target`
    ///
    /// A session that was initialized but never started is discarded. Any
    /// stale file at the target path is removed first.
    pub fn initialize(&mut self, target: RenderTarget) -> Result<(), EncoderInitError> {
        match self.phase {
            EncoderPhase::Started => return Err(EncoderInitError::SessionInProgress),
            EncoderPhase::Initialized => {
                debug!("Discarding unstarted encoder session");
                self.session = None;
                self.phase = EncoderPhase::Uninitialized;
            }
            EncoderPhase::Uninitialized | EncoderPhase::Finished => {}
        }
        target.validate()?;

        let destination_error = |e: std::io::Error| EncoderInitError::Destination {
            path: target.path.clone(),
            reason: e.to_string(),
        };
        match std::fs::remove_file(&target.path) {
            Ok(()) => debug!(path = %target.path.display(), "Removed stale recording"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(destination_error(e)),
        }
        if let Some(parent) = target.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(destination_error)?;
        }

        let sink = self.factory.open(&target)?;
        let pool = PixelBufferPool::new(target.width, target.height, self.pool_capacity);

        info!(
            width = target.width,
            height = target.height,
            fps = target.frame_rate,
            codec = ?target.codec,
            path = %target.path.display(),
            "Encoder initialized"
        );

        self.session = Some(RecordingSession {
            target,
            sink,
            pool,
            origin: None,
            last_timestamp: None,
            first_frame: None,
            appended: 0,
            dropped: 0,
        });
        self.phase = EncoderPhase::Initialized;
        Ok(())
    }

    /// Anchor the output timeline at `source_time`
    pub fn start(&mut self, source_time: Timestamp) -> EncoderResult<()> {
        match self.phase {
            EncoderPhase::Initialized => {}
            EncoderPhase::Uninitialized => return Err(EncoderStateError::NotInitialized.into()),
            EncoderPhase::Started => return Err(EncoderStateError::AlreadyStarted.into()),
            EncoderPhase::Finished => return Err(EncoderStateError::Finished.into()),
        }
        let session = self
            .session
            .as_mut()
            .ok_or(EncoderStateError::NotInitialized)?;

        session.sink.start_session(source_time)?;
        session.origin = Some(source_time);
        self.phase = EncoderPhase::Started;
        info!(origin = %source_time, "Encoder session started");
        Ok(())
    }

    /// Append `frame` at `at`, or drop it under backpressure
    pub fn append(&mut self, frame: &Frame, at: Timestamp) -> EncoderResult<AppendOutcome> {
        if self.phase != EncoderPhase::Started {
            return Err(EncoderStateError::NotStarted.into());
        }
        let session = self.session.as_mut().ok_or(EncoderStateError::NotStarted)?;
        let origin = session.origin.ok_or(EncoderStateError::NotStarted)?;

        let reason = if !session.sink.is_ready_for_more_data() {
            Some(DropReason::NotReady)
        } else if at < origin {
            Some(DropReason::BeforeOrigin)
        } else if session.last_timestamp.is_some_and(|last| at <= last) {
            Some(DropReason::NotMonotonic)
        } else {
            None
        };
        if let Some(reason) = reason {
            return Ok(drop_frame(session, reason, at));
        }

        let Some(mut buffer) = session.pool.acquire() else {
            return Ok(drop_frame(session, DropReason::PoolExhausted, at));
        };
        let (width, height) = session.pool.dimensions();
        if !write_rgba(frame, &mut buffer, width, height) {
            return Ok(drop_frame(session, DropReason::EmptyFrame, at));
        }

        let pts = at.saturating_duration_since(origin);
        session
            .sink
            .append(buffer, pts, session.target.frame_duration())?;

        if session.first_frame.is_none() {
            session.first_frame = Some(frame.clone());
        }
        session.last_timestamp = Some(at);
        session.appended += 1;

        if session.appended % FRAME_LOG_INTERVAL == 1 {
            debug!(
                appended = session.appended,
                dropped = session.dropped,
                pts_ms = pts.as_millis() as u64,
                "Encoder appended frame"
            );
        }
        Ok(AppendOutcome::Appended)
    }

    /// Close the container and end the session
    ///
    /// The encoder is `Finished` afterwards even when this fails.
    pub fn finish(&mut self) -> EncoderResult<FinishedSession> {
        let started = self.phase == EncoderPhase::Started;
        let session = self.session.take();
        self.phase = EncoderPhase::Finished;

        let mut session = match (started, session) {
            (true, Some(session)) => session,
            (false, Some(_)) => return Err(EncoderStateError::NotStarted.into()),
            (_, None) => return Err(EncoderStateError::NotInitialized.into()),
        };

        session.sink.finish()?;

        let origin = session.origin.unwrap_or_default();
        let duration = session
            .last_timestamp
            .map(|last| last.saturating_duration_since(origin))
            .unwrap_or_default();

        info!(
            path = %session.target.path.display(),
            frames = session.appended,
            dropped = session.dropped,
            duration_ms = duration.as_millis() as u64,
            "Encoder finished"
        );

        Ok(FinishedSession {
            path: session.target.path,
            frame_count: session.appended,
            dropped_frames: session.dropped,
            duration,
            first_frame: session.first_frame,
        })
    }
}

fn drop_frame<K>(session: &mut RecordingSession<K>, reason: DropReason, at: Timestamp) -> AppendOutcome {
    session.dropped += 1;
    debug!(reason = ?reason, timestamp = %at, dropped = session.dropped, "Dropped frame");
    AppendOutcome::Dropped(reason)
}

/// Copy `frame` into a packed RGBA buffer of `width x height`
///
/// Same-size RGBA frames are copied row by row, honouring the source stride.
/// Anything else goes through `rgba_at` with nearest-neighbour sampling.
/// Returns `false`, leaving `dst` untouched, when there is nothing to write.
pub fn write_rgba(frame: &Frame, dst: &mut [u8], width: u32, height: u32) -> bool {
    let row_bytes = width as usize * 4;
    if frame.width == 0 || frame.height == 0 {
        return false;
    }
    if dst.len() < row_bytes * height as usize {
        warn!(
            buffer = dst.len(),
            width, height, "Pixel buffer does not fit target"
        );
        return false;
    }

    if frame.format == PixelFormat::RGBA && frame.width == width && frame.height == height {
        for y in 0..height {
            let start = y as usize * row_bytes;
            dst[start..start + row_bytes].copy_from_slice(frame.row(y));
        }
        return true;
    }

    for y in 0..height {
        let sy = (y as u64 * frame.height as u64 / height as u64) as u32;
        for x in 0..width {
            let sx = (x as u64 * frame.width as u64 / width as u64) as u32;
            let idx = y as usize * row_bytes + x as usize * 4;
            dst[idx..idx + 4].copy_from_slice(&frame.rgba_at(sx, sy));
        }
    }
    true
}
