// SPDX-License-Identifier: GPL-3.0-only

//! Container backends for the encoder
//!
//! The [`Encoder`](super::encoder::Encoder) talks to its output through
//! [`VideoSink`]. [`GstVideoSink`](super::gst_sink::GstVideoSink) writes real
//! files; [`MemorySink`] records what it is asked to do and lets tests flip
//! the ready-for-more-data flag.

use super::encoder_selection::VideoCodec;
use super::pool::PooledBuffer;
use crate::backends::camera::types::Timestamp;
use crate::constants::recording::{MAX_DIMENSION, TEMP_RECORDING_NAME};
use crate::errors::{EncoderInitError, SinkError, SinkResult};
use crate::storage::temporary_recording_path;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Output configuration, fixed when the encoder is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub codec: VideoCodec,
    pub path: PathBuf,
}

impl RenderTarget {
    /// Target in the cache directory named after `filename`
    pub fn temporary(size: (u32, u32), frame_rate: u32, codec: VideoCodec, filename: &str) -> Self {
        let filename = if filename.is_empty() {
            TEMP_RECORDING_NAME
        } else {
            filename
        };
        Self {
            width: size.0,
            height: size.1,
            frame_rate,
            codec,
            path: temporary_recording_path(filename, codec.file_extension()),
        }
    }

    /// Duration of one frame at the target rate
    pub fn frame_duration(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.frame_rate.max(1) as u64)
    }

    /// Check the dimensions and rate are encodable
    ///
    /// Chroma-subsampled codecs need even dimensions.
    pub fn validate(&self) -> Result<(), EncoderInitError> {
        if self.width == 0 || self.height == 0 {
            return Err(EncoderInitError::InvalidTarget(format!(
                "empty size {}x{}",
                self.width, self.height
            )));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(EncoderInitError::InvalidTarget(format!(
                "{}x{} is not even",
                self.width, self.height
            )));
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(EncoderInitError::InvalidTarget(format!(
                "{}x{} exceeds {}",
                self.width, self.height, MAX_DIMENSION
            )));
        }
        if self.frame_rate == 0 {
            return Err(EncoderInitError::InvalidTarget("frame rate is zero".into()));
        }
        Ok(())
    }
}

/// An open container accepting RGBA frames
pub trait VideoSink: Send {
    /// False while the backend is saturated; appends are then skipped
    fn is_ready_for_more_data(&self) -> bool;

    /// Begin the output timeline at `origin`
    fn start_session(&mut self, origin: Timestamp) -> SinkResult<()>;

    /// Append one target-sized RGBA buffer at `pts` relative to the origin
    fn append(&mut self, buffer: PooledBuffer, pts: Duration, duration: Duration) -> SinkResult<()>;

    /// Flush and close the container
    fn finish(&mut self) -> SinkResult<()>;
}

/// Opens sinks for render targets
pub trait SinkFactory: Send + 'static {
    type Sink: VideoSink + 'static;

    fn open(&self, target: &RenderTarget) -> SinkResult<Self::Sink>;
}

/// Calls observed by a [`MemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Opened { width: u32, height: u32 },
    Started(Timestamp),
    Appended(Duration),
    Finished,
}

/// Shared view of a [`MemorySinkFactory`]'s sinks
#[derive(Debug, Clone, Default)]
pub struct SinkProbe {
    events: Arc<Mutex<Vec<SinkEvent>>>,
    not_ready: Arc<AtomicBool>,
}

impl SinkProbe {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Make sinks report whether they can take more data
    pub fn set_ready(&self, ready: bool) {
        self.not_ready.store(!ready, Ordering::SeqCst);
    }

    fn push(&self, event: SinkEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Sink factory that keeps frames in memory
///
/// `open` creates an empty file at the target path so the filesystem side of
/// the encoder lifecycle behaves as with a real container; `finish` writes
/// one line per appended frame into it.
#[derive(Debug, Clone, Default)]
pub struct MemorySinkFactory {
    probe: SinkProbe,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> SinkProbe {
        self.probe.clone()
    }
}

impl SinkFactory for MemorySinkFactory {
    type Sink = MemorySink;

    fn open(&self, target: &RenderTarget) -> SinkResult<MemorySink> {
        std::fs::File::create(&target.path)
            .map_err(|e| SinkError::Create(format!("{}: {}", target.path.display(), e)))?;
        self.probe.push(SinkEvent::Opened {
            width: target.width,
            height: target.height,
        });
        Ok(MemorySink {
            path: target.path.clone(),
            probe: self.probe.clone(),
            frames: Vec::new(),
        })
    }
}

/// In-memory [`VideoSink`]
pub struct MemorySink {
    path: PathBuf,
    probe: SinkProbe,
    frames: Vec<Duration>,
}

impl VideoSink for MemorySink {
    fn is_ready_for_more_data(&self) -> bool {
        !self.probe.not_ready.load(Ordering::SeqCst)
    }

    fn start_session(&mut self, origin: Timestamp) -> SinkResult<()> {
        self.probe.push(SinkEvent::Started(origin));
        Ok(())
    }

    fn append(&mut self, _buffer: PooledBuffer, pts: Duration, _duration: Duration) -> SinkResult<()> {
        self.frames.push(pts);
        self.probe.push(SinkEvent::Appended(pts));
        Ok(())
    }

    fn finish(&mut self) -> SinkResult<()> {
        let body: String = self
            .frames
            .iter()
            .map(|pts| format!("{}\n", pts.as_nanos()))
            .collect();
        std::fs::write(&self.path, body).map_err(|e| SinkError::Finalize(e.to_string()))?;
        self.probe.push(SinkEvent::Finished);
        Ok(())
    }
}
