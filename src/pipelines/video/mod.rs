// SPDX-License-Identifier: MPL-2.0

//! Video recording pipeline
//!
//! ```text
//! RecordingController ──▶ SerializedTaskQueue ──▶ Encoder ──▶ VideoSink
//!                                                   │             │
//!                                            PixelBufferPool   GStreamer
//! ```
//!
//! - [`task_queue`]: FIFO worker with barrier tasks
//! - [`encoder`]: lifecycle, backpressure and frame conversion
//! - [`sink`] / [`gst_sink`]: container backends
//! - [`encoder_selection`]: codec to GStreamer element mapping
//! - [`recorder`]: async recording API

pub mod encoder;
pub mod encoder_selection;
pub mod gst_sink;
pub mod pool;
pub mod recorder;
pub mod sink;
pub mod task_queue;

pub use encoder::{AppendOutcome, DropReason, Encoder, EncoderPhase, FinishedSession};
pub use encoder_selection::{EncoderInfo, VideoCodec, available_encoders};
pub use gst_sink::{GstSinkFactory, GstVideoSink};
pub use pool::{PixelBufferPool, PooledBuffer};
pub use recorder::{Artifact, RecordingController};
pub use sink::{MemorySinkFactory, RenderTarget, SinkEvent, SinkFactory, SinkProbe, VideoSink};
pub use task_queue::{SerializedTaskQueue, TaskHandle, TaskKind};
