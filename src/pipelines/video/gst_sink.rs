// SPDX-License-Identifier: MPL-2.0

//! GStreamer container backend
//!
//! ```text
//! appsrc (RGBA) → videoconvert → encoder → parser → muxer → filesink
//! ```
//!
//! Pooled buffers are handed to appsrc without copying and return to the
//! pool when GStreamer releases them. appsrc's need-data and enough-data
//! signals drive the ready-for-more-data flag.

use super::encoder_selection::select_video_encoder;
use super::pool::PooledBuffer;
use super::sink::{RenderTarget, SinkFactory, VideoSink};
use crate::backends::camera::types::Timestamp;
use crate::constants::BitratePreset;
use crate::constants::pipeline::{APPSRC_MAX_BYTES, videoconvert_threads};
use crate::constants::recording::FINALIZE_TIMEOUT;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::{SinkError, SinkResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::{AppSrc, AppSrcCallbacks};
use gstreamer_video as gst_video;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Opens [`GstVideoSink`]s with the best encoder for each target's codec
#[derive(Debug, Clone, Copy, Default)]
pub struct GstSinkFactory {
    pub bitrate: BitratePreset,
}

impl GstSinkFactory {
    pub fn new(bitrate: BitratePreset) -> Self {
        Self { bitrate }
    }
}

impl SinkFactory for GstSinkFactory {
    type Sink = GstVideoSink;

    fn open(&self, target: &RenderTarget) -> SinkResult<GstVideoSink> {
        GstVideoSink::new(target, self.bitrate)
    }
}

/// Encoding pipeline writing one container file
pub struct GstVideoSink {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    ready: Arc<AtomicBool>,
    pushed: u64,
}

fn create(name: &str) -> SinkResult<gst::Element> {
    gst::ElementFactory::make(name)
        .build()
        .map_err(|e| SinkError::Create(format!("Failed to create {}: {}", name, e)))
}

impl GstVideoSink {
    pub fn new(target: &RenderTarget, bitrate: BitratePreset) -> SinkResult<Self> {
        info!(
            width = target.width,
            height = target.height,
            fps = target.frame_rate,
            path = %target.path.display(),
            "Creating recording pipeline"
        );

        gst::init().map_err(|e| SinkError::Create(format!("GStreamer init failed: {}", e)))?;

        let location = target
            .path
            .to_str()
            .ok_or_else(|| SinkError::Create("output path is not valid UTF-8".into()))?;

        let selected = select_video_encoder(target.codec, bitrate, target.width, target.height)?;

        let appsrc = create("appsrc")?
            .downcast::<AppSrc>()
            .map_err(|_| SinkError::Create("Failed to downcast to AppSrc".into()))?;
        let videoconvert = create("videoconvert")?;
        if videoconvert.has_property("n-threads") {
            videoconvert.set_property("n-threads", videoconvert_threads());
        }
        let filesink = create("filesink")?;
        filesink.set_property("location", location);

        let info = gst_video::VideoInfo::builder(
            gst_video::VideoFormat::Rgba,
            target.width,
            target.height,
        )
        .fps(gst::Fraction::new(target.frame_rate as i32, 1))
        .build()
        .map_err(|e| SinkError::Unsupported(format!("Invalid video info: {}", e)))?;
        let caps = info
            .to_caps()
            .map_err(|e| SinkError::Unsupported(format!("Invalid caps: {}", e)))?;

        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gst::Format::Time);
        appsrc.set_is_live(true);
        appsrc.set_max_bytes(APPSRC_MAX_BYTES);
        appsrc.set_block(false);

        let ready = Arc::new(AtomicBool::new(true));
        let need = Arc::clone(&ready);
        let enough = Arc::clone(&ready);
        appsrc.set_callbacks(
            AppSrcCallbacks::builder()
                .need_data(move |_, _| need.store(true, Ordering::SeqCst))
                .enough_data(move |_| {
                    enough.store(false, Ordering::SeqCst);
                    debug!("Recording pipeline has enough data");
                })
                .build(),
        );

        let pipeline = gst::Pipeline::new();
        let mut chain: Vec<&gst::Element> = vec![appsrc.upcast_ref(), &videoconvert, &selected.encoder];
        if let Some(parser) = &selected.parser {
            chain.push(parser);
        }
        chain.push(&selected.muxer);
        chain.push(&filesink);

        pipeline
            .add_many(chain.iter().copied())
            .map_err(|e| SinkError::Create(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many(chain.iter().copied())
            .map_err(|e| SinkError::Unsupported(format!("Failed to link elements: {}", e)))?;

        // Fail at prepare time if any element cannot come up
        pipeline
            .set_state(gst::State::Ready)
            .map_err(|e| SinkError::Create(format!("Failed to open {}: {}", location, e)))?;

        info!(
            encoder = selected.info.element_name,
            muxer = ?selected.muxer.factory().map(|f| f.name()),
            "Recording pipeline ready"
        );

        Ok(Self {
            pipeline,
            appsrc,
            ready,
            pushed: 0,
        })
    }

    /// Surface an error posted on the bus since the last check
    fn check_bus(&self) -> SinkResult<()> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        if let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(err) = msg.view() {
                error!(
                    error = %err.error(),
                    debug = ?err.debug(),
                    source = ?err.src().map(|s| s.name()),
                    "GStreamer error while recording"
                );
                return Err(SinkError::Pipeline(err.error().to_string()));
            }
        }
        Ok(())
    }
}

impl VideoSink for GstVideoSink {
    fn is_ready_for_more_data(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn start_session(&mut self, origin: Timestamp) -> SinkResult<()> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| SinkError::Pipeline(format!("Failed to start recording: {}", e)))?;
        self.check_bus()?;
        debug!(origin = %origin, "Recording pipeline playing");
        Ok(())
    }

    fn append(&mut self, buffer: PooledBuffer, pts: Duration, duration: Duration) -> SinkResult<()> {
        self.check_bus()?;

        let mut gst_buffer = gst::Buffer::from_mut_slice(buffer);
        if let Some(buffer_ref) = gst_buffer.get_mut() {
            buffer_ref.set_pts(gst::ClockTime::from_nseconds(pts.as_nanos() as u64));
            buffer_ref.set_duration(gst::ClockTime::from_nseconds(duration.as_nanos() as u64));
        }

        self.appsrc.push_buffer(gst_buffer).map_err(|e| {
            warn!(?e, "Failed to push frame to recording pipeline");
            SinkError::Pipeline(format!("Failed to push frame: {:?}", e))
        })?;

        self.pushed += 1;
        if self.pushed % FRAME_LOG_INTERVAL == 0 {
            debug!(frame = self.pushed, "Recording frames pushed");
        }
        Ok(())
    }

    fn finish(&mut self) -> SinkResult<()> {
        info!(frames = self.pushed, "Finalizing recording");
        self.appsrc
            .end_of_stream()
            .map_err(|e| SinkError::Finalize(format!("Failed to send EOS: {:?}", e)))?;

        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| SinkError::Finalize("No bus available".into()))?;
        let timeout = gst::ClockTime::from_nseconds(FINALIZE_TIMEOUT.as_nanos() as u64);
        let result = match bus.timed_pop_filtered(
            timeout,
            &[gst::MessageType::Eos, gst::MessageType::Error],
        ) {
            Some(msg) => match msg.view() {
                gst::MessageView::Eos(..) => Ok(()),
                gst::MessageView::Error(err) => {
                    Err(SinkError::Finalize(err.error().to_string()))
                }
                _ => Ok(()),
            },
            None => Err(SinkError::Finalize(format!(
                "no end-of-stream within {:?}",
                FINALIZE_TIMEOUT
            ))),
        };

        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| SinkError::Finalize(format!("Failed to stop pipeline: {}", e)))?;
        result
    }
}

impl Drop for GstVideoSink {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            error!(?e, "Failed to set recording pipeline to Null on drop");
        }
    }
}
