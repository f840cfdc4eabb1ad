// SPDX-License-Identifier: MPL-2.0

//! Video encoder selection with hardware acceleration priority
//!
//! For the configured codec the candidates are tried hardware first, then
//! software. The first element the GStreamer registry can build wins.

use crate::constants::BitratePreset;
use crate::errors::{SinkError, SinkResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Output video codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// AV1 codec (best compression, modern)
    AV1,
    /// HEVC/H.265 codec (good compression)
    HEVC,
    /// H.264 codec (best compatibility)
    #[default]
    H264,
}

impl VideoCodec {
    pub const ALL: [VideoCodec; 3] = [VideoCodec::AV1, VideoCodec::HEVC, VideoCodec::H264];

    /// Get the container format for this codec
    pub fn container_format(&self) -> ContainerFormat {
        match self {
            VideoCodec::AV1 => ContainerFormat::WebM,
            VideoCodec::HEVC => ContainerFormat::MP4,
            VideoCodec::H264 => ContainerFormat::MP4,
        }
    }

    /// Get the file extension for this codec's container
    pub fn file_extension(&self) -> &'static str {
        self.container_format().extension()
    }

    /// Get the parser element name
    pub fn parser_name(&self) -> &'static str {
        match self {
            VideoCodec::AV1 => "av1parse",
            VideoCodec::HEVC => "h265parse",
            VideoCodec::H264 => "h264parse",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            VideoCodec::AV1 => "AV1",
            VideoCodec::HEVC => "H.265",
            VideoCodec::H264 => "H.264",
        }
    }
}

impl std::str::FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "av1" => Ok(VideoCodec::AV1),
            "hevc" | "h265" => Ok(VideoCodec::HEVC),
            "h264" | "avc" => Ok(VideoCodec::H264),
            other => Err(format!("unknown codec '{}'", other)),
        }
    }
}

/// Container formats for video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// MP4 container (good compatibility)
    MP4,
    /// WebM container (open format)
    WebM,
}

impl ContainerFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::MP4 => "mp4",
            ContainerFormat::WebM => "webm",
        }
    }

    pub fn muxer_name(&self) -> &'static str {
        match self {
            ContainerFormat::MP4 => "mp4mux",
            ContainerFormat::WebM => "webmmux",
        }
    }
}

/// Information about an encoder element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderInfo {
    /// GStreamer element name
    pub element_name: &'static str,
    pub display_name: &'static str,
    pub codec: VideoCodec,
    pub is_hardware: bool,
    /// Lower is preferred
    pub priority: u32,
}

const fn encoder(
    element_name: &'static str,
    display_name: &'static str,
    codec: VideoCodec,
    is_hardware: bool,
    priority: u32,
) -> EncoderInfo {
    EncoderInfo {
        element_name,
        display_name,
        codec,
        is_hardware,
        priority,
    }
}

/// Every encoder element we know how to configure, in preference order
pub const KNOWN_ENCODERS: &[EncoderInfo] = &[
    // Hardware AV1
    encoder("vaav1enc", "VA-API AV1 (HW)", VideoCodec::AV1, true, 1),
    encoder("nvav1enc", "NVIDIA AV1 (HW)", VideoCodec::AV1, true, 2),
    encoder("qsvav1enc", "Intel QSV AV1 (HW)", VideoCodec::AV1, true, 3),
    // Software AV1
    encoder("svtav1enc", "SVT-AV1 (SW)", VideoCodec::AV1, false, 10),
    encoder("av1enc", "AOM AV1 (SW)", VideoCodec::AV1, false, 11),
    // Hardware HEVC/H.265
    encoder("vah265enc", "VA-API H.265 (HW)", VideoCodec::HEVC, true, 20),
    encoder("nvh265enc", "NVIDIA H.265 (HW)", VideoCodec::HEVC, true, 21),
    encoder("qsvh265enc", "Intel QSV H.265 (HW)", VideoCodec::HEVC, true, 22),
    encoder("v4l2h265enc", "V4L2 H.265 (HW)", VideoCodec::HEVC, true, 23),
    // Software HEVC/H.265
    encoder("x265enc", "x265 H.265 (SW)", VideoCodec::HEVC, false, 30),
    // Hardware H.264
    encoder("vah264enc", "VA-API H.264 (HW)", VideoCodec::H264, true, 40),
    encoder("nvh264enc", "NVIDIA H.264 (HW)", VideoCodec::H264, true, 41),
    encoder("qsvh264enc", "Intel QSV H.264 (HW)", VideoCodec::H264, true, 42),
    encoder("v4l2h264enc", "V4L2 H.264 (HW)", VideoCodec::H264, true, 43),
    // Software H.264
    encoder("x264enc", "x264 H.264 (SW)", VideoCodec::H264, false, 50),
    encoder("openh264enc", "OpenH264 H.264 (SW)", VideoCodec::H264, false, 51),
];

/// Known encoders for `codec`, preferred first
pub fn candidates(codec: VideoCodec) -> impl Iterator<Item = &'static EncoderInfo> {
    KNOWN_ENCODERS.iter().filter(move |e| e.codec == codec)
}

/// Enumerate the encoders the local GStreamer installation can build
pub fn available_encoders() -> Vec<EncoderInfo> {
    if gst::init().is_err() {
        warn!("GStreamer could not be initialized, no encoders available");
        return Vec::new();
    }

    let mut available: Vec<EncoderInfo> = KNOWN_ENCODERS
        .iter()
        .filter(|info| gst::ElementFactory::find(info.element_name).is_some())
        .cloned()
        .collect();
    available.sort_by_key(|e| e.priority);

    info!("Detected {} video encoders", available.len());
    available
}

/// Encoder, parser and muxer elements ready to be linked
pub struct SelectedVideoEncoder {
    pub encoder: gst::Element,
    pub parser: Option<gst::Element>,
    pub muxer: gst::Element,
    pub info: EncoderInfo,
    pub bitrate_kbps: u32,
}

/// Build the best available encoder for `codec`
pub fn select_video_encoder(
    codec: VideoCodec,
    preset: BitratePreset,
    width: u32,
    height: u32,
) -> SinkResult<SelectedVideoEncoder> {
    gst::init().map_err(|e| SinkError::Create(format!("Failed to initialize GStreamer: {}", e)))?;

    let bitrate = preset.bitrate_kbps(width, height);

    for info in candidates(codec) {
        let Ok(encoder) = gst::ElementFactory::make(info.element_name).build() else {
            continue;
        };
        info!(
            encoder = %info.element_name,
            codec = ?codec,
            hardware = info.is_hardware,
            bitrate_kbps = bitrate,
            "Selected video encoder"
        );
        configure_video_encoder(&encoder, info.element_name, preset, bitrate);

        let parser = match gst::ElementFactory::make(codec.parser_name()).build() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(parser = codec.parser_name(), error = %e, "Parser unavailable, linking encoder directly");
                None
            }
        };

        let container = codec.container_format();
        let muxer = gst::ElementFactory::make(container.muxer_name())
            .build()
            .map_err(|e| {
                SinkError::Unsupported(format!(
                    "Failed to create muxer {}: {}",
                    container.muxer_name(),
                    e
                ))
            })?;
        if muxer.has_property("streamable") {
            muxer.set_property("streamable", false);
        }

        return Ok(SelectedVideoEncoder {
            encoder,
            parser,
            muxer,
            info: info.clone(),
            bitrate_kbps: bitrate,
        });
    }

    Err(SinkError::Unsupported(format!(
        "No {} encoder available. Install gstreamer1-plugins-ugly (x264enc) or gstreamer1-plugin-openh264",
        codec.display_name()
    )))
}

/// Apply rate control for the given element
fn configure_video_encoder(
    encoder: &gst::Element,
    encoder_name: &str,
    preset: BitratePreset,
    bitrate: u32,
) {
    match encoder_name {
        "x264enc" | "x265enc" => {
            encoder.set_property_from_str("speed-preset", preset.x264_preset());
            if encoder_name == "x264enc" {
                encoder.set_property_from_str("tune", "zerolatency");
            }
            encoder.set_property("bitrate", bitrate);
        }
        "vah264enc" | "vah265enc" | "vaav1enc" => {
            encoder.set_property_from_str("rate-control", "cbr");
            encoder.set_property("bitrate", bitrate);
        }
        "nvh264enc" | "nvh265enc" | "nvav1enc" => {
            encoder.set_property("bitrate", bitrate);
            encoder.set_property_from_str("rc-mode", "vbr");
        }
        "qsvh264enc" | "qsvh265enc" | "qsvav1enc" => {
            encoder.set_property("bitrate", bitrate);
        }
        "openh264enc" => {
            encoder.set_property_from_str("rate-control", "bitrate");
            // Bits per second
            encoder.set_property("bitrate", bitrate * 1000);
            encoder.set_property_from_str("usage-type", "camera");
        }
        "svtav1enc" | "av1enc" => {
            encoder.set_property("target-bitrate", bitrate);
        }
        _ => {
            debug!(encoder = %encoder_name, "Using default encoder configuration");
            return;
        }
    }
    debug!(encoder = %encoder_name, bitrate_kbps = bitrate, "Configured encoder");
}
