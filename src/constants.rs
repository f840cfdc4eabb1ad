// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Target bitrate for the video encoder, relative to the output size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BitratePreset {
    Low,
    #[default]
    Medium,
    High,
}

/// Minimum long edge and the (low, medium, high) kbps for that size class.
/// Checked from the top, the last row catches everything smaller.
const BITRATE_TABLE: [(u32, [u32; 3]); 4] = [
    (3840, [15_000, 30_000, 50_000]),
    (1920, [4_000, 8_000, 16_000]),
    (1280, [2_500, 5_000, 10_000]),
    (0, [1_000, 2_000, 4_000]),
];

impl BitratePreset {
    pub const ALL: [BitratePreset; 3] = [Self::Low, Self::Medium, Self::High];

    fn column(self) -> usize {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    pub fn display_name(&self) -> &'static str {
        ["Low", "Medium", "High"][self.column()]
    }

    /// Bitrate in kbps for a `width` x `height` output.
    ///
    /// Only the longer edge counts, so a portrait 1080x1920 recording gets
    /// the same budget as 1920x1080.
    pub fn bitrate_kbps(&self, width: u32, height: u32) -> u32 {
        let long_edge = width.max(height);
        BITRATE_TABLE
            .iter()
            .find(|(min_edge, _)| long_edge >= *min_edge)
            .map_or(BITRATE_TABLE[3].1, |(_, row)| *row)[self.column()]
    }

    /// Software encoder speed preset that fits this budget
    pub fn x264_preset(&self) -> &'static str {
        ["veryfast", "fast", "medium"][self.column()]
    }
}

/// Human readable bitrate, `8000` becomes "8 Mbps" and `2500` "2.5 Mbps"
pub fn format_bitrate(kbps: u32) -> String {
    if kbps % 1000 == 0 {
        format!("{} Mbps", kbps / 1000)
    } else {
        format!("{:.1} Mbps", f64::from(kbps) / 1000.0)
    }
}

/// Recording constants
pub mod recording {
    use super::Duration;

    /// Frame rate used when none is configured
    pub const DEFAULT_FRAME_RATE: u32 = 24;

    /// File stem of the in-progress recording in the cache directory
    pub const TEMP_RECORDING_NAME: &str = "Temporary_Camera_Recording";

    /// Pixel buffers the encoder may have in flight at once
    pub const POOL_CAPACITY: usize = 8;

    /// Largest accepted output edge
    pub const MAX_DIMENSION: u32 = 8192;

    /// How long to wait for the container to finalize after end-of-stream
    pub const FINALIZE_TIMEOUT: Duration = Duration::from_secs(10);
}

/// GStreamer pipeline constants
pub mod pipeline {
    /// Bytes appsrc may queue before it reports enough data
    ///
    /// Four RGBA frames at 1080x1920.
    pub const APPSRC_MAX_BYTES: u64 = 4 * 1080 * 1920 * 4;

    /// Get number of threads for videoconvert based on available CPU threads
    pub fn videoconvert_threads() -> u32 {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(4)
    }
}

/// Timing constants
pub mod timing {
    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;
}
