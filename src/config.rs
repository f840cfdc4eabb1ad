// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::types::{CameraDirection, VideoFilter, VideoResolution};
use crate::constants::BitratePreset;
use crate::constants::recording::{DEFAULT_FRAME_RATE, TEMP_RECORDING_NAME};
use crate::errors::{AppError, AppResult};
use crate::pipelines::video::{RenderTarget, VideoCodec};
use crate::storage::default_video_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "camkit";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Recording resolution
    pub video_resolution: VideoResolution,
    pub frame_rate: u32,
    pub codec: VideoCodec,
    /// Video encoder bitrate preset (Low, Medium, High)
    pub bitrate_preset: BitratePreset,
    pub video_filter: VideoFilter,
    pub camera_direction: CameraDirection,
    /// Mirror camera preview horizontally (selfie mode)
    pub mirror_preview: bool,
    /// Base name of the temporary recording in the cache directory
    pub recording_filename: String,
    /// Where finished videos and photos are exported
    pub output_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video_resolution: VideoResolution::default(),
            frame_rate: DEFAULT_FRAME_RATE,
            codec: VideoCodec::default(),
            bitrate_preset: BitratePreset::default(),
            video_filter: VideoFilter::default(),
            camera_direction: CameraDirection::default(),
            mirror_preview: true, // Default to mirrored (selfie mode)
            recording_filename: TEMP_RECORDING_NAME.to_string(),
            output_dir: None,
        }
    }
}

impl Config {
    /// Default location, `None` when the platform has no config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Export directory for finished artifacts
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(default_video_dir)
    }

    /// Temporary recording target for the configured resolution and codec
    pub fn render_target(&self) -> RenderTarget {
        RenderTarget::temporary(
            self.video_resolution.size(),
            self.frame_rate,
            self.codec,
            &self.recording_filename,
        )
    }
}
