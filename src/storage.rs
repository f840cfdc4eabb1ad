// SPDX-License-Identifier: MPL-2.0

//! Storage utilities for recordings, photos and thumbnails
//!
//! The in-progress recording lives in the cache directory. Once it finishes,
//! an [`ArtifactStore`] copies it to its final home.

use crate::backends::camera::types::{Frame, PixelFormat};
use crate::errors::{AppError, AppResult};
use crate::pipelines::video::Artifact;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DEFAULT_SAVE_FOLDER: &str = "Camera";
const APP_DIR: &str = "camkit";

/// Where the encoder writes the recording in progress
pub fn temporary_recording_path(filename: &str, extension: &str) -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join(format!("{}.{}", filename, extension))
}

/// Get default video directory
pub fn default_video_dir() -> PathBuf {
    dirs::video_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}

/// Get default photo directory
pub fn default_photo_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}

/// Encode a frame as PNG bytes
pub fn encode_png(frame: &Frame) -> AppResult<Vec<u8>> {
    let mut rgba = Vec::with_capacity(frame.width as usize * frame.height as usize * 4);
    match frame.format {
        PixelFormat::RGBA if frame.stride == frame.width * 4 => {
            rgba.extend_from_slice(&frame.data[..frame.width as usize * frame.height as usize * 4]);
        }
        _ => {
            for y in 0..frame.height {
                for x in 0..frame.width {
                    rgba.extend_from_slice(&frame.rgba_at(x, y));
                }
            }
        }
    }

    let image = image::RgbaImage::from_raw(frame.width, frame.height, rgba)
        .ok_or_else(|| AppError::Photo("frame buffer does not match its size".into()))?;
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| AppError::Photo(format!("PNG encoding failed: {}", e)))?;
    Ok(png)
}

/// `<prefix>_<local time>.<ext>` in `dir`, suffixed until it is unused
pub fn timestamped_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let mut path = dir.join(format!("{}_{}.{}", prefix, timestamp, extension));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{}_{}_{}.{}", prefix, timestamp, n, extension));
        n += 1;
    }
    path
}

/// Locations of a persisted recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedVideo {
    pub video: PathBuf,
    pub thumbnail: PathBuf,
}

/// Downstream persistence for finished captures
pub trait ArtifactStore: Send + Sync {
    fn save_video(&self, artifact: &Artifact) -> AppResult<SavedVideo>;

    fn save_photo(&self, png: &[u8]) -> AppResult<PathBuf>;
}

/// Stores captures as plain files in one directory
#[derive(Debug, Clone)]
pub struct DirectoryArtifactStore {
    dir: PathBuf,
}

impl DirectoryArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactStore for DirectoryArtifactStore {
    fn save_video(&self, artifact: &Artifact) -> AppResult<SavedVideo> {
        std::fs::create_dir_all(&self.dir)?;

        let extension = artifact
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let video = timestamped_path(&self.dir, "VID", extension);
        std::fs::copy(&artifact.path, &video)?;

        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "VID".to_string());
        let thumbnail = self.dir.join(format!("{}_thumb.png", stem));
        std::fs::write(&thumbnail, encode_png(&artifact.thumbnail)?)?;

        info!(
            video = %video.display(),
            thumbnail = %thumbnail.display(),
            duration_ms = artifact.duration.as_millis() as u64,
            "Saved recording"
        );
        Ok(SavedVideo { video, thumbnail })
    }

    fn save_photo(&self, png: &[u8]) -> AppResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = timestamped_path(&self.dir, "IMG", "png");
        std::fs::write(&path, png)?;
        debug!(path = %path.display(), bytes = png.len(), "Saved photo");
        Ok(path)
    }
}
