// SPDX-License-Identifier: GPL-3.0-only
// Shared types for capture sources, filters and the recording pipeline

//! Shared frame and device types

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Presentation timestamp on the capture clock, in nanoseconds
///
/// All frames delivered by a [`CaptureSource`](super::CaptureSource) share one
/// monotonic clock domain, and the recording session origin is expressed on
/// the same clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is later than `self`
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Offset this timestamp forward by `duration`
    pub fn saturating_add(&self, duration: Duration) -> Self {
        Self(self.0.saturating_add(Self::from_duration(duration).0))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.0 as f64 / 1_000_000_000.0)
    }
}

/// Pixel format for frames flowing through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    /// This is the canonical format used by the blender and the encoder
    RGBA,
    /// BGRA - 32-bit with alpha (B G R A byte order)
    /// Common format from capture hardware, swizzled to RGBA on encode
    BGRA,
    /// Gray8 - 8-bit single channel (segmentation masks)
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel for this format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::RGBA | PixelFormat::BGRA => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Orientation tag carried with every frame
///
/// The blender and encoder pass this through untouched. Only an explicit
/// mirror request flips the pixel data, and then the tag flips with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    #[default]
    Up,
    /// Horizontally mirrored relative to the sensor
    UpMirrored,
}

impl Orientation {
    /// The orientation after a left/right mirror
    pub fn mirrored(&self) -> Self {
        match self {
            Orientation::Up => Orientation::UpMirrored,
            Orientation::UpMirrored => Orientation::Up,
        }
    }
}

/// A single immutable frame from the capture source
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes (may include padding)
    pub stride: u32,
    pub format: PixelFormat,
    pub data: Arc<[u8]>,
    pub timestamp: Timestamp,
    pub orientation: Orientation,
}

impl Frame {
    /// Build a tightly packed frame, validating the buffer length
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: impl Into<Arc<[u8]>>,
        timestamp: Timestamp,
    ) -> DeviceResult<Self> {
        let data = data.into();
        let stride = width as usize * format.bytes_per_pixel();
        let expected = stride * height as usize;
        if data.len() < expected {
            return Err(DeviceError::FormatNotSupported(format!(
                "Frame data size {} is smaller than {} for {}x{} {:?}",
                data.len(),
                expected,
                width,
                height,
                format
            )));
        }

        Ok(Self {
            width,
            height,
            stride: stride as u32,
            format,
            data,
            timestamp,
            orientation: Orientation::Up,
        })
    }

    /// A frame filled with a single RGBA colour
    pub fn solid_rgba(width: u32, height: u32, rgba: [u8; 4], timestamp: Timestamp) -> Self {
        let data: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            stride: width * 4,
            format: PixelFormat::RGBA,
            data: data.into(),
            timestamp,
            orientation: Orientation::Up,
        }
    }

    /// Bytes of row `y`, without stride padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        let len = self.width as usize * self.format.bytes_per_pixel();
        &self.data[start..start + len]
    }

    /// Pixel at (x, y) as RGBA regardless of the stored format
    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        let bpp = self.format.bytes_per_pixel();
        let idx = y as usize * self.stride as usize + x as usize * bpp;
        let px = &self.data[idx..idx + bpp];
        match self.format {
            PixelFormat::RGBA => [px[0], px[1], px[2], px[3]],
            PixelFormat::BGRA => [px[2], px[1], px[0], px[3]],
            PixelFormat::Gray8 => [px[0], px[0], px[0], 255],
        }
    }
}

/// Single-channel segmentation matte for one frame
///
/// Same scene as its frame but usually at a lower resolution. 255 marks
/// foreground, 0 background.
#[derive(Debug, Clone)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

impl Mask {
    pub fn new(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Option<Self> {
        let data = data.into();
        if width == 0 || height == 0 || data.len() < width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Intensity at (x, y)
    pub fn value(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }
}

/// Capture resolution presets (portrait sizes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum VideoResolution {
    Sd,
    #[default]
    Hd,
    FullHd,
    Uhd4K,
    Custom { width: u32, height: u32 },
}

impl VideoResolution {
    /// Output size in pixels (width, height)
    pub fn size(&self) -> (u32, u32) {
        match self {
            VideoResolution::Sd => (480, 640),
            VideoResolution::Hd => (720, 1280),
            VideoResolution::FullHd => (1080, 1920),
            VideoResolution::Uhd4K => (2160, 3840),
            VideoResolution::Custom { width, height } => (*width, *height),
        }
    }
}

impl std::fmt::Display for VideoResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (w, h) = self.size();
        write!(f, "{}x{}", w, h)
    }
}

/// Per-frame filter applied before preview and recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum VideoFilter {
    #[default]
    None,
    RemoveBackground,
}

/// Which camera faces the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum CameraDirection {
    #[default]
    Front,
    Back,
}

impl CameraDirection {
    pub fn toggled(&self) -> Self {
        match self {
            CameraDirection::Front => CameraDirection::Back,
            CameraDirection::Back => CameraDirection::Front,
        }
    }

    /// Front cameras deliver mirrored video
    pub fn is_mirrored(&self) -> bool {
        matches!(self, CameraDirection::Front)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TorchMode {
    On,
    #[default]
    Off,
}

impl TorchMode {
    pub fn toggled(&self) -> Self {
        match self {
            TorchMode::On => TorchMode::Off,
            TorchMode::Off => TorchMode::On,
        }
    }
}

/// Result type for capture device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Capture device errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// Camera, microphone or output target is not present
    #[error("Device not available: {0}")]
    NotAvailable(String),
    /// Capture session failed to configure or start
    #[error("Capture session failed: {0}")]
    SessionFailed(String),
    /// Frame layout not understood
    #[error("Format not supported: {0}")]
    FormatNotSupported(String),
    /// Torch could not be toggled
    #[error("Torch failed: {0}")]
    TorchFailed(String),
    /// Operation needs an active camera
    #[error("No current camera")]
    CurrentCameraNotSet,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let t0 = Timestamp::from_millis(100);
        let t1 = Timestamp::from_millis(166);
        assert_eq!(t1.saturating_duration_since(t0), Duration::from_millis(66));
        assert_eq!(t0.saturating_duration_since(t1), Duration::ZERO);
        assert_eq!(t0.saturating_add(Duration::from_millis(66)), t1);
    }

    #[test]
    fn test_frame_new_rejects_short_buffer() {
        let result = Frame::new(4, 4, PixelFormat::RGBA, vec![0u8; 10], Timestamp::ZERO);
        assert!(matches!(result, Err(DeviceError::FormatNotSupported(_))));
    }

    #[test]
    fn test_rgba_at_swizzles_bgra() {
        let frame = Frame::new(1, 1, PixelFormat::BGRA, vec![1u8, 2, 3, 4], Timestamp::ZERO)
            .expect("valid frame");
        assert_eq!(frame.rgba_at(0, 0), [3, 2, 1, 4]);
    }

    #[test]
    fn test_resolution_sizes_are_portrait() {
        for res in [
            VideoResolution::Sd,
            VideoResolution::Hd,
            VideoResolution::FullHd,
            VideoResolution::Uhd4K,
        ] {
            let (w, h) = res.size();
            assert!(h > w, "{res} should be portrait");
        }
    }

    #[test]
    fn test_orientation_mirror_round_trip() {
        assert_eq!(Orientation::Up.mirrored(), Orientation::UpMirrored);
        assert_eq!(Orientation::Up.mirrored().mirrored(), Orientation::Up);
    }
}
