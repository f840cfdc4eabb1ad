// SPDX-License-Identifier: GPL-3.0-only

//! Chroma-key segmentation
//!
//! Marks every pixel whose colour is far enough from the key colour as
//! foreground. The mask is computed on a subsampled grid, so it comes out at
//! a lower resolution than the frame just like a model-based segmenter.

use super::{FilterBackend, FilterError};
use crate::backends::camera::test_pattern::GREEN_SCREEN;
use crate::backends::camera::types::{Frame, Mask, PixelFormat};
use tracing::debug;

/// Mask subsampling for the preview path
const PREVIEW_DOWNSCALE: u32 = 4;
/// Mask subsampling for the recorded path
const HIGH_QUALITY_DOWNSCALE: u32 = 2;

/// Colour-distance segmentation against a fixed backdrop colour
#[derive(Debug, Clone)]
pub struct ChromaKeyBackend {
    key: [u8; 3],
    /// Distance below which a pixel is pure background
    tolerance: f32,
    /// Width of the ramp from background to foreground
    softness: f32,
}

impl Default for ChromaKeyBackend {
    fn default() -> Self {
        Self::new(GREEN_SCREEN, 60.0, 40.0)
    }
}

impl ChromaKeyBackend {
    pub fn new(key: [u8; 3], tolerance: f32, softness: f32) -> Self {
        Self {
            key,
            tolerance: tolerance.max(0.0),
            softness: softness.max(1.0),
        }
    }

    fn alpha_for(&self, rgba: [u8; 4]) -> u8 {
        let dr = rgba[0] as f32 - self.key[0] as f32;
        let dg = rgba[1] as f32 - self.key[1] as f32;
        let db = rgba[2] as f32 - self.key[2] as f32;
        let distance = (dr * dr + dg * dg + db * db).sqrt();
        let t = ((distance - self.tolerance) / self.softness).clamp(0.0, 1.0);
        (t * 255.0).round() as u8
    }
}

impl FilterBackend for ChromaKeyBackend {
    fn compute_mask(&self, frame: &Frame, high_quality: bool) -> Result<Mask, FilterError> {
        if frame.format == PixelFormat::Gray8 {
            return Err(FilterError::UnsupportedFrame(
                "chroma key needs colour input".into(),
            ));
        }
        if frame.width == 0 || frame.height == 0 {
            return Err(FilterError::NoResult);
        }

        let downscale = if high_quality {
            HIGH_QUALITY_DOWNSCALE
        } else {
            PREVIEW_DOWNSCALE
        };
        let mask_w = (frame.width / downscale).max(1);
        let mask_h = (frame.height / downscale).max(1);

        let mut data = Vec::with_capacity(mask_w as usize * mask_h as usize);
        for my in 0..mask_h {
            // Sample the centre of each block
            let y = ((my * frame.height + frame.height / 2) / mask_h).min(frame.height - 1);
            for mx in 0..mask_w {
                let x = ((mx * frame.width + frame.width / 2) / mask_w).min(frame.width - 1);
                data.push(self.alpha_for(frame.rgba_at(x, y)));
            }
        }

        debug!(
            frame_w = frame.width,
            frame_h = frame.height,
            mask_w,
            mask_h,
            high_quality,
            "Computed chroma-key mask"
        );

        Mask::new(mask_w, mask_h, data).ok_or(FilterError::NoResult)
    }
}
