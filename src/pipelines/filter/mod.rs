// SPDX-License-Identifier: GPL-3.0-only

//! Per-frame filter stage
//!
//! ```text
//! Frame ──▶ FilterBackend::compute_mask ──▶ FrameBlender::blend ──▶ Frame
//!                     │ FilterError
//!                     └──────────────▶ original frame passed through
//! ```
//!
//! Filtering never fails the pipeline. Whatever goes wrong computing a mask,
//! the caller gets the unfiltered frame back.

pub mod blend;

pub use blend::{Background, FrameBlender, mirror_frame};

use crate::backends::camera::types::{Frame, VideoFilter};
use crate::backends::segmentation::FilterBackend;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Applies the selected [`VideoFilter`] to frames
pub struct FilterStage {
    filter: VideoFilter,
    backend: Arc<dyn FilterBackend>,
    blender: FrameBlender,
    mirror: bool,
    fallbacks: AtomicU64,
}

impl FilterStage {
    pub fn new(filter: VideoFilter, backend: Arc<dyn FilterBackend>, blender: FrameBlender) -> Self {
        Self {
            filter,
            backend,
            blender,
            mirror: false,
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Mirror every output frame left/right, filtered or not
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn filter(&self) -> VideoFilter {
        self.filter
    }

    /// Number of frames that were passed through because masking failed
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Filter one frame, returning the original when no mask is available
    pub fn process(&self, frame: Frame, high_quality: bool) -> Frame {
        if self.filter == VideoFilter::RemoveBackground {
            match self.backend.compute_mask(&frame, high_quality) {
                Ok(mask) => return self.blender.with_mirror(self.mirror).blend(&frame, &mask),
                Err(e) => {
                    let n = self.fallbacks.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(error = %e, fallbacks = n, "Mask unavailable, passing frame through");
                }
            }
        }
        if self.mirror {
            mirror_frame(&frame)
        } else {
            frame
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{Mask, Timestamp};
    use crate::backends::segmentation::FilterError;

    struct FailingBackend;

    impl FilterBackend for FailingBackend {
        fn compute_mask(&self, _frame: &Frame, _hq: bool) -> Result<Mask, FilterError> {
            Err(FilterError::NoResult)
        }
    }

    struct ClearBackend;

    impl FilterBackend for ClearBackend {
        fn compute_mask(&self, _frame: &Frame, _hq: bool) -> Result<Mask, FilterError> {
            Ok(Mask::new(1, 1, vec![0u8]).expect("mask"))
        }
    }

    #[test]
    fn test_failure_passes_original_through() {
        let stage = FilterStage::new(
            VideoFilter::RemoveBackground,
            Arc::new(FailingBackend),
            FrameBlender::default(),
        );
        let frame = Frame::solid_rgba(4, 4, [9, 8, 7, 255], Timestamp::ZERO);
        let out = stage.process(frame.clone(), false);
        assert!(Arc::ptr_eq(&out.data, &frame.data));
        assert_eq!(stage.fallback_count(), 1);
    }

    #[test]
    fn test_no_filter_skips_backend() {
        let stage = FilterStage::new(
            VideoFilter::None,
            Arc::new(FailingBackend),
            FrameBlender::default(),
        );
        let frame = Frame::solid_rgba(4, 4, [9, 8, 7, 255], Timestamp::ZERO);
        stage.process(frame, true);
        assert_eq!(stage.fallback_count(), 0);
    }

    #[test]
    fn test_mirror_applies_without_filter() {
        let stage = FilterStage::new(
            VideoFilter::None,
            Arc::new(FailingBackend),
            FrameBlender::default(),
        )
        .with_mirror(true);
        let frame = Frame::solid_rgba(2, 2, [9, 8, 7, 255], Timestamp::ZERO);
        let out = stage.process(frame, false);
        assert_eq!(
            out.orientation,
            crate::backends::camera::types::Orientation::UpMirrored
        );
    }

    #[test]
    fn test_remove_background_blends() {
        let stage = FilterStage::new(
            VideoFilter::RemoveBackground,
            Arc::new(ClearBackend),
            FrameBlender::default(),
        );
        let frame = Frame::solid_rgba(4, 4, [9, 8, 7, 255], Timestamp::ZERO);
        let out = stage.process(frame, true);
        assert!(out.data.iter().all(|&b| b == 0));
    }
}
