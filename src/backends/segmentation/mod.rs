// SPDX-License-Identifier: GPL-3.0-only

//! Segmentation backends
//!
//! A segmentation backend turns a frame into a foreground matte. Producing no
//! mask is an expected outcome (no subject, backend busy, unsupported format)
//! and callers fall back to the unfiltered frame.

mod chroma_key;

pub use chroma_key::ChromaKeyBackend;

use crate::backends::camera::types::{Frame, Mask};
use thiserror::Error;

/// Reasons a mask could not be computed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FilterError {
    /// Backend ran but found nothing to segment
    #[error("No segmentation result")]
    NoResult,
    /// Frame layout the backend cannot read
    #[error("Unsupported frame: {0}")]
    UnsupportedFrame(String),
    /// Backend-specific failure
    #[error("Segmentation backend error: {0}")]
    Backend(String),
}

/// Person/foreground segmentation
pub trait FilterBackend: Send + Sync {
    /// Compute a matte for `frame`
    ///
    /// `high_quality` selects the slower, higher-resolution path used for the
    /// recorded stream; previews use the fast path.
    fn compute_mask(&self, frame: &Frame, high_quality: bool) -> Result<Mask, FilterError>;
}
