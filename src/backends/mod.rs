// SPDX-License-Identifier: MPL-2.0

//! Frame producers and per-frame analysis
//!
//! [`camera`] pushes frames into the app through a callback. The
//! [`segmentation`] backend turns a frame into a foreground mask that the
//! filter stage composites with.

pub mod camera;
pub mod segmentation;
