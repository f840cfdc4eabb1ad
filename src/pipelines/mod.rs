// SPDX-License-Identifier: MPL-2.0

//! Processing pipelines for captured frames
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Camera Frame │ ──▶ │  Filter Pipeline  │ ──▶ │   Preview    │
//! │   (RGBA)     │     │  - mask           │     │              │
//! │              │     │  - blend          │     │              │
//! └──────────────┘     └─────────┬─────────┘     └──────────────┘
//!                                │ while recording
//!                                ▼
//!                      ┌───────────────────┐     ┌──────────────┐
//!                      │  Video Pipeline   │ ──▶ │  MP4 / WebM  │
//!                      │  - ordered queue  │     │              │
//!                      │  - pooled encoder │     │              │
//!                      └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`filter`]: Mask-based background removal with pass-through fallback
//! - [`video`]: Serialized recording with GStreamer encoding

pub mod filter;
pub mod video;
