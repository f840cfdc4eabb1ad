// SPDX-License-Identifier: GPL-3.0-only

//! Mask compositing
//!
//! The mask is resampled to the frame's resolution with nearest-neighbour
//! sampling, using independent horizontal and vertical scale factors. Each
//! output channel is `orig * a + bg * (1 - a)` in 8-bit fixed point, so the
//! same inputs always give the same bytes.

use crate::backends::camera::types::{Frame, Mask, PixelFormat};

/// What shows through where the mask is zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Background {
    /// The mask itself as a transparent matte: `(v, v, v, v)` for mask value `v`
    #[default]
    Matte,
    /// A fixed RGBA colour
    Solid([u8; 4]),
}

/// Stateless frame/mask compositor
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameBlender {
    background: Background,
    mirror: bool,
}

impl FrameBlender {
    pub fn new(background: Background) -> Self {
        Self {
            background,
            mirror: false,
        }
    }

    /// Flip the output left/right, toggling its orientation tag
    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    /// Composite `original` over the background selected by `mask`
    ///
    /// The output is a packed RGBA frame with the original's dimensions and
    /// timestamp.
    pub fn blend(&self, original: &Frame, mask: &Mask) -> Frame {
        let width = original.width;
        let height = original.height;
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);

        for y in 0..height {
            // Row index in the mask: y / sy where sy = height / mask.height
            let my = scaled_index(y, mask.height, height);
            for x in 0..width {
                let mx = scaled_index(x, mask.width, width);
                let alpha = mask.value(mx, my) as u32;
                let fg = original.rgba_at(x, y);
                let bg = match self.background {
                    Background::Matte => {
                        let v = mask.value(mx, my);
                        [v, v, v, v]
                    }
                    Background::Solid(rgba) => rgba,
                };
                for c in 0..4 {
                    data.push(mix(fg[c], bg[c], alpha));
                }
            }
        }

        let mut orientation = original.orientation;
        if self.mirror {
            flip_horizontal_rgba(&mut data, width as usize, height as usize);
            orientation = orientation.mirrored();
        }

        Frame {
            width,
            height,
            stride: width * 4,
            format: PixelFormat::RGBA,
            data: data.into(),
            timestamp: original.timestamp,
            orientation,
        }
    }
}

/// Nearest source index for destination index `i` when mapping `src_len` onto `dst_len`
fn scaled_index(i: u32, src_len: u32, dst_len: u32) -> u32 {
    let idx = (i as u64 * src_len as u64 / dst_len.max(1) as u64) as u32;
    idx.min(src_len.saturating_sub(1))
}

fn mix(fg: u8, bg: u8, alpha: u32) -> u8 {
    ((fg as u32 * alpha + bg as u32 * (255 - alpha) + 127) / 255) as u8
}

/// Left/right mirror of a frame as packed RGBA, toggling its orientation tag
pub fn mirror_frame(frame: &Frame) -> Frame {
    let mut data = Vec::with_capacity(frame.width as usize * frame.height as usize * 4);
    for y in 0..frame.height {
        for x in 0..frame.width {
            data.extend_from_slice(&frame.rgba_at(x, y));
        }
    }
    flip_horizontal_rgba(&mut data, frame.width as usize, frame.height as usize);
    Frame {
        width: frame.width,
        height: frame.height,
        stride: frame.width * 4,
        format: PixelFormat::RGBA,
        data: data.into(),
        timestamp: frame.timestamp,
        orientation: frame.orientation.mirrored(),
    }
}

/// Mirror RGBA rows in place
pub fn flip_horizontal_rgba(data: &mut [u8], width: usize, height: usize) {
    let row_bytes = width * 4;
    for y in 0..height {
        let row_start = y * row_bytes;
        for x in 0..width / 2 {
            let left_pixel = row_start + x * 4;
            let right_pixel = row_start + (width - 1 - x) * 4;
            for i in 0..4 {
                data.swap(left_pixel + i, right_pixel + i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{Orientation, Timestamp};

    fn half_mask() -> Mask {
        // 2x1 mask: left foreground, right background
        Mask::new(2, 1, vec![255u8, 0]).expect("mask")
    }

    #[test]
    fn test_output_matches_original_dimensions() {
        let frame = Frame::solid_rgba(8, 6, [10, 20, 30, 255], Timestamp::from_millis(5));
        let mask = Mask::new(2, 3, vec![255u8; 6]).expect("mask");
        let out = FrameBlender::default().blend(&frame, &mask);
        assert_eq!((out.width, out.height), (8, 6));
        assert_eq!(out.timestamp, frame.timestamp);
        assert_eq!(out.data.len(), 8 * 6 * 4);
    }

    #[test]
    fn test_full_mask_keeps_original() {
        let frame = Frame::solid_rgba(4, 4, [10, 20, 30, 255], Timestamp::ZERO);
        let mask = Mask::new(1, 1, vec![255u8]).expect("mask");
        let out = FrameBlender::new(Background::Solid([0, 0, 0, 0])).blend(&frame, &mask);
        assert!(out.data.chunks(4).all(|px| px == [10, 20, 30, 255]));
    }

    #[test]
    fn test_matte_background_is_transparent() {
        let frame = Frame::solid_rgba(4, 2, [200, 100, 50, 255], Timestamp::ZERO);
        let out = FrameBlender::default().blend(&frame, &half_mask());
        assert_eq!(out.rgba_at(0, 0), [200, 100, 50, 255]);
        assert_eq!(out.rgba_at(3, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn test_mask_scaled_anisotropically() {
        let frame = Frame::solid_rgba(8, 2, [1, 2, 3, 255], Timestamp::ZERO);
        let out = FrameBlender::new(Background::Solid([9, 9, 9, 9])).blend(&frame, &half_mask());
        for x in 0..4 {
            assert_eq!(out.rgba_at(x, 1), [1, 2, 3, 255]);
        }
        for x in 4..8 {
            assert_eq!(out.rgba_at(x, 1), [9, 9, 9, 9]);
        }
    }

    #[test]
    fn test_mirror_flips_pixels_and_orientation() {
        let frame = Frame::solid_rgba(4, 1, [200, 100, 50, 255], Timestamp::ZERO);
        let plain = FrameBlender::default().blend(&frame, &half_mask());
        assert_eq!(plain.orientation, Orientation::Up);

        let mirrored = FrameBlender::default()
            .with_mirror(true)
            .blend(&frame, &half_mask());
        assert_eq!(mirrored.orientation, Orientation::UpMirrored);
        assert_eq!(mirrored.rgba_at(0, 0), plain.rgba_at(3, 0));
        assert_eq!(mirrored.rgba_at(3, 0), plain.rgba_at(0, 0));
    }

    #[test]
    fn test_mirror_frame_matches_blend_mirror() {
        let frame = Frame::new(
            2,
            1,
            PixelFormat::RGBA,
            vec![1u8, 1, 1, 255, 2, 2, 2, 255],
            Timestamp::ZERO,
        )
        .expect("frame");
        let mirrored = mirror_frame(&frame);
        assert_eq!(mirrored.rgba_at(0, 0), [2, 2, 2, 255]);
        assert_eq!(mirrored.orientation, Orientation::UpMirrored);

        let full = Mask::new(1, 1, vec![255u8]).expect("mask");
        let blended = FrameBlender::default().with_mirror(true).blend(&frame, &full);
        assert_eq!(blended.data, mirrored.data);
    }

    #[test]
    fn test_orientation_passes_through() {
        let mut frame = Frame::solid_rgba(2, 2, [1, 1, 1, 255], Timestamp::ZERO);
        frame.orientation = Orientation::UpMirrored;
        let mask = Mask::new(1, 1, vec![128u8]).expect("mask");
        let out = FrameBlender::default().blend(&frame, &mask);
        assert_eq!(out.orientation, Orientation::UpMirrored);
    }
}
