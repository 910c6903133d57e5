//! Frame geometry and bitrate math
//!
//! Center-crop dimensioning for the lazily-created video track and
//! pixel-proportional bitrate scaling.

use crate::capture::frames::VideoFrame;
use std::sync::Arc;

/// Center-crop `(width, height)` to the target aspect ratio without
/// scaling. Results are rounded down to even values, which every encoder in
/// the pipeline requires.
pub fn crop_dimensions(width: u32, height: u32, target_aspect: f64) -> (u32, u32) {
    if width == 0 || height == 0 || target_aspect <= 0.0 {
        return (width, height);
    }
    let source_aspect = width as f64 / height as f64;
    let (w, h) = if source_aspect > target_aspect {
        // Too wide: trim columns.
        (((height as f64) * target_aspect) as u32, height)
    } else {
        // Too tall: trim rows.
        (width, ((width as f64) / target_aspect) as u32)
    };
    (w & !1, h & !1)
}

/// Center-crop a BGRA frame's pixels to `dst_width x dst_height`.
///
/// The destination must not exceed the source in either dimension; callers
/// derive it with [`crop_dimensions`] from the same source geometry.
pub fn crop_bgra(frame: &VideoFrame, dst_width: u32, dst_height: u32) -> VideoFrame {
    if dst_width == frame.width && dst_height == frame.height {
        return frame.clone();
    }
    let src_row = frame.width as usize * 4;
    let dst_row = dst_width as usize * 4;
    let x_off = ((frame.width - dst_width) / 2) as usize * 4;
    let y_off = ((frame.height - dst_height) / 2) as usize;

    let mut out = Vec::with_capacity(dst_row * dst_height as usize);
    for row in 0..dst_height as usize {
        let start = (y_off + row) * src_row + x_off;
        out.extend_from_slice(&frame.data[start..start + dst_row]);
    }

    VideoFrame {
        pts: frame.pts,
        width: dst_width,
        height: dst_height,
        data: Arc::new(out),
    }
}

/// Scale a base bitrate by the pixel-count ratio against a reference
/// geometry, clamped to `[min, max]`.
pub fn scaled_bitrate(
    width: u32,
    height: u32,
    base_bitrate: u32,
    reference_pixels: u64,
    min_bitrate: u32,
    max_bitrate: u32,
) -> u32 {
    if reference_pixels == 0 {
        return base_bitrate;
    }
    let pixels = width as u64 * height as u64;
    let scaled = base_bitrate as f64 * pixels as f64 / reference_pixels as f64;
    (scaled as u32).clamp(min_bitrate, max_bitrate)
}
