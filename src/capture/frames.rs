//! Frame and sample types flowing out of the capture graph.

use crate::capture::traits::{CaptureError, FlashMode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Presentation timestamp in microseconds.
///
/// Integer microseconds keep the ordering invariants exact; float seconds
/// are only used at logging/serialization edges.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Pts(i64);

impl Pts {
    pub const ZERO: Pts = Pts(0);

    pub fn from_micros(us: i64) -> Self {
        Pts(us)
    }

    pub fn from_millis(ms: i64) -> Self {
        Pts(ms.saturating_mul(1_000))
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }

    pub fn as_millis_f64(self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Shift by a signed number of microseconds.
    pub fn offset_by(self, us: i64) -> Self {
        Pts(self.0.saturating_add(us))
    }

    /// Signed difference `self - other` in microseconds.
    pub fn delta(self, other: Pts) -> i64 {
        self.0.saturating_sub(other.0)
    }
}

/// One captured video frame. Pixel data is packed BGRA, `width * height * 4`
/// bytes, shared so fan-out stays cheap.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub pts: Pts,
    pub width: u32,
    pub height: u32,
    pub data: Arc<Vec<u8>>,
}

impl VideoFrame {
    pub fn bytes_per_row(&self) -> usize {
        self.width as usize * 4
    }

    pub fn aspect(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

/// One captured audio chunk: packed signed 16-bit little-endian PCM,
/// `frame_count` sample frames.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub pts: Pts,
    pub frame_count: u32,
    pub data: Arc<Vec<u8>>,
}

/// Settings resolved by the session controller for one photo capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoSettings {
    /// Flash mode, present only when the bound device reports flash support.
    pub flash: Option<FlashMode>,
    /// Horizontal mirroring, set for the front position.
    pub mirrored: bool,
}

/// Encoded photo bytes delivered by the capture backend.
#[derive(Debug, Clone)]
pub struct PhotoData {
    pub bytes: Vec<u8>,
}

/// Events funneled from the capture hardware into the session controller's
/// serial loop.
#[derive(Debug)]
pub enum CaptureEvent {
    Video(VideoFrame),
    Audio(AudioChunk),
    Photo {
        request_id: u64,
        result: Result<PhotoData, CaptureError>,
    },
}
