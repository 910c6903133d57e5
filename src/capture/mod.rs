//! Capture layer
//!
//! Hardware-facing seams (device control, capture graph) plus the frame and
//! sample types delivered to the session controller. The simulated backend
//! lives in [`sim`].

pub mod frames;
pub mod sim;
pub mod traits;

pub use frames::{AudioChunk, CaptureEvent, PhotoData, PhotoSettings, Pts, VideoFrame};
pub use traits::{
    CaptureError, CaptureGraph, CaptureResult, DeviceControl, DeviceDescriptor, DevicePosition,
    FlashMode, ZoomRange,
};
