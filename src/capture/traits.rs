//! Capture trait definitions
//!
//! Platform-agnostic seams for the capture hardware: device parameter
//! control and the capture graph (inputs, outputs, frame delivery). The
//! shipped backend is the simulator in [`crate::capture::sim`]; a real
//! platform backend implements the same two traits.

use crate::capture::frames::{CaptureEvent, PhotoSettings};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Capture-backend errors.
#[derive(Error, Debug, Clone)]
pub enum CaptureError {
    #[error("no capture device for the requested position")]
    DeviceNotFound,

    #[error("capture graph configuration failed: {0}")]
    Configuration(String),

    #[error("device configuration rejected: {0}")]
    Control(String),
}

/// Result type alias for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Physical camera position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePosition {
    Front,
    Back,
}

impl DevicePosition {
    /// The opposite position, used by camera switching.
    pub fn toggled(self) -> Self {
        match self {
            DevicePosition::Front => DevicePosition::Back,
            DevicePosition::Back => DevicePosition::Front,
        }
    }
}

/// Flash mode carried on the session and applied per photo capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    Auto,
    On,
    Off,
}

impl Default for FlashMode {
    fn default() -> Self {
        Self::Auto
    }
}

/// Continuous zoom bounds reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

impl ZoomRange {
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

/// Static description of a camera device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: String,
    pub position: DevicePosition,
    pub has_flash: bool,
}

/// Parameter surface of a bound camera device.
///
/// Implementations serialize their own parameter access; callers may hold
/// the handle on any thread (the gesture zoom controller mutates zoom
/// concurrently with the session loop).
pub trait DeviceControl: Send + Sync {
    fn descriptor(&self) -> DeviceDescriptor;

    /// Whether the device is still usable; cached devices reporting false
    /// are rediscovered.
    fn is_connected(&self) -> bool;

    fn zoom_range(&self) -> ZoomRange;

    fn zoom_factor(&self) -> f64;

    fn set_zoom_factor(&self, factor: f64) -> CaptureResult<()>;

    /// Exposure bias bounds as (min, max).
    fn exposure_bias_range(&self) -> (f64, f64);

    fn set_exposure_bias(&self, bias: f64) -> CaptureResult<()>;

    /// Continuous autofocus / auto-exposure / auto-white-balance, where
    /// supported.
    fn apply_continuous_auto_modes(&self) -> CaptureResult<()>;
}

/// The capture graph: device inputs, photo and data outputs, and the frame
/// stream. Exclusively owned and driven by the session controller.
#[async_trait]
pub trait CaptureGraph: Send {
    /// Find a camera for the given position. Discovery cost is the caller's
    /// concern; the session controller caches results per position.
    fn discover(&mut self, position: DevicePosition) -> Option<Arc<dyn DeviceControl>>;

    /// Positions with at least one discoverable camera.
    fn available_positions(&self) -> Vec<DevicePosition>;

    /// Bind (or replace) the video device input.
    fn set_video_input(&mut self, device: Arc<dyn DeviceControl>) -> CaptureResult<()>;

    /// Currently bound video device, if any.
    fn video_device(&self) -> Option<Arc<dyn DeviceControl>>;

    /// Bind the microphone input.
    fn bind_audio_input(&mut self) -> CaptureResult<()>;

    /// Attach the photo output and the video/audio data outputs.
    fn attach_outputs(&mut self) -> CaptureResult<()>;

    /// Whether a live video connection exists (video input bound and data
    /// outputs attached).
    fn has_video_connection(&self) -> bool;

    /// Mirror the video and photo connections (front camera).
    fn set_mirrored(&mut self, mirrored: bool);

    /// Request the hardware pipeline to start. Completion is signalled via
    /// the running flag, which callers poll; some hardware takes hundreds of
    /// milliseconds before frames actually flow.
    async fn start(&mut self) -> CaptureResult<()>;

    /// Stop the hardware pipeline. The graph stays configured.
    fn stop(&mut self);

    /// Shared flag that turns true once the pipeline delivers frames.
    fn running_flag(&self) -> Arc<AtomicBool>;

    fn is_running(&self) -> bool;

    /// Asynchronous photo capture; the result arrives as
    /// [`CaptureEvent::Photo`] carrying the same request id.
    fn capture_photo(&mut self, request_id: u64, settings: PhotoSettings);

    /// Take the event stream. Yields `Some` once per configuration cycle.
    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<CaptureEvent>>;

    /// Remove all inputs and outputs and release resources. The graph can
    /// be reconfigured afterwards.
    fn teardown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_toggles() {
        assert_eq!(DevicePosition::Back.toggled(), DevicePosition::Front);
        assert_eq!(DevicePosition::Front.toggled(), DevicePosition::Back);
    }

    #[test]
    fn test_zoom_range_clamp() {
        let range = ZoomRange { min: 0.5, max: 6.0 };
        assert_eq!(range.clamp(0.1), 0.5);
        assert_eq!(range.clamp(3.0), 3.0);
        assert_eq!(range.clamp(9.0), 6.0);
    }
}
