//! Session configuration
//!
//! Every empirically-chosen constant in the capture/recording path lives
//! here as a tunable with the production default.

use crate::recorder::writer::AudioTrackSettings;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Video encode tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EncodeTunables {
    /// Target bitrate at the reference geometry.
    pub base_bitrate: u32,
    pub reference_width: u32,
    pub reference_height: u32,
    /// Bitrate band after pixel-count scaling.
    pub min_bitrate: u32,
    pub max_bitrate: u32,
    /// Audio track settings, fixed per recording.
    pub audio: AudioTrackSettings,
}

impl Default for EncodeTunables {
    fn default() -> Self {
        Self {
            base_bitrate: 6_000_000,
            reference_width: 1920,
            reference_height: 1080,
            min_bitrate: 1_000_000,
            max_bitrate: 12_000_000,
            audio: AudioTrackSettings::default(),
        }
    }
}

impl EncodeTunables {
    pub fn reference_pixels(&self) -> u64 {
        self.reference_width as u64 * self.reference_height as u64
    }
}

/// Continuous zoom gesture tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZoomTunables {
    /// Curated zoom levels offered to the UI, filtered by device support.
    pub preferred_levels: Vec<f64>,
    /// Maximum number of curated levels returned.
    pub max_levels: usize,
    /// Minimum zoom-factor change before a gesture update is applied.
    pub min_delta: f64,
    /// Minimum interval between applied gesture updates.
    pub min_interval_ms: u64,
    /// Drag-to-zoom constant: vertical pixels per factor-of-e change.
    pub drag_scale_px: f64,
}

impl Default for ZoomTunables {
    fn default() -> Self {
        Self {
            preferred_levels: vec![0.5, 1.0, 2.0, 3.0, 5.0],
            max_levels: 3,
            min_delta: 0.01,
            min_interval_ms: 50,
            drag_scale_px: 220.0,
        }
    }
}

/// Session-wide tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionTunables {
    /// Directory for captured photos and recordings. Defaults to the
    /// process temp directory.
    pub output_dir: Option<PathBuf>,

    /// Extra wait after the pipeline confirms running; first-frame quality
    /// on some hardware is poor immediately after start.
    pub settle_delay_ms: u64,

    /// How long to poll for session-start confirmation, and at what cadence.
    pub session_start_timeout_ms: u64,
    pub session_start_poll_ms: u64,

    /// Fail-safe unmute after a camera switch when no video frame shows up.
    pub switch_mute_fallback_ms: u64,

    /// Timestamp deviation beyond which the reconciler folds the difference
    /// into the timeline offset.
    pub discontinuity_threshold_ms: u64,

    /// Nominal capture frame rate; drives the reconciler's prediction step.
    pub nominal_frame_rate: u32,

    /// How far an audio timestamp may precede the last written video
    /// timestamp before the sample is dropped.
    pub audio_video_tolerance_ms: u64,

    /// Aspect ratio of the active preview; the video track is center-cropped
    /// to it. `None` keeps the frame's native aspect.
    pub preview_aspect: Option<f64>,

    pub encode: EncodeTunables,
    pub zoom: ZoomTunables,
}

impl Default for SessionTunables {
    fn default() -> Self {
        Self {
            output_dir: None,
            settle_delay_ms: 100,
            session_start_timeout_ms: 3_000,
            session_start_poll_ms: 100,
            switch_mute_fallback_ms: 1_000,
            discontinuity_threshold_ms: 100,
            nominal_frame_rate: 30,
            audio_video_tolerance_ms: 500,
            preview_aspect: None,
            encode: EncodeTunables::default(),
            zoom: ZoomTunables::default(),
        }
    }
}

impl SessionTunables {
    pub fn resolve_output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn nominal_frame_duration_us(&self) -> i64 {
        if self.nominal_frame_rate == 0 {
            33_333
        } else {
            1_000_000 / self.nominal_frame_rate as i64
        }
    }

    pub fn discontinuity_threshold_us(&self) -> i64 {
        self.discontinuity_threshold_ms as i64 * 1_000
    }

    pub fn audio_video_tolerance_us(&self) -> i64 {
        self.audio_video_tolerance_ms as i64 * 1_000
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn session_start_poll(&self) -> Duration {
        Duration::from_millis(self.session_start_poll_ms.max(1))
    }

    pub fn session_start_attempts(&self) -> u64 {
        (self.session_start_timeout_ms / self.session_start_poll_ms.max(1)).max(1)
    }

    pub fn switch_mute_fallback(&self) -> Duration {
        Duration::from_millis(self.switch_mute_fallback_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_production_constants() {
        let cfg = SessionTunables::default();
        assert_eq!(cfg.discontinuity_threshold_us(), 100_000);
        assert_eq!(cfg.nominal_frame_duration_us(), 33_333);
        assert_eq!(cfg.session_start_attempts(), 30);
        assert_eq!(cfg.encode.audio.sample_rate, 44_100);
        assert_eq!(cfg.encode.audio.channels, 1);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let cfg: SessionTunables =
            serde_json::from_str(r#"{"discontinuityThresholdMs": 250}"#).unwrap();
        assert_eq!(cfg.discontinuity_threshold_ms, 250);
        assert_eq!(cfg.settle_delay_ms, 100);
        assert_eq!(cfg.zoom.max_levels, 3);
    }
}
