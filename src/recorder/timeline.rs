//! Timestamp reconciliation across camera switches
//!
//! Replacing the video device input jumps the capture clock. The reconciler
//! keeps the written timeline smooth by folding any large deviation between
//! the predicted and the observed timestamp into a cumulative offset, and
//! applies the same offset to audio so both tracks share one corrected
//! timeline.

use crate::capture::frames::Pts;

/// Cumulative timestamp correction for one recording.
#[derive(Debug, Clone)]
pub struct Timeline {
    offset_us: i64,
    nominal_frame_us: i64,
    threshold_us: i64,
}

/// Restorable timeline bookkeeping, captured before a camera switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineSnapshot {
    offset_us: i64,
}

impl Timeline {
    pub fn new(nominal_frame_us: i64, threshold_us: i64) -> Self {
        Self {
            offset_us: 0,
            nominal_frame_us,
            threshold_us,
        }
    }

    /// Adjust a raw video timestamp.
    ///
    /// `last_written` is the adjusted timestamp of the most recently written
    /// video frame. When the adjusted candidate deviates from
    /// `last_written + nominal_frame` by more than the threshold, the
    /// deviation is folded into the offset and the candidate lands exactly
    /// on the prediction.
    pub fn adjust_video(&mut self, raw: Pts, last_written: Option<Pts>) -> Pts {
        let mut adjusted = raw.offset_by(-self.offset_us);
        if let Some(last) = last_written {
            let predicted = last.offset_by(self.nominal_frame_us);
            let deviation = adjusted.delta(predicted);
            if deviation.abs() > self.threshold_us {
                self.offset_us += deviation;
                tracing::debug!(
                    deviation_ms = deviation as f64 / 1_000.0,
                    offset_ms = self.offset_us as f64 / 1_000.0,
                    "timestamp discontinuity folded into timeline offset"
                );
                adjusted = predicted;
            }
        }
        adjusted
    }

    /// Adjust a raw audio timestamp with the current offset.
    pub fn adjust_audio(&self, raw: Pts) -> Pts {
        raw.offset_by(-self.offset_us)
    }

    pub fn offset_us(&self) -> i64 {
        self.offset_us
    }

    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            offset_us: self.offset_us,
        }
    }

    pub fn restore(&mut self, snapshot: TimelineSnapshot) {
        self.offset_us = snapshot.offset_us;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOMINAL: i64 = 33_333;
    const THRESHOLD: i64 = 100_000;

    fn timeline() -> Timeline {
        Timeline::new(NOMINAL, THRESHOLD)
    }

    #[test]
    fn test_first_frame_passes_through() {
        let mut tl = timeline();
        let adjusted = tl.adjust_video(Pts::from_micros(12_345), None);
        assert_eq!(adjusted.as_micros(), 12_345);
        assert_eq!(tl.offset_us(), 0);
    }

    #[test]
    fn test_small_jitter_untouched() {
        let mut tl = timeline();
        let last = Pts::from_micros(1_000_000);
        // 10 ms late relative to the prediction: below threshold.
        let adjusted = tl.adjust_video(Pts::from_micros(1_000_000 + NOMINAL + 10_000), Some(last));
        assert_eq!(adjusted.as_micros(), 1_000_000 + NOMINAL + 10_000);
        assert_eq!(tl.offset_us(), 0);
    }

    #[test]
    fn test_forward_jump_folded() {
        let mut tl = timeline();
        let last = Pts::from_micros(1_000_000);
        // Device switch: clock jumps 5 s ahead.
        let adjusted = tl.adjust_video(Pts::from_micros(6_000_000), Some(last));
        assert_eq!(adjusted.as_micros(), 1_000_000 + NOMINAL);
        assert_eq!(tl.offset_us(), 6_000_000 - (1_000_000 + NOMINAL));

        // Subsequent frames on the new clock progress smoothly.
        let next = tl.adjust_video(Pts::from_micros(6_000_000 + NOMINAL), Some(adjusted));
        assert_eq!(next.as_micros(), adjusted.as_micros() + NOMINAL);
    }

    #[test]
    fn test_backward_jump_folded() {
        let mut tl = timeline();
        let last = Pts::from_micros(8_000_000);
        let adjusted = tl.adjust_video(Pts::from_micros(3_000_000), Some(last));
        assert_eq!(adjusted.as_micros(), 8_000_000 + NOMINAL);
        assert!(tl.offset_us() < 0);
    }

    #[test]
    fn test_audio_shares_video_offset() {
        let mut tl = timeline();
        let last = Pts::from_micros(1_000_000);
        tl.adjust_video(Pts::from_micros(6_000_000), Some(last));
        let offset = tl.offset_us();
        let audio = tl.adjust_audio(Pts::from_micros(6_010_000));
        assert_eq!(audio.as_micros(), 6_010_000 - offset);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut tl = timeline();
        let snap = tl.snapshot();
        tl.adjust_video(Pts::from_micros(9_000_000), Some(Pts::from_micros(1_000)));
        assert_ne!(tl.offset_us(), 0);
        tl.restore(snap);
        assert_eq!(tl.offset_us(), 0);
    }
}
