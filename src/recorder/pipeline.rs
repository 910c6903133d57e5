//! Recording pipeline
//!
//! Owns one in-progress recording: the output container, the lazily-created
//! video track, the reconciled timeline, and the audio gate. Video is the
//! ordering reference: the container session starts on the first video
//! frame, and audio that cannot be placed against the written video timeline
//! is dropped rather than written out of order.

use crate::capture::frames::{AudioChunk, Pts, VideoFrame};
use crate::recorder::geometry::{crop_bgra, crop_dimensions, scaled_bitrate};
use crate::recorder::state::RecordingInfo;
use crate::recorder::timeline::{Timeline, TimelineSnapshot};
use crate::recorder::writer::{ContainerSink, SinkFactory, VideoTrackSettings, WriterError};
use crate::session::config::SessionTunables;
use std::path::{Path, PathBuf};

/// Per-recording frame statistics, exposed for logging and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    pub video_written: u64,
    pub audio_written: u64,
    pub video_dropped: u64,
    pub audio_dropped: u64,
}

/// One in-progress recording.
pub struct RecordingPipeline {
    sink: Option<Box<dyn ContainerSink>>,
    info: RecordingInfo,
    timeline: Timeline,
    video_track: Option<VideoTrackSettings>,
    last_written_video: Option<Pts>,
    last_written_audio: Option<Pts>,
    audio_muted: bool,
    failure: Option<WriterError>,
    stats: PipelineStats,

    preview_aspect: Option<f64>,
    frame_rate: u32,
    base_bitrate: u32,
    reference_pixels: u64,
    min_bitrate: u32,
    max_bitrate: u32,
    audio_video_tolerance_us: i64,
}

impl RecordingPipeline {
    /// Allocate the container and configure the audio track eagerly. The
    /// video track waits for the first frame.
    pub fn new(
        factory: &SinkFactory,
        output_path: PathBuf,
        max_duration_ms: Option<u64>,
        cfg: &SessionTunables,
    ) -> Result<Self, WriterError> {
        let mut sink = factory(&output_path)?;
        sink.add_audio_track(&cfg.encode.audio)?;

        Ok(Self {
            sink: Some(sink),
            info: RecordingInfo::new(output_path, max_duration_ms),
            timeline: Timeline::new(
                cfg.nominal_frame_duration_us(),
                cfg.discontinuity_threshold_us(),
            ),
            video_track: None,
            last_written_video: None,
            last_written_audio: None,
            audio_muted: false,
            failure: None,
            stats: PipelineStats::default(),
            preview_aspect: cfg.preview_aspect,
            frame_rate: cfg.nominal_frame_rate,
            base_bitrate: cfg.encode.base_bitrate,
            reference_pixels: cfg.encode.reference_pixels(),
            min_bitrate: cfg.encode.min_bitrate,
            max_bitrate: cfg.encode.max_bitrate,
            audio_video_tolerance_us: cfg.audio_video_tolerance_us(),
        })
    }

    pub fn output_path(&self) -> &Path {
        &self.info.output_path
    }

    pub fn info(&self) -> &RecordingInfo {
        &self.info
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn has_video_track(&self) -> bool {
        self.video_track.is_some()
    }

    pub fn video_track(&self) -> Option<&VideoTrackSettings> {
        self.video_track.as_ref()
    }

    pub fn set_audio_muted(&mut self, muted: bool) {
        if self.audio_muted != muted {
            tracing::debug!(muted, "recording audio gate toggled");
        }
        self.audio_muted = muted;
    }

    pub fn is_audio_muted(&self) -> bool {
        self.audio_muted
    }

    pub fn timeline_snapshot(&self) -> TimelineSnapshot {
        self.timeline.snapshot()
    }

    pub fn restore_timeline(&mut self, snapshot: TimelineSnapshot) {
        self.timeline.restore(snapshot);
    }

    /// Latch a sink failure: the recording stops accepting frames and the
    /// error surfaces when the recording finishes.
    fn latch_failure(&mut self, error: WriterError) {
        tracing::warn!(%error, "container sink fault; dropping subsequent frames");
        self.failure = Some(error);
    }

    fn ensure_video_track(&mut self, frame: &VideoFrame, start_at: Pts) -> Result<(), WriterError> {
        if self.video_track.is_some() {
            return Ok(());
        }
        let target_aspect = self.preview_aspect.unwrap_or_else(|| frame.aspect());
        let (width, height) = crop_dimensions(frame.width, frame.height, target_aspect);
        let bitrate = scaled_bitrate(
            width,
            height,
            self.base_bitrate,
            self.reference_pixels,
            self.min_bitrate,
            self.max_bitrate,
        );
        let settings = VideoTrackSettings {
            width,
            height,
            bitrate,
            frame_rate: self.frame_rate,
        };

        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| WriterError::InvalidState("sink already taken".into()))?;
        sink.add_video_track(&settings)?;
        sink.start_session(start_at)?;

        tracing::info!(
            width,
            height,
            bitrate,
            source_width = frame.width,
            source_height = frame.height,
            "video track configured from first frame"
        );
        self.video_track = Some(settings);
        Ok(())
    }

    /// Ingest one captured video frame.
    pub fn ingest_video(&mut self, frame: &VideoFrame) {
        if self.failure.is_some() || self.sink.is_none() {
            self.stats.video_dropped += 1;
            return;
        }

        let adjusted = self.timeline.adjust_video(frame.pts, self.last_written_video);

        if self.video_track.is_none() {
            if let Err(e) = self.ensure_video_track(frame, adjusted) {
                self.latch_failure(e);
                self.stats.video_dropped += 1;
                return;
            }
        }

        // Within-threshold regressions are dropped, keeping the written
        // track strictly increasing.
        if let Some(last) = self.last_written_video {
            if adjusted <= last {
                self.stats.video_dropped += 1;
                return;
            }
        }

        let track = self.video_track.clone().expect("video track configured");
        let output_frame;
        let to_append = if frame.width != track.width || frame.height != track.height {
            output_frame = crop_bgra(frame, track.width, track.height);
            &output_frame
        } else {
            frame
        };

        let sink = self.sink.as_mut().expect("sink present");
        match sink.append_video(adjusted, to_append) {
            Ok(()) => {
                self.last_written_video = Some(adjusted);
                self.stats.video_written += 1;
            }
            Err(e) => {
                self.stats.video_dropped += 1;
                self.latch_failure(e);
            }
        }
    }

    /// Ingest one captured audio chunk.
    pub fn ingest_audio(&mut self, chunk: &AudioChunk) {
        if self.failure.is_some() || self.sink.is_none() {
            self.stats.audio_dropped += 1;
            return;
        }
        if self.audio_muted {
            self.stats.audio_dropped += 1;
            return;
        }
        // Video is the ordering reference; nothing is written before the
        // first video frame.
        let Some(last_video) = self.last_written_video else {
            self.stats.audio_dropped += 1;
            return;
        };

        let adjusted = self.timeline.adjust_audio(chunk.pts);

        if adjusted.delta(last_video) < -self.audio_video_tolerance_us {
            self.stats.audio_dropped += 1;
            return;
        }
        if let Some(last_audio) = self.last_written_audio {
            if adjusted <= last_audio {
                self.stats.audio_dropped += 1;
                return;
            }
        }

        let sink = self.sink.as_mut().expect("sink present");
        match sink.append_audio(adjusted, chunk) {
            Ok(()) => {
                self.last_written_audio = Some(adjusted);
                self.stats.audio_written += 1;
            }
            Err(e) => {
                self.stats.audio_dropped += 1;
                self.latch_failure(e);
            }
        }
    }

    /// Hand the sink and any latched failure off for finalization.
    pub fn into_finalize_parts(
        mut self,
    ) -> (Option<Box<dyn ContainerSink>>, Option<WriterError>, PathBuf) {
        let path = self.info.output_path.clone();
        (self.sink.take(), self.failure.take(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::writer::{
        read_journal, AudioTrackSettings, JournalSink, SinkFactory,
    };
    use std::sync::Arc;
    use tempfile::tempdir;

    fn journal_factory() -> SinkFactory {
        Arc::new(|path: &Path| JournalSink::create(path))
    }

    fn frame(pts_us: i64, width: u32, height: u32) -> VideoFrame {
        VideoFrame {
            pts: Pts::from_micros(pts_us),
            width,
            height,
            data: Arc::new(vec![0u8; (width * height * 4) as usize]),
        }
    }

    fn chunk(pts_us: i64) -> AudioChunk {
        AudioChunk {
            pts: Pts::from_micros(pts_us),
            frame_count: 441,
            data: Arc::new(vec![0u8; 882]),
        }
    }

    fn pipeline(dir: &Path, cfg: &SessionTunables) -> RecordingPipeline {
        RecordingPipeline::new(&journal_factory(), dir.join("clip.mp4"), None, cfg).unwrap()
    }

    #[test]
    fn test_video_track_deferred_until_first_frame() {
        let dir = tempdir().unwrap();
        let cfg = SessionTunables::default();
        let mut p = pipeline(dir.path(), &cfg);
        assert!(!p.has_video_track());

        p.ingest_video(&frame(0, 128, 72));
        assert!(p.has_video_track());
        let track = p.video_track().unwrap();
        assert_eq!((track.width, track.height), (128, 72));
    }

    #[test]
    fn test_geometry_follows_preview_aspect() {
        let dir = tempdir().unwrap();
        let cfg = SessionTunables {
            preview_aspect: Some(1.0),
            ..Default::default()
        };
        let mut p = pipeline(dir.path(), &cfg);
        p.ingest_video(&frame(0, 128, 72));
        let track = p.video_track().unwrap().clone();
        assert_eq!((track.width, track.height), (72, 72));

        // Subsequent frames are cropped to the track geometry.
        p.ingest_video(&frame(33_333, 128, 72));
        drop(p.into_finalize_parts().0.unwrap().finalize());
        let journal = read_journal(&dir.path().join("clip.mp4")).unwrap();
        for line in journal.lines {
            if let crate::recorder::writer::JournalLine::Video { width, height, .. } = line {
                assert_eq!((width, height), (72, 72));
            }
        }
    }

    #[test]
    fn test_audio_dropped_before_first_video_frame() {
        let dir = tempdir().unwrap();
        let cfg = SessionTunables::default();
        let mut p = pipeline(dir.path(), &cfg);

        p.ingest_audio(&chunk(0));
        assert_eq!(p.stats().audio_written, 0);
        assert_eq!(p.stats().audio_dropped, 1);

        p.ingest_video(&frame(0, 64, 36));
        p.ingest_audio(&chunk(10_000));
        assert_eq!(p.stats().audio_written, 1);
    }

    #[test]
    fn test_audio_dropped_while_muted() {
        let dir = tempdir().unwrap();
        let cfg = SessionTunables::default();
        let mut p = pipeline(dir.path(), &cfg);
        p.ingest_video(&frame(0, 64, 36));

        p.set_audio_muted(true);
        p.ingest_audio(&chunk(5_000));
        assert_eq!(p.stats().audio_written, 0);

        p.set_audio_muted(false);
        p.ingest_audio(&chunk(10_000));
        assert_eq!(p.stats().audio_written, 1);
    }

    #[test]
    fn test_audio_behind_video_beyond_tolerance_dropped() {
        let dir = tempdir().unwrap();
        let cfg = SessionTunables::default();
        let tolerance = cfg.audio_video_tolerance_us();
        let mut p = pipeline(dir.path(), &cfg);

        let video_pts = 2_000_000;
        p.ingest_video(&frame(video_pts, 64, 36));

        // Just inside tolerance: written.
        p.ingest_audio(&chunk(video_pts - tolerance + 1_000));
        assert_eq!(p.stats().audio_written, 1);

        // Beyond tolerance: dropped.
        p.ingest_audio(&chunk(video_pts - tolerance - 1_000));
        assert_eq!(p.stats().audio_written, 1);
        assert!(p.stats().audio_dropped >= 1);
    }

    #[test]
    fn test_audio_regression_dropped() {
        let dir = tempdir().unwrap();
        let cfg = SessionTunables::default();
        let mut p = pipeline(dir.path(), &cfg);
        p.ingest_video(&frame(0, 64, 36));

        p.ingest_audio(&chunk(50_000));
        p.ingest_audio(&chunk(40_000));
        p.ingest_audio(&chunk(60_000));
        assert_eq!(p.stats().audio_written, 2);
    }

    #[test]
    fn test_video_regression_within_threshold_dropped() {
        let dir = tempdir().unwrap();
        let cfg = SessionTunables::default();
        let mut p = pipeline(dir.path(), &cfg);

        p.ingest_video(&frame(100_000, 64, 36));
        // 20 ms backwards: below the fold threshold, dropped.
        p.ingest_video(&frame(80_000, 64, 36));
        assert_eq!(p.stats().video_written, 1);
        assert_eq!(p.stats().video_dropped, 1);
    }

    #[test]
    fn test_switch_discontinuity_folded_across_tracks() {
        let dir = tempdir().unwrap();
        let cfg = SessionTunables::default();
        let nominal = cfg.nominal_frame_duration_us();
        let mut p = pipeline(dir.path(), &cfg);

        p.ingest_video(&frame(0, 64, 36));
        p.ingest_video(&frame(nominal, 64, 36));
        // Camera switch: clock jumps 5 s.
        p.ingest_video(&frame(5_000_000 + 2 * nominal, 64, 36));
        p.ingest_video(&frame(5_000_000 + 3 * nominal, 64, 36));
        // Audio on the post-switch clock lands on the corrected timeline.
        p.ingest_audio(&chunk(5_000_000 + 3 * nominal + 1_000));

        drop(p.into_finalize_parts().0.unwrap().finalize());
        let journal = read_journal(&dir.path().join("clip.mp4")).unwrap();
        let video = journal.video_pts_us();
        assert_eq!(video.len(), 4);
        for pair in video.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap > 0, "video pts must strictly increase");
            assert!(gap <= nominal, "gap {gap} exceeds nominal {nominal}");
        }
        let audio = journal.audio_pts_us();
        assert_eq!(audio.len(), 1);
        assert!(audio[0] >= video[3] - cfg.audio_video_tolerance_us());
    }

    #[test]
    fn test_sink_failure_latches() {
        struct FailingSink {
            path: PathBuf,
        }
        impl ContainerSink for FailingSink {
            fn path(&self) -> &Path {
                &self.path
            }
            fn add_audio_track(&mut self, _: &AudioTrackSettings) -> Result<(), WriterError> {
                Ok(())
            }
            fn add_video_track(&mut self, _: &VideoTrackSettings) -> Result<(), WriterError> {
                Ok(())
            }
            fn start_session(&mut self, _: Pts) -> Result<(), WriterError> {
                Ok(())
            }
            fn append_video(&mut self, _: Pts, _: &VideoFrame) -> Result<(), WriterError> {
                Err(WriterError::Encoder("simulated encoder fault".into()))
            }
            fn append_audio(&mut self, _: Pts, _: &AudioChunk) -> Result<(), WriterError> {
                Ok(())
            }
            fn finalize(self: Box<Self>) -> Result<(), WriterError> {
                Ok(())
            }
        }

        let dir = tempdir().unwrap();
        let factory: SinkFactory = Arc::new(|path: &Path| {
            Ok(Box::new(FailingSink {
                path: path.to_path_buf(),
            }) as Box<dyn ContainerSink>)
        });
        let cfg = SessionTunables::default();
        let mut p =
            RecordingPipeline::new(&factory, dir.path().join("clip.mp4"), None, &cfg).unwrap();

        p.ingest_video(&frame(0, 64, 36));
        assert_eq!(p.stats().video_written, 0);

        // Subsequent frames are silently dropped.
        p.ingest_video(&frame(33_333, 64, 36));
        p.ingest_audio(&chunk(40_000));
        assert_eq!(p.stats().video_written, 0);
        assert_eq!(p.stats().audio_written, 0);

        let (_, failure, _) = p.into_finalize_parts();
        assert!(matches!(failure, Some(WriterError::Encoder(_))));
    }
}
