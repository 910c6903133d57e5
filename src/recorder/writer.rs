//! Output container seam
//!
//! [`ContainerSink`] is the two-track writer the recording pipeline drives:
//! audio track added eagerly, video track added lazily once the first
//! frame's geometry is known, then a session start and interleaved appends,
//! closed by a consuming finalize. [`JournalSink`] writes an NDJSON sample
//! journal: self-contained and inspectable, used by tests and diagnostics.
//! The FFmpeg-backed production sink lives in [`crate::recorder::ffmpeg`].

use crate::capture::frames::{AudioChunk, Pts, VideoFrame};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Writer-related errors.
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("invalid writer state: {0}")]
    InvalidState(String),
}

/// Audio track encode settings. Fixed per recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrackSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
}

impl Default for AudioTrackSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            bitrate: 64_000,
        }
    }
}

/// Video track encode settings, derived from the first observed frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoTrackSettings {
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub frame_rate: u32,
}

/// The output container: multiplexes encoded audio and video samples into
/// one file at `path()`.
///
/// Call order contract (mirrors the underlying platform writer): tracks may
/// only be added before `start_session`; appends require the session to be
/// started and the matching track to exist; `finalize` consumes the sink.
pub trait ContainerSink: Send {
    fn path(&self) -> &Path;

    fn add_audio_track(&mut self, settings: &AudioTrackSettings) -> Result<(), WriterError>;

    fn add_video_track(&mut self, settings: &VideoTrackSettings) -> Result<(), WriterError>;

    fn start_session(&mut self, at: Pts) -> Result<(), WriterError>;

    fn append_video(&mut self, pts: Pts, frame: &VideoFrame) -> Result<(), WriterError>;

    fn append_audio(&mut self, pts: Pts, chunk: &AudioChunk) -> Result<(), WriterError>;

    /// Finish both tracks and close the container. Blocking; the caller
    /// runs it on a blocking task.
    fn finalize(self: Box<Self>) -> Result<(), WriterError>;
}

/// Factory injected into the session controller; tests swap in journal or
/// failing sinks.
pub type SinkFactory =
    Arc<dyn Fn(&Path) -> Result<Box<dyn ContainerSink>, WriterError> + Send + Sync>;

/// One line of the sample journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JournalLine {
    Header {
        created_at: chrono::DateTime<chrono::Utc>,
    },
    AudioTrack {
        settings: AudioTrackSettings,
    },
    VideoTrack {
        settings: VideoTrackSettings,
    },
    SessionStart {
        pts_us: i64,
    },
    Video {
        pts_us: i64,
        width: u32,
        height: u32,
        bytes: usize,
    },
    Audio {
        pts_us: i64,
        frames: u32,
        bytes: usize,
    },
    Finalized {
        video_samples: u64,
        audio_samples: u64,
    },
}

/// NDJSON sample journal sink.
pub struct JournalSink {
    path: PathBuf,
    out: BufWriter<File>,
    audio: Option<AudioTrackSettings>,
    video: Option<VideoTrackSettings>,
    session_started: bool,
    video_samples: u64,
    audio_samples: u64,
}

impl JournalSink {
    pub fn create(path: &Path) -> Result<Box<dyn ContainerSink>, WriterError> {
        let file = File::create(path)?;
        let mut sink = Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            audio: None,
            video: None,
            session_started: false,
            video_samples: 0,
            audio_samples: 0,
        };
        sink.write_line(&JournalLine::Header {
            created_at: chrono::Utc::now(),
        })?;
        Ok(Box::new(sink))
    }

    fn write_line(&mut self, line: &JournalLine) -> Result<(), WriterError> {
        serde_json::to_writer(&mut self.out, line)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }
}

impl ContainerSink for JournalSink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn add_audio_track(&mut self, settings: &AudioTrackSettings) -> Result<(), WriterError> {
        if self.session_started {
            return Err(WriterError::InvalidState(
                "cannot add audio track after session start".into(),
            ));
        }
        self.audio = Some(settings.clone());
        self.write_line(&JournalLine::AudioTrack {
            settings: settings.clone(),
        })
    }

    fn add_video_track(&mut self, settings: &VideoTrackSettings) -> Result<(), WriterError> {
        if self.session_started {
            return Err(WriterError::InvalidState(
                "cannot add video track after session start".into(),
            ));
        }
        self.video = Some(settings.clone());
        self.write_line(&JournalLine::VideoTrack {
            settings: settings.clone(),
        })
    }

    fn start_session(&mut self, at: Pts) -> Result<(), WriterError> {
        if self.session_started {
            return Err(WriterError::InvalidState("session already started".into()));
        }
        self.session_started = true;
        self.write_line(&JournalLine::SessionStart {
            pts_us: at.as_micros(),
        })
    }

    fn append_video(&mut self, pts: Pts, frame: &VideoFrame) -> Result<(), WriterError> {
        if !self.session_started || self.video.is_none() {
            return Err(WriterError::InvalidState(
                "video append without started session and video track".into(),
            ));
        }
        self.video_samples += 1;
        self.write_line(&JournalLine::Video {
            pts_us: pts.as_micros(),
            width: frame.width,
            height: frame.height,
            bytes: frame.data.len(),
        })
    }

    fn append_audio(&mut self, pts: Pts, chunk: &AudioChunk) -> Result<(), WriterError> {
        if !self.session_started || self.audio.is_none() {
            return Err(WriterError::InvalidState(
                "audio append without started session and audio track".into(),
            ));
        }
        self.audio_samples += 1;
        self.write_line(&JournalLine::Audio {
            pts_us: pts.as_micros(),
            frames: chunk.frame_count,
            bytes: chunk.data.len(),
        })
    }

    fn finalize(mut self: Box<Self>) -> Result<(), WriterError> {
        let line = JournalLine::Finalized {
            video_samples: self.video_samples,
            audio_samples: self.audio_samples,
        };
        self.write_line(&line)?;
        self.out.flush()?;
        tracing::debug!(
            path = %self.path.display(),
            video_samples = self.video_samples,
            audio_samples = self.audio_samples,
            "sample journal finalized"
        );
        Ok(())
    }
}

/// A parsed sample journal.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub lines: Vec<JournalLine>,
}

impl Journal {
    pub fn video_track(&self) -> Option<&VideoTrackSettings> {
        self.lines.iter().find_map(|l| match l {
            JournalLine::VideoTrack { settings } => Some(settings),
            _ => None,
        })
    }

    pub fn audio_track(&self) -> Option<&AudioTrackSettings> {
        self.lines.iter().find_map(|l| match l {
            JournalLine::AudioTrack { settings } => Some(settings),
            _ => None,
        })
    }

    pub fn video_pts_us(&self) -> Vec<i64> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                JournalLine::Video { pts_us, .. } => Some(*pts_us),
                _ => None,
            })
            .collect()
    }

    pub fn audio_pts_us(&self) -> Vec<i64> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                JournalLine::Audio { pts_us, .. } => Some(*pts_us),
                _ => None,
            })
            .collect()
    }

    pub fn is_finalized(&self) -> bool {
        self.lines
            .iter()
            .any(|l| matches!(l, JournalLine::Finalized { .. }))
    }
}

/// Read a sample journal back for inspection.
pub fn read_journal(path: &Path) -> Result<Journal, WriterError> {
    let file = File::open(path)?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        lines.push(serde_json::from_str(&line)?);
    }
    Ok(Journal { lines })
}
