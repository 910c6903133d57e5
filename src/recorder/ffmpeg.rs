//! FFmpeg-backed container sink
//!
//! Drives an `ffmpeg` child process the same way the capture channels do:
//! raw BGRA frames piped over stdin, encoded to H.264 as they arrive. PCM
//! audio is buffered to an intermediate raw file and muxed in (AAC) when the
//! recording finalizes. The encoder is only spawned once the video track is
//! added, i.e. once the first frame's geometry is known.

use crate::capture::frames::{AudioChunk, Pts, VideoFrame};
use crate::recorder::writer::{
    AudioTrackSettings, ContainerSink, VideoTrackSettings, WriterError,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tempfile::TempPath;

/// Check whether an `ffmpeg` binary is reachable.
pub fn is_ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .is_ok()
}

struct AudioBuffer {
    writer: BufWriter<File>,
    temp_path: TempPath,
    bytes_written: u64,
}

/// FFmpeg-backed two-track sink.
pub struct FfmpegSink {
    path: PathBuf,
    audio: Option<AudioTrackSettings>,
    video: Option<VideoTrackSettings>,
    process: Option<Child>,
    video_temp: Option<PathBuf>,
    audio_buffer: Option<AudioBuffer>,
    session_started: bool,
    frames_written: u64,
}

impl FfmpegSink {
    pub fn create(path: &Path) -> Result<Box<dyn ContainerSink>, WriterError> {
        Ok(Box::new(Self {
            path: path.to_path_buf(),
            audio: None,
            video: None,
            process: None,
            video_temp: None,
            audio_buffer: None,
            session_started: false,
            frames_written: 0,
        }))
    }

    fn parent_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir)
    }

    fn spawn_encoder(&mut self, settings: &VideoTrackSettings) -> Result<(), WriterError> {
        let video_temp = self.path.with_extension("video.tmp.mp4");
        let process = Command::new("ffmpeg")
            .args([
                "-y",
                "-f",
                "rawvideo",
                "-pixel_format",
                "bgra",
                "-video_size",
                &format!("{}x{}", settings.width, settings.height),
                "-framerate",
                &settings.frame_rate.to_string(),
                "-i",
                "-",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-pix_fmt",
                "yuv420p",
                "-b:v",
                &settings.bitrate.to_string(),
                "-g",
                &(settings.frame_rate * 2).to_string(),
                "-movflags",
                "+faststart",
                video_temp.to_string_lossy().as_ref(),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| WriterError::Encoder(format!("failed to start ffmpeg: {e}")))?;

        tracing::info!(
            width = settings.width,
            height = settings.height,
            bitrate = settings.bitrate,
            output = %video_temp.display(),
            "ffmpeg video encoder started"
        );

        self.process = Some(process);
        self.video_temp = Some(video_temp);
        Ok(())
    }

    fn finish_encoder(&mut self) -> Result<(), WriterError> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };
        drop(process.stdin.take());
        let output = process.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WriterError::Encoder(format!(
                "ffmpeg video encode exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        tracing::debug!(frames = self.frames_written, "ffmpeg video encoder finished");
        Ok(())
    }

    fn run_mux(&self, args: &[String]) -> Result<(), WriterError> {
        let output = Command::new("ffmpeg")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| WriterError::Encoder(format!("failed to start ffmpeg mux: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WriterError::Encoder(format!(
                "ffmpeg mux exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl ContainerSink for FfmpegSink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn add_audio_track(&mut self, settings: &AudioTrackSettings) -> Result<(), WriterError> {
        if self.session_started {
            return Err(WriterError::InvalidState(
                "cannot add audio track after session start".into(),
            ));
        }
        let temp = tempfile::Builder::new()
            .prefix("camkit-audio-")
            .suffix(".pcm")
            .tempfile_in(self.parent_dir())?;
        let (file, temp_path) = temp.into_parts();
        self.audio_buffer = Some(AudioBuffer {
            writer: BufWriter::new(file),
            temp_path,
            bytes_written: 0,
        });
        self.audio = Some(settings.clone());
        Ok(())
    }

    fn add_video_track(&mut self, settings: &VideoTrackSettings) -> Result<(), WriterError> {
        if self.session_started {
            return Err(WriterError::InvalidState(
                "cannot add video track after session start".into(),
            ));
        }
        self.spawn_encoder(settings)?;
        self.video = Some(settings.clone());
        Ok(())
    }

    fn start_session(&mut self, at: Pts) -> Result<(), WriterError> {
        if self.session_started {
            return Err(WriterError::InvalidState("session already started".into()));
        }
        self.session_started = true;
        tracing::debug!(start_pts_ms = at.as_millis_f64(), "container session started");
        Ok(())
    }

    fn append_video(&mut self, _pts: Pts, frame: &VideoFrame) -> Result<(), WriterError> {
        let Some(settings) = &self.video else {
            return Err(WriterError::InvalidState("no video track".into()));
        };
        if !self.session_started {
            return Err(WriterError::InvalidState("session not started".into()));
        }
        let expected = settings.width as usize * settings.height as usize * 4;
        if frame.data.len() != expected {
            return Err(WriterError::Encoder(format!(
                "frame size mismatch: got {} bytes, expected {} ({}x{}x4 BGRA)",
                frame.data.len(),
                expected,
                settings.width,
                settings.height
            )));
        }
        let Some(process) = self.process.as_mut() else {
            return Err(WriterError::InvalidState("encoder not running".into()));
        };
        let Some(stdin) = process.stdin.as_mut() else {
            return Err(WriterError::InvalidState("encoder stdin closed".into()));
        };
        stdin
            .write_all(&frame.data)
            .map_err(|e| WriterError::Encoder(format!("ffmpeg pipe write failed: {e}")))?;
        self.frames_written += 1;
        Ok(())
    }

    fn append_audio(&mut self, _pts: Pts, chunk: &AudioChunk) -> Result<(), WriterError> {
        if !self.session_started {
            return Err(WriterError::InvalidState("session not started".into()));
        }
        let Some(buffer) = self.audio_buffer.as_mut() else {
            return Err(WriterError::InvalidState("no audio track".into()));
        };
        buffer.writer.write_all(&chunk.data)?;
        buffer.bytes_written += chunk.data.len() as u64;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<(), WriterError> {
        self.finish_encoder()?;

        let audio = self.audio_buffer.take().and_then(|mut buffer| {
            if buffer.bytes_written == 0 {
                return None;
            }
            buffer.writer.flush().ok()?;
            Some((buffer.temp_path, self.audio.clone().unwrap_or_default()))
        });
        let video_temp = self.video_temp.take();

        let out = self.path.to_string_lossy().to_string();
        match (&video_temp, &audio) {
            (Some(video), Some((pcm, settings))) => {
                self.run_mux(&[
                    "-y".into(),
                    "-i".into(),
                    video.to_string_lossy().into_owned(),
                    "-f".into(),
                    "s16le".into(),
                    "-ar".into(),
                    settings.sample_rate.to_string(),
                    "-ac".into(),
                    settings.channels.to_string(),
                    "-i".into(),
                    pcm.to_string_lossy().into_owned(),
                    "-c:v".into(),
                    "copy".into(),
                    "-c:a".into(),
                    "aac".into(),
                    "-b:a".into(),
                    settings.bitrate.to_string(),
                    "-shortest".into(),
                    out.clone(),
                ])?;
            }
            (Some(video), None) => {
                std::fs::rename(video, &self.path)?;
            }
            (None, Some((pcm, settings))) => {
                self.run_mux(&[
                    "-y".into(),
                    "-f".into(),
                    "s16le".into(),
                    "-ar".into(),
                    settings.sample_rate.to_string(),
                    "-ac".into(),
                    settings.channels.to_string(),
                    "-i".into(),
                    pcm.to_string_lossy().into_owned(),
                    "-c:a".into(),
                    "aac".into(),
                    "-b:a".into(),
                    settings.bitrate.to_string(),
                    out.clone(),
                ])?;
            }
            (None, None) => {
                // Nothing was recorded; leave an empty container so the
                // returned path exists.
                File::create(&self.path)?;
            }
        }

        if let Some(video) = video_temp {
            if video.exists() {
                let _ = std::fs::remove_file(video);
            }
        }

        tracing::info!(path = %out, frames = self.frames_written, "recording container finalized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_append_before_track_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let mut sink = FfmpegSink::create(&path).unwrap();
        let frame = VideoFrame {
            pts: Pts::ZERO,
            width: 4,
            height: 2,
            data: Arc::new(vec![0u8; 32]),
        };
        assert!(sink.append_video(Pts::ZERO, &frame).is_err());
    }

    #[test]
    fn test_empty_finalize_creates_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let sink = FfmpegSink::create(&path).unwrap();
        sink.finalize().unwrap();
        assert!(path.exists());
    }
}
