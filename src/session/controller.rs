//! Session controller
//!
//! One dedicated task owns the entire capture session: the graph, the
//! device cache, the recording pipeline, and every timer. Public operations
//! go through [`SessionHandle`], which sends a command plus a reply channel
//! onto the session task, the Rust rendition of the serial capture queue,
//! so no two mutations of session state ever race.

use crate::capture::frames::{CaptureEvent, PhotoSettings};
use crate::capture::sim::{SimConfig, SimGraph};
use crate::capture::traits::{
    CaptureGraph, DeviceControl, DevicePosition, FlashMode, ZoomRange,
};
use crate::recorder::ffmpeg::{is_ffmpeg_available, FfmpegSink};
use crate::recorder::pipeline::{PipelineStats, RecordingPipeline};
use crate::recorder::state::RecordingPhase;
use crate::recorder::writer::{JournalSink, SinkFactory, WriterError};
use crate::session::config::SessionTunables;
use crate::session::devices::DeviceCache;
use crate::session::state::ConfigurationState;
use crate::session::zoom::{curated_zoom_levels, ActiveDeviceSlot, ZoomGestures};
use crate::utils::error::{SessionError, SessionResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

/// Push events delivered to bridge subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum CameraEvent {
    #[serde(rename_all = "camelCase")]
    VideoRecorded { path: String },
    #[serde(rename_all = "camelCase")]
    VideoError { message: String },
}

enum Command {
    Prepare {
        reply: oneshot::Sender<SessionResult<()>>,
    },
    Configure {
        start_running: bool,
        settle_delay: Duration,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    CapturePhoto {
        reply: oneshot::Sender<SessionResult<String>>,
    },
    SwitchCamera {
        reply: oneshot::Sender<SessionResult<()>>,
    },
    SetFlash {
        on: bool,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    SetZoom {
        factor: f64,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    SetBrightness {
        value: f64,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    Optimize {
        reply: oneshot::Sender<SessionResult<()>>,
    },
    ZoomLevels {
        reply: oneshot::Sender<Vec<f64>>,
    },
    ZoomRangeQuery {
        reply: oneshot::Sender<SessionResult<ZoomRange>>,
    },
    StartRecording {
        max_duration_ms: Option<u64>,
        reply: oneshot::Sender<SessionResult<()>>,
    },
    StopRecording {
        reply: oneshot::Sender<SessionResult<String>>,
    },
    CancelRecording {
        reply: oneshot::Sender<SessionResult<()>>,
    },
    RecordingStats {
        reply: oneshot::Sender<SessionResult<PipelineStats>>,
    },
    IsRecording {
        reply: oneshot::Sender<bool>,
    },
    IsActive {
        reply: oneshot::Sender<bool>,
    },
    SupportsLiveSwitch {
        reply: oneshot::Sender<bool>,
    },
    Pause {
        reply: oneshot::Sender<SessionResult<()>>,
    },
    Dispose {
        reply: oneshot::Sender<SessionResult<()>>,
    },
    // Internal triggers.
    SwitchMuteTimeout { epoch: u64 },
    MaxDurationElapsed { epoch: u64 },
    FinalizeDone {
        result: Result<(), WriterError>,
        path: PathBuf,
    },
}

/// The default production sink: FFmpeg when reachable, the sample journal
/// otherwise.
pub fn default_sink_factory() -> SinkFactory {
    static FFMPEG: std::sync::OnceLock<bool> = std::sync::OnceLock::new();
    Arc::new(|path: &Path| {
        if *FFMPEG.get_or_init(is_ffmpeg_available) {
            FfmpegSink::create(path)
        } else {
            tracing::warn!("ffmpeg not found; writing sample journal output");
            JournalSink::create(path)
        }
    })
}

/// Builder for a camera session. Must be spawned from within a tokio
/// runtime.
pub struct SessionBuilder {
    graph: Option<Box<dyn CaptureGraph>>,
    sink_factory: Option<SinkFactory>,
    tunables: SessionTunables,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            graph: None,
            sink_factory: None,
            tunables: SessionTunables::default(),
        }
    }

    /// Use a specific capture backend instead of the default simulator.
    pub fn with_graph(mut self, graph: Box<dyn CaptureGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_sink_factory(mut self, factory: SinkFactory) -> Self {
        self.sink_factory = Some(factory);
        self
    }

    pub fn with_tunables(mut self, tunables: SessionTunables) -> Self {
        self.tunables = tunables;
        self
    }

    pub fn spawn(self) -> SessionHandle {
        let tunables = Arc::new(self.tunables);
        let graph = self
            .graph
            .unwrap_or_else(|| Box::new(SimGraph::new(SimConfig::default())));
        let sink_factory = self.sink_factory.unwrap_or_else(default_sink_factory);

        let output_dir = tunables.resolve_output_dir();
        if let Err(e) = std::fs::create_dir_all(&output_dir) {
            tracing::warn!(dir = %output_dir.display(), %e, "could not create output directory");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(32);
        let active_device = ActiveDeviceSlot::new();
        let zoom = ZoomGestures::new(active_device.clone(), tunables.zoom.clone());

        let actor = SessionActor {
            rx,
            self_tx: tx.clone(),
            events: events.clone(),
            cfg: tunables.clone(),
            output_dir,
            graph,
            capture_rx: None,
            devices: DeviceCache::new(),
            active_device,
            config_state: ConfigurationState::Unconfigured,
            position: DevicePosition::Back,
            flash: FlashMode::default(),
            phase: RecordingPhase::Idle,
            pipeline: None,
            pending_stop: None,
            pending_cancel: None,
            cancelling: false,
            pending_photos: HashMap::new(),
            next_photo_id: 0,
            switch_epoch: 0,
            awaiting_switch_frame: false,
            recording_epoch: 0,
            sink_factory,
        };
        tokio::spawn(actor.run());

        SessionHandle {
            tx,
            events,
            zoom,
            tunables,
        }
    }
}

/// Cloneable handle to the session task.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<CameraEvent>,
    zoom: ZoomGestures,
    tunables: Arc<SessionTunables>,
}

macro_rules! request {
    ($self:ident, $variant:ident { $($field:ident : $value:expr),* }) => {{
        let (reply, rx) = oneshot::channel();
        $self
            .tx
            .send(Command::$variant { $($field: $value,)* reply })
            .map_err(|_| SessionError::ConfigurationFailed)?;
        rx.await.map_err(|_| SessionError::ConfigurationFailed)
    }};
}

impl SessionHandle {
    pub fn tunables(&self) -> &SessionTunables {
        &self.tunables
    }

    /// Subscribe to push events (`VideoRecorded`, `VideoError`).
    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.events.subscribe()
    }

    /// Gesture input for continuous zoom; usable from any thread,
    /// independent of recording.
    pub fn zoom_gestures(&self) -> ZoomGestures {
        self.zoom.clone()
    }

    /// Warm device discovery without starting the hardware pipeline.
    pub async fn prepare_camera(&self) -> SessionResult<()> {
        request!(self, Prepare {})?
    }

    /// Idempotent graph construction plus, when `start_running`, the
    /// start-confirmation wait and settle delay.
    pub async fn ensure_configured(
        &self,
        start_running: bool,
        settle_delay: Duration,
    ) -> SessionResult<()> {
        request!(self, Configure {
            start_running: start_running,
            settle_delay: settle_delay
        })?
    }

    /// `ensure_configured` with the configured defaults; the `initCamera`
    /// bridge command.
    pub async fn init_camera(&self) -> SessionResult<()> {
        self.ensure_configured(true, self.tunables.settle_delay())
            .await
    }

    pub async fn is_session_active(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::IsActive { reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn supports_live_switch(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::SupportsLiveSwitch { reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn is_recording(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::IsRecording { reply }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Capture a photo; resolves with the written file path.
    pub async fn capture_photo(&self) -> SessionResult<String> {
        self.init_camera().await?;
        request!(self, CapturePhoto {})?
    }

    pub async fn switch_camera(&self) -> SessionResult<()> {
        request!(self, SwitchCamera {})?
    }

    pub async fn set_flash(&self, on: bool) -> SessionResult<()> {
        request!(self, SetFlash { on: on })?
    }

    pub async fn set_zoom(&self, factor: f64) -> SessionResult<()> {
        request!(self, SetZoom { factor: factor })?
    }

    pub async fn set_brightness(&self, value: f64) -> SessionResult<()> {
        request!(self, SetBrightness { value: value })?
    }

    pub async fn optimize_for_capture(&self) -> SessionResult<()> {
        request!(self, Optimize {})?
    }

    pub async fn available_zoom_levels(&self) -> Vec<f64> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::ZoomLevels { reply }).is_err() {
            return vec![1.0];
        }
        rx.await.unwrap_or_else(|_| vec![1.0])
    }

    pub async fn zoom_range(&self) -> SessionResult<ZoomRange> {
        request!(self, ZoomRangeQuery {})?
    }

    pub async fn start_recording(&self, max_duration_ms: Option<u64>) -> SessionResult<()> {
        self.init_camera().await?;
        request!(self, StartRecording {
            max_duration_ms: max_duration_ms
        })?
    }

    /// Stop and finalize; resolves with the output path once the container
    /// is closed.
    pub async fn stop_recording(&self) -> SessionResult<String> {
        request!(self, StopRecording {})?
    }

    /// Stop, finalize, and delete the output.
    pub async fn cancel_recording(&self) -> SessionResult<()> {
        request!(self, CancelRecording {})?
    }

    /// Frame counters of the in-flight recording.
    pub async fn recording_stats(&self) -> SessionResult<PipelineStats> {
        request!(self, RecordingStats {})?
    }

    pub async fn pause_session(&self) -> SessionResult<()> {
        request!(self, Pause {})?
    }

    pub async fn resume_session(&self) -> SessionResult<()> {
        self.init_camera().await
    }

    pub async fn dispose(&self) -> SessionResult<()> {
        request!(self, Dispose {})?
    }
}

struct SessionActor {
    rx: mpsc::UnboundedReceiver<Command>,
    self_tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<CameraEvent>,
    cfg: Arc<SessionTunables>,
    output_dir: PathBuf,

    graph: Box<dyn CaptureGraph>,
    capture_rx: Option<mpsc::UnboundedReceiver<CaptureEvent>>,
    devices: DeviceCache,
    active_device: ActiveDeviceSlot,

    config_state: ConfigurationState,
    position: DevicePosition,
    flash: FlashMode,

    phase: RecordingPhase,
    pipeline: Option<RecordingPipeline>,
    pending_stop: Option<oneshot::Sender<SessionResult<String>>>,
    pending_cancel: Option<oneshot::Sender<SessionResult<()>>>,
    cancelling: bool,

    pending_photos: HashMap<u64, oneshot::Sender<SessionResult<String>>>,
    next_photo_id: u64,

    switch_epoch: u64,
    awaiting_switch_frame: bool,
    recording_epoch: u64,

    sink_factory: SinkFactory,
}

enum Wake {
    Cmd(Option<Command>),
    Capture(Option<CaptureEvent>),
}

impl SessionActor {
    async fn run(mut self) {
        loop {
            let wake = {
                let rx = &mut self.rx;
                let capture = &mut self.capture_rx;
                tokio::select! {
                    cmd = rx.recv() => Wake::Cmd(cmd),
                    ev = Self::next_capture(capture) => Wake::Capture(ev),
                }
            };
            match wake {
                Wake::Cmd(Some(cmd)) => self.handle_command(cmd).await,
                Wake::Cmd(None) => break,
                Wake::Capture(Some(ev)) => self.handle_capture_event(ev),
                Wake::Capture(None) => self.capture_rx = None,
            }
        }
        tracing::debug!("session task stopped");
    }

    async fn next_capture(
        rx: &mut Option<mpsc::UnboundedReceiver<CaptureEvent>>,
    ) -> Option<CaptureEvent> {
        match rx {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Prepare { reply } => {
                for position in self.graph.available_positions() {
                    let _ = self.devices.get(position, self.graph.as_mut());
                }
                let _ = reply.send(Ok(()));
            }
            Command::Configure {
                start_running,
                settle_delay,
                reply,
            } => self.handle_configure(start_running, settle_delay, reply).await,
            Command::CapturePhoto { reply } => self.handle_capture_photo(reply),
            Command::SwitchCamera { reply } => self.handle_switch(reply),
            Command::SetFlash { on, reply } => {
                let result = self.bound_device().map(|_| {
                    self.flash = if on { FlashMode::On } else { FlashMode::Off };
                });
                let _ = reply.send(result);
            }
            Command::SetZoom { factor, reply } => {
                let result = self.bound_device().and_then(|device| {
                    let clamped = device.zoom_range().clamp(factor);
                    device.set_zoom_factor(clamped).map_err(SessionError::from)
                });
                let _ = reply.send(result);
            }
            Command::SetBrightness { value, reply } => {
                let result = self.bound_device().and_then(|device| {
                    let (min, max) = device.exposure_bias_range();
                    device
                        .set_exposure_bias(value.clamp(min, max))
                        .map_err(SessionError::from)
                });
                let _ = reply.send(result);
            }
            Command::Optimize { reply } => {
                let result = self
                    .bound_device()
                    .and_then(|d| d.apply_continuous_auto_modes().map_err(SessionError::from));
                let _ = reply.send(result);
            }
            Command::ZoomLevels { reply } => {
                let levels = match self.graph.video_device() {
                    Some(device) => curated_zoom_levels(
                        device.zoom_range(),
                        &self.cfg.zoom.preferred_levels,
                        self.cfg.zoom.max_levels,
                    ),
                    None => vec![1.0],
                };
                let _ = reply.send(levels);
            }
            Command::ZoomRangeQuery { reply } => {
                let _ = reply.send(self.bound_device().map(|d| d.zoom_range()));
            }
            Command::StartRecording {
                max_duration_ms,
                reply,
            } => self.handle_start_recording(max_duration_ms, reply),
            Command::StopRecording { reply } => self.handle_stop_recording(reply),
            Command::CancelRecording { reply } => self.handle_cancel_recording(reply),
            Command::RecordingStats { reply } => {
                let result = self
                    .pipeline
                    .as_ref()
                    .map(|p| p.stats())
                    .ok_or(SessionError::NotRecording);
                let _ = reply.send(result);
            }
            Command::IsRecording { reply } => {
                let _ = reply.send(self.phase == RecordingPhase::Recording);
            }
            Command::IsActive { reply } => {
                let active = self.config_state == ConfigurationState::Configured
                    && self.graph.is_running();
                let _ = reply.send(active);
            }
            Command::SupportsLiveSwitch { reply } => {
                let _ = reply.send(self.graph.available_positions().len() > 1);
            }
            Command::Pause { reply } => {
                self.graph.stop();
                tracing::info!("capture session paused");
                let _ = reply.send(Ok(()));
            }
            Command::Dispose { reply } => {
                self.handle_dispose();
                let _ = reply.send(Ok(()));
            }
            Command::SwitchMuteTimeout { epoch } => {
                if epoch == self.switch_epoch && self.awaiting_switch_frame {
                    tracing::warn!(
                        "no video frame after camera switch; resuming audio via fallback"
                    );
                    self.end_switch_mute();
                }
            }
            Command::MaxDurationElapsed { epoch } => {
                if epoch == self.recording_epoch && self.phase == RecordingPhase::Recording {
                    tracing::info!("max recording duration reached; stopping");
                    self.begin_finalize(false);
                }
            }
            Command::FinalizeDone { result, path } => self.handle_finalize_done(result, path),
        }
    }

    // -- configuration ----------------------------------------------------

    async fn handle_configure(
        &mut self,
        start_running: bool,
        settle_delay: Duration,
        reply: oneshot::Sender<SessionResult<()>>,
    ) {
        if self.config_state == ConfigurationState::Unconfigured {
            self.config_state = ConfigurationState::Configuring;
            match self.configure_graph() {
                Ok(()) => {
                    self.config_state = ConfigurationState::Configured;
                    tracing::info!(position = ?self.position, "capture session configured");
                }
                Err(e) => {
                    self.config_state = ConfigurationState::Unconfigured;
                    let _ = reply.send(Err(e));
                    return;
                }
            }
        }

        if !start_running {
            let _ = reply.send(Ok(()));
            return;
        }

        if !self.graph.is_running() {
            if let Err(e) = self.graph.start().await {
                let _ = reply.send(Err(e.into()));
                return;
            }
        }

        // Wait for start confirmation off the session task: bounded polling
        // of the running flag, then the settle delay. The session task keeps
        // processing frames and commands meanwhile.
        let flag = self.graph.running_flag();
        let poll = self.cfg.session_start_poll();
        let max_attempts = self.cfg.session_start_attempts();
        tokio::spawn(async move {
            let mut attempts = 0u64;
            loop {
                if flag.load(Ordering::Relaxed) {
                    tokio::time::sleep(settle_delay).await;
                    let _ = reply.send(Ok(()));
                    return;
                }
                attempts += 1;
                if attempts > max_attempts {
                    let _ = reply.send(Err(SessionError::ConfigurationFailed));
                    return;
                }
                tokio::time::sleep(poll).await;
            }
        });
    }

    fn configure_graph(&mut self) -> SessionResult<()> {
        let device = self
            .devices
            .get(self.position, self.graph.as_mut())
            .ok_or(SessionError::DeviceUnavailable)?;
        self.graph.set_video_input(device.clone()).map_err(|e| {
            tracing::error!(%e, "failed to bind video input");
            SessionError::ConfigurationFailed
        })?;
        if let Err(e) = self.graph.bind_audio_input() {
            tracing::warn!(%e, "no audio input bound; recordings will have no audio");
        }
        self.graph.attach_outputs().map_err(|e| {
            tracing::error!(%e, "failed to attach outputs");
            SessionError::ConfigurationFailed
        })?;
        self.graph
            .set_mirrored(self.position == DevicePosition::Front);
        if self.capture_rx.is_none() {
            self.capture_rx = self.graph.take_events();
        }
        self.active_device.set(Some(device));
        Ok(())
    }

    fn bound_device(&self) -> SessionResult<Arc<dyn DeviceControl>> {
        self.graph
            .video_device()
            .ok_or(SessionError::DeviceUnavailable)
    }

    // -- photo capture ----------------------------------------------------

    fn handle_capture_photo(&mut self, reply: oneshot::Sender<SessionResult<String>>) {
        if self.config_state != ConfigurationState::Configured
            || !self.graph.has_video_connection()
        {
            let _ = reply.send(Err(SessionError::ConfigurationFailed));
            return;
        }
        let flash = self
            .graph
            .video_device()
            .filter(|d| d.descriptor().has_flash)
            .map(|_| self.flash);
        let settings = PhotoSettings {
            flash,
            mirrored: self.position == DevicePosition::Front,
        };
        let request_id = self.next_photo_id;
        self.next_photo_id += 1;
        self.pending_photos.insert(request_id, reply);
        self.graph.capture_photo(request_id, settings);
    }

    // -- recording --------------------------------------------------------

    fn handle_start_recording(
        &mut self,
        max_duration_ms: Option<u64>,
        reply: oneshot::Sender<SessionResult<()>>,
    ) {
        if self.phase != RecordingPhase::Idle {
            let _ = reply.send(Err(SessionError::AlreadyRecording));
            return;
        }

        let path = self.output_dir.join(format!("{}.mp4", Uuid::new_v4()));
        match RecordingPipeline::new(&self.sink_factory, path, max_duration_ms, &self.cfg) {
            Err(e) => {
                let _ = reply.send(Err(e.into()));
            }
            Ok(pipeline) => {
                tracing::info!(
                    path = %pipeline.output_path().display(),
                    max_duration_ms,
                    "recording started"
                );
                self.pipeline = Some(pipeline);
                self.phase = RecordingPhase::Recording;
                self.cancelling = false;
                self.recording_epoch += 1;

                if let Some(ms) = max_duration_ms.filter(|ms| *ms > 0) {
                    let tx = self.self_tx.clone();
                    let epoch = self.recording_epoch;
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        let _ = tx.send(Command::MaxDurationElapsed { epoch });
                    });
                }
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn handle_stop_recording(&mut self, reply: oneshot::Sender<SessionResult<String>>) {
        if self.phase != RecordingPhase::Recording {
            let _ = reply.send(Err(SessionError::NotRecording));
            return;
        }
        if self.pipeline.is_none() {
            let _ = reply.send(Err(SessionError::ConfigurationFailed));
            return;
        }
        self.pending_stop = Some(reply);
        self.begin_finalize(false);
    }

    fn handle_cancel_recording(&mut self, reply: oneshot::Sender<SessionResult<()>>) {
        if self.phase != RecordingPhase::Recording || self.pipeline.is_none() {
            let _ = reply.send(Ok(()));
            return;
        }
        self.pending_cancel = Some(reply);
        self.begin_finalize(true);
    }

    /// Shared stop path: flip the phase (frame acceptance ends here),
    /// disarm timers, unmute, and finalize the container off the session
    /// task.
    fn begin_finalize(&mut self, cancel: bool) {
        self.phase = RecordingPhase::Finalizing;
        self.cancelling = cancel;
        self.recording_epoch += 1;
        self.end_switch_mute();

        let pipeline = self.pipeline.take().expect("pipeline present");
        let stats = pipeline.stats();
        tracing::info!(
            video_frames = stats.video_written,
            audio_chunks = stats.audio_written,
            video_dropped = stats.video_dropped,
            audio_dropped = stats.audio_dropped,
            cancel,
            "finalizing recording"
        );

        let (sink, failure, path) = pipeline.into_finalize_parts();
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || match (sink, failure) {
                (Some(sink), None) => sink.finalize(),
                (Some(sink), Some(error)) => {
                    // Close the container, but the latched fault wins.
                    let _ = sink.finalize();
                    Err(error)
                }
                (None, Some(error)) => Err(error),
                (None, None) => Ok(()),
            })
            .await
            .unwrap_or_else(|e| {
                Err(WriterError::InvalidState(format!("finalize task failed: {e}")))
            });
            let _ = tx.send(Command::FinalizeDone { result, path });
        });
    }

    fn handle_finalize_done(&mut self, result: Result<(), WriterError>, path: PathBuf) {
        self.phase = RecordingPhase::Idle;

        if self.cancelling {
            self.cancelling = false;
            if let Err(e) = std::fs::remove_file(&path) {
                if path.exists() {
                    tracing::warn!(path = %path.display(), %e, "could not remove cancelled output");
                }
            }
            tracing::info!("recording cancelled");
            if let Some(reply) = self.pending_cancel.take() {
                let _ = reply.send(Ok(()));
            }
            return;
        }

        match result {
            Ok(()) => {
                let path = path.to_string_lossy().into_owned();
                tracing::info!(path = %path, "recording finished");
                if let Some(reply) = self.pending_stop.take() {
                    let _ = reply.send(Ok(path.clone()));
                }
                let _ = self.events.send(CameraEvent::VideoRecorded { path });
            }
            Err(error) => {
                let message = error.to_string();
                tracing::error!(error = %message, "recording failed");
                if let Some(reply) = self.pending_stop.take() {
                    let _ = reply.send(Err(error.into()));
                }
                let _ = self.events.send(CameraEvent::VideoError { message });
            }
        }
    }

    // -- camera switch ----------------------------------------------------

    fn handle_switch(&mut self, reply: oneshot::Sender<SessionResult<()>>) {
        if !self.graph.is_running() {
            let _ = reply.send(Err(SessionError::ConfigurationFailed));
            return;
        }

        let target = self.position.toggled();
        let previous_zoom = self
            .graph
            .video_device()
            .map(|d| d.zoom_factor())
            .unwrap_or(1.0);
        let recording =
            self.phase == RecordingPhase::Recording && self.pipeline.is_some();
        let snapshot = self.pipeline.as_ref().map(|p| p.timeline_snapshot());

        if recording {
            self.begin_switch_mute();
        }

        match self.replace_video_input(target, previous_zoom) {
            Ok(()) => {
                tracing::info!(?target, recording, "camera switched");
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                if recording {
                    self.end_switch_mute();
                    if let (Some(pipeline), Some(snapshot)) =
                        (self.pipeline.as_mut(), snapshot)
                    {
                        pipeline.restore_timeline(snapshot);
                    }
                }
                tracing::warn!(?target, error = %e, "camera switch failed");
                let _ = reply.send(Err(e));
            }
        }
    }

    fn replace_video_input(
        &mut self,
        target: DevicePosition,
        desired_zoom: f64,
    ) -> SessionResult<()> {
        let device = self
            .devices
            .get(target, self.graph.as_mut())
            .ok_or(SessionError::DeviceUnavailable)?;
        self.graph
            .set_video_input(device.clone())
            .map_err(|_| SessionError::ConfigurationFailed)?;
        self.graph
            .set_mirrored(target == DevicePosition::Front);

        // Carry zoom over and prefer continuous auto modes; failures keep
        // device defaults.
        let clamped = device.zoom_range().clamp(desired_zoom);
        if let Err(e) = device.set_zoom_factor(clamped) {
            tracing::debug!(%e, "zoom carry-over rejected");
        }
        if let Err(e) = device.apply_continuous_auto_modes() {
            tracing::debug!(%e, "continuous auto modes rejected");
        }

        self.position = target;
        self.active_device.set(Some(device));
        Ok(())
    }

    /// Mute audio and arm the fail-safe unmute. Two triggers race: the first
    /// post-switch video frame, or the fallback timer; whichever fires first
    /// bumps the epoch, which cancels the other.
    fn begin_switch_mute(&mut self) {
        self.switch_epoch += 1;
        self.awaiting_switch_frame = true;
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.set_audio_muted(true);
        }
        let tx = self.self_tx.clone();
        let epoch = self.switch_epoch;
        let fallback = self.cfg.switch_mute_fallback();
        tokio::spawn(async move {
            tokio::time::sleep(fallback).await;
            let _ = tx.send(Command::SwitchMuteTimeout { epoch });
        });
    }

    fn end_switch_mute(&mut self) {
        self.switch_epoch += 1;
        self.awaiting_switch_frame = false;
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.set_audio_muted(false);
        }
    }

    // -- frame delivery ---------------------------------------------------

    fn handle_capture_event(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Video(frame) => {
                if self.phase != RecordingPhase::Recording {
                    return;
                }
                if self.awaiting_switch_frame {
                    tracing::debug!("first post-switch video frame; resuming audio");
                    self.end_switch_mute();
                }
                if let Some(pipeline) = self.pipeline.as_mut() {
                    pipeline.ingest_video(&frame);
                }
            }
            CaptureEvent::Audio(chunk) => {
                if self.phase != RecordingPhase::Recording {
                    return;
                }
                if let Some(pipeline) = self.pipeline.as_mut() {
                    pipeline.ingest_audio(&chunk);
                }
            }
            CaptureEvent::Photo { request_id, result } => {
                let Some(reply) = self.pending_photos.remove(&request_id) else {
                    return;
                };
                match result {
                    Ok(data) => {
                        let path = self.output_dir.join(format!("{}.jpg", Uuid::new_v4()));
                        match std::fs::write(&path, &data.bytes) {
                            Ok(()) => {
                                tracing::info!(path = %path.display(), "photo captured");
                                let _ =
                                    reply.send(Ok(path.to_string_lossy().into_owned()));
                            }
                            Err(e) => {
                                let _ = reply.send(Err(e.into()));
                            }
                        }
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e.into()));
                    }
                }
            }
        }
    }

    // -- teardown ---------------------------------------------------------

    fn handle_dispose(&mut self) {
        if self.phase == RecordingPhase::Recording && self.pipeline.is_some() {
            // Abort the in-flight recording; the finalize path removes the
            // partial output.
            self.pending_stop = None;
            self.pending_cancel = None;
            self.begin_finalize(true);
        }
        self.switch_epoch += 1;
        self.awaiting_switch_frame = false;
        self.recording_epoch += 1;

        self.graph.stop();
        self.graph.teardown();
        self.capture_rx = None;
        self.devices.clear();
        self.active_device.set(None);
        self.config_state = ConfigurationState::Unconfigured;
        self.pending_photos.clear();
        tracing::info!("camera session disposed");
    }
}
