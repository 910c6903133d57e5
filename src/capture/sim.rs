//! Simulated capture backend
//!
//! A deterministic stand-in for the platform capture stack, used by tests
//! and demos. The important behavior it reproduces is the capture clock:
//! every device carries its own clock offset, and replacing the video input
//! jumps the session clock to the new device's offset, exactly the
//! discontinuity a live camera switch produces.

use crate::capture::frames::{AudioChunk, CaptureEvent, PhotoData, PhotoSettings, Pts, VideoFrame};
use crate::capture::traits::{
    CaptureError, CaptureGraph, CaptureResult, DeviceControl, DeviceDescriptor, DevicePosition,
    ZoomRange,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Static description of one simulated camera.
#[derive(Debug, Clone)]
pub struct SimDeviceSpec {
    pub id: String,
    pub name: String,
    pub position: DevicePosition,
    pub has_flash: bool,
    pub zoom: ZoomRange,
    pub exposure_bias: (f64, f64),
    /// Clock offset of this device's capture timeline, in milliseconds.
    pub clock_offset_ms: i64,
}

/// Simulator configuration. Defaults model a two-camera phone at 30 fps;
/// tests shrink the intervals to run fast.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub devices: Vec<SimDeviceSpec>,
    pub has_microphone: bool,
    /// Delay between `start()` and the running flag turning true.
    pub start_latency: Duration,
    pub frame_interval: Duration,
    pub audio_interval: Duration,
    pub frame_width: u32,
    pub frame_height: u32,
    pub sample_rate: u32,
    pub photo_latency: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            devices: vec![
                SimDeviceSpec {
                    id: "sim-back-wide".into(),
                    name: "Simulated Back Camera".into(),
                    position: DevicePosition::Back,
                    has_flash: true,
                    zoom: ZoomRange { min: 0.5, max: 8.0 },
                    exposure_bias: (-2.0, 2.0),
                    clock_offset_ms: 0,
                },
                SimDeviceSpec {
                    id: "sim-front-wide".into(),
                    name: "Simulated Front Camera".into(),
                    position: DevicePosition::Front,
                    has_flash: false,
                    zoom: ZoomRange { min: 1.0, max: 5.0 },
                    exposure_bias: (-2.0, 2.0),
                    clock_offset_ms: 5_000,
                },
            ],
            has_microphone: true,
            start_latency: Duration::from_millis(30),
            frame_interval: Duration::from_millis(33),
            audio_interval: Duration::from_millis(20),
            frame_width: 128,
            frame_height: 72,
            sample_rate: 44_100,
            photo_latency: Duration::from_millis(5),
        }
    }
}

struct SimDeviceState {
    zoom: f64,
    exposure_bias: f64,
    continuous_auto: bool,
    connected: bool,
}

/// A simulated camera device with thread-safe parameter state.
pub struct SimDevice {
    spec: SimDeviceSpec,
    state: Mutex<SimDeviceState>,
}

impl SimDevice {
    pub fn new(spec: SimDeviceSpec) -> Self {
        let zoom = spec.zoom.clamp(1.0);
        Self {
            spec,
            state: Mutex::new(SimDeviceState {
                zoom,
                exposure_bias: 0.0,
                continuous_auto: false,
                connected: true,
            }),
        }
    }

    /// Test hook: mark the device disconnected so caches drop it.
    pub fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    pub fn continuous_auto_enabled(&self) -> bool {
        self.state.lock().continuous_auto
    }

    pub fn exposure_bias(&self) -> f64 {
        self.state.lock().exposure_bias
    }
}

impl DeviceControl for SimDevice {
    fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            id: self.spec.id.clone(),
            name: self.spec.name.clone(),
            position: self.spec.position,
            has_flash: self.spec.has_flash,
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn zoom_range(&self) -> ZoomRange {
        self.spec.zoom
    }

    fn zoom_factor(&self) -> f64 {
        self.state.lock().zoom
    }

    fn set_zoom_factor(&self, factor: f64) -> CaptureResult<()> {
        if factor < self.spec.zoom.min || factor > self.spec.zoom.max {
            return Err(CaptureError::Control(format!(
                "zoom factor {factor} outside [{}, {}]",
                self.spec.zoom.min, self.spec.zoom.max
            )));
        }
        self.state.lock().zoom = factor;
        Ok(())
    }

    fn exposure_bias_range(&self) -> (f64, f64) {
        self.spec.exposure_bias
    }

    fn set_exposure_bias(&self, bias: f64) -> CaptureResult<()> {
        let (min, max) = self.spec.exposure_bias;
        if bias < min || bias > max {
            return Err(CaptureError::Control(format!(
                "exposure bias {bias} outside [{min}, {max}]"
            )));
        }
        self.state.lock().exposure_bias = bias;
        Ok(())
    }

    fn apply_continuous_auto_modes(&self) -> CaptureResult<()> {
        self.state.lock().continuous_auto = true;
        Ok(())
    }
}

struct SimShared {
    running: AtomicBool,
    alive: AtomicBool,
    outputs_attached: AtomicBool,
    audio_bound: AtomicBool,
    clock_offset_us: AtomicI64,
    epoch: Instant,
    video_device: Mutex<Option<Arc<SimDevice>>>,
    events_tx: Mutex<mpsc::UnboundedSender<CaptureEvent>>,
}

impl SimShared {
    fn now_pts(&self) -> Pts {
        let elapsed = self.epoch.elapsed().as_micros() as i64;
        Pts::from_micros(elapsed + self.clock_offset_us.load(Ordering::Relaxed))
    }

    fn send(&self, event: CaptureEvent) {
        let _ = self.events_tx.lock().send(event);
    }
}

/// Simulated capture graph.
pub struct SimGraph {
    cfg: SimConfig,
    devices: Vec<Arc<SimDevice>>,
    shared: Arc<SimShared>,
    events_rx: Option<mpsc::UnboundedReceiver<CaptureEvent>>,
    running_flag: Arc<AtomicBool>,
    mirrored: bool,
    pump_spawned: bool,
}

impl SimGraph {
    pub fn new(cfg: SimConfig) -> Self {
        let devices = cfg
            .devices
            .iter()
            .cloned()
            .map(|spec| Arc::new(SimDevice::new(spec)))
            .collect();
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(SimShared {
            running: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            outputs_attached: AtomicBool::new(false),
            audio_bound: AtomicBool::new(false),
            clock_offset_us: AtomicI64::new(0),
            epoch: Instant::now(),
            video_device: Mutex::new(None),
            events_tx: Mutex::new(tx),
        });
        Self {
            running_flag: Arc::new(AtomicBool::new(false)),
            cfg,
            devices,
            shared,
            events_rx: Some(rx),
            mirrored: false,
            pump_spawned: false,
        }
    }

    /// Direct access to a simulated device, for tests that manipulate
    /// device state behind the `DeviceControl` surface.
    pub fn sim_device(&self, id: &str) -> Option<Arc<SimDevice>> {
        self.devices.iter().find(|d| d.spec.id == id).cloned()
    }

    fn spawn_pump(&mut self) {
        if self.pump_spawned {
            return;
        }
        self.pump_spawned = true;

        let shared = self.shared.clone();
        let running_flag = self.running_flag.clone();
        let frame_interval = self.cfg.frame_interval;
        let audio_interval = self.cfg.audio_interval;
        let width = self.cfg.frame_width;
        let height = self.cfg.frame_height;
        let sample_rate = self.cfg.sample_rate;

        tokio::spawn(async move {
            let pixels: Arc<Vec<u8>> = Arc::new(
                (0..(width as usize * height as usize))
                    .flat_map(|i| {
                        let shade = (i % 251) as u8;
                        [shade, shade.wrapping_add(85), shade.wrapping_add(170), 0xFF]
                    })
                    .collect(),
            );
            let audio_frames =
                ((sample_rate as u128 * audio_interval.as_micros()) / 1_000_000) as u32;
            let silence: Arc<Vec<u8>> = Arc::new(vec![0u8; audio_frames as usize * 2]);

            let mut next_video = Instant::now();
            let mut next_audio = Instant::now();

            loop {
                if !shared.alive.load(Ordering::Relaxed) {
                    break;
                }
                if !shared.running.load(Ordering::Relaxed) {
                    running_flag.store(false, Ordering::Relaxed);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    next_video = Instant::now();
                    next_audio = Instant::now();
                    continue;
                }
                running_flag.store(true, Ordering::Relaxed);

                let now = Instant::now();
                let outputs = shared.outputs_attached.load(Ordering::Relaxed);

                if now >= next_video {
                    if outputs {
                        let device = shared.video_device.lock().clone();
                        if device.is_some() {
                            shared.send(CaptureEvent::Video(VideoFrame {
                                pts: shared.now_pts(),
                                width,
                                height,
                                data: pixels.clone(),
                            }));
                        }
                    }
                    next_video = now + frame_interval;
                }

                if now >= next_audio {
                    if outputs && shared.audio_bound.load(Ordering::Relaxed) {
                        shared.send(CaptureEvent::Audio(AudioChunk {
                            pts: shared.now_pts(),
                            frame_count: audio_frames,
                            data: silence.clone(),
                        }));
                    }
                    next_audio = now + audio_interval;
                }

                let wake = next_video.min(next_audio);
                tokio::time::sleep_until(tokio::time::Instant::from_std(wake)).await;
            }
            tracing::debug!("sim capture pump stopped");
        });
    }
}

#[async_trait]
impl CaptureGraph for SimGraph {
    fn discover(&mut self, position: DevicePosition) -> Option<Arc<dyn DeviceControl>> {
        self.devices
            .iter()
            .find(|d| d.spec.position == position && d.is_connected())
            .map(|d| d.clone() as Arc<dyn DeviceControl>)
    }

    fn available_positions(&self) -> Vec<DevicePosition> {
        let mut positions = Vec::new();
        for device in &self.devices {
            if device.is_connected() && !positions.contains(&device.spec.position) {
                positions.push(device.spec.position);
            }
        }
        positions
    }

    fn set_video_input(&mut self, device: Arc<dyn DeviceControl>) -> CaptureResult<()> {
        let id = device.descriptor().id;
        let sim = self
            .devices
            .iter()
            .find(|d| d.spec.id == id)
            .cloned()
            .ok_or_else(|| CaptureError::Configuration(format!("unknown device {id}")))?;

        self.shared
            .clock_offset_us
            .store(sim.spec.clock_offset_ms * 1_000, Ordering::Relaxed);
        *self.shared.video_device.lock() = Some(sim);
        tracing::debug!(device = %id, "sim video input bound");
        Ok(())
    }

    fn video_device(&self) -> Option<Arc<dyn DeviceControl>> {
        self.shared
            .video_device
            .lock()
            .clone()
            .map(|d| d as Arc<dyn DeviceControl>)
    }

    fn bind_audio_input(&mut self) -> CaptureResult<()> {
        if !self.cfg.has_microphone {
            return Err(CaptureError::DeviceNotFound);
        }
        self.shared.audio_bound.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn attach_outputs(&mut self) -> CaptureResult<()> {
        self.shared.outputs_attached.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn has_video_connection(&self) -> bool {
        self.shared.outputs_attached.load(Ordering::Relaxed)
            && self.shared.video_device.lock().is_some()
    }

    fn set_mirrored(&mut self, mirrored: bool) {
        self.mirrored = mirrored;
    }

    async fn start(&mut self) -> CaptureResult<()> {
        self.spawn_pump();
        if self.shared.running.load(Ordering::Relaxed) {
            return Ok(());
        }
        let shared = self.shared.clone();
        let latency = self.cfg.start_latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            if shared.alive.load(Ordering::Relaxed) {
                shared.running.store(true, Ordering::Relaxed);
            }
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Relaxed);
        self.running_flag.store(false, Ordering::Relaxed);
    }

    fn running_flag(&self) -> Arc<AtomicBool> {
        self.running_flag.clone()
    }

    fn is_running(&self) -> bool {
        self.running_flag.load(Ordering::Relaxed)
    }

    fn capture_photo(&mut self, request_id: u64, settings: PhotoSettings) {
        let shared = self.shared.clone();
        let latency = self.cfg.photo_latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let device = shared.video_device.lock().clone();
            let result = match device {
                Some(device) => {
                    // Minimal JPEG-shaped payload carrying the capture
                    // parameters, enough for callers to persist and inspect.
                    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
                    let note = format!(
                        "sim-photo device={} flash={:?} mirrored={}",
                        device.spec.id, settings.flash, settings.mirrored
                    );
                    bytes.extend_from_slice(note.as_bytes());
                    bytes.extend_from_slice(&[0xFF, 0xD9]);
                    Ok(PhotoData { bytes })
                }
                None => Err(CaptureError::DeviceNotFound),
            };
            shared.send(CaptureEvent::Photo { request_id, result });
        });
    }

    fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<CaptureEvent>> {
        self.events_rx.take()
    }

    fn teardown(&mut self) {
        self.shared.running.store(false, Ordering::Relaxed);
        self.running_flag.store(false, Ordering::Relaxed);
        self.shared.outputs_attached.store(false, Ordering::Relaxed);
        self.shared.audio_bound.store(false, Ordering::Relaxed);
        *self.shared.video_device.lock() = None;
        // Fresh channel for the next configuration cycle.
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.events_tx.lock() = tx;
        self.events_rx = Some(rx);
        self.mirrored = false;
    }
}

impl Drop for SimGraph {
    fn drop(&mut self) {
        self.shared.alive.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parameter_bounds() {
        let device = SimDevice::new(SimConfig::default().devices[0].clone());
        assert!(device.set_zoom_factor(2.0).is_ok());
        assert_eq!(device.zoom_factor(), 2.0);
        assert!(device.set_zoom_factor(100.0).is_err());
        assert!(device.set_exposure_bias(1.5).is_ok());
        assert!(device.set_exposure_bias(5.0).is_err());
    }

    #[test]
    fn test_discovery_and_positions() {
        let mut graph = SimGraph::new(SimConfig::default());
        assert_eq!(graph.available_positions().len(), 2);
        let back = graph.discover(DevicePosition::Back).expect("back camera");
        assert_eq!(back.descriptor().position, DevicePosition::Back);
        assert!(back.descriptor().has_flash);
    }

    #[test]
    fn test_disconnected_device_not_discovered() {
        let mut graph = SimGraph::new(SimConfig::default());
        graph.devices[0].disconnect();
        assert!(graph.discover(DevicePosition::Back).is_none());
        assert_eq!(graph.available_positions().len(), 1);
    }

    #[tokio::test]
    async fn test_input_replacement_jumps_clock() {
        let mut graph = SimGraph::new(SimConfig::default());
        let back = graph.discover(DevicePosition::Back).unwrap();
        graph.set_video_input(back).unwrap();
        let before = graph.shared.now_pts();

        let front = graph.discover(DevicePosition::Front).unwrap();
        graph.set_video_input(front).unwrap();
        let after = graph.shared.now_pts();

        // Front camera clock sits 5 s ahead of the back camera clock.
        assert!(after.delta(before) > 4_900_000);
    }
}
