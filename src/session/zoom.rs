//! Continuous zoom control
//!
//! Two independent gesture state machines (pinch scale and vertical drag)
//! convert pointer deltas into device zoom updates. Updates are clamped to
//! the device range and rate-limited so a continuous gesture does not flood
//! the device with configuration calls. Device errors are swallowed here:
//! the next update supersedes a failed one.

use crate::capture::traits::{DeviceControl, ZoomRange};
use crate::session::config::ZoomTunables;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared slot holding the currently bound video device. The session
/// controller updates it on configure, switch, and dispose; the zoom
/// controller reads it on every gesture update.
#[derive(Clone, Default)]
pub struct ActiveDeviceSlot {
    inner: Arc<Mutex<Option<Arc<dyn DeviceControl>>>>,
}

impl ActiveDeviceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, device: Option<Arc<dyn DeviceControl>>) {
        *self.inner.lock() = device;
    }

    pub fn get(&self) -> Option<Arc<dyn DeviceControl>> {
        self.inner.lock().clone()
    }
}

/// Transient per-gesture state, created at gesture begin.
#[derive(Debug, Clone, Copy)]
struct GestureZoomState {
    base_zoom: f64,
    last_applied: f64,
    last_update: Option<Instant>,
}

#[derive(Default)]
struct Gestures {
    pinch: Option<GestureZoomState>,
    drag: Option<GestureZoomState>,
}

#[derive(Clone, Copy)]
enum GestureKind {
    Pinch,
    Drag,
}

impl Gestures {
    fn slot(&mut self, kind: GestureKind) -> &mut Option<GestureZoomState> {
        match kind {
            GestureKind::Pinch => &mut self.pinch,
            GestureKind::Drag => &mut self.drag,
        }
    }
}

/// Candidate zoom for a pinch gesture: the raw scale is already
/// multiplicative.
pub fn pinch_candidate(base_zoom: f64, scale: f64) -> f64 {
    base_zoom * scale
}

/// Candidate zoom for a vertical drag: linear finger travel maps to
/// multiplicative zoom (upward drag, negative translation, zooms in),
/// matching pinch perception.
pub fn drag_candidate(base_zoom: f64, translation_y: f64, drag_scale_px: f64) -> f64 {
    base_zoom * (-translation_y / drag_scale_px).exp()
}

/// Curate the zoom levels offered to the UI: preferred levels within the
/// device range, the device minimum always present, ascending, at most
/// `max_levels` entries.
pub fn curated_zoom_levels(range: ZoomRange, preferred: &[f64], max_levels: usize) -> Vec<f64> {
    let mut levels: Vec<f64> = preferred
        .iter()
        .copied()
        .filter(|level| *level >= range.min && *level <= range.max)
        .collect();
    if !levels.iter().any(|l| (l - range.min).abs() < 1e-9) {
        levels.push(range.min);
    }
    levels.sort_by(|a, b| a.partial_cmp(b).expect("zoom levels are finite"));
    levels.truncate(max_levels);
    levels
}

/// Cloneable handle feeding pinch/drag gesture events into the zoom
/// controller. Both gestures may be active simultaneously; each keeps its
/// own base and rate-limit state.
#[derive(Clone)]
pub struct ZoomGestures {
    device: ActiveDeviceSlot,
    gestures: Arc<Mutex<Gestures>>,
    tunables: ZoomTunables,
}

impl ZoomGestures {
    pub fn new(device: ActiveDeviceSlot, tunables: ZoomTunables) -> Self {
        Self {
            device,
            gestures: Arc::new(Mutex::new(Gestures::default())),
            tunables,
        }
    }

    pub fn pinch_began(&self) {
        self.begin(GestureKind::Pinch);
    }

    pub fn pinch_changed(&self, scale: f64) {
        self.changed_at(GestureKind::Pinch, Instant::now(), |base| {
            pinch_candidate(base, scale)
        });
    }

    pub fn pinch_ended(&self) {
        self.gestures.lock().pinch = None;
    }

    pub fn drag_began(&self) {
        self.begin(GestureKind::Drag);
    }

    pub fn drag_changed(&self, translation_y: f64) {
        let k = self.tunables.drag_scale_px;
        self.changed_at(GestureKind::Drag, Instant::now(), |base| {
            drag_candidate(base, translation_y, k)
        });
    }

    pub fn drag_ended(&self) {
        self.gestures.lock().drag = None;
    }

    fn begin(&self, kind: GestureKind) {
        let Some(device) = self.device.get() else {
            return;
        };
        let base = device.zoom_factor();
        *self.gestures.lock().slot(kind) = Some(GestureZoomState {
            base_zoom: base,
            last_applied: base,
            last_update: None,
        });
    }

    fn changed_at(&self, kind: GestureKind, now: Instant, candidate: impl Fn(f64) -> f64) {
        let Some(device) = self.device.get() else {
            return;
        };

        let mut gestures = self.gestures.lock();
        let Some(state) = gestures.slot(kind).as_mut() else {
            return;
        };

        let clamped = device.zoom_range().clamp(candidate(state.base_zoom));

        if (clamped - state.last_applied).abs() < self.tunables.min_delta {
            return;
        }
        if let Some(last) = state.last_update {
            if now.duration_since(last) < Duration::from_millis(self.tunables.min_interval_ms) {
                return;
            }
        }

        // Transient device errors are superseded by the next update.
        if let Err(e) = device.set_zoom_factor(clamped) {
            tracing::debug!(%e, "zoom update rejected by device");
            return;
        }
        state.last_applied = clamped;
        state.last_update = Some(now);
    }

    #[cfg(test)]
    fn pinch_changed_at(&self, scale: f64, now: Instant) {
        self.changed_at(GestureKind::Pinch, now, |base| pinch_candidate(base, scale));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::sim::{SimConfig, SimDevice};

    fn test_device() -> Arc<SimDevice> {
        // Back camera: zoom 0.5..8.0, starts at 1.0.
        Arc::new(SimDevice::new(SimConfig::default().devices[0].clone()))
    }

    fn gestures_with(device: &Arc<SimDevice>) -> ZoomGestures {
        let slot = ActiveDeviceSlot::new();
        slot.set(Some(device.clone() as Arc<dyn DeviceControl>));
        ZoomGestures::new(slot, ZoomTunables::default())
    }

    #[test]
    fn test_pinch_candidate_math() {
        assert!((pinch_candidate(2.0, 1.5) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_drag_candidate_math() {
        // Upward drag zooms in, downward zooms out, symmetric in log space.
        let zoom_in = drag_candidate(2.0, -220.0, 220.0);
        let zoom_out = drag_candidate(2.0, 220.0, 220.0);
        assert!((zoom_in - 2.0 * std::f64::consts::E).abs() < 1e-9);
        assert!((zoom_in * zoom_out - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_pinch_applies_and_clamps() {
        let device = test_device();
        let g = gestures_with(&device);

        g.pinch_began();
        g.pinch_changed(2.0);
        assert!((device.zoom_factor() - 2.0).abs() < 1e-9);

        // Far past the device maximum of 8.0.
        let later = Instant::now() + Duration::from_millis(100);
        g.pinch_changed_at(100.0, later);
        assert!((device.zoom_factor() - 8.0).abs() < 1e-9);

        g.pinch_ended();
    }

    #[test]
    fn test_rate_limit_by_interval() {
        let device = test_device();
        let g = gestures_with(&device);
        let t0 = Instant::now();

        g.pinch_began();
        g.pinch_changed_at(1.5, t0);
        assert!((device.zoom_factor() - 1.5).abs() < 1e-9);

        // 10 ms later: below the 50 ms interval, ignored.
        g.pinch_changed_at(2.0, t0 + Duration::from_millis(10));
        assert!((device.zoom_factor() - 1.5).abs() < 1e-9);

        // 60 ms later: applied.
        g.pinch_changed_at(2.0, t0 + Duration::from_millis(60));
        assert!((device.zoom_factor() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_limit_by_delta() {
        let device = test_device();
        let g = gestures_with(&device);
        let t0 = Instant::now();

        g.pinch_began();
        g.pinch_changed_at(1.5, t0);
        // A hair's change: below min_delta, ignored even after the interval.
        g.pinch_changed_at(1.5005, t0 + Duration::from_millis(100));
        assert!((device.zoom_factor() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_gestures_are_independent() {
        let device = test_device();
        let g = gestures_with(&device);
        let t0 = Instant::now();

        g.pinch_began();
        g.pinch_changed_at(2.0, t0);
        assert!((device.zoom_factor() - 2.0).abs() < 1e-9);

        // Drag begins from the device's current zoom, not pinch state.
        g.drag_began();
        g.drag_changed(-220.0 * std::f64::consts::LN_2); // one doubling
        assert!((device.zoom_factor() - 4.0).abs() < 1e-6);

        // Pinch still resolves against the base captured at its own begin
        // (1.0), untouched by the drag.
        let later = t0 + Duration::from_millis(200);
        g.pinch_changed_at(3.0, later);
        assert!((device.zoom_factor() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_device_is_a_no_op() {
        let g = ZoomGestures::new(ActiveDeviceSlot::new(), ZoomTunables::default());
        g.pinch_began();
        g.pinch_changed(2.0);
        g.pinch_ended();
    }

    #[test]
    fn test_curated_levels_back_camera() {
        let levels = curated_zoom_levels(
            ZoomRange { min: 0.5, max: 8.0 },
            &[0.5, 1.0, 2.0, 3.0, 5.0],
            3,
        );
        assert_eq!(levels, vec![0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_curated_levels_include_device_min() {
        let levels = curated_zoom_levels(
            ZoomRange { min: 0.7, max: 4.0 },
            &[0.5, 1.0, 2.0, 3.0, 5.0],
            3,
        );
        assert_eq!(levels, vec![0.7, 1.0, 2.0]);
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_curated_levels_narrow_range() {
        let levels = curated_zoom_levels(
            ZoomRange { min: 1.0, max: 1.5 },
            &[0.5, 1.0, 2.0, 3.0, 5.0],
            3,
        );
        assert_eq!(levels, vec![1.0]);
    }
}
