//! Per-position device cache
//!
//! Discovery is slow on real hardware, so the session controller caches the
//! resolved device per position. A cached device that reports disconnection
//! is dropped and rediscovered.

use crate::capture::traits::{CaptureGraph, DeviceControl, DevicePosition};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct DeviceCache {
    map: HashMap<DevicePosition, Arc<dyn DeviceControl>>,
}

impl DeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached device for the position, or a fresh discovery.
    pub fn get(
        &mut self,
        position: DevicePosition,
        graph: &mut dyn CaptureGraph,
    ) -> Option<Arc<dyn DeviceControl>> {
        if let Some(cached) = self.map.get(&position) {
            if cached.is_connected() {
                return Some(cached.clone());
            }
            tracing::info!(?position, "cached device disconnected; rediscovering");
            self.map.remove(&position);
        }

        let device = graph.discover(position)?;
        self.map.insert(position, device.clone());
        Some(device)
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
