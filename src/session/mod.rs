//! Camera session
//!
//! The session controller actor, its configuration, device cache, and the
//! continuous zoom controller.

pub mod config;
pub mod controller;
pub mod devices;
pub mod state;
pub mod zoom;

pub use config::{EncodeTunables, SessionTunables, ZoomTunables};
pub use controller::{default_sink_factory, CameraEvent, SessionBuilder, SessionHandle};
pub use state::ConfigurationState;
pub use zoom::{ActiveDeviceSlot, ZoomGestures};
