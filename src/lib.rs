//! camkit: native camera capture core.
//!
//! The platform-native half of a mobile camera feature: a capture session
//! manager owning a live audio/video pipeline, frame-accurate recording
//! through a low-level container writer, live camera switching with
//! audio/video timeline reconciliation, and continuous gesture-driven zoom,
//! all driven through a string-keyed command bridge.
//!
//! The capture hardware sits behind the [`capture::traits::CaptureGraph`]
//! seam; the crate ships a deterministic simulator backend. A typical
//! embedding:
//!
//! ```no_run
//! use camkit::commands::{handle_method_call, CameraState, MethodCall};
//! use camkit::session::SessionBuilder;
//!
//! # async fn run() {
//! let session = SessionBuilder::new().spawn();
//! let state = CameraState::new(session);
//! let response = handle_method_call(&state, MethodCall::new("initCamera")).await;
//! # let _ = response;
//! # }
//! ```

pub mod capture;
pub mod commands;
pub mod recorder;
pub mod session;
pub mod utils;

pub use capture::{DevicePosition, FlashMode, ZoomRange};
pub use commands::{CameraState, MethodCall, MethodResponse};
pub use session::{CameraEvent, SessionBuilder, SessionHandle, SessionTunables};
pub use utils::error::{ErrorResponse, SessionError, SessionResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing for embedders that have no subscriber of their own.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camkit=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
