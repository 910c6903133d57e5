//! Bridge command handlers
//!
//! String-keyed commands the managed application layer invokes over the
//! message-passing bridge, plus the push events flowing back.

pub mod camera;

pub use camera::{handle_method_call, push_event_call, CameraState, MethodCall, MethodResponse};
