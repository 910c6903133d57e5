//! Camera bridge commands
//!
//! The string-keyed command surface the managed application layer drives
//! over the message-passing bridge. Method names, argument keys, status
//! strings, and error codes mirror the mobile plugin contract; the
//! transport itself (channel framing, marshalling) stays outside this
//! crate.

use crate::session::controller::{CameraEvent, SessionHandle};
use crate::utils::error::{ErrorResponse, SessionError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// Shared state for the camera command surface.
#[derive(Clone)]
pub struct CameraState {
    session: SessionHandle,
}

impl CameraState {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Push events (`onVideoRecorded`, `onVideoError`) to relay to the
    /// caller.
    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.session.subscribe()
    }
}

/// An incoming bridge call: method name plus JSON arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            arguments: Value::Null,
        }
    }

    pub fn with_args(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// A bridge response: a JSON result or a coded error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum MethodResponse {
    Success(Value),
    Error(ErrorResponse),
}

impl MethodResponse {
    pub fn ok(value: impl Serialize) -> Self {
        Self::Success(serde_json::to_value(value).unwrap_or(Value::Null))
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error(ErrorResponse::new(code, message))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetFlashArgs {
    is_on: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetZoomArgs {
    zoom_value: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetBrightnessArgs {
    value: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRecordingArgs {
    max_duration_ms: Option<i64>,
}

fn parse_args<T: DeserializeOwned>(arguments: &Value, missing: &str) -> Result<T, MethodResponse> {
    serde_json::from_value(arguments.clone())
        .map_err(|_| MethodResponse::error("INVALID_ARGS", format!("Missing {missing}")))
}

fn map_result<T: Serialize>(result: Result<T, SessionError>, code: &str) -> MethodResponse {
    match result {
        Ok(value) => MethodResponse::ok(value),
        Err(error) => MethodResponse::Error(ErrorResponse::from_session(code, &error)),
    }
}

/// Dispatch one bridge call onto the camera session.
pub async fn handle_method_call(state: &CameraState, call: MethodCall) -> MethodResponse {
    let session = state.session();
    tracing::debug!(method = %call.method, "bridge call");

    match call.method.as_str() {
        "prepareCamera" => map_result(
            session.prepare_camera().await.map(|_| true),
            "INIT_ERROR",
        ),
        "initCamera" => map_result(session.init_camera().await.map(|_| true), "INIT_ERROR"),
        "isSessionActive" => MethodResponse::ok(session.is_session_active().await),
        "supportsLiveSwitch" => MethodResponse::ok(session.supports_live_switch().await),
        "takePicture" => map_result(session.capture_photo().await, "CAPTURE_ERROR"),
        "switchCamera" => map_result(
            session.switch_camera().await.map(|_| "Camera switched"),
            "SWITCH_ERROR",
        ),
        "setFlash" => match parse_args::<SetFlashArgs>(&call.arguments, "isOn") {
            Err(response) => response,
            Ok(args) => map_result(
                session.set_flash(args.is_on).await.map(|_| "Flash updated"),
                "FLASH_ERROR",
            ),
        },
        "setZoom" => match parse_args::<SetZoomArgs>(&call.arguments, "zoomValue") {
            Err(response) => response,
            Ok(args) => map_result(
                session.set_zoom(args.zoom_value).await.map(|_| "Zoom updated"),
                "ZOOM_ERROR",
            ),
        },
        "setBrightness" => match parse_args::<SetBrightnessArgs>(&call.arguments, "value") {
            Err(response) => response,
            Ok(args) => map_result(
                session
                    .set_brightness(args.value)
                    .await
                    .map(|_| "Brightness updated"),
                "BRIGHTNESS_ERROR",
            ),
        },
        "getAvailableZoomLevels" => MethodResponse::ok(session.available_zoom_levels().await),
        "getZoomRange" => match session.zoom_range().await {
            Ok(range) => MethodResponse::ok(json!({
                "minZoom": range.min,
                "maxZoom": range.max,
            })),
            // No bound device: answer null rather than an error.
            Err(_) => MethodResponse::ok(Value::Null),
        },
        "optimizeCamera" => map_result(
            session
                .optimize_for_capture()
                .await
                .map(|_| "Camera optimized"),
            "OPTIMIZE_ERROR",
        ),
        "pauseCamera" => map_result(
            session.pause_session().await.map(|_| "Camera paused"),
            "PAUSE_ERROR",
        ),
        "resumeCamera" => map_result(
            session.resume_session().await.map(|_| "Camera resumed"),
            "RESUME_ERROR",
        ),
        "disposeCamera" => map_result(
            session.dispose().await.map(|_| "Camera disposed"),
            "DISPOSE_ERROR",
        ),
        "startVideoRecording" => {
            let args: StartRecordingArgs = match call.arguments {
                Value::Null => StartRecordingArgs::default(),
                ref other => match serde_json::from_value(other.clone()) {
                    Ok(args) => args,
                    Err(_) => {
                        return MethodResponse::error("INVALID_ARGS", "Invalid maxDurationMs")
                    }
                },
            };
            let max_duration = args.max_duration_ms.filter(|ms| *ms > 0).map(|ms| ms as u64);
            map_result(
                session.start_recording(max_duration).await.map(|_| true),
                "RECORDING_ERROR",
            )
        }
        "stopVideoRecording" => map_result(session.stop_recording().await, "STOP_ERROR"),
        "cancelVideoRecording" => map_result(
            session.cancel_recording().await.map(|_| ""),
            "CANCEL_ERROR",
        ),
        other => {
            tracing::warn!(method = %other, "unimplemented bridge method");
            MethodResponse::error("NOT_IMPLEMENTED", format!("Unknown method: {other}"))
        }
    }
}

/// Render a push event as the outgoing bridge call the caller receives.
pub fn push_event_call(event: &CameraEvent) -> MethodCall {
    match event {
        CameraEvent::VideoRecorded { path } => {
            MethodCall::with_args("onVideoRecorded", json!({ "path": path }))
        }
        CameraEvent::VideoError { message } => {
            MethodCall::with_args("onVideoError", json!({ "message": message }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::writer::JournalSink;
    use crate::session::config::SessionTunables;
    use crate::session::controller::SessionBuilder;
    use anyhow::Result;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn fast_state(dir: &Path) -> CameraState {
        let tunables = SessionTunables {
            output_dir: Some(dir.to_path_buf()),
            settle_delay_ms: 0,
            session_start_poll_ms: 5,
            session_start_timeout_ms: 2_000,
            ..Default::default()
        };
        let handle = SessionBuilder::new()
            .with_sink_factory(Arc::new(|path: &Path| JournalSink::create(path)))
            .with_tunables(tunables)
            .spawn();
        CameraState::new(handle)
    }

    #[tokio::test]
    async fn test_init_and_session_active() -> Result<()> {
        let dir = tempdir()?;
        let state = fast_state(dir.path());

        let response = handle_method_call(&state, MethodCall::new("initCamera")).await;
        assert_eq!(response, MethodResponse::Success(Value::Bool(true)));

        let response = handle_method_call(&state, MethodCall::new("isSessionActive")).await;
        assert_eq!(response, MethodResponse::Success(Value::Bool(true)));

        let response = handle_method_call(&state, MethodCall::new("supportsLiveSwitch")).await;
        assert_eq!(response, MethodResponse::Success(Value::Bool(true)));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_flash_requires_is_on() -> Result<()> {
        let dir = tempdir()?;
        let state = fast_state(dir.path());
        handle_method_call(&state, MethodCall::new("initCamera")).await;

        let response = handle_method_call(&state, MethodCall::new("setFlash")).await;
        match response {
            MethodResponse::Error(e) => {
                assert_eq!(e.code, "INVALID_ARGS");
                assert_eq!(e.message, "Missing isOn");
            }
            other => panic!("expected INVALID_ARGS, got {other:?}"),
        }

        let response = handle_method_call(
            &state,
            MethodCall::with_args("setFlash", json!({ "isOn": true })),
        )
        .await;
        assert_eq!(
            response,
            MethodResponse::Success(Value::String("Flash updated".into()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_zoom_commands() -> Result<()> {
        let dir = tempdir()?;
        let state = fast_state(dir.path());

        // Before configuration there is no bound device.
        let response = handle_method_call(&state, MethodCall::new("getZoomRange")).await;
        assert_eq!(response, MethodResponse::Success(Value::Null));

        handle_method_call(&state, MethodCall::new("initCamera")).await;

        let response = handle_method_call(
            &state,
            MethodCall::with_args("setZoom", json!({ "zoomValue": 2.0 })),
        )
        .await;
        assert_eq!(
            response,
            MethodResponse::Success(Value::String("Zoom updated".into()))
        );

        let response = handle_method_call(&state, MethodCall::new("getZoomRange")).await;
        assert_eq!(
            response,
            MethodResponse::Success(json!({ "minZoom": 0.5, "maxZoom": 8.0 }))
        );

        let response =
            handle_method_call(&state, MethodCall::new("getAvailableZoomLevels")).await;
        assert_eq!(response, MethodResponse::Success(json!([0.5, 1.0, 2.0])));
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_without_recording_is_coded_error() -> Result<()> {
        let dir = tempdir()?;
        let state = fast_state(dir.path());
        handle_method_call(&state, MethodCall::new("initCamera")).await;

        let response = handle_method_call(&state, MethodCall::new("stopVideoRecording")).await;
        match response {
            MethodResponse::Error(e) => {
                assert_eq!(e.code, "STOP_ERROR");
                assert_eq!(e.message, "No active recording");
            }
            other => panic!("expected STOP_ERROR, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_method_not_implemented() -> Result<()> {
        let dir = tempdir()?;
        let state = fast_state(dir.path());
        let response = handle_method_call(&state, MethodCall::new("fooBar")).await;
        match response {
            MethodResponse::Error(e) => assert_eq!(e.code, "NOT_IMPLEMENTED"),
            other => panic!("expected NOT_IMPLEMENTED, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_recording_roundtrip_over_bridge() -> Result<()> {
        let dir = tempdir()?;
        let state = fast_state(dir.path());
        handle_method_call(&state, MethodCall::new("initCamera")).await;

        let response = handle_method_call(
            &state,
            MethodCall::with_args("startVideoRecording", json!({ "maxDurationMs": null })),
        )
        .await;
        assert_eq!(response, MethodResponse::Success(Value::Bool(true)));

        // The simulator pumps frames in real time; give it a moment.
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;

        let response = handle_method_call(&state, MethodCall::new("stopVideoRecording")).await;
        let MethodResponse::Success(Value::String(path)) = response else {
            panic!("expected a path, got {response:?}");
        };
        assert!(std::path::Path::new(&path).exists());

        let response = handle_method_call(&state, MethodCall::new("disposeCamera")).await;
        assert_eq!(
            response,
            MethodResponse::Success(Value::String("Camera disposed".into()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_take_picture_over_bridge() -> Result<()> {
        let dir = tempdir()?;
        let state = fast_state(dir.path());

        let response = handle_method_call(&state, MethodCall::new("takePicture")).await;
        let MethodResponse::Success(Value::String(path)) = response else {
            panic!("expected a path, got {response:?}");
        };
        let bytes = std::fs::read(&path)?;
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_over_bridge_returns_empty_string() -> Result<()> {
        let dir = tempdir()?;
        let state = fast_state(dir.path());
        handle_method_call(&state, MethodCall::new("initCamera")).await;
        handle_method_call(
            &state,
            MethodCall::with_args("startVideoRecording", Value::Null),
        )
        .await;

        let response =
            handle_method_call(&state, MethodCall::new("cancelVideoRecording")).await;
        assert_eq!(response, MethodResponse::Success(Value::String("".into())));
        Ok(())
    }

    #[test]
    fn test_push_event_rendering() {
        let call = push_event_call(&CameraEvent::VideoRecorded {
            path: "/tmp/x.mp4".into(),
        });
        assert_eq!(call.method, "onVideoRecorded");
        assert_eq!(call.arguments, json!({ "path": "/tmp/x.mp4" }));

        let call = push_event_call(&CameraEvent::VideoError {
            message: "boom".into(),
        });
        assert_eq!(call.method, "onVideoError");
    }
}
