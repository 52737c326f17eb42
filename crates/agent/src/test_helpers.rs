//! Shared test doubles for the dispatcher and loop tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use adbpilot_core::action::{ActionKind, ActionRequest};
use adbpilot_core::device::{ActionPayload, DeviceCapability};
use adbpilot_core::error::{DeviceError, ProviderError};
use adbpilot_core::provider::{ModelTurn, Provider, ProviderRequest};
use adbpilot_core::transcript::Turn;
use tokio_util::sync::CancellationToken;

pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

/// A provider that returns a sequence of scripted turns.
///
/// Each call to `complete` returns the next turn in the queue. Once the
/// queue is empty the `repeat` turn is returned, if set; otherwise the
/// call panics.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Result<ModelTurn, ProviderError>>>,
    repeat: Option<ModelTurn>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ModelTurn>) -> Self {
        Self::with_results(turns.into_iter().map(Ok).collect())
    }

    pub fn with_results(turns: Vec<Result<ModelTurn, ProviderError>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            repeat: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// A provider that answers every round with the same turn.
    pub fn repeating(turn: ModelTurn) -> Self {
        Self {
            repeat: Some(turn),
            ..Self::new(vec![])
        }
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// The transcript snapshot passed to each call.
    pub fn transcripts(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest<'_>) -> Result<ModelTurn, ProviderError> {
        self.seen.lock().unwrap().push(request.transcript.to_vec());
        let next = self.turns.lock().unwrap().pop_front();
        match (next, &self.repeat) {
            (Some(turn), _) => turn,
            (None, Some(turn)) => Ok(turn.clone()),
            (None, None) => panic!(
                "ScriptedProvider: no more turns (call #{})",
                self.call_count()
            ),
        }
    }
}

/// A provider whose request never finishes.
pub struct HangingProvider;

#[async_trait::async_trait]
impl Provider for HangingProvider {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: ProviderRequest<'_>) -> Result<ModelTurn, ProviderError> {
        std::future::pending().await
    }
}

/// A fake device that records every call in order.
///
/// Log entries are `invoke:<action>` and `capture`.
#[derive(Default)]
pub struct RecordingDevice {
    log: Mutex<Vec<String>>,
    fail_action: Option<&'static str>,
    capture_fails: bool,
    unavailable: bool,
    cancel_on_invoke: Option<CancellationToken>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make one action fail with a command error.
    pub fn failing_on(action: &'static str) -> Self {
        Self {
            fail_action: Some(action),
            ..Self::default()
        }
    }

    pub fn without_screen() -> Self {
        Self {
            capture_fails: true,
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Cancel `token` from inside the first invocation.
    pub fn cancelling(token: CancellationToken) -> Self {
        Self {
            cancel_on_invoke: Some(token),
            ..Self::default()
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn invocations(&self) -> Vec<String> {
        self.log()
            .into_iter()
            .filter_map(|entry| entry.strip_prefix("invoke:").map(String::from))
            .collect()
    }

    pub fn captures(&self) -> usize {
        self.log().iter().filter(|e| *e == "capture").count()
    }
}

#[async_trait::async_trait]
impl DeviceCapability for RecordingDevice {
    fn name(&self) -> &str {
        "recording"
    }

    async fn ensure_available(&self) -> Result<(), DeviceError> {
        if self.unavailable {
            Err(DeviceError::Unavailable("can't locate adb".into()))
        } else {
            Ok(())
        }
    }

    async fn invoke(&self, action: &ActionKind) -> Result<ActionPayload, DeviceError> {
        self.log.lock().unwrap().push(format!("invoke:{}", action.name()));
        if let Some(token) = &self.cancel_on_invoke {
            token.cancel();
        }
        if self.fail_action == Some(action.name()) {
            return Err(DeviceError::CommandFailed {
                command: format!("adb {}", action.name()),
                code: 1,
                stderr: "error: device offline".into(),
            });
        }
        Ok(match action {
            ActionKind::TakeScreenshot { .. } => ActionPayload::Binary {
                mime_type: "image/png".into(),
                bytes: FAKE_PNG.to_vec(),
            },
            ActionKind::InstalledPackages => {
                ActionPayload::Structured(serde_json::json!({ "packages": ["com.android.chrome"] }))
            }
            ActionKind::CheckAdbInstalled => ActionPayload::Text("/usr/bin/adb".into()),
            _ => ActionPayload::Empty,
        })
    }

    async fn capture_screen(&self) -> Result<Vec<u8>, DeviceError> {
        self.log.lock().unwrap().push("capture".into());
        if self.capture_fails {
            Err(DeviceError::CommandFailed {
                command: "adb exec-out screencap -p".into(),
                code: 1,
                stderr: "screencap failed".into(),
            })
        } else {
            Ok(FAKE_PNG.to_vec())
        }
    }
}

pub fn tap(x: u32, y: u32) -> ActionRequest {
    ActionRequest::new("tap", serde_json::json!({ "x": x, "y": y }))
}

pub fn press(keycode: &str) -> ActionRequest {
    ActionRequest::new("press_key", serde_json::json!({ "keycode": keycode }))
}
