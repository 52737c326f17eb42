//! Device capability trait — the abstraction over the device bridge.
//!
//! A capability provider executes one typed action against one device
//! and can capture the screen. Results are normalized by the dispatcher
//! into an [`ActionResult`] and bundled with a post-action screenshot
//! into an [`Observation`].

use async_trait::async_trait;
use serde_json::Value;

use crate::action::ActionKind;
use crate::error::DeviceError;

/// Raw payload returned by a capability provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    /// The action produced no output worth reporting
    Empty,
    Text(String),
    Structured(Value),
    Binary { mime_type: String, bytes: Vec<u8> },
}

/// The normalized outcome of one dispatched action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Success { payload: Value },
    BinaryPayload { mime_type: String, bytes: Vec<u8> },
    Failure { error: String },
}

impl ActionResult {
    pub fn failure(error: impl ToString) -> Self {
        Self::Failure {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure { .. })
    }

    /// Render the result as compact JSON for the model.
    ///
    /// Binary payloads are summarized; their bytes reach the model only
    /// as images.
    pub fn to_model_json(&self) -> Value {
        match self {
            Self::Success { payload } => serde_json::json!({ "ok": true, "result": payload }),
            Self::BinaryPayload { mime_type, bytes } => serde_json::json!({
                "ok": true,
                "result": { "mime_type": mime_type, "size_bytes": bytes.len() },
            }),
            Self::Failure { error } => serde_json::json!({ "ok": false, "error": error }),
        }
    }
}

impl From<ActionPayload> for ActionResult {
    fn from(payload: ActionPayload) -> Self {
        match payload {
            ActionPayload::Empty => Self::Success { payload: Value::Null },
            ActionPayload::Text(text) => Self::Success {
                payload: Value::String(text),
            },
            ActionPayload::Structured(value) => Self::Success { payload: value },
            ActionPayload::Binary { mime_type, bytes } => Self::BinaryPayload { mime_type, bytes },
        }
    }
}

impl From<Result<ActionPayload, DeviceError>> for ActionResult {
    fn from(result: Result<ActionPayload, DeviceError>) -> Self {
        match result {
            Ok(payload) => payload.into(),
            Err(e) => Self::failure(e),
        }
    }
}

/// What the model sees after every dispatched action.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Post-action screenshot (PNG)
    pub visual: Option<Vec<u8>>,

    /// Why the screenshot is missing, if it is
    pub visual_error: Option<String>,

    pub result: ActionResult,
}

impl Observation {
    /// Pair an action result with the outcome of the capture attempt.
    pub fn new(result: ActionResult, capture: Result<Vec<u8>, DeviceError>) -> Self {
        match capture {
            Ok(bytes) => Self {
                visual: Some(bytes),
                visual_error: None,
                result,
            },
            Err(e) => Self {
                visual: None,
                visual_error: Some(e.to_string()),
                result,
            },
        }
    }
}

/// The core device capability trait.
#[async_trait]
pub trait DeviceCapability: Send + Sync {
    /// A human-readable name (e.g., "adb").
    fn name(&self) -> &str;

    /// Fails with [`DeviceError::Unavailable`] when nothing can be dispatched.
    async fn ensure_available(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Execute one action.
    async fn invoke(&self, action: &ActionKind) -> Result<ActionPayload, DeviceError>;

    /// Capture the current screen as PNG bytes.
    async fn capture_screen(&self) -> Result<Vec<u8>, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_normalize_to_results() {
        assert_eq!(
            ActionResult::from(ActionPayload::Empty),
            ActionResult::Success { payload: Value::Null }
        );
        assert_eq!(
            ActionResult::from(ActionPayload::Text("ok".into())),
            ActionResult::Success { payload: Value::String("ok".into()) }
        );
        let binary = ActionResult::from(ActionPayload::Binary {
            mime_type: "image/png".into(),
            bytes: vec![1, 2, 3],
        });
        assert!(matches!(binary, ActionResult::BinaryPayload { ref bytes, .. } if bytes.len() == 3));
    }

    #[test]
    fn device_errors_become_failures_verbatim() {
        let err = DeviceError::Timeout {
            command: "adb shell input tap 1 1".into(),
            timeout_secs: 30,
        };
        let expected = err.to_string();
        let result = ActionResult::from(Err::<ActionPayload, _>(err));
        assert_eq!(result, ActionResult::Failure { error: expected });
        assert!(!result.is_success());
    }

    #[test]
    fn binary_result_json_omits_bytes() {
        let result = ActionResult::BinaryPayload {
            mime_type: "image/png".into(),
            bytes: vec![0; 2048],
        };
        let json = result.to_model_json();
        assert_eq!(json["result"]["size_bytes"], 2048);
        assert_eq!(json["ok"], true);
    }

    #[test]
    fn capture_error_recorded_on_observation() {
        let obs = Observation::new(
            ActionResult::failure("boom"),
            Err(DeviceError::Unavailable("adb missing".into())),
        );
        assert!(obs.visual.is_none());
        assert!(obs.visual_error.unwrap().contains("adb missing"));
    }
}
