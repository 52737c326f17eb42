//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send the run transcript plus the action
//! advertisement to an LLM and get back the model's next turn.
//! The model is stateless between calls, so every request carries the
//! whole transcript.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::ActionRequest;
use crate::error::ProviderError;
use crate::transcript::Turn;

/// Name of the reserved control action the model calls to finish a task.
pub const COMPLETION_ACTION: &str = "task_complete";

/// A tool definition sent to the LLM so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The definition of the reserved completion action.
pub fn completion_definition() -> ToolDefinition {
    ToolDefinition {
        name: COMPLETION_ACTION.into(),
        description: "Call this exactly once when the requested task is fully done. \
                      Do not call any device action in the same turn."
            .into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Short summary of what was accomplished"
                }
            },
            "required": ["summary"]
        }),
    }
}

/// Everything a provider needs for one round.
#[derive(Debug, Clone)]
pub struct ProviderRequest<'a> {
    /// The model to use (e.g., "gemini-2.0-flash", "gpt-4o")
    pub model: &'a str,

    /// Instructions placed before the transcript
    pub system_prompt: &'a str,

    /// The full transcript, oldest turn first
    pub transcript: &'a [Turn],

    /// Available actions the model can call
    pub tools: &'a [ToolDefinition],

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One response from the model: optional text, zero or more action
/// requests, and an optional structured completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelTurn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Device actions, in the order the model returned them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionRequest>,

    /// Summary carried by a `task_complete` call, if the model made one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded
    #[serde(default)]
    pub model: String,
}

impl ModelTurn {
    /// Assemble a turn from raw response parts.
    ///
    /// Calls to the reserved completion action are lifted out of the
    /// action list into `completion`; empty text becomes `None`.
    pub fn from_parts(text: Option<String>, requests: Vec<ActionRequest>) -> Self {
        let mut completion = None;
        let mut actions = Vec::with_capacity(requests.len());
        for request in requests {
            if request.name == COMPLETION_ACTION {
                let summary = request
                    .arguments
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                completion.get_or_insert(summary);
            } else {
                actions.push(request);
            }
        }

        Self {
            text: text.filter(|t| !t.trim().is_empty()),
            actions,
            completion,
            usage: None,
            model: String::new(),
        }
    }

    /// A text-only turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self::from_parts(Some(text.into()), Vec::new())
    }

    /// A turn that only requests actions.
    pub fn actions(requests: Vec<ActionRequest>) -> Self {
        Self::from_parts(None, requests)
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The agent loop calls
/// `complete()` without knowing which provider is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "gemini", "openai").
    fn name(&self) -> &str;

    /// Send the transcript and get the model's next turn.
    async fn complete(&self, request: ProviderRequest<'_>) -> std::result::Result<ModelTurn, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
