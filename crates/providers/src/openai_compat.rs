//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Gemini (via its OpenAI endpoint),
//! Ollama, vLLM and any OpenAI-compatible endpoint that supports tool
//! calling and image input.
//!
//! Transcript rendering:
//! - `UserInstruction` → user message
//! - `ModelText` → assistant message (empty text becomes a placeholder)
//! - `ModelAction` → assistant message with a single tool call
//! - `Observation` → tool message with the JSON result, then (for the
//!   most recent `image_history` screenshots) a user message carrying the
//!   screenshot as a `data:image/png;base64,...` URL

use std::time::Duration;

use adbpilot_core::action::ActionRequest;
use adbpilot_core::device::Observation;
use adbpilot_core::error::ProviderError;
use adbpilot_core::provider::*;
use adbpilot_core::transcript::Turn;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Screenshots sent as images when not configured otherwise.
pub const DEFAULT_IMAGE_HISTORY: usize = 3;

/// Stands in for an empty assistant turn; `content: ""` is rejected by some backends.
const EMPTY_TURN_PLACEHOLDER: &str = "(no response)";

/// An OpenAI-compatible LLM provider.
#[cfg_attr(test, derive(Debug))]
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    image_history: usize,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: build_client(Duration::from_secs(120)),
            image_history: DEFAULT_IMAGE_HISTORY,
        }
    }

    /// Create a Gemini provider via Google's OpenAI-compatible endpoint.
    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self::new(
            "gemini",
            "https://generativelanguage.googleapis.com/v1beta/openai",
            api_key,
        )
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    /// Set how many of the most recent screenshots are sent as images.
    pub fn with_image_history(mut self, count: usize) -> Self {
        self.image_history = count;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert the transcript to OpenAI API messages.
    fn to_api_messages(system_prompt: &str, transcript: &[Turn], image_history: usize) -> Vec<ApiMessage> {
        let with_visual = transcript
            .iter()
            .filter(|t| matches!(t, Turn::Observation(o) if o.visual.is_some()))
            .count();
        let mut skip_images = with_visual.saturating_sub(image_history);

        let mut messages = Vec::with_capacity(transcript.len() + 1);
        if !system_prompt.is_empty() {
            messages.push(ApiMessage::text("system", system_prompt));
        }

        let mut last_call: Option<&ActionRequest> = None;
        for turn in transcript {
            match turn {
                Turn::UserInstruction(text) => messages.push(ApiMessage::text("user", text)),
                Turn::ModelText(text) if text.trim().is_empty() => {
                    messages.push(ApiMessage::text("assistant", EMPTY_TURN_PLACEHOLDER))
                }
                Turn::ModelText(text) => messages.push(ApiMessage::text("assistant", text)),
                Turn::ModelAction(request) => {
                    last_call = Some(request);
                    messages.push(ApiMessage {
                        role: "assistant".into(),
                        content: None,
                        tool_calls: Some(vec![ApiToolCall {
                            id: request.id.clone(),
                            r#type: "function".into(),
                            function: ApiFunction {
                                name: request.name.clone(),
                                arguments: serde_json::Value::Object(request.arguments.clone()).to_string(),
                            },
                        }]),
                        tool_call_id: None,
                    });
                }
                Turn::Observation(observation) => {
                    let (call_id, action) = last_call
                        .map(|c| (c.id.clone(), c.name.as_str()))
                        .unwrap_or_default();
                    let send_image = observation.visual.is_some() && {
                        if skip_images > 0 {
                            skip_images -= 1;
                            false
                        } else {
                            true
                        }
                    };

                    messages.push(ApiMessage {
                        role: "tool".into(),
                        content: Some(ApiContent::Text(observation_json(observation, send_image).to_string())),
                        tool_calls: None,
                        tool_call_id: Some(call_id),
                    });

                    if let (true, Some(png)) = (send_image, observation.visual.as_ref()) {
                        messages.push(ApiMessage {
                            role: "user".into(),
                            content: Some(ApiContent::Parts(vec![
                                ApiContentPart::Text {
                                    text: format!("Screen after `{action}`:"),
                                },
                                ApiContentPart::ImageUrl {
                                    image_url: ApiImageUrl {
                                        url: format!("data:image/png;base64,{}", BASE64.encode(png)),
                                    },
                                },
                            ])),
                            tool_calls: None,
                            tool_call_id: None,
                        });
                    }
                }
            }
        }

        messages
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Turn an API response into the model's next turn.
    fn parse_turn(api_response: ApiResponse) -> std::result::Result<ModelTurn, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        let requests: Vec<ActionRequest> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| {
                let arguments = if tc.function.arguments.trim().is_empty() {
                    serde_json::Value::Object(Default::default())
                } else {
                    serde_json::from_str(&tc.function.arguments).unwrap_or_else(|e| {
                        warn!(tool = %tc.function.name, error = %e, "Tool call arguments are not valid JSON");
                        serde_json::Value::Null
                    })
                };
                let id = if tc.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    tc.id
                };
                ActionRequest::with_id(id, tc.function.name, arguments)
            })
            .collect();

        let text = choice.message.content.and_then(ApiContent::into_text);
        let mut turn = ModelTurn::from_parts(text, requests).with_model(api_response.model);
        if let Some(u) = api_response.usage {
            turn = turn.with_usage(Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });
        }
        Ok(turn)
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// The JSON body of a tool message for one observation.
fn observation_json(observation: &Observation, image_attached: bool) -> serde_json::Value {
    let mut body = observation.result.to_model_json();
    let screenshot = match (&observation.visual, &observation.visual_error) {
        (Some(_), _) if image_attached => "attached in the next message".to_string(),
        (Some(_), _) => "omitted (older screenshot)".to_string(),
        (None, Some(err)) => format!("unavailable: {err}"),
        (None, None) => "unavailable".to_string(),
    };
    body["screenshot"] = serde_json::Value::String(screenshot);
    body
}

fn map_send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest<'_>) -> std::result::Result<ModelTurn, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(request.system_prompt, request.transcript, self.image_history),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(request.tools));
        }

        debug!(
            provider = %self.name,
            model = %request.model,
            turns = request.transcript.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status == 404 {
            return Err(ProviderError::ModelNotFound(request.model.to_string()));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        Self::parse_turn(api_response)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(map_send_error)?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<ApiContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, text: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(ApiContent::Text(text.to_string())),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

impl ApiContent {
    fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Parts(parts) => {
                let text: String = parts
                    .into_iter()
                    .filter_map(|p| match p {
                        ApiContentPart::Text { text } => Some(text),
                        ApiContentPart::ImageUrl { .. } => None,
                    })
                    .collect();
                Some(text)
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
