//! Error types for the AdbPilot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all AdbPilot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Device errors ---
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    // --- Transcript errors ---
    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the language model.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures reported by the device bridge.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// The bridge executable cannot be located; nothing is dispatchable.
    #[error("Device bridge unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to start `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` exited with status {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("Unexpected output from `{command}`: {reason}")]
    InvalidOutput { command: String, reason: String },
}

/// A model-issued action request that cannot be dispatched.
///
/// The `Display` text is what the model sees in the failure observation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidActionRequest {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("invalid parameter: {name} ({reason})")]
    InvalidParameter { name: String, reason: String },
}

/// An append that would break the transcript's turn ordering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("the transcript already has its user instruction")]
    DuplicateInstruction,

    #[error("action `{pending}` is still awaiting its observation")]
    ObservationPending { pending: String },

    #[error("observation appended without a pending action")]
    UnpairedObservation,
}
