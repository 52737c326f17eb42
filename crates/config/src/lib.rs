//! Configuration loading, validation, and management for AdbPilot.
//!
//! Loads configuration from `~/.adbpilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.adbpilot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model provider: "gemini", "openai", "openrouter", "ollama" or any
    /// name together with `api_url`
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Override for the provider's OpenAI-compatible base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model to request
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Seconds before a model request is abandoned
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub agent: AgentSettings,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.0-flash".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_request_timeout_secs() -> u64 {
    120
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("device", &self.device)
            .field("agent", &self.agent)
            .finish()
    }
}

/// How to reach the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Explicit adb executable; looked up on PATH when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adb_path: Option<PathBuf>,

    /// Device serial passed as `adb -s`; adb's default device when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Pause between an action and its screenshot, for the UI to settle
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default)]
    pub save_screenshots: bool,

    /// Where screenshots are written; `<config dir>/screenshots` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_dir: Option<PathBuf>,
}

fn default_command_timeout_secs() -> u64 {
    30
}
fn default_settle_delay_ms() -> u64 {
    1000
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: None,
            serial: None,
            command_timeout_secs: default_command_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            save_screenshots: false,
            screenshot_dir: None,
        }
    }
}

/// Agent loop behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model rounds before a run is aborted
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Legacy completion token, matched by substring in model text
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,

    /// Whether the legacy marker ends a run (the structured
    /// `task_complete` call always does)
    #[serde(default = "default_true")]
    pub accept_completion_marker: bool,

    /// How many of the most recent screenshots are sent as images
    #[serde(default = "default_image_history")]
    pub image_history: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_max_rounds() -> u32 {
    30
}
fn default_completion_marker() -> String {
    r#"{"status": "success"}"#.into()
}
fn default_true() -> bool {
    true
}
fn default_image_history() -> usize {
    3
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            completion_marker: default_completion_marker(),
            accept_completion_marker: true,
            image_history: default_image_history(),
            system_prompt_override: None,
        }
    }
}

/// Environment variables consulted for the API key, highest priority first.
pub const API_KEY_VARS: &[&str] = &[
    "ADBPILOT_API_KEY",
    "GEMINI_API_KEY",
    "OPENAI_API_KEY",
    "OPENROUTER_API_KEY",
];

impl AppConfig {
    /// Load configuration from the default path (~/.adbpilot/config.toml).
    ///
    /// Environment overrides are applied on top, see
    /// [`AppConfig::apply_env_overrides`].
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// - API key: first of [`API_KEY_VARS`], only when the file has none
    /// - `ADBPILOT_PROVIDER`, `ADBPILOT_MODEL`, `ADBPILOT_DEVICE` (serial)
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = API_KEY_VARS
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.is_empty()));
        }

        if let Some(provider) = lookup("ADBPILOT_PROVIDER") {
            self.provider = provider;
        }

        if let Some(model) = lookup("ADBPILOT_MODEL") {
            self.model = model;
        }

        if let Some(serial) = lookup("ADBPILOT_DEVICE") {
            self.device.serial = Some(serial);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".adbpilot")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Directory screenshots are saved to.
    pub fn screenshot_dir(&self) -> PathBuf {
        self.device
            .screenshot_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("screenshots"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_rounds must be at least 1".into(),
            ));
        }

        if self.agent.accept_completion_marker && self.agent.completion_marker.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "agent.completion_marker must not be empty while accept_completion_marker is set".into(),
            ));
        }

        if self.device.command_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "device.command_timeout_secs must be at least 1".into(),
            ));
        }

        if self.provider.trim().is_empty() {
            return Err(ConfigError::ValidationError("provider must not be empty".into()));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            device: DeviceConfig::default(),
            agent: AgentSettings::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
