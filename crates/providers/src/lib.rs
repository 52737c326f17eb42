//! LLM Provider implementations for AdbPilot.
//!
//! All providers implement the `adbpilot_core::Provider` trait.
//! [`build_from_config`] selects the endpoint from configuration.

pub mod builder;
pub mod openai_compat;

pub use builder::build_from_config;
pub use openai_compat::OpenAiCompatProvider;
