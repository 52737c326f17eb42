//! # AdbPilot Core
//!
//! Domain types, traits, and error definitions for the AdbPilot device
//! agent. This crate has **no transport or process dependencies**: it
//! defines the model that the provider, device and agent crates
//! implement against.
//!
//! - [`action`]: the action catalog and typed [`ActionKind`]
//! - [`transcript`]: the append-only run transcript
//! - [`provider`]: the model-client trait
//! - [`device`]: the device-capability trait and observation types
//! - [`event`]: progress events

pub mod action;
pub mod device;
pub mod error;
pub mod event;
pub mod provider;
pub mod transcript;

// Re-export key types at crate root for ergonomics
pub use action::{ActionCatalog, ActionKind, ActionRequest, ActionSpec, ParamSpec, ParamType};
pub use device::{ActionPayload, ActionResult, DeviceCapability, Observation};
pub use error::{DeviceError, Error, InvalidActionRequest, ProviderError, Result, TranscriptError};
pub use event::{DomainEvent, EventBus};
pub use provider::{COMPLETION_ACTION, ModelTurn, Provider, ProviderRequest, ToolDefinition, Usage};
pub use transcript::{ConversationState, RunId, Turn};
