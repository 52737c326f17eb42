//! Turn and ConversationState — the append-only run transcript.
//!
//! The transcript is replayed to the model in full every round. It only
//! grows: there is no removal or edit operation, so a wrong entry stays
//! in context for the rest of the run. Nothing here bounds its size;
//! providers decide how much of it to render onto the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::ActionRequest;
use crate::device::Observation;
use crate::error::TranscriptError;

/// Unique identifier for one agent run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of conversation history.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    UserInstruction(String),
    ModelAction(ActionRequest),
    ModelText(String),
    Observation(Observation),
}

impl Turn {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserInstruction(_) => "user_instruction",
            Self::ModelAction(_) => "model_action",
            Self::ModelText(_) => "model_text",
            Self::Observation(_) => "observation",
        }
    }
}

/// The ordered transcript of a single run.
///
/// `append` only accepts the turn kinds legal in the current state:
/// after a `ModelAction`, the next turn must be its `Observation`;
/// an `Observation` must follow a `ModelAction`; the single
/// `UserInstruction` is supplied at construction.
#[derive(Debug, Clone)]
pub struct ConversationState {
    id: RunId,
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Start a transcript seeded with the user's instruction.
    pub fn new(instruction: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RunId::new(),
            turns: vec![Turn::UserInstruction(instruction.into())],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The instruction this run was started with.
    pub fn instruction(&self) -> &str {
        match self.turns.first() {
            Some(Turn::UserInstruction(text)) => text,
            _ => "",
        }
    }

    /// The action still waiting for its observation, if any.
    pub fn pending_action(&self) -> Option<&ActionRequest> {
        match self.turns.last() {
            Some(Turn::ModelAction(request)) => Some(request),
            _ => None,
        }
    }

    /// Append a turn, rejecting any that would break turn ordering.
    pub fn append(&mut self, turn: Turn) -> Result<(), TranscriptError> {
        match (&turn, self.pending_action()) {
            (Turn::UserInstruction(_), _) => return Err(TranscriptError::DuplicateInstruction),
            (Turn::Observation(_), None) => return Err(TranscriptError::UnpairedObservation),
            (Turn::ModelAction(_) | Turn::ModelText(_), Some(pending)) => {
                return Err(TranscriptError::ObservationPending {
                    pending: pending.name.clone(),
                });
            }
            _ => {}
        }

        self.updated_at = Utc::now();
        self.turns.push(turn);
        Ok(())
    }

    /// Read-only view of every turn, oldest first.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always false: a transcript starts with its instruction.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Number of observations recorded so far.
    pub fn observation_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| matches!(t, Turn::Observation(_)))
            .count()
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    ///
    /// Screenshots are not counted.
    pub fn estimated_tokens(&self) -> usize {
        self.turns
            .iter()
            .map(|t| match t {
                Turn::UserInstruction(s) | Turn::ModelText(s) => s.len() / 4,
                Turn::ModelAction(r) => (r.name.len() + serde_json::Value::Object(r.arguments.clone()).to_string().len()) / 4,
                Turn::Observation(o) => o.result.to_model_json().to_string().len() / 4,
            })
            .sum()
    }
}
