//! The AdbPilot agent loop.
//!
//! The agent follows an **Observe → Ask → Act** cycle:
//!
//! 1. **Seed** the transcript with the user's instruction
//! 2. **Ask** the model for its next turn, sending the whole transcript
//! 3. **If actions**: dispatch each one to the device, record the result
//!    and a fresh screenshot, then go back to step 2
//! 4. **If completion**: stop
//!
//! The loop also stops on a model transport failure, an exhausted round
//! budget, cancellation, or a device bridge that cannot be reached.

pub mod dispatcher;
pub mod interpret;
pub mod loop_runner;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatcher::TurnDispatcher;
pub use interpret::{CompletionPolicy, Directive};
pub use loop_runner::{AbortReason, AgentLoop, LoopOutcome, RunReport};
pub use tokio_util::sync::CancellationToken;
