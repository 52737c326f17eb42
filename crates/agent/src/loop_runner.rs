//! The agent loop: ask the model, dispatch its actions, repeat.
//!
//! ```text
//! AwaitingModel ──completion──────────────▶ Completed
//!      │  ▲
//!      │  └──── Dispatching (batch, left to right)
//!      └──transport error / budget / cancel / no device──▶ Aborted
//! ```
//!
//! Every model request carries the full transcript and the catalog
//! advertisement. A batch is always followed by a model request, so two
//! batches never run back to back.

use std::sync::Arc;
use std::time::Duration;

use adbpilot_config::AppConfig;
use adbpilot_core::action::ActionCatalog;
use adbpilot_core::device::DeviceCapability;
use adbpilot_core::error::{DeviceError, ProviderError, TranscriptError};
use adbpilot_core::event::{DomainEvent, EventBus};
use adbpilot_core::provider::{COMPLETION_ACTION, ModelTurn, Provider, ProviderRequest};
use adbpilot_core::transcript::{ConversationState, RunId, Turn};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::{DEFAULT_SETTLE_DELAY, TurnDispatcher};
use crate::interpret::{CompletionPolicy, Directive};

/// Default model rounds per run.
pub const DEFAULT_MAX_ROUNDS: u32 = 30;

/// Why a run stopped without completing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AbortReason {
    #[error("device capability unavailable: {0}")]
    CapabilityUnavailable(DeviceError),

    #[error("model request failed: {0}")]
    ModelTransport(#[from] ProviderError),

    #[error("round budget of {rounds} exhausted")]
    RoundBudgetExhausted { rounds: u32 },

    #[error("run cancelled")]
    Cancelled,

    #[error("transcript rejected a turn: {0}")]
    InvalidTranscript(#[from] TranscriptError),
}

/// Terminal state of a run.
#[derive(Debug, Clone)]
pub enum LoopOutcome {
    Completed { summary: String },
    Aborted { reason: AbortReason },
}

impl LoopOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Everything a finished run leaves behind.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub outcome: LoopOutcome,
    pub transcript: ConversationState,
    /// Model requests that received a response
    pub rounds: u32,
    /// Actions handed to the dispatcher
    pub dispatched: usize,
}

#[derive(Default)]
struct Progress {
    rounds: u32,
    dispatched: usize,
}

/// The agent loop. Holds no per-run state, so one loop can serve
/// consecutive runs.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The device actions are dispatched to
    device: Arc<dyn DeviceCapability>,

    /// Actions advertised to the model
    catalog: Arc<ActionCatalog>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Maximum model rounds per run
    max_rounds: u32,

    /// Pause between an action and its screenshot
    settle_delay: Duration,

    completion: CompletionPolicy,

    /// Replaces the generated system prompt when set
    system_prompt: Option<String>,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        device: Arc<dyn DeviceCapability>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            device,
            catalog: Arc::new(ActionCatalog::standard()),
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            settle_delay: DEFAULT_SETTLE_DELAY,
            completion: CompletionPolicy::default(),
            system_prompt: None,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    /// Create a loop with every setting taken from configuration.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        device: Arc<dyn DeviceCapability>,
    ) -> Self {
        let completion = if config.agent.accept_completion_marker {
            CompletionPolicy::with_marker(config.agent.completion_marker.clone())
        } else {
            CompletionPolicy::structured_only()
        };

        let agent = Self::new(provider, device, config.model.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_max_rounds(config.agent.max_rounds)
            .with_settle_delay(Duration::from_millis(config.device.settle_delay_ms))
            .with_completion_policy(completion);

        match &config.agent.system_prompt_override {
            Some(prompt) => agent.with_system_prompt(prompt.clone()),
            None => agent,
        }
    }

    pub fn with_catalog(mut self, catalog: ActionCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Set the maximum number of model rounds per run.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_completion_policy(mut self, policy: CompletionPolicy) -> Self {
        self.completion = policy;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// The system prompt sent with every request.
    pub fn system_prompt(&self) -> String {
        match &self.system_prompt {
            Some(prompt) => prompt.clone(),
            None => default_system_prompt(self.completion.marker()),
        }
    }

    /// Drive one instruction to a terminal state.
    pub async fn run(&self, instruction: impl Into<String>, cancel: CancellationToken) -> RunReport {
        let mut state = ConversationState::new(instruction);
        let run_id = state.id().clone();

        info!(run_id = %run_id, instruction = %state.instruction(), "Starting run");
        self.event_bus.publish(DomainEvent::RunStarted {
            run_id: run_id.to_string(),
            instruction: state.instruction().to_string(),
            timestamp: chrono::Utc::now(),
        });

        let mut progress = Progress::default();
        let outcome = match self.drive(&mut state, &cancel, &mut progress).await {
            Ok(summary) => {
                info!(run_id = %run_id, rounds = progress.rounds, "Run completed");
                LoopOutcome::Completed { summary }
            }
            Err(reason) => {
                warn!(run_id = %run_id, rounds = progress.rounds, reason = %reason, "Run aborted");
                LoopOutcome::Aborted { reason }
            }
        };

        self.event_bus.publish(DomainEvent::RunFinished {
            run_id: run_id.to_string(),
            completed: outcome.is_completed(),
            detail: match &outcome {
                LoopOutcome::Completed { summary } => summary.clone(),
                LoopOutcome::Aborted { reason } => reason.to_string(),
            },
            rounds: progress.rounds,
            timestamp: chrono::Utc::now(),
        });

        RunReport {
            run_id,
            outcome,
            transcript: state,
            rounds: progress.rounds,
            dispatched: progress.dispatched,
        }
    }

    async fn drive(
        &self,
        state: &mut ConversationState,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<String, AbortReason> {
        self.device
            .ensure_available()
            .await
            .map_err(AbortReason::CapabilityUnavailable)?;

        let system_prompt = self.system_prompt();
        let tools = self.catalog.advertisement();
        let dispatcher = TurnDispatcher::new(self.device.clone(), self.catalog.clone())
            .with_settle_delay(self.settle_delay)
            .with_event_bus(self.event_bus.clone());

        loop {
            if cancel.is_cancelled() {
                return Err(AbortReason::Cancelled);
            }
            if progress.rounds >= self.max_rounds {
                return Err(AbortReason::RoundBudgetExhausted {
                    rounds: self.max_rounds,
                });
            }

            debug!(run_id = %state.id(), round = progress.rounds + 1, turns = state.len(), "Requesting model turn");

            let request = ProviderRequest {
                model: &self.model,
                system_prompt: &system_prompt,
                transcript: state.snapshot(),
                tools: &tools,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };

            let turn = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AbortReason::Cancelled),
                turn = self.provider.complete(request) => turn?,
            };
            progress.rounds += 1;
            self.publish_response(state.id(), progress.rounds, &turn);

            match self.completion.interpret(turn) {
                Directive::Complete { summary } => return Ok(summary),
                Directive::Continue { text } => state.append(Turn::ModelText(text))?,
                Directive::Dispatch { text, actions } => {
                    if let Some(text) = text {
                        state.append(Turn::ModelText(text))?;
                    }
                    for action in actions {
                        if cancel.is_cancelled() {
                            return Err(AbortReason::Cancelled);
                        }
                        state.append(Turn::ModelAction(action.clone()))?;
                        let observation = dispatcher.dispatch(&action).await;
                        state.append(Turn::Observation(observation))?;
                        progress.dispatched += 1;
                    }
                }
            }
        }
    }

    fn publish_response(&self, run_id: &RunId, round: u32, turn: &ModelTurn) {
        debug!(
            round,
            actions = turn.actions.len(),
            completion = turn.completion.is_some(),
            "Model responded"
        );
        self.event_bus.publish(DomainEvent::ModelResponded {
            run_id: run_id.to_string(),
            round,
            model: if turn.model.is_empty() {
                self.model.clone()
            } else {
                turn.model.clone()
            },
            text_preview: turn.text.as_deref().map(|t| preview(t, 120)),
            action_count: turn.actions.len(),
            tokens_used: turn.usage.map(|u| u.total_tokens),
            timestamp: chrono::Utc::now(),
        });
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// The instruction block sent ahead of the transcript.
pub fn default_system_prompt(marker: Option<&str>) -> String {
    let mut prompt = format!(
        "You are an agent operating an Android device through adb.\n\
         After every action you receive its result and a fresh screenshot of the screen.\n\
         Work in small steps: look at the latest screenshot, then call one or more actions.\n\
         Screen coordinates are in device pixels, origin at the top left.\n\
         If an action fails, read the error and try something else.\n\
         When the task is fully done, call `{COMPLETION_ACTION}` with a short summary."
    );
    if let Some(marker) = marker {
        prompt.push_str(&format!(
            "\nIf you cannot call `{COMPLETION_ACTION}`, reply with the text {marker} instead."
        ));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use adbpilot_core::action::ActionRequest;
    use adbpilot_core::device::ActionResult;
    use serde_json::json;

    fn agent(provider: Arc<dyn Provider>, device: Arc<RecordingDevice>) -> AgentLoop {
        AgentLoop::new(provider, device, "mock-model").with_settle_delay(Duration::ZERO)
    }

    fn done() -> ModelTurn {
        ModelTurn::text(r#"Finished. {"status": "success"}"#)
    }

    fn kinds(state: &ConversationState) -> Vec<&'static str> {
        state.snapshot().iter().map(Turn::kind).collect()
    }

    #[tokio::test]
    async fn completion_marker_stops_without_dispatch() {
        let provider = Arc::new(ScriptedProvider::new(vec![done()]));
        let device = Arc::new(RecordingDevice::new());

        let report = agent(provider.clone(), device.clone())
            .run("open settings", CancellationToken::new())
            .await;

        assert!(report.outcome.is_completed());
        assert_eq!(report.dispatched, 0);
        assert_eq!(report.rounds, 1);
        assert!(device.log().is_empty());
        assert_eq!(report.transcript.len(), 1);
    }

    #[tokio::test]
    async fn actions_then_completion_is_deterministic() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ModelTurn::actions(vec![tap(10, 20)]),
            ModelTurn::actions(vec![press("ENTER")]),
            done(),
        ]));
        let device = Arc::new(RecordingDevice::new());

        let report = agent(provider.clone(), device.clone())
            .run("search for cats", CancellationToken::new())
            .await;

        assert!(report.outcome.is_completed());
        assert_eq!(
            kinds(&report.transcript),
            ["user_instruction", "model_action", "observation", "model_action", "observation"]
        );
        assert_eq!(report.dispatched, 2);
        assert_eq!(provider.call_count(), 3);
        assert_eq!(device.log(), ["invoke:tap", "capture", "invoke:press_key", "capture"]);
    }

    #[tokio::test]
    async fn batch_dispatches_in_order_with_observations_between() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ModelTurn::actions(vec![tap(1, 1), press("HOME"), tap(2, 2)]),
            done(),
        ]));
        let device = Arc::new(RecordingDevice::new());

        let report = agent(provider.clone(), device.clone())
            .run("go home", CancellationToken::new())
            .await;

        assert_eq!(
            device.log(),
            ["invoke:tap", "capture", "invoke:press_key", "capture", "invoke:tap", "capture"]
        );
        let names: Vec<String> = report
            .transcript
            .snapshot()
            .iter()
            .filter_map(|t| match t {
                Turn::ModelAction(a) => Some(a.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, ["tap", "press_key", "tap"]);

        // The second request sees all three observations.
        let second = &provider.transcripts()[1];
        assert_eq!(second.iter().filter(|t| matches!(t, Turn::Observation(_))).count(), 3);
    }

    #[tokio::test]
    async fn no_two_actions_without_observation() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ModelTurn::actions(vec![tap(1, 1), ActionRequest::new("warp", json!({})), tap(3, 3)]),
            ModelTurn::text("Thinking about it"),
            ModelTurn::actions(vec![press("BACK")]),
            done(),
        ]));
        let device = Arc::new(RecordingDevice::new());

        let report = agent(provider, device).run("x", CancellationToken::new()).await;

        let turns = report.transcript.snapshot();
        for pair in turns.windows(2) {
            if matches!(pair[0], Turn::ModelAction(_)) {
                assert!(matches!(pair[1], Turn::Observation(_)));
            }
        }
        assert_eq!(report.dispatched, 4);
    }

    #[tokio::test]
    async fn invalid_request_does_not_stop_the_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ModelTurn::actions(vec![ActionRequest::new("tap", json!({"x": 5}))]),
            done(),
        ]));
        let device = Arc::new(RecordingDevice::new());

        let report = agent(provider, device.clone()).run("x", CancellationToken::new()).await;

        assert!(report.outcome.is_completed());
        assert!(device.invocations().is_empty());
        match &report.transcript.snapshot()[2] {
            Turn::Observation(obs) => {
                assert_eq!(obs.result, ActionResult::failure("missing parameter: y"));
                assert!(obs.visual.is_some());
            }
            other => panic!("expected observation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn text_with_actions_is_recorded_first() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ModelTurn::from_parts(Some("I'll tap the search bar".into()), vec![tap(5, 5)]),
            done(),
        ]));
        let report = agent(provider, Arc::new(RecordingDevice::new()))
            .run("x", CancellationToken::new())
            .await;

        assert_eq!(
            kinds(&report.transcript),
            ["user_instruction", "model_text", "model_action", "observation"]
        );
    }

    #[tokio::test]
    async fn structured_completion_summary() {
        let provider = Arc::new(ScriptedProvider::new(vec![ModelTurn::actions(vec![ActionRequest::new(
            COMPLETION_ACTION,
            json!({"summary": "Wi-Fi enabled"}),
        )])]));
        let report = agent(provider, Arc::new(RecordingDevice::new()))
            .with_completion_policy(CompletionPolicy::structured_only())
            .run("enable wifi", CancellationToken::new())
            .await;

        match report.outcome {
            LoopOutcome::Completed { summary } => assert_eq!(summary, "Wi-Fi enabled"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn round_budget_aborts() {
        let provider = Arc::new(ScriptedProvider::repeating(ModelTurn::actions(vec![tap(1, 1)])));
        let device = Arc::new(RecordingDevice::new());

        let report = agent(provider.clone(), device.clone())
            .with_max_rounds(3)
            .run("loop forever", CancellationToken::new())
            .await;

        assert!(matches!(
            report.outcome,
            LoopOutcome::Aborted {
                reason: AbortReason::RoundBudgetExhausted { rounds: 3 }
            }
        ));
        assert_eq!(provider.call_count(), 3);
        assert_eq!(report.dispatched, 3);
    }

    #[tokio::test]
    async fn empty_turns_consume_rounds() {
        let provider = Arc::new(ScriptedProvider::repeating(ModelTurn::default()));
        let report = agent(provider, Arc::new(RecordingDevice::new()))
            .with_max_rounds(2)
            .run("x", CancellationToken::new())
            .await;

        assert_eq!(kinds(&report.transcript), ["user_instruction", "model_text", "model_text"]);
        assert!(!report.outcome.is_completed());
    }

    #[tokio::test]
    async fn transport_failure_aborts() {
        let provider = Arc::new(ScriptedProvider::with_results(vec![
            Ok(ModelTurn::actions(vec![tap(1, 1)])),
            Err(ProviderError::AuthenticationFailed("bad key".into())),
        ]));
        let device = Arc::new(RecordingDevice::new());

        let report = agent(provider, device.clone()).run("x", CancellationToken::new()).await;

        assert!(matches!(
            report.outcome,
            LoopOutcome::Aborted {
                reason: AbortReason::ModelTransport(ProviderError::AuthenticationFailed(_))
            }
        ));
        assert_eq!(device.invocations(), ["tap"]);
        assert_eq!(report.rounds, 1);
    }

    #[tokio::test]
    async fn unavailable_device_aborts_before_first_round() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let report = agent(provider.clone(), Arc::new(RecordingDevice::unavailable()))
            .run("x", CancellationToken::new())
            .await;

        assert!(matches!(
            report.outcome,
            LoopOutcome::Aborted {
                reason: AbortReason::CapabilityUnavailable(_)
            }
        ));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let provider = Arc::new(ScriptedProvider::new(vec![]));

        let report = agent(provider.clone(), Arc::new(RecordingDevice::new()))
            .run("x", cancel)
            .await;

        assert!(matches!(
            report.outcome,
            LoopOutcome::Aborted {
                reason: AbortReason::Cancelled
            }
        ));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn cancel_interrupts_inflight_request() {
        let cancel = CancellationToken::new();
        let agent = agent(Arc::new(HangingProvider), Arc::new(RecordingDevice::new()));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let report = agent.run("x", cancel).await;
        assert!(matches!(
            report.outcome,
            LoopOutcome::Aborted {
                reason: AbortReason::Cancelled
            }
        ));
        assert_eq!(report.rounds, 0);
    }

    #[tokio::test]
    async fn cancel_stops_remaining_actions_in_batch() {
        let cancel = CancellationToken::new();
        let device = Arc::new(RecordingDevice::cancelling(cancel.clone()));
        let provider = Arc::new(ScriptedProvider::new(vec![ModelTurn::actions(vec![
            tap(1, 1),
            tap(2, 2),
            tap(3, 3),
        ])]));

        let report = agent(provider.clone(), device.clone()).run("x", cancel).await;

        assert!(matches!(
            report.outcome,
            LoopOutcome::Aborted {
                reason: AbortReason::Cancelled
            }
        ));
        assert_eq!(device.log(), ["invoke:tap", "capture"]);
        assert_eq!(report.dispatched, 1);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(
            kinds(&report.transcript),
            ["user_instruction", "model_action", "observation"]
        );
    }

    #[tokio::test]
    async fn events_cover_the_run() {
        let bus = Arc::new(EventBus::new(32));
        let mut rx = bus.subscribe();
        let provider = Arc::new(ScriptedProvider::new(vec![ModelTurn::actions(vec![tap(1, 1)]), done()]));

        agent(provider, Arc::new(RecordingDevice::new()))
            .with_event_bus(bus)
            .run("x", CancellationToken::new())
            .await;

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(match event.as_ref() {
                DomainEvent::RunStarted { .. } => "started",
                DomainEvent::ModelResponded { .. } => "responded",
                DomainEvent::ActionDispatched { .. } => "dispatched",
                DomainEvent::RunFinished { completed: true, .. } => "completed",
                DomainEvent::RunFinished { .. } => "aborted",
            });
        }
        assert_eq!(names, ["started", "responded", "dispatched", "responded", "completed"]);
    }

    #[test]
    fn default_prompt_mentions_completion() {
        let prompt = default_system_prompt(Some(r#"{"status": "success"}"#));
        assert!(prompt.contains(COMPLETION_ACTION));
        assert!(prompt.contains(r#"{"status": "success"}"#));
        assert!(!default_system_prompt(None).contains("status"));
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview("short", 10), "short");
    }

    #[test]
    fn from_config_applies_settings() {
        let mut config = AppConfig::default();
        config.agent.max_rounds = 7;
        config.agent.accept_completion_marker = false;
        config.agent.system_prompt_override = Some("custom".into());

        let agent = AgentLoop::from_config(
            &config,
            Arc::new(ScriptedProvider::new(vec![])),
            Arc::new(RecordingDevice::new()),
        );
        assert_eq!(agent.max_rounds, 7);
        assert!(agent.completion.marker().is_none());
        assert_eq!(agent.system_prompt(), "custom");
    }
}
