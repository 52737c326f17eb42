//! Model turn interpretation: decide what a model response means for the run.

use adbpilot_core::action::ActionRequest;
use adbpilot_core::provider::ModelTurn;

/// The marker accepted in free text when legacy completion is enabled.
pub const DEFAULT_COMPLETION_MARKER: &str = r#"{"status": "success"}"#;

/// What the loop should do with one model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// The task is done; nothing is dispatched.
    Complete { summary: String },

    /// Record `text` (if any), then dispatch `actions` left to right.
    Dispatch {
        text: Option<String>,
        actions: Vec<ActionRequest>,
    },

    /// Record the text and ask the model again.
    Continue { text: String },
}

/// How completion is recognized.
///
/// A structured `task_complete` call always completes the run. The legacy
/// marker, when set, completes it too if found (case-sensitively) anywhere
/// in the turn's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionPolicy {
    marker: Option<String>,
}

impl CompletionPolicy {
    pub fn with_marker(marker: impl Into<String>) -> Self {
        Self {
            marker: Some(marker.into()).filter(|m: &String| !m.is_empty()),
        }
    }

    pub fn structured_only() -> Self {
        Self { marker: None }
    }

    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    pub fn interpret(&self, turn: ModelTurn) -> Directive {
        let ModelTurn {
            text,
            actions,
            completion,
            ..
        } = turn;

        if let Some(summary) = completion {
            let summary = if summary.trim().is_empty() {
                text.unwrap_or_default()
            } else {
                summary
            };
            return Directive::Complete { summary };
        }

        if let (Some(marker), Some(text)) = (self.marker.as_deref(), text.as_deref()) {
            if text.contains(marker) {
                return Directive::Complete {
                    summary: text.to_string(),
                };
            }
        }

        if actions.is_empty() {
            Directive::Continue {
                text: text.unwrap_or_default(),
            }
        } else {
            Directive::Dispatch { text, actions }
        }
    }
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self::with_marker(DEFAULT_COMPLETION_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adbpilot_core::provider::COMPLETION_ACTION;
    use serde_json::json;

    fn tap() -> ActionRequest {
        ActionRequest::new("tap", json!({"x": 1, "y": 2}))
    }

    #[test]
    fn marker_in_text_completes() {
        let turn = ModelTurn::text(r#"Chrome is open. {"status": "success"}"#);
        assert!(matches!(
            CompletionPolicy::default().interpret(turn),
            Directive::Complete { .. }
        ));
    }

    #[test]
    fn marker_wins_over_actions() {
        let turn = ModelTurn::from_parts(Some(r#"{"status": "success"}"#.into()), vec![tap()]);
        assert!(matches!(
            CompletionPolicy::default().interpret(turn),
            Directive::Complete { .. }
        ));
    }

    #[test]
    fn marker_is_case_sensitive() {
        let turn = ModelTurn::text(r#"{"STATUS": "SUCCESS"}"#);
        assert!(matches!(
            CompletionPolicy::default().interpret(turn),
            Directive::Continue { .. }
        ));
    }

    #[test]
    fn marker_ignored_when_disabled() {
        let turn = ModelTurn::text(r#"{"status": "success"}"#);
        assert!(matches!(
            CompletionPolicy::structured_only().interpret(turn),
            Directive::Continue { .. }
        ));
    }

    #[test]
    fn structured_completion() {
        let turn = ModelTurn::actions(vec![
            tap(),
            ActionRequest::new(COMPLETION_ACTION, json!({"summary": "done"})),
        ]);
        assert_eq!(
            CompletionPolicy::structured_only().interpret(turn),
            Directive::Complete {
                summary: "done".into()
            }
        );
    }

    #[test]
    fn empty_summary_falls_back_to_text() {
        let turn = ModelTurn::from_parts(
            Some("All set".into()),
            vec![ActionRequest::new(COMPLETION_ACTION, json!({}))],
        );
        assert_eq!(
            CompletionPolicy::default().interpret(turn),
            Directive::Complete {
                summary: "All set".into()
            }
        );
    }

    #[test]
    fn text_and_actions_dispatch_with_text() {
        let turn = ModelTurn::from_parts(Some("Tapping the icon".into()), vec![tap(), tap()]);
        match CompletionPolicy::default().interpret(turn) {
            Directive::Dispatch { text, actions } => {
                assert_eq!(text.as_deref(), Some("Tapping the icon"));
                assert_eq!(actions.len(), 2);
            }
            other => panic!("unexpected directive {other:?}"),
        }
    }

    #[test]
    fn empty_turn_continues_with_empty_text() {
        assert_eq!(
            CompletionPolicy::default().interpret(ModelTurn::default()),
            Directive::Continue {
                text: String::new()
            }
        );
    }

    #[test]
    fn empty_marker_is_disabled() {
        assert!(CompletionPolicy::with_marker("").marker().is_none());
    }
}
