//! Serves recorded interactions back in order.

use log::debug;
use serde_json::Value;

use super::format::{CallArgs, Interaction};
use crate::error::HarnessError;

/// How a replayed call is matched against the next recorded interaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Strict sequential order, checking only the method name.
    #[default]
    OperationName,
    /// Strict sequential order, checking method name and arguments.
    OperationAndArguments,
}

/// Sequential cursor over a cassette's interactions.
#[derive(Debug)]
pub struct CassetteReplayer {
    label: String,
    interactions: Vec<Interaction>,
    cursor: usize,
    policy: MatchPolicy,
}

impl CassetteReplayer {
    /// Creates a replayer; `label` names the cassette(s) in error messages.
    pub fn new(
        label: impl Into<String>,
        interactions: Vec<Interaction>,
        policy: MatchPolicy,
    ) -> Self {
        Self { label: label.into(), interactions, cursor: 0, policy }
    }

    /// Number of interactions not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.interactions.len() - self.cursor
    }

    /// Number of interactions loaded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// True if nothing was loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Consumes the next interaction and returns its recorded result.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::CassetteExhausted`] when nothing is left.
    /// - [`HarnessError::CassetteMismatch`] when the next interaction was
    ///   recorded for a different call; the cursor does not advance.
    /// - [`HarnessError::Fault`] when the recorded outcome is a failure.
    pub fn replay(&mut self, method: &str, call: &CallArgs) -> Result<Value, HarnessError> {
        let position = self.cursor;
        let Some(interaction) = self.interactions.get(position) else {
            return Err(HarnessError::CassetteExhausted {
                cassette: self.label.clone(),
                recorded: self.interactions.len(),
                method: method.to_owned(),
            });
        };

        let names_match = interaction.method == method;
        let args_match = self.policy == MatchPolicy::OperationName || interaction.call == *call;
        if !(names_match && args_match) {
            let (expected, actual) = match self.policy {
                MatchPolicy::OperationName => (interaction.method.clone(), method.to_owned()),
                MatchPolicy::OperationAndArguments => (
                    format!("{}({})", interaction.method, interaction.call),
                    format!("{method}({call})"),
                ),
            };
            return Err(HarnessError::CassetteMismatch {
                cassette: self.label.clone(),
                position,
                expected,
                actual,
            });
        }

        self.cursor += 1;
        debug!("{}: replayed #{position} `{method}`", self.label);
        interaction.outcome.reproduce()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::format::Outcome;
    use crate::error::Fault;
    use serde_json::json;

    fn status_cassette() -> Vec<Interaction> {
        vec![
            Interaction {
                method: "get_status".into(),
                call: CallArgs::positional([json!(123)]),
                outcome: Outcome::Success { value: json!("complete") },
            },
            Interaction {
                method: "get_status".into(),
                call: CallArgs::positional([json!(124)]),
                outcome: Outcome::Failure { kind: "NotFound".into(), message: "124".into() },
            },
        ]
    }

    #[test]
    fn replays_in_order_then_exhausts() {
        let mut replayer =
            CassetteReplayer::new("build/status", status_cassette(), MatchPolicy::default());

        let first = replayer.replay("get_status", &CallArgs::positional([json!(123)]));
        assert_eq!(first.unwrap(), json!("complete"));

        let second = replayer.replay("get_status", &CallArgs::positional([json!(124)]));
        assert_eq!(second.unwrap_err().as_fault(), Some(&Fault::new("NotFound", "124")));

        let third = replayer.replay("get_status", &CallArgs::positional([json!(125)]));
        assert!(matches!(third, Err(HarnessError::CassetteExhausted { recorded: 2, .. })));
        assert_eq!(replayer.remaining(), 0);
    }

    #[test]
    fn name_mismatch_does_not_advance() {
        let mut replayer = CassetteReplayer::new("c", status_cassette(), MatchPolicy::default());
        let err = replayer.replay("cancelTask", &CallArgs::none()).unwrap_err();
        match err {
            HarnessError::CassetteMismatch { position, expected, actual, .. } => {
                assert_eq!(position, 0);
                assert_eq!(expected, "get_status");
                assert_eq!(actual, "cancelTask");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
        assert_eq!(replayer.remaining(), 2);
    }

    #[test]
    fn default_policy_ignores_arguments() {
        let mut replayer = CassetteReplayer::new("c", status_cassette(), MatchPolicy::default());
        let value = replayer.replay("get_status", &CallArgs::positional([json!(999)])).unwrap();
        assert_eq!(value, json!("complete"));
    }

    #[test]
    fn argument_policy_reports_full_calls() {
        let mut replayer =
            CassetteReplayer::new("c", status_cassette(), MatchPolicy::OperationAndArguments);
        let err = replayer.replay("get_status", &CallArgs::positional([json!(999)])).unwrap_err();
        match err {
            HarnessError::CassetteMismatch { expected, actual, .. } => {
                assert_eq!(expected, "get_status(123)");
                assert_eq!(actual, "get_status(999)");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }
}
