//! Reasoning records and the per-question state machine.

use crate::domain::error::{LimpError, Result};
use crate::domain::perception::AgentFailure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// `Pending -> PerceptionLoaded -> Answering -> Done | Abstained | Failed`.
///
/// `Failed` is reachable from `Pending` and `PerceptionLoaded` on malformed
/// input; `Abstained` only from `PerceptionLoaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningState {
    Pending,
    PerceptionLoaded,
    Answering,
    Done,
    Abstained,
    Failed,
}

impl ReasoningState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningState::Pending => "pending",
            ReasoningState::PerceptionLoaded => "perception_loaded",
            ReasoningState::Answering => "answering",
            ReasoningState::Done => "done",
            ReasoningState::Abstained => "abstained",
            ReasoningState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReasoningState::Done | ReasoningState::Abstained | ReasoningState::Failed
        )
    }

    pub fn can_transition_to(&self, next: ReasoningState) -> bool {
        use ReasoningState::*;
        matches!(
            (self, next),
            (Pending, PerceptionLoaded)
                | (Pending, Failed)
                | (PerceptionLoaded, Answering)
                | (PerceptionLoaded, Abstained)
                | (PerceptionLoaded, Failed)
                | (Answering, Done)
        )
    }
}

impl fmt::Display for ReasoningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one question's progress through [`ReasoningState`].
#[derive(Debug, Clone)]
pub struct ReasoningRun {
    state: ReasoningState,
}

impl Default for ReasoningRun {
    fn default() -> Self {
        Self::new()
    }
}

impl ReasoningRun {
    pub fn new() -> Self {
        Self {
            state: ReasoningState::Pending,
        }
    }

    pub fn state(&self) -> ReasoningState {
        self.state
    }

    pub fn advance(&mut self, next: ReasoningState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(LimpError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

/// One reasoning agent's scores for a question's options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOpinion {
    pub agent: String,
    pub option_scores: BTreeMap<String, f64>,
    pub confidence: f64,
    pub rationale: String,
    #[serde(default)]
    pub weight: f64,
}

impl AgentOpinion {
    pub fn new(agent: &str, option_scores: BTreeMap<String, f64>, confidence: f64) -> Self {
        Self {
            agent: agent.to_string(),
            option_scores,
            confidence: confidence.clamp(0.0, 1.0),
            rationale: String::new(),
            weight: 0.0,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }
}

/// Outcome of answering one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    pub state: ReasoningState,
    /// `None` when abstained, failed, or the required agent errored.
    pub chosen_option: Option<String>,
    pub rationale: String,
    #[serde(default)]
    pub final_scores: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_agent: Option<String>,
    #[serde(default)]
    pub opinions: Vec<AgentOpinion>,
    #[serde(default)]
    pub failures: Vec<AgentFailure>,
}

impl Answer {
    pub fn is_answered(&self) -> bool {
        self.state == ReasoningState::Done && self.chosen_option.is_some()
    }
}
