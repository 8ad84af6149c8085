use crate::domain::evaluation::EvaluationReport;
use crate::domain::ground_truth::GroundTruth;
use crate::domain::perception::{AgentFailure, PerceptionOutput};
use crate::domain::question::QuestionSet;
use crate::domain::reasoning::Answer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Done,
    Partial,
    Failed,
}

impl fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EpisodeStatus::Done => "done",
            EpisodeStatus::Partial => "partial",
            EpisodeStatus::Failed => "failed",
        })
    }
}

/// Everything one episode run produced. Persisted as `run_result.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub episode_id: String,
    pub config_name: String,
    pub status: EpisodeStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub enabled_agents: Vec<String>,
    #[serde(default)]
    pub perception: Option<PerceptionOutput>,
    #[serde(default)]
    pub ground_truth: Option<GroundTruth>,
    #[serde(default)]
    pub questions: Option<QuestionSet>,
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub evaluation: Option<EvaluationReport>,
    #[serde(default)]
    pub failures: Vec<AgentFailure>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RunResult {
    pub fn new(episode_id: &str, config_name: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            episode_id: episode_id.to_string(),
            config_name: config_name.to_string(),
            status: EpisodeStatus::Done,
            started_at: now,
            finished_at: now,
            enabled_agents: Vec::new(),
            perception: None,
            ground_truth: None,
            questions: None,
            answers: Vec::new(),
            evaluation: None,
            failures: Vec::new(),
            error: None,
        }
    }

    /// Mark the run failed with a terminal error message.
    pub fn fail(&mut self, error: impl ToString) {
        self.status = EpisodeStatus::Failed;
        self.error = Some(error.to_string());
    }

    /// Derive `done` / `partial` from the recorded failures. Leaves `failed` alone.
    pub fn settle(&mut self) {
        self.finished_at = Utc::now();
        if self.status == EpisodeStatus::Failed {
            return;
        }
        let skipped = self
            .questions
            .as_ref()
            .map(|q| !q.skipped.is_empty())
            .unwrap_or(false);
        let answer_failures = self.answers.iter().any(|a| !a.failures.is_empty());
        self.status = if self.failures.is_empty() && !skipped && !answer_failures {
            EpisodeStatus::Done
        } else {
            EpisodeStatus::Partial
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settle_marks_partial_on_failures() {
        let mut r = RunResult::new("ep1", "full");
        r.settle();
        assert_eq!(r.status, EpisodeStatus::Done);

        r.failures
            .push(AgentFailure::new("board_parser", "frame[3]", "timeout"));
        r.settle();
        assert_eq!(r.status, EpisodeStatus::Partial);
    }

    #[test]
    fn settle_keeps_failed() {
        let mut r = RunResult::new("ep1", "full");
        r.fail("frames directory missing");
        r.settle();
        assert_eq!(r.status, EpisodeStatus::Failed);
        assert_eq!(r.status.to_string(), "failed");
    }
}
