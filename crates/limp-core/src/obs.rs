//! Structured lifecycle events for episode runs.
//!
//! Every event is an `info!`/`warn!` record with an `event` field, so JSON
//! output can be filtered on it.

use tracing::{info, warn};

/// RAII guard tagging everything logged during one episode with its id.
///
/// ```ignore
/// let _span = EpisodeSpan::enter("hand_0042", "full");
/// ```
pub struct EpisodeSpan {
    _span: tracing::span::EnteredSpan,
}

impl EpisodeSpan {
    pub fn enter(episode_id: &str, config_name: &str) -> Self {
        let span = tracing::info_span!("limp.episode", episode_id = %episode_id, config = %config_name);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_episode_started(episode_id: &str, enabled_agents: usize) {
    info!(event = "episode.started", episode_id = %episode_id, enabled_agents = enabled_agents);
}

pub fn emit_episode_finished(episode_id: &str, status: &str, duration_ms: u64) {
    info!(
        event = "episode.finished",
        episode_id = %episode_id,
        status = %status,
        duration_ms = duration_ms,
    );
}

pub fn emit_stage_completed(stage: &str, units: usize, failures: usize, duration_ms: u64) {
    info!(
        event = "stage.completed",
        stage = %stage,
        units = units,
        failures = failures,
        duration_ms = duration_ms,
    );
}

pub fn emit_agent_failed(capability: &str, unit: &str, error: &dyn std::fmt::Display) {
    warn!(event = "agent.failed", capability = %capability, unit = %unit, error = %error);
}

pub fn emit_question_skipped(template: &str, unit: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "question.skipped", template = %template, unit = %unit, reason = %reason);
}

pub fn emit_abstained(question_id: &str, required_agent: &str) {
    info!(event = "reasoning.abstained", question_id = %question_id, required_agent = %required_agent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episode_span_enter() {
        let _span = EpisodeSpan::enter("ep-1", "full");
        emit_episode_started("ep-1", 4);
        emit_agent_failed("board_parser", "frame[2]", &"timeout");
    }
}
