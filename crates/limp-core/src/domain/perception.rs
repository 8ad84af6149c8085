//! Perception output: the only episode record reasoning agents may read.

use crate::domain::episode::ProtocolMode;
use crate::domain::timeline::GameStateTimeline;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerceptionMeta {
    pub fps: f64,
    pub frame_count: usize,
    pub duration: f64,
    pub sampling_interval: usize,
}

/// A recovered agent failure for one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFailure {
    pub capability: String,
    /// Unit the failure applies to, e.g. `frame[12]` or `segment[1]`.
    pub unit: String,
    pub error: String,
}

impl AgentFailure {
    pub fn new(capability: &str, unit: impl Into<String>, error: impl ToString) -> Self {
        Self {
            capability: capability.to_string(),
            unit: unit.into(),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionOutput {
    pub episode_id: String,
    pub protocol: ProtocolMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero: Option<String>,
    pub meta: PerceptionMeta,
    pub timeline: GameStateTimeline,
    #[serde(default)]
    pub enabled_agents: Vec<String>,
    #[serde(default)]
    pub failures: Vec<AgentFailure>,
}

impl PerceptionOutput {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Apply the protocol's visibility rules to every embedded snapshot.
    pub fn redact(&mut self) {
        let hero = self.hero.clone();
        self.timeline.redact(self.protocol, hero.as_deref());
    }

    /// Narrow a stored record to the protocol of the current run. Redacted
    /// cards cannot come back, so an audience run keeps a player-mode
    /// record as stored.
    pub fn scope_to(&mut self, protocol: ProtocolMode, hero: Option<&str>) {
        if protocol == ProtocolMode::Audience {
            return;
        }
        self.protocol = protocol;
        self.hero = hero.map(str::to_string);
        self.redact();
    }

    /// Distinct player names in order of first appearance.
    pub fn players(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for seg in &self.timeline.segments {
            for name in seg.players() {
                if seen.insert(name.to_ascii_lowercase()) {
                    out.push(name);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timeline::{GameState, PhaseSegment, PhaseType, PlayerState};

    fn output(protocol: ProtocolMode, hero: Option<&str>) -> PerceptionOutput {
        let mut seg = PhaseSegment::new(PhaseType::PreFlop, 0.0, 5.0);
        seg.initial_state = Some(GameState {
            timestamp: 0.0,
            phase: PhaseType::PreFlop,
            board: vec![],
            pot: Some(150.0),
            players: ["Alice", "Bob"]
                .iter()
                .map(|n| PlayerState {
                    name: n.to_string(),
                    position: None,
                    stack: Some(5_000.0),
                    hole_cards: Some(vec!["Kh".to_string(), "Kd".to_string()]),
                    is_active: true,
                })
                .collect(),
        });
        let mut timeline = GameStateTimeline::new();
        timeline.push_segment(seg).unwrap();
        PerceptionOutput {
            episode_id: "ep1".to_string(),
            protocol,
            hero: hero.map(str::to_string),
            meta: PerceptionMeta::default(),
            timeline,
            enabled_agents: vec![],
            failures: vec![],
        }
    }

    #[test]
    fn player_mode_serialization_has_no_opponent_cards() {
        let mut out = output(ProtocolMode::Player, Some("Alice"));
        out.redact();
        let text = serde_json::to_string(&out).unwrap();
        assert_eq!(text.matches("hole_cards").count(), 1);

        let mut out = output(ProtocolMode::Player, None);
        out.redact();
        let text = serde_json::to_string(&out).unwrap();
        assert!(!text.contains("hole_cards"));
    }

    #[test]
    fn stored_audience_record_is_narrowed_for_a_player_run() {
        let mut out = output(ProtocolMode::Audience, None);
        out.scope_to(ProtocolMode::Player, Some("Bob"));
        assert_eq!(out.protocol, ProtocolMode::Player);
        assert_eq!(out.hero.as_deref(), Some("Bob"));
        let state = out.timeline.segments[0].initial_state.as_ref().unwrap();
        assert!(state.player("Alice").unwrap().hole_cards.is_none());
        assert!(state.player("Bob").unwrap().hole_cards.is_some());

        // Bob's cards were already dropped, a later audience run cannot see them.
        let mut player = output(ProtocolMode::Player, Some("Alice"));
        player.redact();
        player.scope_to(ProtocolMode::Audience, None);
        assert_eq!(player.protocol, ProtocolMode::Player);
        let state = player.timeline.segments[0].initial_state.as_ref().unwrap();
        assert!(state.player("Bob").unwrap().hole_cards.is_none());
    }

    #[test]
    fn players_are_deduplicated_in_order() {
        let out = output(ProtocolMode::Audience, None);
        assert_eq!(out.players(), vec!["Alice", "Bob"]);
        assert!(!out.is_partial());
    }
}
