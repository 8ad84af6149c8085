//! Game-state timeline produced by the perception stage.
//!
//! A timeline is an ordered list of half-open [`PhaseSegment`]s. Each segment
//! owns the [`ActionEvent`]s detected inside its interval. Both lists are
//! append-only: the push methods reject anything that would break ordering.

use crate::domain::episode::ProtocolMode;
use crate::domain::error::DataIntegrityError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Betting round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhaseType {
    #[serde(rename = "Pre-flop")]
    PreFlop,
    Flop,
    Turn,
    River,
    Showdown,
    Unknown,
}

impl PhaseType {
    /// Position in the betting sequence; `None` for `Unknown`.
    pub fn ordinal(&self) -> Option<u8> {
        match self {
            PhaseType::PreFlop => Some(0),
            PhaseType::Flop => Some(1),
            PhaseType::Turn => Some(2),
            PhaseType::River => Some(3),
            PhaseType::Showdown => Some(4),
            PhaseType::Unknown => None,
        }
    }

    /// Whether `next` is exactly one step after `self`.
    pub fn is_followed_by(&self, next: PhaseType) -> bool {
        match (self.ordinal(), next.ordinal()) {
            (Some(a), Some(b)) => b == a + 1,
            _ => false,
        }
    }

    /// Phase implied by the number of visible community cards.
    pub fn from_board_count(count: usize) -> PhaseType {
        match count {
            0 => PhaseType::PreFlop,
            3 => PhaseType::Flop,
            4 => PhaseType::Turn,
            5 => PhaseType::River,
            _ => PhaseType::Unknown,
        }
    }

    /// Lenient parse of model output (`"preflop"`, `"Pre-flop"`, `"FLOP"` ...).
    pub fn parse_label(label: &str) -> PhaseType {
        let norm: String = label
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match norm.as_str() {
            "preflop" => PhaseType::PreFlop,
            "flop" => PhaseType::Flop,
            "turn" => PhaseType::Turn,
            "river" => PhaseType::River,
            "showdown" => PhaseType::Showdown,
            _ => PhaseType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseType::PreFlop => "Pre-flop",
            PhaseType::Flop => "Flop",
            PhaseType::Turn => "Turn",
            PhaseType::River => "River",
            PhaseType::Showdown => "Showdown",
            PhaseType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PhaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Check,
    Bet,
    Call,
    Raise,
    Fold,
    #[serde(rename = "all-in")]
    AllIn,
    Unknown,
}

impl ActionType {
    pub fn is_aggressive(&self) -> bool {
        matches!(self, ActionType::Bet | ActionType::Raise | ActionType::AllIn)
    }

    pub fn is_passive(&self) -> bool {
        matches!(self, ActionType::Check | ActionType::Call)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Check => "check",
            ActionType::Bet => "bet",
            ActionType::Call => "call",
            ActionType::Raise => "raise",
            ActionType::Fold => "fold",
            ActionType::AllIn => "all-in",
            ActionType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable body-language cues for one player in one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehavioralCues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hands: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaze: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occlusion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facial_emotion: Option<String>,
}

/// Cues aggregated over the frames of one decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehavioralSummary {
    pub dominant_posture: Option<String>,
    pub posture_changed: bool,
    #[serde(default)]
    pub dominant_hands: Option<String>,
    pub fidgeting_detected: bool,
    pub dominant_gaze: Option<String>,
    pub dominant_emotion: Option<String>,
    pub emotion_changed: bool,
    pub frame_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default)]
    pub stack: Option<f64>,
    /// Cards shown on the broadcast overlay. Absent, not empty, when withheld.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hole_cards: Option<Vec<String>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Table snapshot read from a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub timestamp: f64,
    pub phase: PhaseType,
    #[serde(default)]
    pub board: Vec<String>,
    #[serde(default)]
    pub pot: Option<f64>,
    #[serde(default)]
    pub players: Vec<PlayerState>,
}

impl GameState {
    pub fn player(&self, name: &str) -> Option<&PlayerState> {
        self.players
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Drop hole cards the protocol does not allow downstream consumers to see.
    pub fn redact(&mut self, protocol: ProtocolMode, hero: Option<&str>) {
        if protocol == ProtocolMode::Audience {
            return;
        }
        for player in &mut self.players {
            let is_hero = hero
                .map(|h| player.name.eq_ignore_ascii_case(h))
                .unwrap_or(false);
            if !is_hero {
                player.hole_cards = None;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub timestamp: f64,
    pub player: String,
    #[serde(rename = "type")]
    pub action: ActionType,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub decision_start: Option<f64>,
    #[serde(default)]
    pub decision_duration: Option<f64>,
    /// Set by the action detector; cue analysis only runs on flagged events.
    #[serde(default)]
    pub key_decision: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<BehavioralSummary>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub confidence: f64,
}

impl ActionEvent {
    pub fn new(timestamp: f64, player: impl Into<String>, action: ActionType, amount: f64) -> Self {
        let player = player.into();
        let summary = if amount > 0.0 {
            format!("{player} {action} {amount:.0}")
        } else {
            format!("{player} {action}")
        };
        Self {
            timestamp,
            player,
            action,
            amount,
            decision_start: None,
            decision_duration: None,
            key_decision: false,
            behavior: None,
            summary,
            confidence: 1.0,
        }
    }
}

/// One betting round over a half-open interval `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSegment {
    pub phase: PhaseType,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub actions: Vec<ActionEvent>,
    #[serde(default)]
    pub initial_state: Option<GameState>,
    #[serde(default)]
    pub final_state: Option<GameState>,
}

impl PhaseSegment {
    pub fn new(phase: PhaseType, start: f64, end: f64) -> Self {
        Self {
            phase,
            start,
            end,
            actions: Vec::new(),
            initial_state: None,
            final_state: None,
        }
    }

    pub fn contains(&self, timestamp: f64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    /// Append an action; it must fall inside the interval and not precede
    /// the last recorded action.
    pub fn push_action(&mut self, event: ActionEvent) -> Result<(), DataIntegrityError> {
        if !self.contains(event.timestamp) {
            return Err(DataIntegrityError::ActionOutsideSegment {
                timestamp: event.timestamp,
                start: self.start,
                end: self.end,
            });
        }
        if let Some(last) = self.actions.last() {
            if event.timestamp < last.timestamp {
                return Err(DataIntegrityError::ActionOrder {
                    index: self.actions.len(),
                });
            }
        }
        self.actions.push(event);
        Ok(())
    }

    /// Names seen in the segment's snapshots, falling back to the actors.
    pub fn players(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let states = [self.initial_state.as_ref(), self.final_state.as_ref()];
        for state in states.into_iter().flatten() {
            for p in &state.players {
                if !names.iter().any(|n| n.eq_ignore_ascii_case(&p.name)) {
                    names.push(p.name.clone());
                }
            }
        }
        for a in &self.actions {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&a.player)) {
                names.push(a.player.clone());
            }
        }
        names
    }

    /// Latest known snapshot of the segment.
    pub fn latest_state(&self) -> Option<&GameState> {
        self.final_state.as_ref().or(self.initial_state.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStateTimeline {
    pub segments: Vec<PhaseSegment>,
}

impl GameStateTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment that starts at or after the previous one ends.
    pub fn push_segment(&mut self, segment: PhaseSegment) -> Result<(), DataIntegrityError> {
        let index = self.segments.len();
        if segment.end <= segment.start {
            return Err(DataIntegrityError::EmptySegment {
                index,
                start: segment.start,
                end: segment.end,
            });
        }
        if let Some(prev) = self.segments.last() {
            if segment.start < prev.end {
                return Err(DataIntegrityError::SegmentOrder { index });
            }
        }
        self.segments.push(segment);
        Ok(())
    }

    /// Check ordering and containment for a timeline loaded from disk.
    pub fn validate(&self) -> Result<(), DataIntegrityError> {
        let mut prev_end = f64::NEG_INFINITY;
        for (index, seg) in self.segments.iter().enumerate() {
            if seg.end <= seg.start {
                return Err(DataIntegrityError::EmptySegment {
                    index,
                    start: seg.start,
                    end: seg.end,
                });
            }
            if seg.start < prev_end {
                return Err(DataIntegrityError::SegmentOrder { index });
            }
            prev_end = seg.end;

            let mut last = f64::NEG_INFINITY;
            for (position, action) in seg.actions.iter().enumerate() {
                if !seg.contains(action.timestamp) {
                    return Err(DataIntegrityError::ActionOutsideSegment {
                        timestamp: action.timestamp,
                        start: seg.start,
                        end: seg.end,
                    });
                }
                if action.timestamp < last {
                    return Err(DataIntegrityError::ActionOrder { index: position });
                }
                last = action.timestamp;
            }
        }
        Ok(())
    }

    /// All actions in timeline order, paired with their segment.
    pub fn actions(&self) -> impl Iterator<Item = (&PhaseSegment, &ActionEvent)> {
        self.segments
            .iter()
            .flat_map(|seg| seg.actions.iter().map(move |a| (seg, a)))
    }

    pub fn segment_at(&self, timestamp: f64) -> Option<&PhaseSegment> {
        self.segments.iter().find(|s| s.contains(timestamp))
    }

    pub fn redact(&mut self, protocol: ProtocolMode, hero: Option<&str>) {
        for seg in &mut self.segments {
            for state in [seg.initial_state.as_mut(), seg.final_state.as_mut()]
                .into_iter()
                .flatten()
            {
                state.redact(protocol, hero);
            }
        }
    }
}
