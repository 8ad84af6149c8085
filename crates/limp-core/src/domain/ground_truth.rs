//! Privileged ground truth, produced by the annotation stage.
//!
//! Nothing in this module converts into perception or question-prompt types.
//! The QA generator reads it to derive answer keys; the reasoning stage never
//! receives it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A ground-truth field that may not have been recoverable for an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Availability<T> {
    Available(T),
    Unavailable { reason: String },
}

impl<T> Availability<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Availability::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Availability::Available(v) => Some(v),
            Availability::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available(_))
    }
}

/// Pre-flop hand class derived from hole cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandStrength {
    Weak,
    Medium,
    Strong,
}

impl HandStrength {
    /// Classify two hole cards with the Chen score.
    ///
    /// Scores of 9 and above are strong, 5 and below weak.
    pub fn from_hole_cards(cards: &[String]) -> Option<HandStrength> {
        let score = chen_score(cards)?;
        Some(if score >= 9.0 {
            HandStrength::Strong
        } else if score <= 5.0 {
            HandStrength::Weak
        } else {
            HandStrength::Medium
        })
    }
}

fn card_rank(card: &str) -> Option<(u8, char)> {
    let card = card.trim();
    let suit = card.chars().last()?;
    let rank_part = &card[..card.len() - suit.len_utf8()];
    let rank = match rank_part.to_ascii_uppercase().as_str() {
        "A" => 14,
        "K" => 13,
        "Q" => 12,
        "J" => 11,
        "T" | "10" => 10,
        r => {
            let n: u8 = r.parse().ok()?;
            if (2..=9).contains(&n) {
                n
            } else {
                return None;
            }
        }
    };
    Some((rank, suit.to_ascii_lowercase()))
}

fn chen_high_value(rank: u8) -> f64 {
    match rank {
        14 => 10.0,
        13 => 8.0,
        12 => 7.0,
        11 => 6.0,
        r => r as f64 / 2.0,
    }
}

fn chen_score(cards: &[String]) -> Option<f64> {
    if cards.len() != 2 {
        return None;
    }
    let (r1, s1) = card_rank(&cards[0])?;
    let (r2, s2) = card_rank(&cards[1])?;
    let (hi, lo) = if r1 >= r2 { (r1, r2) } else { (r2, r1) };

    if hi == lo {
        return Some((chen_high_value(hi) * 2.0).max(5.0));
    }

    let mut score = chen_high_value(hi);
    if s1 == s2 {
        score += 2.0;
    }
    let gap = hi - lo - 1;
    score -= match gap {
        0 => 0.0,
        1 => 1.0,
        2 => 2.0,
        3 => 4.0,
        _ => 5.0,
    };
    if gap <= 1 && hi < 12 {
        score += 1.0;
    }
    Some(score.ceil())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentLabels {
    pub is_bluff: bool,
    pub is_value: bool,
}

/// A commentary segment labeled from its wording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarratedEvent {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub labels: IntentLabels,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl NarratedEvent {
    /// Commentary trails the action; `slack` extends the window forward.
    pub fn covers(&self, timestamp: f64, slack: f64) -> bool {
        self.start <= timestamp && timestamp <= self.end + slack
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerFacts {
    pub hole_cards: Availability<Vec<String>>,
    pub hand_strength: Availability<HandStrength>,
}

impl PlayerFacts {
    pub fn from_cards(cards: Vec<String>) -> Self {
        let hand_strength = match HandStrength::from_hole_cards(&cards) {
            Some(s) => Availability::Available(s),
            None => Availability::unavailable(format!("unparseable hole cards {cards:?}")),
        };
        Self {
            hole_cards: Availability::Available(cards),
            hand_strength,
        }
    }

    pub fn unknown(reason: &str) -> Self {
        Self {
            hole_cards: Availability::unavailable(reason),
            hand_strength: Availability::unavailable(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub episode_id: String,
    pub transcript: Availability<String>,
    #[serde(default)]
    pub narration: Vec<NarratedEvent>,
    #[serde(default)]
    pub players: BTreeMap<String, PlayerFacts>,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub key_moments: Vec<String>,
}

impl GroundTruth {
    /// Ground truth with nothing recovered.
    pub fn empty(episode_id: &str, reason: &str) -> Self {
        Self {
            episode_id: episode_id.to_string(),
            transcript: Availability::unavailable(reason),
            narration: Vec::new(),
            players: BTreeMap::new(),
            winner: None,
            key_moments: Vec::new(),
        }
    }

    pub fn facts(&self, player: &str) -> Option<&PlayerFacts> {
        self.players
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(player))
            .map(|(_, facts)| facts)
    }

    pub fn hand_strength(&self, player: &str) -> Option<HandStrength> {
        self.facts(player)
            .and_then(|f| f.hand_strength.get())
            .copied()
    }

    pub fn hole_cards(&self, player: &str) -> Option<&Vec<String>> {
        self.facts(player).and_then(|f| f.hole_cards.get())
    }

    /// First narrated event around `timestamp` carrying a bluff or value label.
    pub fn labeled_narration_at(&self, timestamp: f64, slack: f64) -> Option<&NarratedEvent> {
        self.narration
            .iter()
            .find(|n| n.covers(timestamp, slack) && (n.labels.is_bluff || n.labels.is_value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cards(a: &str, b: &str) -> Vec<String> {
        vec![a.to_string(), b.to_string()]
    }

    #[test]
    fn chen_classification() {
        assert_eq!(HandStrength::from_hole_cards(&cards("Ah", "Ad")), Some(HandStrength::Strong));
        assert_eq!(HandStrength::from_hole_cards(&cards("As", "Kd")), Some(HandStrength::Strong));
        assert_eq!(HandStrength::from_hole_cards(&cards("Jh", "Th")), Some(HandStrength::Strong));
        assert_eq!(HandStrength::from_hole_cards(&cards("7s", "7d")), Some(HandStrength::Medium));
        assert_eq!(HandStrength::from_hole_cards(&cards("Kc", "Qd")), Some(HandStrength::Medium));
        assert_eq!(HandStrength::from_hole_cards(&cards("7c", "2d")), Some(HandStrength::Weak));
        assert_eq!(HandStrength::from_hole_cards(&cards("10h", "9h")), Some(HandStrength::Medium));
    }

    #[test]
    fn chen_rejects_bad_input() {
        assert_eq!(HandStrength::from_hole_cards(&cards("Xh", "Ad")), None);
        assert_eq!(HandStrength::from_hole_cards(&["Ah".to_string()]), None);
    }

    #[test]
    fn availability_serializes_with_status_tag() {
        let facts = PlayerFacts::unknown("no metadata");
        let json = serde_json::to_value(&facts).unwrap();
        assert_eq!(json["hole_cards"]["status"], "unavailable");
        assert_eq!(json["hole_cards"]["value"]["reason"], "no metadata");

        let facts = PlayerFacts::from_cards(cards("Ah", "Ad"));
        let json = serde_json::to_value(&facts).unwrap();
        assert_eq!(json["hand_strength"]["status"], "available");
        assert_eq!(json["hand_strength"]["value"], "strong");
    }

    #[test]
    fn lookup_is_case_insensitive_and_narration_uses_slack() {
        let mut gt = GroundTruth::empty("ep1", "no audio");
        gt.players
            .insert("Alice".to_string(), PlayerFacts::from_cards(cards("Ah", "Ad")));
        gt.narration.push(NarratedEvent {
            start: 10.0,
            end: 12.0,
            text: "she is bluffing here".to_string(),
            labels: IntentLabels {
                is_bluff: true,
                is_value: false,
            },
            actions: vec![],
        });
        assert_eq!(gt.hand_strength("alice"), Some(HandStrength::Strong));
        assert!(gt.labeled_narration_at(16.5, 5.0).is_some());
        assert!(gt.labeled_narration_at(17.5, 5.0).is_none());
        assert!(gt.labeled_narration_at(9.0, 5.0).is_none());
    }
}
