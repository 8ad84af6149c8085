//! Question templates, one per (level, type).
//!
//! | template | trigger | answer | ToM label |
//! |---|---|---|---|
//! | `action_intent` | action is not a fold or check | narrated label, else actor hand strength | social_goal |
//! | `action_binary` | amount above the bluff threshold | narrated bluff, else weak hand | social_goal |
//! | `phase_strategy` | phase with two players, one entry per acting player | narrated labels, else the action pattern | social_goal |
//! | `phase_advantage` | phase with two players | both hand strengths, else aggression and stacks | belief |

use super::{Draft, QaRules, Unit};
use limp_core::{
    ActionEvent, AnswerSource, DataIntegrityError, GroundTruth, HandStrength,
    NarratedEvent, PhaseSegment, QuestionContext, QuestionLevel, QuestionOption, QuestionType,
    ScoringContext, TomLabel,
};
use std::collections::BTreeMap;

/// Declarative description of one kind of question.
pub trait QuestionTemplate: Send + Sync {
    fn name(&self) -> &'static str;

    fn level(&self) -> QuestionLevel;

    fn question_type(&self) -> QuestionType;

    fn tom_label(&self) -> TomLabel;

    /// Questions this template asks about `unit`. Empty when the trigger
    /// does not fire; an `Err` entry is a question that had to be skipped.
    fn apply(&self, unit: &Unit<'_>, gt: &GroundTruth, rules: &QaRules) -> Vec<Result<Draft, DataIntegrityError>>;
}

/// Built-in templates in generation order.
pub fn builtin() -> Vec<Box<dyn QuestionTemplate>> {
    vec![
        Box::new(ActionIntent),
        Box::new(ActionBinary),
        Box::new(PhaseStrategy),
        Box::new(PhaseAdvantage),
    ]
}

fn missing(field: &str, subject: &str) -> DataIntegrityError {
    DataIntegrityError::MissingGroundTruth {
        field: field.to_string(),
        subject: subject.to_string(),
    }
}

fn describe(action: &ActionEvent) -> String {
    if action.amount > 0.0 {
        format!("{} {}", action.action, format_amount(action.amount))
    } else {
        action.action.to_string()
    }
}

/// `12500` as `$12,500`.
pub fn format_amount(amount: f64) -> String {
    let whole = amount.round() as i64;
    let digits = whole.abs().to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if whole < 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

fn stacks(segment: &PhaseSegment) -> Option<BTreeMap<String, f64>> {
    let state = segment.latest_state()?;
    let map: BTreeMap<String, f64> = state
        .players
        .iter()
        .filter_map(|p| p.stack.map(|s| (p.name.clone(), s)))
        .collect();
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

fn stack_of(segment: &PhaseSegment, player: &str) -> Option<f64> {
    segment.latest_state()?.player(player)?.stack
}

fn base_context(segment: &PhaseSegment, player: &str, opponent: Option<&str>) -> QuestionContext {
    let state = segment.latest_state();
    QuestionContext {
        phase: segment.phase,
        board: state.map(|s| s.board.clone()).unwrap_or_default(),
        pot: state.and_then(|s| s.pot),
        player: player.to_string(),
        opponent: opponent.map(str::to_string),
        action: None,
        action_sequence: Vec::new(),
        stacks: stacks(segment),
    }
}

/// Privileged facts about `players` that backed an answer.
fn scoring(gt: &GroundTruth, players: &[&str], narration: Option<&NarratedEvent>) -> ScoringContext {
    let mut ctx = ScoringContext {
        narration: narration.map(|n| n.text.clone()),
        ..Default::default()
    };
    for player in players {
        if let Some(strength) = gt.hand_strength(player) {
            ctx.hand_strengths.insert(player.to_string(), strength);
        }
        if let Some(cards) = gt.hole_cards(player) {
            ctx.hole_cards.insert(player.to_string(), cards.clone());
        }
    }
    ctx
}

// -----------------------------------------------------------------------------
// Action level
// -----------------------------------------------------------------------------

fn action_context(segment: &PhaseSegment, action: &ActionEvent, opponent: Option<&str>) -> QuestionContext {
    let mut ctx = base_context(segment, &action.player, opponent);
    ctx.action = Some(action.clone());
    ctx.action_sequence = segment
        .actions
        .iter()
        .take_while(|a| a.timestamp <= action.timestamp)
        .cloned()
        .collect();
    ctx
}

pub struct ActionIntent;

impl QuestionTemplate for ActionIntent {
    fn name(&self) -> &'static str {
        "action_intent"
    }

    fn level(&self) -> QuestionLevel {
        QuestionLevel::Action
    }

    fn question_type(&self) -> QuestionType {
        QuestionType::Intent
    }

    fn tom_label(&self) -> TomLabel {
        TomLabel::SocialGoal
    }

    fn apply(&self, unit: &Unit<'_>, gt: &GroundTruth, rules: &QaRules) -> Vec<Result<Draft, DataIntegrityError>> {
        let Unit::Action {
            id,
            segment,
            action,
            opponent,
        } = unit
        else {
            return Vec::new();
        };
        let player = action.player.as_str();
        let narrated = gt.labeled_narration_at(action.timestamp, rules.narration_slack);
        let derived = match narrated {
            Some(n) if n.labels.is_bluff => Ok(("A", AnswerSource::Narration)),
            Some(_) => Ok(("B", AnswerSource::Narration)),
            None => match gt.hand_strength(player) {
                Some(HandStrength::Strong) => Ok(("B", AnswerSource::HiddenCards)),
                Some(HandStrength::Weak) => Ok(("A", AnswerSource::HiddenCards)),
                Some(HandStrength::Medium) => Ok(("C", AnswerSource::HiddenCards)),
                None => Err(missing("hand_strength", player)),
            },
        };
        let draft = derived.map(|(answer, source)| Draft {
            id: format!("{id}_intent"),
            timestamp: action.timestamp,
            prompt: format!(
                "What is the most likely intent behind {player}'s {}?",
                describe(action)
            ),
            options: vec![
                QuestionOption::new(
                    "A",
                    &format!("Bluff: {player} applies pressure to make the opponent fold with a weaker hand"),
                ),
                QuestionOption::new(
                    "B",
                    &format!("Value: {player} believes they are ahead and wants to be called"),
                ),
                QuestionOption::new(
                    "C",
                    &format!("Control: {player} keeps the pot manageable and stays flexible"),
                ),
            ],
            answer: answer.to_string(),
            answer_source: source,
            context: action_context(segment, action, opponent.as_deref()),
            scoring: scoring(gt, &[player], narrated),
        });
        vec![draft]
    }
}

pub struct ActionBinary;

impl QuestionTemplate for ActionBinary {
    fn name(&self) -> &'static str {
        "action_binary"
    }

    fn level(&self) -> QuestionLevel {
        QuestionLevel::Action
    }

    fn question_type(&self) -> QuestionType {
        QuestionType::Binary
    }

    fn tom_label(&self) -> TomLabel {
        TomLabel::SocialGoal
    }

    fn apply(&self, unit: &Unit<'_>, gt: &GroundTruth, rules: &QaRules) -> Vec<Result<Draft, DataIntegrityError>> {
        let Unit::Action {
            id,
            segment,
            action,
            opponent,
        } = unit
        else {
            return Vec::new();
        };
        if action.amount <= rules.bluff_amount_threshold {
            return Vec::new();
        }
        let player = action.player.as_str();
        let narrated = gt.labeled_narration_at(action.timestamp, rules.narration_slack);
        let derived = match narrated {
            Some(n) => Ok((if n.labels.is_bluff { "A" } else { "B" }, AnswerSource::Narration)),
            None => match gt.hand_strength(player) {
                Some(HandStrength::Weak) => Ok(("A", AnswerSource::HiddenCards)),
                Some(_) => Ok(("B", AnswerSource::HiddenCards)),
                None => Err(missing("hand_strength", player)),
            },
        };
        let draft = derived.map(|(answer, source)| Draft {
            id: format!("{id}_bluff"),
            timestamp: action.timestamp,
            prompt: format!("Is {player}'s {} a bluff?", describe(action)),
            options: vec![
                QuestionOption::new(
                    "A",
                    &format!("Yes: {player} is bluffing and holds less than the bet represents"),
                ),
                QuestionOption::new(
                    "B",
                    &format!("No: {player} is betting on the strength of their hand"),
                ),
            ],
            answer: answer.to_string(),
            answer_source: source,
            context: action_context(segment, action, opponent.as_deref()),
            scoring: scoring(gt, &[player], narrated),
        });
        vec![draft]
    }
}

// -----------------------------------------------------------------------------
// Phase level
// -----------------------------------------------------------------------------

fn phase_context(segment: &PhaseSegment, player: &str, opponent: Option<&str>) -> QuestionContext {
    let mut ctx = base_context(segment, player, opponent);
    ctx.action_sequence = segment.actions.clone();
    ctx
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Id suffix for `players[seat]`: the slug, plus the seat index when another
/// player at the table slugs the same way.
fn player_key(players: &[String], seat: usize) -> String {
    let key = slug(&players[seat]);
    let shared = players.iter().filter(|p| slug(p) == key).count() > 1;
    if shared {
        format!("{key}_{seat}")
    } else {
        key
    }
}

/// Strategy from the shape of a player's actions in one phase.
fn strategy_from_pattern(actions: &[&ActionEvent]) -> &'static str {
    let aggressive = actions.iter().filter(|a| a.action.is_aggressive()).count();
    let passive = actions.iter().filter(|a| a.action.is_passive()).count();
    let nervous = actions.iter().any(|a| {
        a.behavior
            .as_ref()
            .map(|b| b.fidgeting_detected || b.posture_changed)
            .unwrap_or(false)
    });
    if aggressive > passive {
        if nervous {
            "A"
        } else {
            "B"
        }
    } else {
        "C"
    }
}

pub struct PhaseStrategy;

impl QuestionTemplate for PhaseStrategy {
    fn name(&self) -> &'static str {
        "phase_strategy"
    }

    fn level(&self) -> QuestionLevel {
        QuestionLevel::Phase
    }

    fn question_type(&self) -> QuestionType {
        QuestionType::Strategy
    }

    fn tom_label(&self) -> TomLabel {
        TomLabel::SocialGoal
    }

    fn apply(&self, unit: &Unit<'_>, gt: &GroundTruth, rules: &QaRules) -> Vec<Result<Draft, DataIntegrityError>> {
        let Unit::Phase { id, segment, players } = unit else {
            return Vec::new();
        };
        let mut drafts = Vec::new();
        for (seat, player) in players.iter().enumerate() {
            let actions: Vec<&ActionEvent> = segment
                .actions
                .iter()
                .filter(|a| a.player.eq_ignore_ascii_case(player))
                .collect();
            if actions.is_empty() {
                continue;
            }
            let opponent = players
                .iter()
                .find(|p| !p.eq_ignore_ascii_case(player))
                .map(String::as_str);
            let narrated = actions
                .iter()
                .find_map(|a| gt.labeled_narration_at(a.timestamp, rules.narration_slack));
            let (answer, source) = match narrated {
                Some(n) if n.labels.is_bluff => ("A", AnswerSource::Narration),
                Some(_) => ("B", AnswerSource::Narration),
                None => (strategy_from_pattern(&actions), AnswerSource::RuleBased),
            };
            let phase = segment.phase;
            drafts.push(Ok(Draft {
                id: format!("{id}_strategy_{}", player_key(players, seat)),
                timestamp: segment.start,
                prompt: format!("What best describes {player}'s overall strategy during the {phase}?"),
                options: vec![
                    QuestionOption::new(
                        "A",
                        &format!("Aggressive bluffing: {player} uses pressure to push the opponent off the hand"),
                    ),
                    QuestionOption::new(
                        "B",
                        &format!("Value-oriented: {player} thinks they are ahead and builds the pot"),
                    ),
                    QuestionOption::new(
                        "C",
                        &format!("Pot control: {player} plays cautiously to keep the pot small"),
                    ),
                ],
                answer: answer.to_string(),
                answer_source: source,
                context: phase_context(segment, player, opponent),
                scoring: scoring(gt, &[player.as_str()], narrated),
            }));
        }
        drafts
    }
}

/// Advantage from aggression, then from a clear stack lead.
fn advantage_from_pattern(segment: &PhaseSegment, a: &str, b: &str) -> &'static str {
    let aggression = |name: &str| {
        segment
            .actions
            .iter()
            .filter(|x| x.player.eq_ignore_ascii_case(name) && x.action.is_aggressive())
            .count()
    };
    let (agg_a, agg_b) = (aggression(a), aggression(b));
    if agg_a > agg_b {
        return "A";
    }
    if agg_b > agg_a {
        return "B";
    }
    match (stack_of(segment, a), stack_of(segment, b)) {
        (Some(sa), Some(sb)) if sa > sb * 1.2 => "A",
        (Some(sa), Some(sb)) if sb > sa * 1.2 => "B",
        _ => "C",
    }
}

pub struct PhaseAdvantage;

impl QuestionTemplate for PhaseAdvantage {
    fn name(&self) -> &'static str {
        "phase_advantage"
    }

    fn level(&self) -> QuestionLevel {
        QuestionLevel::Phase
    }

    fn question_type(&self) -> QuestionType {
        QuestionType::Advantage
    }

    fn tom_label(&self) -> TomLabel {
        TomLabel::Belief
    }

    fn apply(&self, unit: &Unit<'_>, gt: &GroundTruth, _rules: &QaRules) -> Vec<Result<Draft, DataIntegrityError>> {
        let Unit::Phase { id, segment, players } = unit else {
            return Vec::new();
        };
        let (Some(a), Some(b)) = (players.first(), players.get(1)) else {
            return Vec::new();
        };
        let (answer, source) = match (gt.hand_strength(a), gt.hand_strength(b)) {
            (Some(sa), Some(sb)) if sa > sb => ("A", AnswerSource::HiddenCards),
            (Some(sa), Some(sb)) if sb > sa => ("B", AnswerSource::HiddenCards),
            (Some(_), Some(_)) => ("C", AnswerSource::HiddenCards),
            _ => (advantage_from_pattern(segment, a, b), AnswerSource::RuleBased),
        };
        let phase = segment.phase;
        vec![Ok(Draft {
            id: format!("{id}_advantage"),
            timestamp: segment.start,
            prompt: format!("Who is in the better position at the end of the {phase}?"),
            options: vec![
                QuestionOption::new("A", &format!("{a}: the board and the betting favor {a}")),
                QuestionOption::new("B", &format!("{b}: the board and the betting favor {b}")),
                QuestionOption::new("C", "Even: neither player has a clear edge"),
            ],
            answer: answer.to_string(),
            answer_source: source,
            context: phase_context(segment, a, Some(b)),
            scoring: scoring(gt, &[a.as_str(), b.as_str()], None),
        })]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limp_core::ActionType;

    #[test]
    fn amounts_are_grouped() {
        assert_eq!(format_amount(12_500.0), "$12,500");
        assert_eq!(format_amount(900.0), "$900");
        assert_eq!(format_amount(1_000_000.0), "$1,000,000");
    }

    #[test]
    fn aggression_without_tells_reads_as_value() {
        let raise = ActionEvent::new(1.0, "Alice", ActionType::Raise, 500.0);
        let bet = ActionEvent::new(2.0, "Alice", ActionType::Bet, 500.0);
        assert_eq!(strategy_from_pattern(&[&raise, &bet]), "B");

        let mut nervous = raise.clone();
        nervous.behavior = Some(limp_core::BehavioralSummary {
            fidgeting_detected: true,
            ..Default::default()
        });
        assert_eq!(strategy_from_pattern(&[&nervous]), "A");

        let call = ActionEvent::new(3.0, "Alice", ActionType::Call, 500.0);
        assert_eq!(strategy_from_pattern(&[&call]), "C");
    }

    #[test]
    fn stack_lead_breaks_aggression_tie() {
        let mut seg = PhaseSegment::new(limp_core::PhaseType::Flop, 0.0, 10.0);
        seg.final_state = Some(limp_core::GameState {
            timestamp: 9.0,
            phase: limp_core::PhaseType::Flop,
            board: vec![],
            pot: None,
            players: vec![
                limp_core::PlayerState {
                    name: "Alice".to_string(),
                    position: None,
                    stack: Some(20_000.0),
                    hole_cards: None,
                    is_active: true,
                },
                limp_core::PlayerState {
                    name: "Bob".to_string(),
                    position: None,
                    stack: Some(10_000.0),
                    hole_cards: None,
                    is_active: true,
                },
            ],
        });
        assert_eq!(advantage_from_pattern(&seg, "Alice", "Bob"), "A");
        seg.actions
            .push(ActionEvent::new(1.0, "Bob", ActionType::Raise, 900.0));
        assert_eq!(advantage_from_pattern(&seg, "Alice", "Bob"), "B");
    }

    #[test]
    fn slug_is_filesystem_safe() {
        assert_eq!(slug("Phil Ivey"), "phil_ivey");
    }

    #[test]
    fn names_that_slug_alike_get_seat_suffixes() {
        let players = vec!["J.Doe".to_string(), "J-Doe".to_string(), "Bob".to_string()];
        assert_eq!(player_key(&players, 0), "j_doe_0");
        assert_eq!(player_key(&players, 1), "j_doe_1");
        assert_eq!(player_key(&players, 2), "bob");
    }
}
