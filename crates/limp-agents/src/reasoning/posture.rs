//! Rule-based reading of behavioral cues.

use super::{keyed, uniform};
use async_trait::async_trait;
use limp_core::{
    AgentContext, AgentError, AgentOpinion, AgentParams, BehavioralSummary, PerceptionOutput,
    QuestionPrompt, QuestionType, ReasoningAgent, RegistryError,
};

pub const NAME: &str = "posture";

const INDICATOR: f64 = 0.15;

const BLUFF_POSTURE: [&str; 2] = ["leaning back", "neutral"];
const BLUFF_HANDS: [&str; 2] = ["playing with chips", "touching face"];
const BLUFF_GAZE: [&str; 2] = ["looking away", "looking down"];
const BLUFF_EMOTION: [&str; 2] = ["tense", "uncertain"];

const VALUE_POSTURE: [&str; 1] = ["leaning forward"];
const VALUE_HANDS: [&str; 2] = ["on table", "folded"];
const VALUE_GAZE: [&str; 2] = ["staring at opponent", "looking at board"];
const VALUE_EMOTION: [&str; 2] = ["confident", "neutral"];

fn hit(value: &Option<String>, indicators: &[&str]) -> bool {
    value
        .as_deref()
        .map(|v| indicators.iter().any(|i| v.eq_ignore_ascii_case(i)))
        .unwrap_or(false)
}

/// Bluff and value evidence accumulated from cues and decision time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evidence {
    pub bluff: f64,
    pub value: f64,
    pub notes: Vec<String>,
}

impl Evidence {
    pub fn observe(&mut self, cues: &BehavioralSummary) {
        let dims = [
            ("posture", &cues.dominant_posture, &BLUFF_POSTURE[..], &VALUE_POSTURE[..]),
            ("hands", &cues.dominant_hands, &BLUFF_HANDS[..], &VALUE_HANDS[..]),
            ("gaze", &cues.dominant_gaze, &BLUFF_GAZE[..], &VALUE_GAZE[..]),
            ("emotion", &cues.dominant_emotion, &BLUFF_EMOTION[..], &VALUE_EMOTION[..]),
        ];
        for (dim, value, bluff, value_set) in dims {
            if hit(value, bluff) {
                self.bluff += INDICATOR;
                self.notes.push(format!("{dim}={} suggests bluff", value.as_deref().unwrap_or("")));
            }
            if hit(value, value_set) {
                self.value += INDICATOR;
                self.notes.push(format!("{dim}={} suggests value", value.as_deref().unwrap_or("")));
            }
        }
        if cues.fidgeting_detected {
            self.bluff += 0.2;
            self.notes.push("fidgeting".to_string());
        }
        if cues.posture_changed || cues.emotion_changed {
            self.bluff += 0.1;
            self.notes.push("behavior changed during the decision".to_string());
        }
    }

    pub fn decision_time(&mut self, seconds: f64) {
        if seconds > 10.0 {
            self.bluff += 0.1;
            self.notes.push(format!("long think ({seconds:.1}s)"));
        } else if seconds < 2.0 {
            self.value += 0.1;
            self.notes.push(format!("quick action ({seconds:.1}s)"));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bluff == 0.0 && self.value == 0.0
    }
}

/// Cues attached to the question's action, else to the player's actions in
/// the shown sequence.
pub fn gather(question: &QuestionPrompt) -> Evidence {
    let ctx = &question.context;
    let mut ev = Evidence::default();
    match &ctx.action {
        Some(action) => {
            if let Some(cues) = &action.behavior {
                ev.observe(cues);
            }
            if let Some(d) = action.decision_duration {
                ev.decision_time(d);
            }
        }
        None => {
            for a in ctx
                .action_sequence
                .iter()
                .filter(|a| a.player.eq_ignore_ascii_case(&ctx.player))
            {
                if let Some(cues) = &a.behavior {
                    ev.observe(cues);
                }
            }
        }
    }
    ev
}

pub struct Posture;

pub fn build(_ctx: &AgentContext, _params: &AgentParams) -> Result<Box<dyn ReasoningAgent>, RegistryError> {
    Ok(Box::new(Posture))
}

#[async_trait]
impl ReasoningAgent for Posture {
    fn capability(&self) -> &str {
        NAME
    }

    async fn reason(
        &self,
        question: &QuestionPrompt,
        _perception: &PerceptionOutput,
    ) -> Result<AgentOpinion, AgentError> {
        let ev = gather(question);
        let (b, v) = (ev.bluff, ev.value);
        let scores = match question.question_type {
            QuestionType::Intent | QuestionType::Strategy => keyed(
                question,
                &[("A", 0.33 + b), ("B", 0.33 + v), ("C", 0.33 + (1.0 - b - v) * 0.3)],
            ),
            QuestionType::Binary => {
                let yes = b / (b + v + 0.01);
                keyed(question, &[("A", yes), ("B", 1.0 - yes)])
            }
            QuestionType::Advantage => uniform(question),
        };
        let rationale = if ev.notes.is_empty() {
            "no clear behavioral signals".to_string()
        } else {
            ev.notes.join("; ")
        };
        Ok(AgentOpinion::new(NAME, scores, (b + v).min(1.0)).with_rationale(rationale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::test_support::intent_prompt;
    use limp_core::{ActionEvent, ActionType, PerceptionMeta, ProtocolMode};

    fn perception() -> PerceptionOutput {
        PerceptionOutput {
            episode_id: "ep".to_string(),
            protocol: ProtocolMode::Audience,
            hero: None,
            meta: PerceptionMeta::default(),
            timeline: Default::default(),
            enabled_agents: vec![],
            failures: vec![],
        }
    }

    fn nervous_raise() -> ActionEvent {
        let mut a = ActionEvent::new(3.0, "Alice", ActionType::Raise, 3_000.0);
        a.decision_duration = Some(14.0);
        a.behavior = Some(BehavioralSummary {
            dominant_posture: Some("Leaning back".to_string()),
            posture_changed: true,
            dominant_hands: Some("Playing with chips".to_string()),
            fidgeting_detected: true,
            dominant_gaze: Some("Looking away".to_string()),
            dominant_emotion: None,
            emotion_changed: false,
            frame_count: 3,
        });
        a
    }

    #[test]
    fn nervous_cues_accumulate_bluff_evidence() {
        let ev = gather(&intent_prompt(Some(nervous_raise())));
        // posture, hands, gaze: 3 * 0.15; fidgeting 0.2; change 0.1; long think 0.1
        assert!((ev.bluff - 0.85).abs() < 1e-9);
        assert_eq!(ev.value, 0.0);
    }

    #[tokio::test]
    async fn intent_scores_favor_bluff() {
        let q = intent_prompt(Some(nervous_raise()));
        let op = Posture.reason(&q, &perception()).await.unwrap();
        assert!(op.option_scores["A"] > op.option_scores["B"]);
        assert!(op.option_scores["A"] > op.option_scores["C"]);
        let total: f64 = op.option_scores.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((op.confidence - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_cues_gives_zero_confidence() {
        let q = intent_prompt(None);
        let op = Posture.reason(&q, &perception()).await.unwrap();
        assert_eq!(op.confidence, 0.0);
        assert_eq!(op.rationale, "no clear behavioral signals");
    }
}
