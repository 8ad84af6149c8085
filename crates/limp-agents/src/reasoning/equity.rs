//! Pot-equity estimate mapped onto option scores.
//!
//! Equity is estimated by the language model from public information and
//! from any hole cards the broadcast overlay showed. Low equity behind an
//! aggressive line points at a bluff, high equity at value.

use super::keyed;
use crate::json;
use crate::prompts::equity_prompt;
use async_trait::async_trait;
use limp_core::agent::param_f64;
use limp_core::{
    AgentContext, AgentError, AgentOpinion, AgentParams, LanguageModel, PerceptionOutput,
    QuestionPrompt, QuestionType, ReasoningAgent, RegistryError,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAME: &str = "equity";

/// Option scores for a player equity in `[0, 1]`.
pub fn scores_for(question: &QuestionPrompt, equity: f64) -> BTreeMap<String, f64> {
    let eq = equity.clamp(0.0, 1.0);
    match question.question_type {
        QuestionType::Intent | QuestionType::Strategy => {
            let (a, b) = if eq < 0.35 {
                (0.5, 0.2)
            } else if eq > 0.65 {
                (0.2, 0.5)
            } else {
                (0.33, 0.33)
            };
            keyed(question, &[("A", a), ("B", b), ("C", 1.0 - a - b)])
        }
        QuestionType::Binary => keyed(question, &[("A", 1.0 - eq), ("B", eq)]),
        QuestionType::Advantage => keyed(
            question,
            &[("A", eq), ("B", 1.0 - eq), ("C", 0.5 - (eq - 0.5).abs())],
        ),
    }
}

/// Hole cards the overlay showed at the question's moment.
fn visible_cards(question: &QuestionPrompt, perception: &PerceptionOutput) -> String {
    let Some(state) = perception
        .timeline
        .segment_at(question.timestamp)
        .and_then(|s| s.latest_state())
    else {
        return "none".to_string();
    };
    let shown: Vec<String> = state
        .players
        .iter()
        .filter_map(|p| {
            p.hole_cards
                .as_ref()
                .map(|c| format!("{}: {}", p.name, c.join(" ")))
        })
        .collect();
    if shown.is_empty() {
        "none".to_string()
    } else {
        shown.join(", ")
    }
}

pub struct Equity {
    language: Arc<dyn LanguageModel>,
    default_confidence: f64,
}

pub fn build(ctx: &AgentContext, params: &AgentParams) -> Result<Box<dyn ReasoningAgent>, RegistryError> {
    Ok(Box::new(Equity {
        language: ctx.require_language(NAME)?,
        default_confidence: param_f64(params, "confidence", 0.4),
    }))
}

#[async_trait]
impl ReasoningAgent for Equity {
    fn capability(&self) -> &str {
        NAME
    }

    async fn reason(
        &self,
        question: &QuestionPrompt,
        perception: &PerceptionOutput,
    ) -> Result<AgentOpinion, AgentError> {
        let prompt = format!(
            "{}\n\nVisible hole cards: {}",
            equity_prompt(question, perception),
            visible_cards(question, perception)
        );
        let text = self.language.complete(&prompt).await?;
        let reply = json::extract_object(&text)?;
        let equity = reply
            .get("equity")
            .and_then(json::amount)
            .ok_or_else(|| AgentError::MalformedResponse("missing equity".to_string()))?;
        // Percentages come back as 0-100 now and then.
        let equity = if equity > 1.0 { equity / 100.0 } else { equity };
        let reasoning = reply
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let confidence = reply
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(self.default_confidence);
        Ok(
            AgentOpinion::new(NAME, scores_for(question, equity), confidence)
                .with_rationale(format!("equity {equity:.2}: {reasoning}")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::test_support::intent_prompt;

    #[test]
    fn low_equity_points_at_bluff() {
        let q = intent_prompt(None);
        let s = scores_for(&q, 0.2);
        assert!(s["A"] > s["B"]);
        let s = scores_for(&q, 0.8);
        assert!(s["B"] > s["A"]);
        let s = scores_for(&q, 0.5);
        assert!((s["A"] - s["B"]).abs() < 1e-9);
    }

    #[test]
    fn binary_yes_tracks_inverse_equity() {
        let mut q = intent_prompt(None);
        q.question_type = QuestionType::Binary;
        q.options.truncate(2);
        let s = scores_for(&q, 0.25);
        assert!((s["A"] - 0.75).abs() < 1e-9);
        assert_eq!(s.len(), 2);
    }
}
