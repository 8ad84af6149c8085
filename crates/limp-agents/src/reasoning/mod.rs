//! Built-in reasoning agents.
//!
//! Every agent scores the question's options; the pipeline combines the
//! scores. Option keys follow the question templates:
//!
//! | type | A | B | C |
//! |---|---|---|---|
//! | intent | Bluff | Value | Control |
//! | binary | Yes | No | |
//! | strategy | Aggressive | Value | Control |
//! | advantage | the player | the opponent | even |

pub mod equity;
pub mod posture;
pub mod tom_belief;
pub mod tom_social;

use crate::json;
use limp_core::{AgentError, AgentOpinion, LanguageModel, QuestionPrompt};
use serde_json::Value;
use std::collections::BTreeMap;

/// Scale scores to sum to one. All-zero input becomes uniform.
pub fn normalize(mut scores: BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let total: f64 = scores.values().sum();
    let n = scores.len() as f64;
    for v in scores.values_mut() {
        *v = if total > 0.0 { *v / total } else { 1.0 / n };
    }
    scores
}

pub fn uniform(question: &QuestionPrompt) -> BTreeMap<String, f64> {
    normalize(
        question
            .option_keys()
            .into_iter()
            .map(|k| (k.to_string(), 1.0))
            .collect(),
    )
}

/// Set the scores of the options the question has; others are ignored.
pub fn keyed(question: &QuestionPrompt, values: &[(&str, f64)]) -> BTreeMap<String, f64> {
    let scores = question
        .option_keys()
        .into_iter()
        .map(|k| {
            let v = values
                .iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| v.max(0.0))
                .unwrap_or(0.0);
            (k.to_string(), v)
        })
        .collect();
    normalize(scores)
}

/// Read `option_scores` from a model reply, restricted to the question's keys.
pub fn reply_scores(question: &QuestionPrompt, reply: &Value) -> Result<BTreeMap<String, f64>, AgentError> {
    let obj = reply
        .get("option_scores")
        .and_then(Value::as_object)
        .ok_or_else(|| AgentError::MalformedResponse("missing option_scores".to_string()))?;
    let scores: BTreeMap<String, f64> = question
        .option_keys()
        .into_iter()
        .map(|k| {
            let v = obj.get(k).and_then(json::amount).unwrap_or(0.0).max(0.0);
            (k.to_string(), v)
        })
        .collect();
    if scores.values().all(|v| *v == 0.0) {
        return Err(AgentError::MalformedResponse(
            "option_scores names none of the question's options".to_string(),
        ));
    }
    Ok(normalize(scores))
}

fn reply_str<'a>(reply: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| reply.get(*k).and_then(Value::as_str))
        .filter(|s| !s.trim().is_empty())
}

/// Ask the language model and turn its JSON reply into an opinion.
pub(crate) async fn language_opinion(
    agent: &str,
    language: &dyn LanguageModel,
    prompt: &str,
    question: &QuestionPrompt,
    rationale_keys: &[&str],
) -> Result<AgentOpinion, AgentError> {
    let text = language.complete(prompt).await?;
    let reply = json::extract_object(&text)?;
    let scores = reply_scores(question, &reply)?;
    let confidence = reply.get("confidence").and_then(Value::as_f64).unwrap_or(0.5);
    let rationale = rationale_keys
        .iter()
        .filter_map(|k| reply_str(&reply, &[*k]))
        .collect::<Vec<_>>()
        .join(" ");
    Ok(AgentOpinion::new(agent, scores, confidence).with_rationale(rationale))
}


#[cfg(test)]
mod tests {
    use super::test_support::intent_prompt;
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_scores_keep_known_keys_and_normalize() {
        let q = intent_prompt(None);
        let s = reply_scores(&q, &json!({"option_scores": {"A": 0.2, "B": "0.6", "Z": 5}})).unwrap();
        assert_eq!(s.len(), 3);
        assert!((s["B"] - 0.75).abs() < 1e-9);
        assert_eq!(s["C"], 0.0);
    }

    #[test]
    fn reply_without_scores_is_malformed() {
        let q = intent_prompt(None);
        assert!(reply_scores(&q, &json!({"belief_analysis": "x"})).is_err());
        assert!(reply_scores(&q, &json!({"option_scores": {"Z": 1}})).is_err());
    }

    #[test]
    fn uniform_and_keyed() {
        let q = intent_prompt(None);
        assert!((uniform(&q)["A"] - 1.0 / 3.0).abs() < 1e-9);
        let k = keyed(&q, &[("A", 1.0), ("B", 3.0)]);
        assert!((k["B"] - 0.75).abs() < 1e-9);
    }
}
