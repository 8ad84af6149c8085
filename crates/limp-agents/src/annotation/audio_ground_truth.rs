//! Ground truth from broadcast commentary.
//!
//! The audio is transcribed, every transcript segment is labelled by
//! keyword, and the full text is passed to the language model to pull out
//! the facts the commentators state (hole cards, winner, key moments).
//! Commentary reaches the annotation stage only.

use crate::json;
use crate::prompts::narration_prompt;
use async_trait::async_trait;
use limp_core::agent::{param_usize, unsupported};
use limp_core::{
    AgentContext, AgentError, AgentParams, AnnotationAgent, AnnotationReport, AnnotationRequest,
    IntentLabels, LanguageModel, NarratedEvent, NarrationFacts, NarrationReport, RegistryError,
    SpeechModel, TranscriptSegment,
};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

pub const NAME: &str = "audio_ground_truth";

struct Keywords {
    bluff: Regex,
    value: Regex,
    actions: Vec<(&'static str, Regex)>,
}

static KEYWORDS: LazyLock<Keywords> = LazyLock::new(|| {
    let re = |p: &str| Regex::new(p).expect("keyword pattern is valid");
    Keywords {
        bluff: re(r"\b(bluff|bluffs|bluffing|representing|air)\b"),
        value: re(r"\b(value|has it|holding|the nuts|monster)\b"),
        actions: vec![
            ("fold", re(r"\b(fold|folds|folding|gives up)\b")),
            ("all-in", re(r"\b(all[- ]in|shove|shoves|shoving)\b")),
            ("raise", re(r"\b(raise|raises|raising|re-raise)\b")),
            ("call", re(r"\b(call|calls|calling)\b")),
            ("check", re(r"\b(check|checks|checking)\b")),
            ("bet", re(r"\b(bet|bets|betting)\b")),
        ],
    }
});

/// Keyword labels for one transcript segment; `None` when nothing matched.
pub fn label_segment(segment: &TranscriptSegment) -> Option<NarratedEvent> {
    let kw = &*KEYWORDS;
    let text = segment.text.to_lowercase();
    let labels = IntentLabels {
        is_bluff: kw.bluff.is_match(&text),
        is_value: kw.value.is_match(&text),
    };
    let actions: Vec<String> = kw
        .actions
        .iter()
        .filter(|(_, re)| re.is_match(&text))
        .map(|(name, _)| name.to_string())
        .collect();
    if !labels.is_bluff && !labels.is_value && actions.is_empty() {
        return None;
    }
    Some(NarratedEvent {
        start: segment.start,
        end: segment.end,
        text: segment.text.trim().to_string(),
        labels,
        actions,
    })
}

/// Accepts either `{"hole_cards": {name: [..]}}` or
/// `{"players": [{"name": .., "hole_cards": [..]}]}`.
pub fn parse_facts(value: &Value) -> NarrationFacts {
    let card_list = |v: &Value| -> Option<Vec<String>> {
        let cards: Vec<String> = v
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        (!cards.is_empty()).then_some(cards)
    };

    let mut hole_cards = BTreeMap::new();
    if let Some(map) = value.get("hole_cards").and_then(Value::as_object) {
        for (name, cards) in map {
            if let Some(cards) = card_list(cards) {
                hole_cards.insert(name.clone(), cards);
            }
        }
    }
    if let Some(players) = value.get("players").and_then(Value::as_array) {
        for p in players {
            let name = p.get("name").and_then(Value::as_str);
            let cards = p.get("hole_cards").and_then(card_list);
            if let (Some(name), Some(cards)) = (name, cards) {
                hole_cards.entry(name.to_string()).or_insert(cards);
            }
        }
    }

    let winner = value
        .get("winner")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|w| !w.is_empty() && !w.eq_ignore_ascii_case("null"))
        .map(str::to_string);

    let key_moments = value
        .get("key_moments")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|m| match m {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(_) => m
                        .get("event")
                        .or_else(|| m.get("description"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    NarrationFacts {
        hole_cards,
        winner,
        key_moments,
    }
}

pub struct AudioGroundTruth {
    speech: Arc<dyn SpeechModel>,
    language: Arc<dyn LanguageModel>,
    max_transcript_chars: usize,
}

pub fn build(ctx: &AgentContext, params: &AgentParams) -> Result<Box<dyn AnnotationAgent>, RegistryError> {
    Ok(Box::new(AudioGroundTruth {
        speech: ctx.require_speech(NAME)?,
        language: ctx.require_language(NAME)?,
        max_transcript_chars: param_usize(params, "max_transcript_chars", 6000),
    }))
}

impl AudioGroundTruth {
    async fn facts(&self, transcript: &str) -> Result<NarrationFacts, AgentError> {
        let text: String = transcript.chars().take(self.max_transcript_chars).collect();
        let reply = self.language.complete(&narration_prompt(&text)).await?;
        Ok(parse_facts(&json::extract_object(&reply)?))
    }
}

#[async_trait]
impl AnnotationAgent for AudioGroundTruth {
    fn capability(&self) -> &str {
        NAME
    }

    async fn annotate(&self, request: AnnotationRequest) -> Result<AnnotationReport, AgentError> {
        let kind = request.kind();
        let AnnotationRequest::Narration { audio } = request else {
            return Err(unsupported(NAME, kind));
        };
        if !tokio::fs::try_exists(&audio).await.unwrap_or(false) {
            return Err(AgentError::MissingInput(format!(
                "audio track not found: {}",
                audio.display()
            )));
        }

        let transcript = self.speech.transcribe(&audio).await?;
        let events: Vec<NarratedEvent> = transcript.segments.iter().filter_map(label_segment).collect();

        let facts = if transcript.text.trim().is_empty() {
            NarrationFacts::default()
        } else {
            match self.facts(&transcript.text).await {
                Ok(f) => f,
                Err(e) => {
                    warn!(error = %e, "narration fact extraction failed, keeping labels only");
                    NarrationFacts::default()
                }
            }
        };
        info!(
            segments = transcript.segments.len(),
            labeled = events.len(),
            narrated_hands = facts.hole_cards.len(),
            "narration annotated"
        );

        Ok(AnnotationReport::Narration(NarrationReport {
            transcript: transcript.text,
            events,
            facts,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seg(start: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end: start + 2.0,
            text: text.to_string(),
        }
    }

    #[test]
    fn keywords_label_intent_and_actions() {
        let e = label_segment(&seg(3.0, "He's representing the flush here, big raise")).unwrap();
        assert!(e.labels.is_bluff);
        assert!(!e.labels.is_value);
        assert_eq!(e.actions, vec!["raise"]);

        let e = label_segment(&seg(9.0, "She has it, she's going all in for value")).unwrap();
        assert!(e.labels.is_value);
        assert_eq!(e.actions, vec!["all-in"]);

        assert!(label_segment(&seg(0.0, "Welcome back to the final table")).is_none());
    }

    #[test]
    fn word_boundaries_avoid_false_hits() {
        // "better" and "chair" must not read as bet / air.
        assert!(label_segment(&seg(0.0, "a better chair")).is_none());
    }

    #[test]
    fn facts_accept_both_shapes() {
        let f = parse_facts(&json!({
            "hole_cards": {"Alice": ["Ah", "Kh"]},
            "players": [{"name": "Bob", "hole_cards": ["7c", "2d"]}, {"name": "Carol", "hole_cards": []}],
            "winner": "Alice",
            "key_moments": ["river shove", {"event": "hero call"}]
        }));
        assert_eq!(f.hole_cards.len(), 2);
        assert_eq!(f.winner.as_deref(), Some("Alice"));
        assert_eq!(f.key_moments, vec!["river shove", "hero call"]);
        assert_eq!(parse_facts(&json!({"winner": "null"})).winner, None);
    }
}
