//! Benchmark questions.
//!
//! A [`Question`] carries its answer key and, in audience mode, the
//! privileged facts the key was derived from. Reasoning only ever sees the
//! [`QuestionPrompt`] projection, which has neither.

use crate::domain::episode::ProtocolMode;
use crate::domain::ground_truth::HandStrength;
use crate::domain::timeline::{ActionEvent, PhaseType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionLevel {
    Action,
    Phase,
}

impl QuestionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionLevel::Action => "action",
            QuestionLevel::Phase => "phase",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "action" => Some(QuestionLevel::Action),
            "phase" => Some(QuestionLevel::Phase),
            _ => None,
        }
    }
}

impl fmt::Display for QuestionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Intent,
    Binary,
    Strategy,
    Advantage,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Intent => "intent",
            QuestionType::Binary => "binary",
            QuestionType::Strategy => "strategy",
            QuestionType::Advantage => "advantage",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Theory-of-mind category a question probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TomLabel {
    Belief,
    SocialGoal,
}

impl TomLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TomLabel::Belief => "belief",
            TomLabel::SocialGoal => "social_goal",
        }
    }
}

impl fmt::Display for TomLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Narration,
    HiddenCards,
    RuleBased,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub key: String,
    pub text: String,
}

impl QuestionOption {
    pub fn new(key: &str, text: &str) -> Self {
        Self {
            key: key.to_string(),
            text: text.to_string(),
        }
    }
}

/// Perception-derived context shown alongside the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionContext {
    pub phase: PhaseType,
    #[serde(default)]
    pub board: Vec<String>,
    #[serde(default)]
    pub pot: Option<f64>,
    /// Player the question is about.
    pub player: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opponent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionEvent>,
    #[serde(default)]
    pub action_sequence: Vec<ActionEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacks: Option<BTreeMap<String, f64>>,
}

/// Privileged facts behind an answer key. Withheld in player mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hand_strengths: BTreeMap<String, HandStrength>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hole_cards: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub level: QuestionLevel,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub tom_label: TomLabel,
    pub protocol: ProtocolMode,
    pub timestamp: f64,
    pub prompt: String,
    pub options: Vec<QuestionOption>,
    pub answer: String,
    pub answer_source: AnswerSource,
    pub context: QuestionContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring_context: Option<ScoringContext>,
}

impl Question {
    /// The answer-free projection handed to the reasoning stage.
    pub fn prompt(&self) -> QuestionPrompt {
        QuestionPrompt {
            id: self.id.clone(),
            level: self.level,
            question_type: self.question_type,
            tom_label: self.tom_label,
            timestamp: self.timestamp,
            prompt: self.prompt.clone(),
            options: self.options.clone(),
            context: self.context.clone(),
        }
    }

    pub fn answer_text(&self) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.key == self.answer)
            .map(|o| o.text.as_str())
    }
}

/// A question as reasoning agents see it: no answer key, no scoring facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionPrompt {
    pub id: String,
    pub level: QuestionLevel,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub tom_label: TomLabel,
    pub timestamp: f64,
    pub prompt: String,
    pub options: Vec<QuestionOption>,
    pub context: QuestionContext,
}

impl QuestionPrompt {
    pub fn option_keys(&self) -> Vec<&str> {
        self.options.iter().map(|o| o.key.as_str()).collect()
    }

    /// Options rendered one per line as `A) text`.
    pub fn render_options(&self) -> String {
        self.options
            .iter()
            .map(|o| format!("{}) {}", o.key, o.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A template application that produced no question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedQuestion {
    pub template: String,
    pub unit: String,
    pub reason: String,
}

pub const QUESTION_SET_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub episode_id: String,
    pub protocol: ProtocolMode,
    pub version: String,
    pub questions: Vec<Question>,
    #[serde(default)]
    pub skipped: Vec<SkippedQuestion>,
    /// SHA-256 over the canonical JSON of each question, in order.
    pub digest: String,
}

impl QuestionSet {
    pub fn new(
        episode_id: &str,
        protocol: ProtocolMode,
        questions: Vec<Question>,
        skipped: Vec<SkippedQuestion>,
    ) -> Self {
        let digest = Self::compute_digest(&questions);
        Self {
            episode_id: episode_id.to_string(),
            protocol,
            version: QUESTION_SET_VERSION.to_string(),
            questions,
            skipped,
            digest,
        }
    }

    pub fn compute_digest(questions: &[Question]) -> String {
        let mut hasher = Sha256::new();
        for q in questions {
            // Question has no maps with nondeterministic order; to_vec is canonical.
            let bytes = serde_json::to_vec(q).unwrap_or_default();
            hasher.update(&bytes);
            hasher.update(b"\0");
        }
        hex::encode(hasher.finalize())
    }

    pub fn verify_digest(&self) -> bool {
        Self::compute_digest(&self.questions) == self.digest
    }

    pub fn get(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn prompts(&self) -> Vec<QuestionPrompt> {
        self.questions.iter().map(Question::prompt).collect()
    }
}
