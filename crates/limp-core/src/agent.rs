//! Agent interfaces, one trait per registry namespace.
//!
//! Every agent receives a typed request and returns a typed report or an
//! [`AgentError`]. Agents only hold what their constructor received: model
//! handles from [`AgentContext`] and their own [`AgentParams`].

use crate::domain::episode::{FrameRef, PrivilegedMetadata};
use crate::domain::error::{AgentError, RegistryError};
use crate::domain::ground_truth::{NarratedEvent, PlayerFacts};
use crate::domain::perception::PerceptionOutput;
use crate::domain::question::QuestionPrompt;
use crate::domain::reasoning::AgentOpinion;
use crate::domain::timeline::{ActionEvent, BehavioralSummary, GameState, PhaseType};
use crate::models::{LanguageModel, SpeechModel, VisionModel};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Free-form per-agent parameters from the resolved configuration.
pub type AgentParams = serde_json::Map<String, Value>;

pub fn param_f64(params: &AgentParams, key: &str, default: f64) -> f64 {
    params.get(key).and_then(Value::as_f64).unwrap_or(default)
}

pub fn param_usize(params: &AgentParams, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .unwrap_or(default)
}

pub fn param_bool(params: &AgentParams, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

pub fn param_str<'a>(params: &'a AgentParams, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Model handles available to agent constructors.
#[derive(Clone, Default)]
pub struct AgentContext {
    pub vision: Option<Arc<dyn VisionModel>>,
    pub language: Option<Arc<dyn LanguageModel>>,
    pub speech: Option<Arc<dyn SpeechModel>>,
    /// Deadline for each model call an agent makes. Agents whose unit
    /// spans several calls apply it per call.
    pub call_timeout: Option<Duration>,
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("vision", &self.vision.as_ref().map(|m| m.model_name().to_string()))
            .field("language", &self.language.as_ref().map(|m| m.model_name().to_string()))
            .field("speech", &self.speech.as_ref().map(|m| m.model_name().to_string()))
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl AgentContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vision(mut self, model: Arc<dyn VisionModel>) -> Self {
        self.vision = Some(model);
        self
    }

    pub fn with_language(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language = Some(model);
        self
    }

    pub fn with_speech(mut self, model: Arc<dyn SpeechModel>) -> Self {
        self.speech = Some(model);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn require_vision(&self, agent: &str) -> Result<Arc<dyn VisionModel>, RegistryError> {
        self.vision.clone().ok_or_else(|| missing_model(agent, "vision"))
    }

    pub fn require_language(&self, agent: &str) -> Result<Arc<dyn LanguageModel>, RegistryError> {
        self.language
            .clone()
            .ok_or_else(|| missing_model(agent, "language"))
    }

    pub fn require_speech(&self, agent: &str) -> Result<Arc<dyn SpeechModel>, RegistryError> {
        self.speech.clone().ok_or_else(|| missing_model(agent, "speech"))
    }
}

fn missing_model(agent: &str, kind: &str) -> RegistryError {
    RegistryError::Build {
        name: agent.to_string(),
        reason: format!("no {kind} model configured"),
    }
}

/// Cut a single call off after `timeout`.
pub async fn with_timeout<T, Fut>(timeout: Duration, fut: Fut) -> Result<T, AgentError>
where
    Fut: Future<Output = Result<T, AgentError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| AgentError::Timeout {
            after_ms: timeout.as_millis() as u64,
        })?
}

/// [`with_timeout`] when a deadline is set, otherwise the call as is.
pub async fn bounded<T, Fut>(timeout: Option<Duration>, fut: Fut) -> Result<T, AgentError>
where
    Fut: Future<Output = Result<T, AgentError>>,
{
    match timeout {
        Some(timeout) => with_timeout(timeout, fut).await,
        None => fut.await,
    }
}

pub fn unsupported(agent: &str, request: &str) -> AgentError {
    AgentError::UnsupportedRequest {
        agent: agent.to_string(),
        request: request.to_string(),
    }
}

// -----------------------------------------------------------------------------
// Perception
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum PerceptionRequest {
    /// Read the betting round shown in one frame.
    ClassifyPhase { frame: FrameRef },
    /// Detect actions within one phase segment.
    DetectActions {
        phase: PhaseType,
        start: f64,
        end: f64,
        frames: Vec<FrameRef>,
    },
    /// Read the table at a phase boundary.
    ParseBoard { frame: FrameRef, phase: PhaseType },
    /// Summarize one player's behavior over a decision window.
    AnalyzeCues {
        player: String,
        timestamp: f64,
        frames: Vec<FrameRef>,
    },
}

impl PerceptionRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            PerceptionRequest::ClassifyPhase { .. } => "classify_phase",
            PerceptionRequest::DetectActions { .. } => "detect_actions",
            PerceptionRequest::ParseBoard { .. } => "parse_board",
            PerceptionRequest::AnalyzeCues { .. } => "analyze_cues",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseReading {
    pub phase: PhaseType,
    pub community_cards: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PerceptionReport {
    Phase(PhaseReading),
    Actions(Vec<ActionEvent>),
    Board(GameState),
    Cues(BehavioralSummary),
}

#[async_trait]
pub trait PerceptionAgent: Send + Sync {
    fn capability(&self) -> &str;

    async fn perceive(&self, request: PerceptionRequest) -> Result<PerceptionReport, AgentError>;
}

// -----------------------------------------------------------------------------
// Annotation
// -----------------------------------------------------------------------------

/// Facts the commentary states outright.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrationFacts {
    /// Player name to hole cards, when the commentators name them.
    #[serde(default)]
    pub hole_cards: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub key_moments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NarrationReport {
    pub transcript: String,
    pub events: Vec<NarratedEvent>,
    pub facts: NarrationFacts,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationRequest {
    Narration {
        audio: PathBuf,
    },
    HiddenCards {
        metadata: Option<PrivilegedMetadata>,
        narrated: BTreeMap<String, Vec<String>>,
    },
}

impl AnnotationRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            AnnotationRequest::Narration { .. } => "narration",
            AnnotationRequest::HiddenCards { .. } => "hidden_cards",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationReport {
    Narration(NarrationReport),
    HiddenCards(BTreeMap<String, PlayerFacts>),
}

#[async_trait]
pub trait AnnotationAgent: Send + Sync {
    fn capability(&self) -> &str;

    async fn annotate(&self, request: AnnotationRequest) -> Result<AnnotationReport, AgentError>;
}

// -----------------------------------------------------------------------------
// Reasoning
// -----------------------------------------------------------------------------

/// Reasoning agents see the answer-free prompt and the perception output only.
#[async_trait]
pub trait ReasoningAgent: Send + Sync {
    fn capability(&self) -> &str;

    async fn reason(
        &self,
        question: &QuestionPrompt,
        perception: &PerceptionOutput,
    ) -> Result<AgentOpinion, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn param_helpers_fall_back_to_defaults() {
        let mut params = AgentParams::new();
        params.insert("min_bet".to_string(), json!(250));
        params.insert("strict".to_string(), json!(true));
        params.insert("label".to_string(), json!("x"));
        assert_eq!(param_f64(&params, "min_bet", 100.0), 250.0);
        assert_eq!(param_usize(&params, "min_bet", 1), 250);
        assert!(param_bool(&params, "strict", false));
        assert_eq!(param_f64(&params, "missing", 7.5), 7.5);
        assert_eq!(param_str(&params, "label"), Some("x"));
    }

    #[test]
    fn context_reports_missing_models() {
        let ctx = AgentContext::new();
        let err = ctx.require_vision("board_parser").err().unwrap();
        assert_eq!(
            err,
            RegistryError::Build {
                name: "board_parser".to_string(),
                reason: "no vision model configured".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_applies_only_a_configured_deadline() {
        let slow = || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, AgentError>(7)
        };
        assert_eq!(
            bounded(Some(Duration::from_secs(2)), slow()).await,
            Err(AgentError::Timeout { after_ms: 2000 })
        );
        assert_eq!(bounded(None, slow()).await, Ok(7));

        let ctx = AgentContext::new().with_call_timeout(Duration::from_secs(2));
        assert_eq!(ctx.call_timeout, Some(Duration::from_secs(2)));
    }
}
