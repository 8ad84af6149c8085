//! Seams to the external vision, language and speech models.
//!
//! Agents hold these as `Arc<dyn ...>` handed over through
//! [`AgentContext`](crate::agent::AgentContext); the pipeline wraps each call
//! an agent makes for one unit of work in a timeout.

use crate::domain::error::AgentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[async_trait]
pub trait VisionModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Answer `prompt` about a single image. Returns the raw model text.
    async fn describe(&self, image: &Path, prompt: &str) -> Result<String, AgentError>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Deterministic (temperature 0) JSON-mode completion.
    async fn complete(&self, prompt: &str) -> Result<String, AgentError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

#[async_trait]
pub trait SpeechModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn transcribe(&self, audio: &Path) -> Result<Transcript, AgentError>;
}
