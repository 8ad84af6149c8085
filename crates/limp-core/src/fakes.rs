//! In-memory model fakes for tests.
//!
//! Replies are scripted by rules matched in insertion order against the
//! image path and prompt; the first match wins.

use crate::domain::error::AgentError;
use crate::models::{LanguageModel, SpeechModel, Transcript, VisionModel};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// How a scripted call resolves.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Fail(String),
    /// Answers with the text once the delay has passed.
    Delayed(Duration, String),
    /// Never answers within any sane timeout.
    Hang,
}

impl Reply {
    pub fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }

    pub fn delayed(delay: Duration, s: impl Into<String>) -> Self {
        Reply::Delayed(delay, s.into())
    }

    async fn resolve(&self) -> Result<String, AgentError> {
        match self {
            Reply::Text(t) => Ok(t.clone()),
            Reply::Fail(e) => Err(AgentError::Model(e.clone())),
            Reply::Delayed(delay, t) => {
                tokio::time::sleep(*delay).await;
                Ok(t.clone())
            }
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(AgentError::Model("hung call resumed".to_string()))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    path_contains: Option<String>,
    prompt_contains: Option<String>,
    reply: Reply,
}

impl Rule {
    fn matches(&self, path: Option<&Path>, prompt: &str) -> bool {
        let path_ok = match (&self.path_contains, path) {
            (None, _) => true,
            (Some(needle), Some(p)) => p.to_string_lossy().contains(needle.as_str()),
            (Some(_), None) => false,
        };
        let prompt_ok = self
            .prompt_contains
            .as_ref()
            .map(|needle| prompt.contains(needle.as_str()))
            .unwrap_or(true);
        path_ok && prompt_ok
    }
}

// -----------------------------------------------------------------------------
// Vision
// -----------------------------------------------------------------------------

pub struct ScriptedVision {
    rules: Vec<Rule>,
    fallback: Reply,
    calls: Mutex<Vec<(PathBuf, String)>>,
}

impl Default for ScriptedVision {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedVision {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: Reply::Fail("no scripted reply".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Reply for images whose path contains `path` and prompts containing `prompt`.
    pub fn on(mut self, path: Option<&str>, prompt: Option<&str>, reply: Reply) -> Self {
        self.rules.push(Rule {
            path_contains: path.map(str::to_string),
            prompt_contains: prompt.map(str::to_string),
            reply,
        });
        self
    }

    pub fn otherwise(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, prompt_contains: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p.contains(prompt_contains))
            .count()
    }
}

#[async_trait]
impl VisionModel for ScriptedVision {
    fn model_name(&self) -> &str {
        "scripted-vision"
    }

    async fn describe(&self, image: &Path, prompt: &str) -> Result<String, AgentError> {
        self.calls
            .lock()
            .unwrap()
            .push((image.to_path_buf(), prompt.to_string()));
        let reply = self
            .rules
            .iter()
            .find(|r| r.matches(Some(image), prompt))
            .map(|r| r.reply.clone())
            .unwrap_or_else(|| self.fallback.clone());
        reply.resolve().await
    }
}

// -----------------------------------------------------------------------------
// Language
// -----------------------------------------------------------------------------

pub struct ScriptedLanguage {
    rules: Vec<Rule>,
    fallback: Reply,
    prompts: Mutex<Vec<String>>,
}

impl Default for ScriptedLanguage {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLanguage {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: Reply::Fail("no scripted reply".to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, prompt_contains: &str, reply: Reply) -> Self {
        self.rules.push(Rule {
            path_contains: None,
            prompt_contains: Some(prompt_contains.to_string()),
            reply,
        });
        self
    }

    pub fn otherwise(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguage {
    fn model_name(&self) -> &str {
        "scripted-language"
    }

    async fn complete(&self, prompt: &str) -> Result<String, AgentError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self
            .rules
            .iter()
            .find(|r| r.matches(None, prompt))
            .map(|r| r.reply.clone())
            .unwrap_or_else(|| self.fallback.clone());
        reply.resolve().await
    }
}

// -----------------------------------------------------------------------------
// Speech
// -----------------------------------------------------------------------------

pub struct ScriptedSpeech {
    transcript: Result<Transcript, AgentError>,
    calls: Mutex<usize>,
}

impl ScriptedSpeech {
    pub fn new(transcript: Transcript) -> Self {
        Self {
            transcript: Ok(transcript),
            calls: Mutex::new(0),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            transcript: Err(AgentError::Model(error.to_string())),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SpeechModel for ScriptedSpeech {
    fn model_name(&self) -> &str {
        "scripted-speech"
    }

    async fn transcribe(&self, _audio: &Path) -> Result<Transcript, AgentError> {
        *self.calls.lock().unwrap() += 1;
        self.transcript.clone()
    }
}
