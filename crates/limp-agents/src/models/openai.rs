//! OpenAI-compatible HTTP client for chat, vision and transcription.
//!
//! Works against any server exposing `/chat/completions` and
//! `/audio/transcriptions` under `base_url`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use limp_core::{
    AgentContext, AgentError, LanguageModel, ModelSettings, SpeechModel, Transcript, VisionModel,
};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Errors from model API calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("missing API key: {0}")]
    MissingApiKey(String),

    #[error("cannot read {path}: {reason}")]
    Input { path: String, reason: String },
}

impl From<LlmError> for AgentError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(after_ms) => AgentError::Timeout { after_ms },
            LlmError::InvalidResponse(m) => AgentError::MalformedResponse(m),
            LlmError::Input { path, reason } => AgentError::MissingInput(format!("{path}: {reason}")),
            other => AgentError::Model(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Shared HTTP client; model handles borrow it through an `Arc`.
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn with_base_url(api_key: String, base_url: String, timeout: Duration) -> Result<Self, LlmError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_settings(settings: &ModelSettings, timeout: Duration) -> Result<Self, LlmError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| LlmError::MissingApiKey("LLM_API_KEY not set".into()))?;
        Self::with_base_url(api_key, settings.base_url.clone(), timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn classify(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(self.timeout.as_millis() as u64)
        } else {
            LlmError::Http(err)
        }
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
        let status = response.status().as_u16();
        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(LlmError::RateLimited { retry_after });
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_else(|_| "(no body)".into());
            return Err(LlmError::ApiError {
                status,
                message: body,
            });
        }
        Ok(response)
    }

    /// JSON-mode chat completion at temperature 0.
    pub async fn chat(&self, model: &str, content: Value) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": model,
            "temperature": 0.0,
            "response_format": {"type": "json_object"},
            "messages": [{"role": "user", "content": content}],
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let response = self.check(response).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("no message content".into()))
    }

    pub async fn transcribe(&self, model: &str, audio: &Path) -> Result<Transcript, LlmError> {
        let bytes = tokio::fs::read(audio).await.map_err(|e| LlmError::Input {
            path: audio.display().to_string(),
            reason: e.to_string(),
        })?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());
        let part = Part::bytes(bytes).file_name(file_name).mime_str("audio/wav")?;
        let form = Form::new()
            .text("model", model.to_string())
            .text("response_format", "verbose_json")
            .text("language", "en")
            .part("file", part);

        let url = format!("{}/audio/transcriptions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let response = self.check(response).await?;
        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("failed to parse transcript: {e}")))
    }
}

fn image_mime(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Encode an image as a `data:` URL for inline vision requests.
pub async fn data_url(path: &Path) -> Result<String, LlmError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| LlmError::Input {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(format!("data:{};base64,{}", image_mime(path), BASE64.encode(bytes)))
}

/// One chat model served by an [`OpenAiClient`], usable for text and images.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    client: Arc<OpenAiClient>,
    model: String,
}

impl OpenAiChat {
    pub fn new(client: Arc<OpenAiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, AgentError> {
        Ok(self.client.chat(&self.model, json!(prompt)).await?)
    }
}

#[async_trait]
impl VisionModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn describe(&self, image: &Path, prompt: &str) -> Result<String, AgentError> {
        let url = data_url(image).await?;
        let content = json!([
            {"type": "text", "text": prompt},
            {"type": "image_url", "image_url": {"url": url}},
        ]);
        Ok(self.client.chat(&self.model, content).await?)
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    client: Arc<OpenAiClient>,
    model: String,
}

impl OpenAiSpeech {
    pub fn new(client: Arc<OpenAiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl SpeechModel for OpenAiSpeech {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn transcribe(&self, audio: &Path) -> Result<Transcript, AgentError> {
        Ok(self.client.transcribe(&self.model, audio).await?)
    }
}

/// Model handles for every agent, all served by one client.
pub fn context_from_settings(settings: &ModelSettings, timeout: Duration) -> Result<AgentContext, LlmError> {
    let client = Arc::new(OpenAiClient::from_settings(settings, timeout)?);
    Ok(AgentContext::new()
        .with_language(Arc::new(OpenAiChat::new(client.clone(), &settings.llm_model)))
        .with_vision(Arc::new(OpenAiChat::new(client.clone(), &settings.vlm_model)))
        .with_speech(Arc::new(OpenAiSpeech::new(client, &settings.asr_model))))
}
