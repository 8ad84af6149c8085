pub mod openai;

pub use openai::{context_from_settings, LlmError, OpenAiChat, OpenAiClient, OpenAiSpeech};
