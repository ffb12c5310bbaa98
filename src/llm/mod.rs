//! Completion backend contracts.
//!
//! The session talks to language models only through [`CompletionBackend`]
//! (whole answers and live token streams) and [`PunctuationBackend`]
//! (translation-mode punctuation). [`api::ApiLlm`] implements the former
//! for any OpenAI-compatible server; [`CompletionPunctuator`] derives the
//! latter from any completion backend.

pub mod api;
pub mod sse;

pub use api::ApiLlm;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::prompts;

/// Role of a message sent to a completion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A message in provider-neutral form. Content is an ordered list of text
/// segments, as stored in conversation memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<String>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: vec![text.into()],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: vec![text.into()],
        }
    }
}

/// Per-request overrides. Unset fields fall back to the backend's defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<usize>,
    pub stop: Vec<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }
}

/// A completion request: ordered messages plus options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub options: RequestOptions,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            options: RequestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// A normalized event from a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    /// A chunk of generated text.
    TextDelta { text: String },
    /// The reply finished normally.
    End,
    /// The backend reported an error mid-stream.
    Error { error: String },
}

/// A boxed, lazy, non-restartable stream of reply events.
pub type ReplyStream = Pin<Box<dyn Stream<Item = ReplyEvent> + Send>>;

/// A chat/translation completion service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Request a complete, non-streamed answer.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Request a streamed answer.
    async fn stream(&self, request: &CompletionRequest) -> Result<ReplyStream>;
}

/// A service that inserts punctuation into raw ASR text.
#[async_trait]
pub trait PunctuationBackend: Send + Sync {
    /// Punctuate `text`, given the already committed text for context.
    async fn punctuate(&self, prior: &str, text: &str) -> Result<String>;
}

/// Token cap for punctuation answers; they echo a short fragment.
const PUNCTUATION_MAX_TOKENS: usize = 100;

/// [`PunctuationBackend`] backed by a completion service and the
/// punctuation prompt.
pub struct CompletionPunctuator {
    backend: Arc<dyn CompletionBackend>,
    model: Option<String>,
}

impl CompletionPunctuator {
    /// Punctuate with `backend`, optionally on a different (cheaper) `model`.
    pub fn new(backend: Arc<dyn CompletionBackend>, model: Option<String>) -> Self {
        Self { backend, model }
    }

    fn request(&self, prior: &str, text: &str) -> CompletionRequest {
        let mut options = RequestOptions::new()
            .with_temperature(0.0)
            .with_max_tokens(PUNCTUATION_MAX_TOKENS);
        options.model = self.model.clone();
        CompletionRequest::new(vec![ChatMessage::user(prompts::punctuation_prompt(
            prior, text,
        ))])
        .with_options(options)
    }
}

#[async_trait]
impl PunctuationBackend for CompletionPunctuator {
    async fn punctuate(&self, prior: &str, text: &str) -> Result<String> {
        self.backend.complete(&self.request(prior, text)).await
    }
}
