//! OpenAI-compatible API backend.
//!
//! Supports any server implementing the OpenAI chat completions API:
//! - Ollama (`http://localhost:11434`)
//! - vLLM, llama.cpp server, MLX server
//! - hosted providers behind a bearer token

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::sse::{SseEvent, SseLineParser};
use super::{ChatMessage, CompletionBackend, CompletionRequest, ReplyEvent, ReplyStream};
use crate::config::LlmConfig;
use crate::error::{ParleyError, Result};

/// Completion backend speaking the OpenAI chat-completions protocol.
pub struct ApiLlm {
    config: LlmConfig,
    endpoint: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for ApiLlm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiLlm")
            .field("endpoint", &self.endpoint)
            .field("model", &self.config.api_model)
            .finish()
    }
}

impl ApiLlm {
    /// Create a backend from the `[llm]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| ParleyError::Backend(format!("HTTP client setup failed: {e}")))?;

        let endpoint = completions_endpoint(&config.api_url);
        info!("API LLM configured: {endpoint} model={}", config.api_model);

        Ok(Self {
            config: config.clone(),
            endpoint,
            client,
        })
    }

    /// Build the JSON body for `request`.
    pub fn build_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let options = &request.options;
        let messages: Vec<Value> = request.messages.iter().map(message_json).collect();
        let mut body = json!({
            "model": options.model.as_deref().unwrap_or(&self.config.api_model),
            "messages": messages,
            "stream": stream,
            "temperature": options.temperature.unwrap_or(self.config.temperature),
            "top_p": options.top_p.unwrap_or(self.config.top_p),
            "max_tokens": options.max_tokens.unwrap_or(self.config.max_tokens),
        });
        if !options.stop.is_empty() {
            body["stop"] = json!(options.stop);
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let mut req = self.client.post(&self.endpoint).json(body);
        if !self.config.api_key.is_empty() {
            req = req.bearer_auth(&self.config.api_key);
        }
        let response = req
            .send()
            .await
            .map_err(|e| ParleyError::Backend(format!("API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ParleyError::Backend(format!(
                "API HTTP {}: {}",
                status.as_u16(),
                extract_error_message(&body_text)
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionBackend for ApiLlm {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = self.build_body(request, false);
        let response = self.post(&body).await?;
        let text = response
            .text()
            .await
            .map_err(|e| ParleyError::Backend(format!("failed to read completion body: {e}")))?;
        let value: Value = serde_json::from_str(&text)?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| ParleyError::Backend(format!("completion without content: {value}")))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ReplyStream> {
        let body = self.build_body(request, true);
        let response = self.post(&body).await?;
        debug!("reply stream opened");
        Ok(Box::pin(reply_events(response.bytes_stream())))
    }
}

/// `{base}/v1/chat/completions`, tolerating a base that already ends in `/v1`.
fn completions_endpoint(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);
    format!("{base}/v1/chat/completions")
}

fn message_json(message: &ChatMessage) -> Value {
    let content = match message.content.as_slice() {
        [single] => json!(single),
        parts => json!(
            parts
                .iter()
                .map(|text| json!({"type": "text", "text": text}))
                .collect::<Vec<_>>()
        ),
    };
    json!({ "role": message.role, "content": content })
}

/// Extract an error message from an OpenAI-style error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_owned())
}

/// Translate one SSE payload into reply events.
fn parse_chunk(event: &SseEvent) -> Vec<ReplyEvent> {
    if event.is_done() {
        return vec![ReplyEvent::End];
    }
    if event.event_type.as_deref() == Some("error") {
        return vec![ReplyEvent::Error {
            error: extract_error_message(&event.data),
        }];
    }
    let value: Value = match serde_json::from_str(&event.data) {
        Ok(v) => v,
        Err(e) => {
            return vec![ReplyEvent::Error {
                error: format!("malformed stream chunk: {e}"),
            }];
        }
    };
    if let Some(message) = value["error"]["message"].as_str() {
        return vec![ReplyEvent::Error {
            error: message.to_owned(),
        }];
    }

    let mut events = Vec::new();
    let choice = &value["choices"][0];
    if let Some(text) = choice["delta"]["content"].as_str()
        && !text.is_empty()
    {
        events.push(ReplyEvent::TextDelta {
            text: text.to_owned(),
        });
    }
    if choice["finish_reason"].as_str().is_some() {
        events.push(ReplyEvent::End);
    }
    events
}

struct StreamState {
    bytes: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    parser: SseLineParser,
    buffered: std::collections::VecDeque<ReplyEvent>,
    finished: bool,
}

/// Turn an SSE byte stream into reply events. The stream ends after the
/// first `End` or `Error`; a connection closed without either ends with
/// `End`.
fn reply_events(
    bytes: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> impl Stream<Item = ReplyEvent> + Send {
    let state = StreamState {
        bytes: Box::pin(bytes),
        parser: SseLineParser::new(),
        buffered: std::collections::VecDeque::new(),
        finished: false,
    };
    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            if let Some(event) = state.buffered.pop_front() {
                if matches!(event, ReplyEvent::End | ReplyEvent::Error { .. }) {
                    state.finished = true;
                }
                return Some((event, state));
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for sse in state.parser.push(&chunk) {
                        state.buffered.extend(parse_chunk(&sse));
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    let error = ReplyEvent::Error {
                        error: ParleyError::Stream(e.to_string()).to_string(),
                    };
                    return Some((error, state));
                }
                None => {
                    if let Some(sse) = state.parser.flush() {
                        state.buffered.extend(parse_chunk(&sse));
                    }
                    // The buffer now ends in a terminal event, so the
                    // byte stream is never polled again.
                    state.buffered.push_back(ReplyEvent::End);
                }
            }
        }
    })
}
