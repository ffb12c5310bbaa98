//! Reply streaming with soft cancellation.
//!
//! One [`StreamDispatcher::run_reply`] call drives one streamed reply: it
//! splits the token stream into sentences, hands each sentence downstream
//! as soon as it completes, and records the whole reply in memory when the
//! stream ends. The shared [`CancellationClock`] is consulted before every
//! event and again under the memory lock, so a reply superseded by a newer
//! user turn stops emitting and never reaches memory.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::clock::CancellationClock;
use super::messages::{Downstream, SegmentUnit};
use crate::llm::{CompletionBackend, CompletionRequest, ReplyEvent};
use crate::memory::TurnMemory;
use crate::text::splitter::SentenceSplitter;

/// How a reply task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The reply was recorded in memory and closed downstream (or was empty).
    Completed,
    /// A newer user turn superseded the reply.
    Cancelled,
    /// The backend or the sink failed; memory is untouched.
    Failed,
}

/// Everything a reply task needs, cheaply cloneable into spawned tasks.
#[derive(Clone)]
pub struct StreamDispatcher {
    backend: Arc<dyn CompletionBackend>,
    memory: Arc<Mutex<TurnMemory>>,
    clock: CancellationClock,
    sink: mpsc::Sender<Downstream>,
}

impl StreamDispatcher {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        memory: Arc<Mutex<TurnMemory>>,
        clock: CancellationClock,
        sink: mpsc::Sender<Downstream>,
    ) -> Self {
        Self {
            backend,
            memory,
            clock,
            sink,
        }
    }

    /// Stream a reply to `request` and emit it sentence by sentence.
    pub async fn run_reply(&self, request: CompletionRequest) -> ReplyOutcome {
        let started_at = self.clock.now();
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        info!(%request_id, backend = self.backend.name(), "reply started");

        let mut stream = match self.backend.stream(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(%request_id, "failed to open reply stream: {e}");
                return ReplyOutcome::Failed;
            }
        };

        let mut splitter = SentenceSplitter::new();
        let mut full_text = String::new();
        let mut first_sentence_logged = false;

        loop {
            let event = stream.next().await;
            if self.clock.is_outdated(started_at) {
                info!(%request_id, "reply outdated by a newer turn, stopping");
                return ReplyOutcome::Cancelled;
            }
            match event {
                Some(ReplyEvent::TextDelta { text }) => {
                    full_text.push_str(&text);
                    for sentence in splitter.push(&text) {
                        if !first_sentence_logged {
                            first_sentence_logged = true;
                            info!(
                                %request_id,
                                latency_ms = started.elapsed().as_millis(),
                                "first sentence ready"
                            );
                        }
                        debug!(%request_id, "sentence [{sentence}]");
                        if !self.emit(SegmentUnit::sentence(sentence)).await {
                            return ReplyOutcome::Failed;
                        }
                    }
                }
                Some(ReplyEvent::End) | None => break,
                Some(ReplyEvent::Error { error }) => {
                    error!(%request_id, "reply stream failed: {error}");
                    return ReplyOutcome::Failed;
                }
            }
        }

        if full_text.trim().is_empty() {
            error!(%request_id, "empty reply, nothing recorded");
            return ReplyOutcome::Completed;
        }

        {
            let mut memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
            if self.clock.is_outdated(started_at) {
                info!(%request_id, "reply outdated before it was recorded");
                return ReplyOutcome::Cancelled;
            }
            memory.append_assistant(&full_text);
        }

        if !self.emit(SegmentUnit::closing(splitter.finish())).await {
            return ReplyOutcome::Failed;
        }
        info!(
            %request_id,
            chars = full_text.chars().count(),
            elapsed_ms = started.elapsed().as_millis(),
            "reply completed"
        );
        ReplyOutcome::Completed
    }

    async fn emit(&self, unit: SegmentUnit) -> bool {
        if self.sink.send(Downstream::Segment(unit)).await.is_err() {
            warn!("downstream closed, dropping reply");
            return false;
        }
        true
    }
}
