//! A conversation session: turn intake, memory and reply tasks.
//!
//! The session owns everything one conversation needs. Intake methods
//! decide what becomes a user turn, record it, and spawn a reply task per
//! turn; reply tasks run concurrently and supersede each other through the
//! shared [`CancellationClock`].

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use super::clock::CancellationClock;
use super::commit::IncrementalCommitController;
use super::dispatcher::{ReplyOutcome, StreamDispatcher};
use super::messages::{ChatInput, Downstream, SegmentUnit, TranscriptUpdate};
use crate::config::{ParleyConfig, SessionMode};
use crate::error::{ParleyError, Result};
use crate::llm::{
    ApiLlm, ChatMessage, CompletionBackend, CompletionPunctuator, CompletionRequest,
    PunctuationBackend, RequestOptions,
};
use crate::memory::{Turn, TurnMemory};
use crate::prompts::{InputFormatter, TRANSLATION_PREFILL, TRANSLATION_STOP};

/// Handle to a spawned reply task.
pub type ReplyHandle = JoinHandle<ReplyOutcome>;

/// One conversation.
pub struct Session {
    mode: SessionMode,
    greeting: String,
    system_prompt: Option<String>,
    memory: Arc<Mutex<TurnMemory>>,
    clock: CancellationClock,
    commit: IncrementalCommitController,
    formatter: Mutex<InputFormatter>,
    dispatcher: StreamDispatcher,
    punctuator: Arc<dyn PunctuationBackend>,
    sink: mpsc::Sender<Downstream>,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Session {
    /// Create a session over explicit backends.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::Config`] if the configuration is invalid.
    pub fn new(
        config: ParleyConfig,
        backend: Arc<dyn CompletionBackend>,
        punctuator: Arc<dyn PunctuationBackend>,
        sink: mpsc::Sender<Downstream>,
    ) -> Result<Self> {
        let config = config.validate()?;
        let mode = config.session.mode;
        let memory = Arc::new(Mutex::new(TurnMemory::new(config.session.max_memory_length)));
        let clock = CancellationClock::new(config.cancel.grace());
        let dispatcher =
            StreamDispatcher::new(backend, Arc::clone(&memory), clock.clone(), sink.clone());

        info!(
            ?mode,
            max_memory_length = config.session.max_memory_length,
            grace_ms = config.cancel.grace_ms,
            "session created"
        );

        Ok(Self {
            mode,
            greeting: config.session.greeting.clone(),
            system_prompt: config.llm.effective_system_prompt(mode),
            formatter: Mutex::new(InputFormatter::new(&config.session.user_template)),
            commit: IncrementalCommitController::new(config.commit),
            memory,
            clock,
            dispatcher,
            punctuator,
            sink,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// Create a session talking to the configured OpenAI-compatible server.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn with_api(config: ParleyConfig, sink: mpsc::Sender<Downstream>) -> Result<Self> {
        let backend: Arc<dyn CompletionBackend> = Arc::new(ApiLlm::new(&config.llm)?);
        let punctuator = Arc::new(CompletionPunctuator::new(
            Arc::clone(&backend),
            config.llm.punctuation_model.clone(),
        ));
        Self::new(config, backend, punctuator, sink)
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// The clock shared by this session's reply tasks.
    pub fn clock(&self) -> &CancellationClock {
        &self.clock
    }

    /// Send the configured greeting, if any, as one closing unit.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::Channel`] if the downstream sink is closed.
    pub async fn start(&self) -> Result<()> {
        if self.greeting.is_empty() {
            return Ok(());
        }
        self.send(Downstream::Segment(SegmentUnit::closing(self.greeting.clone())))
            .await?;
        info!("greeting [{}] sent", self.greeting);
        Ok(())
    }

    /// Accept typed or otherwise pre-segmented user text.
    ///
    /// In translate mode the input is treated as a transcript without a
    /// stable split.
    pub async fn on_chat_input(&self, input: ChatInput) -> Option<ReplyHandle> {
        match self.mode {
            SessionMode::Chat => self.accept_chat_text(&input.text, input.is_final),
            SessionMode::Translate => {
                let update = TranscriptUpdate {
                    text: input.text,
                    is_final: input.is_final,
                    ..TranscriptUpdate::default()
                };
                self.accept_transcript(&update).await
            }
        }
    }

    /// Accept a speech-recognition update.
    ///
    /// Chat mode only acts on final transcripts; translate mode commits text
    /// incrementally.
    pub async fn on_transcript(&self, update: TranscriptUpdate) -> Option<ReplyHandle> {
        match self.mode {
            SessionMode::Chat => self.accept_chat_text(&update.text, update.is_final),
            SessionMode::Translate => self.accept_transcript(&update).await,
        }
    }

    /// Handle an interruption from upstream.
    ///
    /// Chat mode supersedes every running reply and forwards a flush
    /// downstream; translate mode ignores it.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::Channel`] if the downstream sink is closed.
    pub async fn flush(&self) -> Result<()> {
        if self.mode == SessionMode::Translate {
            info!("ignoring flush in translate mode");
            return Ok(());
        }
        let at = self.clock.mark_outdated();
        debug!(outdated_at = at, "flush accepted");
        self.send(Downstream::Flush).await
    }

    /// Copy of the current conversation memory.
    pub fn memory_snapshot(&self) -> Vec<Turn> {
        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .turns()
            .to_vec()
    }

    /// Stop accepting input, abandon running replies and wait for their
    /// tasks to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!("session shut down");
    }

    fn accept_chat_text(&self, text: &str, is_final: bool) -> Option<ReplyHandle> {
        if !is_final {
            debug!("ignoring non-final input");
            return None;
        }
        if text.is_empty() {
            debug!("ignoring empty input");
            return None;
        }
        self.submit_user_turn(text)
    }

    async fn accept_transcript(&self, update: &TranscriptUpdate) -> Option<ReplyHandle> {
        let text = self
            .commit
            .process(update, self.punctuator.as_ref())
            .await?;
        self.submit_user_turn(&text)
    }

    /// Record `raw` as a user turn and spawn its reply.
    fn submit_user_turn(&self, raw: &str) -> Option<ReplyHandle> {
        if self.cancel.is_cancelled() {
            debug!("session is shut down, dropping input");
            return None;
        }
        let prompt = self
            .formatter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .format(raw)?;

        if self.mode == SessionMode::Chat {
            self.clock.mark_outdated();
        }

        let messages = {
            let mut memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
            memory.append_user(&prompt);
            if self.mode == SessionMode::Translate {
                memory.append_assistant(TRANSLATION_PREFILL);
            }
            memory.to_messages()
        };
        info!(turns = messages.len(), "user turn accepted [{raw}]");

        let request = self.build_request(messages);
        let dispatcher = self.dispatcher.clone();
        let cancel = self.cancel.clone();
        Some(self.tasks.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("reply abandoned on shutdown");
                    ReplyOutcome::Cancelled
                }
                outcome = dispatcher.run_reply(request) => outcome,
            }
        }))
    }

    fn build_request(&self, history: Vec<ChatMessage>) -> CompletionRequest {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(ChatMessage::system(prompt.clone()));
        }
        messages.extend(history);
        let mut options = RequestOptions::new();
        if self.mode == SessionMode::Translate {
            options = options.with_stop(TRANSLATION_STOP);
        }
        CompletionRequest::new(messages).with_options(options)
    }

    async fn send(&self, message: Downstream) -> Result<()> {
        self.sink
            .send(message)
            .await
            .map_err(|e| ParleyError::Channel(format!("downstream closed: {e}")))
    }
}
