//! Translation-mode commit controller.
//!
//! Decides, from a rolling partial transcript, how much text is safe to hand
//! to the translator now. Text already ending in punctuation is committed
//! directly; otherwise a punctuation service is asked to segment the
//! uncommitted tail, and its answer is reconciled against the transcript
//! before anything is committed.

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::CommitConfig;
use crate::llm::PunctuationBackend;
use crate::pipeline::messages::TranscriptUpdate;
use crate::text::align::align;
use crate::text::punctuation::{
    contains_punctuation, content_before_last_punctuation, remove_trailing_punctuation,
};
use crate::text::word_count::word_count;

/// Per-utterance commit bookkeeping.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommitState {
    /// Stable text already handed on, as a character prefix of the stable
    /// transcript.
    pub committed_text: String,
    /// Length of the uncommitted text when the punctuation service last
    /// produced nothing usable (0 after a success).
    pub last_failed_length: usize,
    /// Language of the most recent update that carried one.
    pub language: String,
}

impl CommitState {
    fn reset(&mut self) {
        self.committed_text.clear();
        self.last_failed_length = 0;
    }
}

/// Single-flight commit state machine for one translation session.
#[derive(Debug, Default)]
pub struct IncrementalCommitController {
    config: CommitConfig,
    state: Mutex<CommitState>,
}

impl IncrementalCommitController {
    pub fn new(config: CommitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CommitState::default()),
        }
    }

    /// Snapshot of the current bookkeeping, or `None` while an update is in
    /// flight.
    pub fn state(&self) -> Option<CommitState> {
        self.state.try_lock().ok().map(|state| state.clone())
    }

    /// Process one transcript update and return the text to commit, if any.
    ///
    /// Updates arriving while another one is still being processed are
    /// dropped.
    pub async fn process(
        &self,
        update: &TranscriptUpdate,
        punctuator: &dyn PunctuationBackend,
    ) -> Option<String> {
        let Ok(mut state) = self.state.try_lock() else {
            info!("commit already in progress, skipping update");
            return None;
        };
        if !update.language.is_empty() {
            state.language.clone_from(&update.language);
        }

        if update.lacks_stability() {
            debug!("update without stable split");
            if !update.is_final {
                return None;
            }
            state.reset();
            return (!update.text.is_empty()).then(|| update.text.clone());
        }

        let remainder: String = update
            .stable_text
            .chars()
            .skip(state.committed_text.chars().count())
            .collect();

        // Every final update closes the utterance, even one with no stable text.
        if update.is_final {
            state.reset();
            info!("final transcript, committing remainder [{remainder}]");
            return (!remainder.is_empty()).then_some(remainder);
        }
        if remainder.is_empty() {
            return None;
        }

        if let Some(prefix) = content_before_last_punctuation(&remainder) {
            info!("punctuation found in transcript, committing without the service");
            state.committed_text.push_str(prefix);
            return Some(prefix.to_owned());
        }

        if contains_punctuation(&update.non_stable_text) {
            debug!("punctuation in non-stable text, waiting for it to stabilise");
            return None;
        }

        let length = word_count(&state.language, &remainder);
        if !self.should_punctuate(length, state.last_failed_length) {
            return None;
        }

        info!(
            language = %state.language,
            length,
            "asking punctuation service to segment [{remainder}]"
        );
        let answer = match punctuator.punctuate(&state.committed_text, &remainder).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("punctuation request failed: {e}");
                state.last_failed_length = length;
                return None;
            }
        };
        let answer = remove_trailing_punctuation(answer.trim());
        info!("punctuation answer [{answer}]");

        let alignment = align(&remainder, answer, self.config.alignment);
        if alignment.is_empty() {
            state.last_failed_length = length;
            return None;
        }
        state.last_failed_length = 0;
        state.committed_text.push_str(&alignment.consumed);
        Some(alignment.punctuated)
    }

    fn should_punctuate(&self, length: usize, last_failed_length: usize) -> bool {
        length >= self.config.min_length
            && length.saturating_sub(last_failed_length) > self.config.min_new_words
    }
}
