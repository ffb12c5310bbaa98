//! Incremental sentence splitting for streamed replies.

use super::punctuation::is_punctuation;

/// One step of sentence accumulation.
///
/// Appends characters of `delta` to `pending` until the first punctuation
/// mark, which is kept at the end of the returned sentence. Characters after
/// the mark are returned as the remainder. Returns `(sentence, remainder,
/// true)` when a boundary was found; otherwise `(accumulated, "", false)`
/// and the caller keeps `accumulated` as its new pending text.
#[must_use]
pub fn parse_sentence(pending: &str, delta: &str) -> (String, String, bool) {
    match delta.char_indices().find(|(_, c)| is_punctuation(*c)) {
        Some((at, mark)) => {
            let split = at + mark.len_utf8();
            let mut sentence = String::with_capacity(pending.len() + split);
            sentence.push_str(pending);
            sentence.push_str(&delta[..split]);
            (sentence, delta[split..].to_owned(), true)
        }
        None => {
            let mut accumulated = String::with_capacity(pending.len() + delta.len());
            accumulated.push_str(pending);
            accumulated.push_str(delta);
            (accumulated, String::new(), false)
        }
    }
}

/// Sentence buffer owned by a single reply task.
///
/// Feed deltas with [`push`](Self::push); each call returns the sentences
/// completed by that delta, in arrival order.
#[derive(Debug, Default)]
pub struct SentenceSplitter {
    pending: String,
}

impl SentenceSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a delta and return every sentence it completes.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut rest = delta.to_owned();
        loop {
            let (sentence, remainder, complete) = parse_sentence(&self.pending, &rest);
            if !complete {
                self.pending = sentence;
                break;
            }
            self.pending.clear();
            sentences.push(sentence);
            rest = remainder;
        }
        sentences
    }

    /// Text received since the last completed sentence.
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Take the pending partial sentence, leaving the buffer empty.
    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }
}
