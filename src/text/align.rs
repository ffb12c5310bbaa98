//! Reconciliation of a machine-punctuated answer against its source text.
//!
//! The punctuation service receives unpunctuated ASR text and answers with
//! the same words plus punctuation, but the answer may be truncated, echo
//! the input imperfectly, or drift. [`align`] recovers the longest prefix of
//! the source that the answer reproduces faithfully, together with the
//! punctuated form of that prefix. Words are never invented or reordered.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::punctuation::{is_punctuation, strip_punctuation_and_spaces};

/// How strictly the answer must match the source text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentMode {
    /// Accept the longest faithfully reproduced prefix.
    #[default]
    Lenient,
    /// Accept only an answer identical to the source once punctuation and
    /// spaces are removed.
    Strict,
}

/// Result of reconciling one punctuation answer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alignment {
    /// Prefix of the source text that the answer covers.
    pub consumed: String,
    /// The answer's punctuated rendering of `consumed`.
    pub punctuated: String,
}

impl Alignment {
    /// Whether nothing could be attributed to the source.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }
}

/// Align `answer` against `source`.
///
/// An answer that is not strictly longer than the source (in characters)
/// cannot carry any added punctuation and is rejected outright.
#[must_use]
pub fn align(source: &str, answer: &str, mode: AlignmentMode) -> Alignment {
    if answer.chars().count() <= source.chars().count() {
        return Alignment::default();
    }
    match mode {
        AlignmentMode::Lenient => align_lenient(source, answer),
        AlignmentMode::Strict => align_strict(source, answer),
    }
}

fn align_strict(source: &str, answer: &str) -> Alignment {
    let expected = strip_punctuation_and_spaces(source);
    let received = strip_punctuation_and_spaces(answer);
    if expected != received {
        warn!("punctuated answer [{received}] does not match source [{expected}], dropping it");
        return Alignment::default();
    }
    Alignment {
        consumed: source.to_owned(),
        punctuated: answer.to_owned(),
    }
}

fn align_lenient(source: &str, answer: &str) -> Alignment {
    let source_chars: Vec<char> = source.chars().collect();
    let mut cursor = 0usize;
    let mut consumed = 0usize;
    // Byte offset just past the last accepted answer character.
    let mut punctuated_end = 0usize;

    for (at, c) in answer.char_indices() {
        let matches_source = source_chars.get(cursor).is_some_and(|expected| *expected == c);
        if matches_source {
            cursor += 1;
            consumed = cursor;
            punctuated_end = at + c.len_utf8();
        } else if is_punctuation(c) {
            punctuated_end = at + c.len_utf8();
        } else {
            break;
        }
    }

    if consumed == 0 {
        return Alignment::default();
    }
    Alignment {
        consumed: source_chars[..consumed].iter().collect(),
        punctuated: answer[..punctuated_end].to_owned(),
    }
}
