//! Message types passed across the session boundary.

use serde::{Deserialize, Serialize};

/// A transcript update from the speech recogniser for the utterance in
/// progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptUpdate {
    /// BCP-47 style language tag (`en-US`, `zh-CN`). May be empty.
    pub language: String,
    /// Full transcript text (stable + non-stable).
    pub text: String,
    /// Prefix the recogniser asserts will not change further.
    pub stable_text: String,
    /// Trailing part still subject to revision.
    pub non_stable_text: String,
    /// Whether this is the terminal update of the utterance.
    pub is_final: bool,
}

impl TranscriptUpdate {
    /// A partial update carrying stable and non-stable text.
    pub fn partial(
        language: impl Into<String>,
        stable_text: impl Into<String>,
        non_stable_text: impl Into<String>,
    ) -> Self {
        let stable_text = stable_text.into();
        let non_stable_text = non_stable_text.into();
        Self {
            language: language.into(),
            text: format!("{stable_text}{non_stable_text}"),
            stable_text,
            non_stable_text,
            is_final: false,
        }
    }

    /// The terminal update of an utterance.
    pub fn final_text(language: impl Into<String>, stable_text: impl Into<String>) -> Self {
        let stable_text = stable_text.into();
        Self {
            language: language.into(),
            text: stable_text.clone(),
            stable_text,
            non_stable_text: String::new(),
            is_final: true,
        }
    }

    /// Whether the recogniser reported no stable/non-stable split at all.
    #[must_use]
    pub fn lacks_stability(&self) -> bool {
        self.stable_text.is_empty() && self.non_stable_text.is_empty()
    }
}

/// Chat-mode text input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatInput {
    /// The user's text.
    pub text: String,
    /// Whether the text is complete (non-final input is ignored in chat mode).
    pub is_final: bool,
}

impl ChatInput {
    /// A complete user utterance.
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// A unit of reply text handed downstream (TTS, printer).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentUnit {
    /// Sentence text (may be empty on the closing unit).
    pub text: String,
    /// Whether this unit closes the reply.
    pub end_of_segment: bool,
}

impl SegmentUnit {
    /// A completed sentence inside a reply.
    pub fn sentence(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            end_of_segment: false,
        }
    }

    /// The closing unit of a reply.
    pub fn closing(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            end_of_segment: true,
        }
    }
}

/// Everything a session sends to its downstream sink, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Downstream {
    /// Reply text.
    Segment(SegmentUnit),
    /// An interruption was accepted; drop anything queued for playback.
    Flush,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn transcript_update_parses_with_missing_fields() {
        let update: TranscriptUpdate =
            serde_json::from_str(r#"{"stable_text": "hello", "is_final": false}"#).unwrap();
        assert_eq!(update.stable_text, "hello");
        assert!(update.language.is_empty());
        assert!(!update.lacks_stability());
    }

    #[test]
    fn partial_builder_joins_text() {
        let update = TranscriptUpdate::partial("en-US", "hello ", "wor");
        assert_eq!(update.text, "hello wor");
        assert!(!update.is_final);
    }

    #[test]
    fn downstream_serializes_tagged() {
        let json = serde_json::to_value(Downstream::Segment(SegmentUnit::closing("bye"))).unwrap();
        assert_eq!(json["type"], "segment");
        assert_eq!(json["text"], "bye");
        assert_eq!(json["end_of_segment"], true);
        let json = serde_json::to_value(Downstream::Flush).unwrap();
        assert_eq!(json["type"], "flush");
    }
}
