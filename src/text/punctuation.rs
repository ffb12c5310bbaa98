//! The sentence-terminating punctuation set and helpers built on it.
//!
//! Every boundary decision in the crate (sentence splitting, commit points,
//! prefix alignment) uses the same fixed set of ASCII and full-width marks.

/// Characters that terminate a sentence or clause unit.
pub const PUNCTUATIONS: [char; 8] = [',', '，', '.', '。', '?', '？', '!', '！'];

/// Whether `c` is a unit-terminating punctuation mark.
#[must_use]
pub fn is_punctuation(c: char) -> bool {
    PUNCTUATIONS.contains(&c)
}

/// Whether `text` contains any punctuation mark.
#[must_use]
pub fn contains_punctuation(text: &str) -> bool {
    text.chars().any(is_punctuation)
}

/// Strip every trailing punctuation mark from `text`.
///
/// Idempotent: applying it twice gives the same result as applying it once.
#[must_use]
pub fn remove_trailing_punctuation(text: &str) -> &str {
    text.trim_end_matches(is_punctuation)
}

/// Split `text` after its last punctuation mark.
///
/// Scans backwards for the last mark and returns the prefix up to and
/// including it, extended over any spaces that follow (the final character
/// of `text` is never swallowed this way). Returns `None` when `text` has no
/// punctuation.
#[must_use]
pub fn content_before_last_punctuation(text: &str) -> Option<&str> {
    let (mark_at, mark) = text.char_indices().rev().find(|(_, c)| is_punctuation(*c))?;
    let mut end = mark_at + mark.len_utf8();
    // A trailing run of spaces stays uncommitted until more text follows it.
    let last_char_start = text.char_indices().next_back().map_or(0, |(i, _)| i);
    while end < last_char_start && text[end..].starts_with(' ') {
        end += 1;
    }
    Some(&text[..end])
}

/// Remove every punctuation mark and space, for punctuation-insensitive
/// comparison.
#[must_use]
pub fn strip_punctuation_and_spaces(text: &str) -> String {
    text.chars()
        .filter(|c| *c != ' ' && !is_punctuation(*c))
        .collect()
}
