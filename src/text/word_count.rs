//! Language-aware length measurement.

/// Primary language subtags written without word separators.
///
/// Text in these languages is measured in characters instead of words.
const CHARACTER_COUNTED: &[&str] = &["zh", "jp", "cn", "th", "lo", "km", "my", "ar", "vi"];

/// Measure `text` in the unit that matters for `language`.
///
/// Returns the character count when the primary subtag of `language`
/// (e.g. `zh` in `zh-CN`) is a scriptio-continua language, otherwise the
/// number of whitespace-separated words. An empty tag counts words.
#[must_use]
pub fn word_count(language: &str, text: &str) -> usize {
    if counts_characters(language) {
        text.chars().count()
    } else {
        text.split_whitespace().count()
    }
}

fn counts_characters(language: &str) -> bool {
    let primary = language.split(['-', '_']).next().unwrap_or_default();
    CHARACTER_COUNTED
        .iter()
        .any(|tag| tag.eq_ignore_ascii_case(primary.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chinese_counts_characters() {
        assert_eq!(word_count("zh-CN", "你好世界"), 4);
    }

    #[test]
    fn english_counts_words() {
        assert_eq!(word_count("en-US", "hello world"), 2);
    }

    #[test]
    fn primary_subtag_is_case_insensitive() {
        assert_eq!(word_count("ZH-tw", "早安"), 2);
        assert_eq!(word_count("th", "สวัสดี"), 6);
    }

    #[test]
    fn repeated_spaces_do_not_inflate_count() {
        assert_eq!(word_count("en", "  one   two three "), 3);
        assert_eq!(word_count("en", ""), 0);
    }

    #[test]
    fn empty_language_counts_words() {
        assert_eq!(word_count("", "one two three"), 3);
    }

    #[test]
    fn unknown_language_counts_words() {
        assert_eq!(word_count("de-DE", "guten Morgen"), 2);
    }
}
