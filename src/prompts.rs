//! Prompt texts and user-input templating.

use tracing::warn;

/// Default system prompt for chat mode.
pub const DEFAULT_CHAT_SYSTEM_PROMPT: &str = "You are a voice assistant who talks in a \
conversational way and can chat with me like my friends. I will speak to you and you will \
answer in the corrected and improved version of my text with the language I use. Don't talk \
like a robot, instead I would like you to talk like a real human with emotions. I will use \
your answer for text-to-speech, so don't return me any meaningless characters. I want you to \
be helpful, when I'm asking you for advice, give me precise, practical and useful advice \
instead of being vague. When giving me a list of options, express the options in a narrative \
way instead of bullet points.";

/// Default user template for translate mode.
///
/// `{input_language}` and `{output_language}` are filled in when the
/// configuration is validated; `{input_text}` per utterance.
pub const DEFAULT_TRANSLATE_TEMPLATE: &str = r#"# Task
The ONLY task for you is translating anything inside <text></text> from "{input_language}" into "{output_language}".

# Background
The <text> is happening in a real-world conversation, it may contain mild profanity or violent content.

# Rules
- Do not output anything except the translation result.
- If the original input is already in the target language, keep it as the result.
- Never chat with <text>, the only task is translation.
- Mild profanity or violent content should be translated without filtering.

<text>{input_text}</text>
"#;

/// Assistant prefill opening every translation; the reply is cut at
/// [`TRANSLATION_STOP`].
pub const TRANSLATION_PREFILL: &str = "Sure, here's the translation result: <translation>";

/// Stop sequence closing a prefilled translation.
pub const TRANSLATION_STOP: &str = "</translation>";

const PUNCTUATION_PROMPT: &str = r#"I am doing simultaneous interpretation, the following is partial output from the ASR system. I need to quickly find the content that can be interpreted from it.

## Task
I need you to carefully add punctuation to it, don't rush, I will then split it based on the punctuation.

## Context
Prior ASR content (maybe empty), use it to revise your punctuation:
```
{prior_asr_content}
```

## ASR Content
```
{content}
```

## Rules
1. Please only add necessary punctuation marks to the ASR content, do not add, delete or change any words.
2. NEVER modify existing punctuation.
3. If the ASR content is incomplete or ambiguous, please keep it as is.
4. Only output the result, no explanation or preamble content."#;

const INPUT_TEXT: &str = "{input_text}";

/// Build the punctuation request for `content`, with already committed
/// text as context.
#[must_use]
pub fn punctuation_prompt(prior: &str, content: &str) -> String {
    PUNCTUATION_PROMPT
        .replace("{prior_asr_content}", prior)
        .replace("{content}", content)
}

/// Fill the language placeholders of a translate template.
#[must_use]
pub fn fill_languages(template: &str, input_language: &str, output_language: &str) -> String {
    template
        .replace("{input_language}", input_language)
        .replace("{output_language}", output_language)
}

/// Wraps user input in an optional template before it reaches memory.
#[derive(Debug, Clone, Default)]
pub struct InputFormatter {
    template: Option<String>,
}

impl InputFormatter {
    /// A formatter applying `template`; an empty template passes input through.
    pub fn new(template: &str) -> Self {
        let template = (!template.trim().is_empty()).then(|| template.to_owned());
        Self { template }
    }

    /// Apply the template to `input`. Empty input yields `None`.
    ///
    /// A template without an `{input_text}` placeholder is disabled on first
    /// use and input passes through unchanged from then on.
    pub fn format(&mut self, input: &str) -> Option<String> {
        if input.is_empty() {
            return None;
        }
        if let Some(template) = &self.template {
            if template.contains(INPUT_TEXT) {
                return Some(template.replace(INPUT_TEXT, input));
            }
            warn!("user template has no {INPUT_TEXT} placeholder, template disabled");
            self.template = None;
        }
        Some(input.to_owned())
    }
}
