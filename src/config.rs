//! Configuration types for a parley session.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::error::{ParleyError, Result};
use crate::prompts;
use crate::text::align::AlignmentMode;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    /// Conversation mode, memory and templating.
    pub session: SessionConfig,
    /// Translation-mode commit thresholds.
    pub commit: CommitConfig,
    /// Barge-in cancellation.
    pub cancel: CancelConfig,
    /// Completion backend connection and sampling.
    pub llm: LlmConfig,
}

/// What the session does with user input.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Final utterances become chat turns; replies are streamed back.
    #[default]
    Chat,
    /// Partial transcripts are committed incrementally and translated.
    Translate,
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: SessionMode,
    /// Maximum turns kept in conversation memory after each trim.
    pub max_memory_length: usize,
    /// Sent downstream as one closing unit when the session starts.
    pub greeting: String,
    /// Source language (translate mode only).
    pub input_language: String,
    /// Target language (translate mode only).
    pub output_language: String,
    /// Template wrapped around each user input; `{input_text}` marks the
    /// input. Translate mode falls back to the built-in template.
    pub user_template: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::default(),
            max_memory_length: 10,
            greeting: String::new(),
            input_language: String::new(),
            output_language: String::new(),
            user_template: String::new(),
        }
    }
}

/// Thresholds for invoking the punctuation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Minimum uncommitted length (words or characters) before asking the
    /// punctuation service.
    pub min_length: usize,
    /// After a failed reconciliation, how many more words must arrive
    /// before retrying.
    pub min_new_words: usize,
    /// How strictly a punctuation answer must match the source text.
    pub alignment: AlignmentMode,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            min_new_words: 6,
            alignment: AlignmentMode::default(),
        }
    }
}

/// Soft-cancellation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CancelConfig {
    /// Interrupts landing within this window after a reply started do not
    /// cancel it.
    pub grace_ms: u64,
}

impl Default for CancelConfig {
    fn default() -> Self {
        Self { grace_ms: 100 }
    }
}

impl CancelConfig {
    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Completion backend settings (OpenAI-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the server (with or without a trailing `/v1`).
    pub api_url: String,
    /// Model requested for replies.
    pub api_model: String,
    /// Bearer token; empty for local servers.
    pub api_key: String,
    /// Model used for punctuation requests (defaults to `api_model`).
    #[serde(default)]
    pub punctuation_model: Option<String>,
    /// System prompt. Empty uses the built-in chat prompt in chat mode and
    /// no system prompt in translate mode.
    pub system_prompt: String,
    pub temperature: f64,
    pub top_p: f64,
    /// Maximum tokens generated per reply.
    pub max_tokens: usize,
    /// Whole-request timeout for the HTTP client (0 disables it).
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            // Ollama default endpoint.
            api_url: "http://localhost:11434".to_owned(),
            api_model: "llama3.2:3b".to_owned(),
            api_key: String::new(),
            punctuation_model: None,
            system_prompt: String::new(),
            temperature: 0.1,
            top_p: 1.0,
            max_tokens: 512,
            request_timeout_secs: 0,
        }
    }
}

impl LlmConfig {
    /// The system prompt actually sent for `mode`, if any.
    #[must_use]
    pub fn effective_system_prompt(&self, mode: SessionMode) -> Option<String> {
        let custom = self.system_prompt.trim();
        if !custom.is_empty() {
            return Some(custom.to_owned());
        }
        match mode {
            SessionMode::Chat => Some(prompts::DEFAULT_CHAT_SYSTEM_PROMPT.to_owned()),
            SessionMode::Translate => None,
        }
    }
}

impl ParleyConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ParleyError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ParleyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/parley/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("parley").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("parley")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/parley-config/config.toml")
        }
    }

    /// Check mode-dependent settings and resolve the effective user template.
    ///
    /// # Errors
    ///
    /// Returns an error when translate mode is missing a language.
    pub fn validate(mut self) -> Result<Self> {
        match self.session.mode {
            SessionMode::Translate => {
                let session = &mut self.session;
                if session.input_language.trim().is_empty()
                    || session.output_language.trim().is_empty()
                {
                    return Err(ParleyError::Config(
                        "input_language and output_language must be set in translate mode"
                            .to_owned(),
                    ));
                }
                if session.user_template.trim().is_empty() {
                    warn!("user_template is not set, using the built-in translate template");
                    session.user_template = prompts::DEFAULT_TRANSLATE_TEMPLATE.to_owned();
                }
                session.user_template = prompts::fill_languages(
                    &session.user_template,
                    &session.input_language,
                    &session.output_language,
                );
            }
            SessionMode::Chat => {
                if !self.session.user_template.trim().is_empty() {
                    warn!("user_template is ignored in chat mode");
                    self.session.user_template.clear();
                }
            }
        }
        if self.llm.top_p <= 0.0 || self.llm.top_p > 1.0 {
            return Err(ParleyError::Config(format!(
                "llm.top_p must be in (0, 1], got {}",
                self.llm.top_p
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(ParleyError::Config("llm.max_tokens must be positive".to_owned()));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn defaults_match_tuned_heuristics() {
        let config = ParleyConfig::default();
        assert_eq!(config.session.mode, SessionMode::Chat);
        assert_eq!(config.session.max_memory_length, 10);
        assert_eq!(config.commit.min_length, 8);
        assert_eq!(config.commit.min_new_words, 6);
        assert_eq!(config.commit.alignment, AlignmentMode::Lenient);
        assert_eq!(config.cancel.grace(), Duration::from_millis(100));
        assert!(config.llm.max_tokens > 0);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
[session]
mode = "translate"
input_language = "en-US"
output_language = "zh-CN"

[commit]
min_length = 4
alignment = "strict"
"#;
        let config: ParleyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.session.mode, SessionMode::Translate);
        assert_eq!(config.commit.min_length, 4);
        assert_eq!(config.commit.min_new_words, 6);
        assert_eq!(config.commit.alignment, AlignmentMode::Strict);
        assert_eq!(config.cancel.grace_ms, 100);
    }

    #[test]
    fn unknown_mode_fails_to_parse() {
        let result: std::result::Result<ParleyConfig, _> =
            toml::from_str("[session]\nmode = \"dictate\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn translate_requires_languages() {
        let mut config = ParleyConfig::default();
        config.session.mode = SessionMode::Translate;
        config.session.input_language = "en-US".into();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ParleyError::Config(_)));
    }

    #[test]
    fn translate_fills_default_template() {
        let mut config = ParleyConfig::default();
        config.session.mode = SessionMode::Translate;
        config.session.input_language = "en-US".into();
        config.session.output_language = "ja-JP".into();
        let config = config.validate().unwrap();
        assert!(config.session.user_template.contains(r#"into "ja-JP""#));
        assert!(config.session.user_template.contains("{input_text}"));
    }

    #[test]
    fn chat_mode_drops_template() {
        let mut config = ParleyConfig::default();
        config.session.user_template = "say {input_text}".into();
        let config = config.validate().unwrap();
        assert!(config.session.user_template.is_empty());
    }

    #[test]
    fn system_prompt_depends_on_mode() {
        let llm = LlmConfig::default();
        assert!(llm.effective_system_prompt(SessionMode::Chat).is_some());
        assert!(llm.effective_system_prompt(SessionMode::Translate).is_none());
        let llm = LlmConfig {
            system_prompt: "be brief".into(),
            ..Default::default()
        };
        assert_eq!(
            llm.effective_system_prompt(SessionMode::Translate).as_deref(),
            Some("be brief")
        );
    }

    #[test]
    fn invalid_top_p_is_rejected() {
        let mut config = ParleyConfig::default();
        config.llm.top_p = 1.5;
        assert!(config.validate().is_err());
    }
}
