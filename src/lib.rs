//! Parley: turn-taking control for streamed voice conversations.
//!
//! This crate sits between a speech recogniser and a speech synthesiser and
//! decides what the language model sees and when:
//! Transcript → commit → memory → streamed reply → sentences → downstream
//!
//! # Architecture
//!
//! - **Commit**: in translate mode, partial transcripts are committed
//!   incrementally, punctuated by a completion service when needed
//! - **Memory**: bounded, role-alternating turn buffer
//! - **Dispatch**: one task per reply, split into sentences as tokens arrive
//! - **Cancellation**: a shared clock lets newer turns supersede older
//!   replies without aborting tasks
//! - **Backend**: any OpenAI-compatible chat-completions server

pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod pipeline;
pub mod prompts;
pub mod text;

pub use config::{ParleyConfig, SessionMode};
pub use error::{ParleyError, Result};
pub use pipeline::dispatcher::ReplyOutcome;
pub use pipeline::messages::{ChatInput, Downstream, SegmentUnit, TranscriptUpdate};
pub use pipeline::session::Session;
