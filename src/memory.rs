//! Bounded, role-alternating conversation memory.
//!
//! Completion services expect a conversation to start with a user turn and
//! to alternate roles. [`TurnMemory`] keeps that shape structurally: the
//! buffer is trimmed before every append, consecutive user input is merged
//! into one turn, and replies are merged into a trailing assistant turn.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::{ChatMessage, ChatRole};

/// Speaker of a stored turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One stored turn: a role and its ordered text segments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: Vec<String>,
}

impl Turn {
    fn new(role: Role, text: &str) -> Self {
        Self {
            role,
            content: vec![text.to_owned()],
        }
    }
}

/// Conversation buffer shared by one session.
#[derive(Debug, Clone)]
pub struct TurnMemory {
    turns: Vec<Turn>,
    max_turns: usize,
}

impl TurnMemory {
    /// Create an empty memory holding at most `max_turns` turns after each trim.
    #[must_use]
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns,
        }
    }

    /// Drop turns from the front until the buffer fits and starts with a user turn.
    pub fn trim(&mut self) {
        let mut dropped = 0usize;
        while let Some(front) = self.turns.first() {
            if self.turns.len() > self.max_turns {
                debug!("dropping oldest turn, memory length limit {}", self.max_turns);
            } else if front.role == Role::Assistant {
                debug!("dropping leading assistant turn");
            } else {
                break;
            }
            dropped += 1;
            self.turns.remove(0);
        }
        if dropped > 0 {
            debug!(dropped, remaining = self.turns.len(), "memory trimmed");
        }
    }

    /// Record user text, merging into a trailing user turn when present.
    pub fn append_user(&mut self, text: &str) {
        self.trim();
        match self.turns.last_mut() {
            Some(last) if last.role == Role::User => {
                debug!("previous user turn got no reply, merging input into it");
                last.content.push(text.to_owned());
            }
            _ => self.turns.push(Turn::new(Role::User, text)),
        }
    }

    /// Record assistant text, merging into a trailing assistant turn when
    /// present. Returns `false` when the reply was dropped because there is
    /// no user turn to answer.
    pub fn append_assistant(&mut self, text: &str) -> bool {
        self.trim();
        match self.turns.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content.push(text.to_owned());
                true
            }
            Some(_) => {
                self.turns.push(Turn::new(Role::Assistant, text));
                true
            }
            None => {
                debug!("no user turn to answer, dropping assistant text");
                false
            }
        }
    }

    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Snapshot the buffer as completion messages.
    #[must_use]
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .map(|turn| ChatMessage {
                role: match turn.role {
                    Role::User => ChatRole::User,
                    Role::Assistant => ChatRole::Assistant,
                },
                content: turn.content.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn roles(memory: &TurnMemory) -> Vec<Role> {
        memory.turns().iter().map(|t| t.role).collect()
    }

    #[test]
    fn consecutive_user_input_merges() {
        let mut memory = TurnMemory::new(10);
        memory.append_user("hello");
        memory.append_user("are you there");
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.turns()[0].content, vec!["hello", "are you there"]);
    }

    #[test]
    fn replies_alternate_with_user_turns() {
        let mut memory = TurnMemory::new(10);
        memory.append_user("hi");
        assert!(memory.append_assistant("hello!"));
        memory.append_user("how are you");
        assert!(memory.append_assistant("fine."));
        assert_eq!(
            roles(&memory),
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }

    #[test]
    fn assistant_text_merges_into_trailing_assistant_turn() {
        let mut memory = TurnMemory::new(10);
        memory.append_user("translate this");
        assert!(memory.append_assistant("<translation>"));
        assert!(memory.append_assistant("traduire ceci"));
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.turns()[1].content, vec!["<translation>", "traduire ceci"]);
    }

    #[test]
    fn assistant_into_empty_memory_is_dropped() {
        let mut memory = TurnMemory::new(10);
        assert!(!memory.append_assistant("orphan"));
        assert!(memory.is_empty());
    }

    #[test]
    fn trim_drops_oldest_then_leading_assistant() {
        let mut memory = TurnMemory::new(3);
        memory.append_user("u1");
        memory.append_assistant("a1");
        memory.append_user("u2");
        memory.append_assistant("a2");
        // [u1 a1 u2 a2] -> trim pops u1 (over limit), then a1 (leading assistant)
        memory.append_user("u3");
        assert_eq!(roles(&memory), vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(memory.turns()[0].content, vec!["u2"]);
    }

    #[test]
    fn zero_capacity_keeps_only_latest_input() {
        let mut memory = TurnMemory::new(0);
        memory.append_user("first");
        memory.append_user("second");
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.turns()[0].content, vec!["second"]);
    }

    #[test]
    fn trim_invariants_hold_for_any_append_sequence() {
        // Deterministic pseudo-random op sequences over several capacities.
        for max in 0..6usize {
            let mut memory = TurnMemory::new(max);
            let mut seed: u32 = 0x9e37_79b9 ^ max as u32;
            for step in 0..200 {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                if seed % 3 == 0 {
                    memory.append_assistant(&format!("a{step}"));
                } else {
                    memory.append_user(&format!("u{step}"));
                }
                memory.trim();
                assert!(memory.len() <= max, "len {} > max {max}", memory.len());
                if let Some(front) = memory.turns().first() {
                    assert_eq!(front.role, Role::User);
                }
                for pair in memory.turns().windows(2) {
                    assert_ne!(pair[0].role, pair[1].role);
                }
            }
        }
    }

    #[test]
    fn messages_snapshot_keeps_segments() {
        let mut memory = TurnMemory::new(4);
        memory.append_user("a");
        memory.append_user("b");
        let messages = memory.to_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[0].content, vec!["a", "b"]);
    }
}
