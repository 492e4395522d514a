//! Bounded conversation history.

use crate::provider::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One completed turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Set when a generation was cancelled mid-stream and only part of the
    /// answer was kept.
    pub truncated: bool,
}

impl ConversationTurn {
    pub fn now(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
            truncated: false,
        }
    }

    pub fn truncated(role: Role, text: impl Into<String>) -> Self {
        Self {
            truncated: true,
            ..Self::now(role, text)
        }
    }
}

/// Ordered turns bounded by count and total characters; oldest evicted
/// first.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<ConversationTurn>,
    max_turns: usize,
    max_chars: usize,
}

impl ConversationHistory {
    pub fn new(max_turns: usize, max_chars: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns,
            max_chars,
        }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        self.enforce_bounds();
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// The most recent `count` turns, in chronological order.
    pub fn recent(&self, count: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(count);
        self.turns.iter().skip(skip).cloned().collect()
    }

    fn total_chars(&self) -> usize {
        self.turns.iter().map(|t| t.text.chars().count()).sum()
    }

    fn enforce_bounds(&mut self) {
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
        while self.turns.len() > 1 && self.total_chars() > self.max_chars {
            self.turns.pop_front();
        }
    }
}
