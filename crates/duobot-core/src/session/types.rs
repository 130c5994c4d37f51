//! Session types

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The chat participant talking to the bot
    Participant,
    /// The completion service
    Assistant,
}

impl Role {
    /// Role name used by the LLM APIs
    pub fn as_api_role(&self) -> &'static str {
        match self {
            Role::Participant => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One exchanged message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    /// Build a turn, rejecting empty or whitespace-only content
    pub fn new(role: Role, content: impl Into<String>) -> Result<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(Error::InvalidTurn(format!(
                "{} turn has empty content",
                role.as_api_role()
            )));
        }
        Ok(Self { role, content })
    }

    pub fn participant(content: impl Into<String>) -> Result<Self> {
        Self::new(Role::Participant, content)
    }

    pub fn assistant(content: impl Into<String>) -> Result<Self> {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Conversation state of one participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Identifies this incarnation of the session; a cleared and
    /// recreated session for the same key gets a new id
    id: String,
    key: String,
    turns: VecDeque<Turn>,
    last_active: DateTime<Utc>,
}

impl Session {
    /// Create an empty session for a participant key
    pub fn new(key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.into(),
            turns: VecDeque::new(),
            last_active: now,
        }
    }

    /// Append a turn, dropping the oldest turns until at most
    /// `window_size` remain
    pub(crate) fn push_turn(&mut self, turn: Turn, window_size: usize, now: DateTime<Utc>) {
        self.turns.push_back(turn);
        while self.turns.len() > window_size {
            self.turns.pop_front();
        }
        // never move backwards, even if a caller read the clock early
        self.last_active = self.last_active.max(now);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// Retained turns, oldest first
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Owned copy of the retained turns, oldest first
    pub fn window(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Whether the session was last touched at or before `cutoff`
    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_active <= cutoff
    }
}
