//! In-memory session store
//!
//! Sessions live in a `DashMap`, which splits the key space into shards
//! keyed by hash(key), each guarded by its own lock. A mutation holds only
//! the shard of its key, so appends for one participant are serialized
//! while unrelated participants proceed independently.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::session::{Clock, Role, Session, SystemClock, Turn};
use crate::Result;

/// Keyed store of conversation sessions with a bounded turn window
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    window_size: usize,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Default number of turns retained per session
    pub const DEFAULT_WINDOW_SIZE: usize = 20;

    /// Create a store with the default window and the system clock
    pub fn new() -> Self {
        Self::with_options(Self::DEFAULT_WINDOW_SIZE, Arc::new(SystemClock::new()))
    }

    /// Create a store with a custom window size and clock.
    /// A window of zero is raised to one.
    pub fn with_options(window_size: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            window_size: window_size.max(1),
            clock,
        }
    }

    /// Create a store from the `[session]` configuration section
    pub fn from_config(config: &SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_options(config.window_size, clock)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Get the session for `key`, creating an empty one if absent
    pub fn get_or_create(&self, key: &str) -> Session {
        if let Some(session) = self.get(key) {
            return session;
        }

        self.sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(key = %key, "Creating new session");
                Session::new(key, self.clock.now())
            })
            .value()
            .clone()
    }

    /// Get a snapshot of the session for `key`, if any
    pub fn get(&self, key: &str) -> Option<Session> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    /// Retained turns for `key`; empty when there is no session
    pub fn window(&self, key: &str) -> Vec<Turn> {
        self.sessions
            .get(key)
            .map(|entry| entry.value().window())
            .unwrap_or_default()
    }

    /// Append a turn to the session for `key` and return the trimmed window
    pub fn append_turn(&self, key: &str, role: Role, content: impl Into<String>) -> Result<Vec<Turn>> {
        let turn = Turn::new(role, content)?;
        let (_, window) = self.append(key, turn);
        Ok(window)
    }

    /// Append under the key's lock; returns the session id with the window
    pub(crate) fn append(&self, key: &str, turn: Turn) -> (String, Vec<Turn>) {
        let mut entry = self
            .sessions
            .entry(key.to_string())
            .or_insert_with(|| {
                debug!(key = %key, "Creating new session");
                Session::new(key, self.clock.now())
            });
        let now = self.clock.now();
        entry.push_turn(turn, self.window_size, now);
        (entry.id().to_string(), entry.window())
    }

    /// Append only if the session for `key` is still the incarnation
    /// `session_id`. Returns `None` when it was cleared or evicted meanwhile.
    pub(crate) fn append_if_current(&self, key: &str, session_id: &str, turn: Turn) -> Option<Vec<Turn>> {
        let mut entry = self.sessions.get_mut(key)?;
        if entry.id() != session_id {
            return None;
        }
        let now = self.clock.now();
        entry.push_turn(turn, self.window_size, now);
        Some(entry.window())
    }

    /// Remove the session for `key`. Returns whether one existed.
    pub fn clear(&self, key: &str) -> bool {
        let existed = self.sessions.remove(key).is_some();
        if existed {
            info!(key = %key, "Cleared session");
        }
        existed
    }

    /// Keys of all sessions currently held
    pub fn snapshot_keys(&self) -> HashSet<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Remove the session for `key` only if it was last active at or before
    /// `cutoff`. The check and the removal happen under the same lock.
    pub fn remove_if_idle(&self, key: &str, cutoff: DateTime<Utc>) -> bool {
        self.sessions
            .remove_if(key, |_, session| session.is_idle_since(cutoff))
            .is_some()
    }

    /// Number of sessions held
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
