//! Typing presence tracker
//!
//! Short-lived typing state per participant of one session. Entries
//! expire on their own: the periodic sweep is the only defense against a
//! peer disconnecting without an explicit "stopped typing" signal, and
//! reads filter lazily so a missed sweep never shows a stale typist.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use liveline_protocol::TypingState;

#[derive(Debug, Default)]
pub struct PresenceTracker {
    // user_id -> expires_at
    entries: HashMap<String, DateTime<Utc>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert or remove a typing entry. Returns true when the set of
    /// visible typists changed (refreshing an existing entry does not).
    pub fn set_typing(
        &mut self,
        user_id: &str,
        is_typing: bool,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> bool {
        if is_typing {
            let was_active = self
                .entries
                .get(user_id)
                .is_some_and(|expires| *expires > now);
            self.entries.insert(user_id.to_string(), now + ttl);
            !was_active
        } else {
            self.entries.remove(user_id).is_some()
        }
    }

    /// Drop expired entries. Returns true if anything was removed.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> bool {
        let before = self.entries.len();
        self.entries.retain(|_, expires| *expires > now);
        self.entries.len() != before
    }

    /// Currently active typists, sorted for deterministic reads.
    pub fn active(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut users: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, expires)| **expires > now)
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        users
    }

    /// Raw entries for snapshot publication.
    pub fn entries(&self, session_id: &str) -> Vec<TypingState> {
        let mut states: Vec<TypingState> = self
            .entries
            .iter()
            .map(|(user, expires)| TypingState {
                session_id: session_id.to_string(),
                user_id: user.clone(),
                expires_at: *expires,
            })
            .collect();
        states.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        states
    }
}
