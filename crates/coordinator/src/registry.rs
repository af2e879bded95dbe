//! Session registry
//!
//! The authoritative in-memory map of known sessions, owned exclusively
//! by the coordinator actor. Snapshot slots are shared with readers
//! through a `DashMap` so reads never enter the actor.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::mpsc;

use liveline_protocol::{SessionState, SessionSummary, Update};

use crate::session::SessionRecord;

pub type SnapshotMap = Arc<DashMap<String, Arc<ArcSwap<SessionState>>>>;

pub struct Registry {
    sessions: HashMap<String, SessionRecord>,
    list_subscribers: Vec<mpsc::Sender<Update>>,
    snapshots: SnapshotMap,
}

impl Registry {
    pub fn new(snapshots: SnapshotMap) -> Self {
        Self {
            sessions: HashMap::new(),
            list_subscribers: Vec::new(),
            snapshots,
        }
    }

    pub fn get(&self, id: &str) -> Option<&SessionRecord> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut SessionRecord> {
        self.sessions.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn insert(&mut self, record: SessionRecord) {
        let id = record.id().to_string();
        self.snapshots.insert(id.clone(), record.snapshot_arc());
        self.sessions.insert(id, record);
    }

    /// Evict a session the UI no longer needs. The record persists
    /// server-side; this only drops the client's view.
    pub fn evict(&mut self, id: &str) -> Option<SessionRecord> {
        self.snapshots.remove(id);
        self.sessions.remove(id)
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.sessions.values().map(|r| r.summary()).collect()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut SessionRecord> {
        self.sessions.values_mut()
    }

    pub fn subscribe_list(&mut self, tx: mpsc::Sender<Update>) {
        self.list_subscribers.push(tx);
    }

    /// Broadcast an update to all list subscribers, dropping closed
    /// channels.
    pub async fn broadcast_list(&mut self, update: Update) {
        self.list_subscribers.retain(|tx| !tx.is_closed());
        for tx in &self.list_subscribers {
            let _ = tx.send(update.clone()).await;
        }
    }
}
