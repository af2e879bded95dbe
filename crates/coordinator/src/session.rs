//! Session record
//!
//! Owns everything the coordinator tracks for one conversation: lifecycle
//! core, message store, typing presence, claim gate, UI subscribers, and
//! the lock-free snapshot slot readers load from.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;

use liveline_protocol::{
    SessionChanges, SessionSnapshot, SessionState, SessionStatus, SessionSummary, SupportMessage,
    Update,
};

use crate::claim::{ClaimAdmission, ClaimGate};
use crate::presence::PresenceTracker;
use crate::store::{ConfirmOutcome, MergeOutcome, MessageStore};
use crate::transition::{transition, Effect, Input, SessionCore};

pub struct SessionRecord {
    core: SessionCore,
    store: MessageStore,
    presence: PresenceTracker,
    claim: ClaimGate,
    last_seq: Option<u64>,
    subscribers: Vec<mpsc::Sender<Update>>,
    snapshot: Arc<ArcSwap<SessionState>>,
}

impl SessionRecord {
    pub fn from_snapshot(snap: &SessionSnapshot) -> Self {
        let core = SessionCore::from_snapshot(snap);
        let state = build_state(&core, &MessageStore::new(), &PresenceTracker::new());
        Self {
            core,
            store: MessageStore::new(),
            presence: PresenceTracker::new(),
            claim: ClaimGate::new(),
            last_seq: None,
            subscribers: Vec::new(),
            snapshot: Arc::new(ArcSwap::from_pointee(state)),
        }
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn status(&self) -> SessionStatus {
        self.core.status
    }

    pub fn is_terminal(&self) -> bool {
        self.core.status.is_terminal()
    }

    pub fn summary(&self) -> SessionSummary {
        self.snapshot.load().summary()
    }

    pub fn state(&self) -> SessionState {
        build_state(&self.core, &self.store, &self.presence)
    }

    /// The shared snapshot slot for lock-free reads.
    pub fn snapshot_arc(&self) -> Arc<ArcSwap<SessionState>> {
        Arc::clone(&self.snapshot)
    }

    /// Publish the current state to snapshot readers.
    pub fn refresh_snapshot(&self) {
        self.snapshot.store(Arc::new(self.state()));
    }

    // -- Event sequencing ---------------------------------------------------

    /// Per-session delivery dedup: returns false when the event's sequence
    /// number is at or below the last applied one.
    pub fn accept_seq(&mut self, seq: Option<u64>) -> bool {
        match (seq, self.last_seq) {
            (Some(seq), Some(last)) if seq <= last => false,
            (Some(seq), _) => {
                self.last_seq = Some(seq);
                true
            }
            (None, _) => true,
        }
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Run the pure transition function and adopt the resulting state.
    pub fn apply_input(&mut self, input: Input, now: DateTime<Utc>) -> Vec<Update> {
        let (core, effects) = transition(self.core.clone(), input, now);
        self.core = core;
        effects
            .into_iter()
            .map(|Effect::Emit(update)| *update)
            .collect()
    }

    /// Adopt an authoritative server snapshot, emitting the delta between
    /// it and the local view. Escalation never regresses even if the
    /// server reports a stale lower level.
    pub fn reconcile_snapshot(&mut self, snap: &SessionSnapshot, now: DateTime<Utc>) -> Vec<Update> {
        let mut changes = SessionChanges::default();
        let was_terminal = self.core.status.is_terminal();

        if snap.status != self.core.status {
            self.core.status = snap.status;
            changes.status = Some(snap.status);
        }
        if snap.escalation_level > self.core.escalation_level {
            self.core.escalation_level = snap.escalation_level;
            changes.escalation_level = Some(snap.escalation_level);
        }
        if snap.assigned_operator_id != self.core.assigned_operator_id {
            self.core.assigned_operator_id = snap.assigned_operator_id.clone();
            changes.assigned_operator_id = Some(snap.assigned_operator_id.clone());
        }
        if snap.needs_attention != self.core.needs_attention {
            self.core.needs_attention = snap.needs_attention;
            changes.needs_attention = Some(snap.needs_attention);
        }
        if snap.closed_at != self.core.closed_at {
            self.core.closed_at = snap.closed_at;
            changes.closed_at = Some(snap.closed_at);
        }
        if snap.current_context != self.core.current_context {
            self.core.current_context = snap.current_context.clone();
            changes.current_context = Some(snap.current_context.clone());
        }

        let mut updates = Vec::new();
        if !changes.is_empty() {
            self.core.last_activity_at = Some(now);
            changes.last_activity_at = Some(now);
            updates.push(Update::SessionDelta {
                session_id: self.core.id.clone(),
                changes,
            });
        }
        if !was_terminal && self.core.status.is_terminal() {
            updates.push(Update::SessionEnded {
                session_id: self.core.id.clone(),
                status: self.core.status,
                reason: None,
            });
        }
        updates
    }

    // -- Messages -----------------------------------------------------------

    pub fn append_local(&mut self, message: SupportMessage, now: DateTime<Utc>) {
        self.store.append_local(message);
        self.core.last_activity_at = Some(now);
    }

    pub fn merge_message(&mut self, message: SupportMessage, now: DateTime<Utc>) -> MergeOutcome {
        let outcome = self.store.merge(message);
        if outcome == MergeOutcome::Inserted {
            self.core.last_activity_at = Some(now);
        }
        outcome
    }

    pub fn confirm_message(
        &mut self,
        canonical: SupportMessage,
        now: DateTime<Utc>,
    ) -> ConfirmOutcome {
        self.core.last_activity_at = Some(now);
        self.store.confirm(canonical)
    }

    pub fn mark_send_failed(&mut self, message_id: &str) -> bool {
        self.store.mark_failed(message_id)
    }

    pub fn mark_retrying(&mut self, message_id: &str) -> Option<String> {
        self.store.mark_retrying(message_id)
    }

    // -- Presence -----------------------------------------------------------

    /// Returns the active typist list when the visible set changed.
    pub fn set_typing(
        &mut self,
        user_id: &str,
        is_typing: bool,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Option<Vec<String>> {
        self.presence
            .set_typing(user_id, is_typing, now, ttl)
            .then(|| self.presence.active(now))
    }

    pub fn sweep_presence(&mut self, now: DateTime<Utc>) -> Option<Vec<String>> {
        self.presence.sweep(now).then(|| self.presence.active(now))
    }

    // -- Claim gate ---------------------------------------------------------

    pub fn admit_claim(&mut self, operator_id: &str, now: DateTime<Utc>) -> ClaimAdmission {
        self.claim.admit(
            self.core.status,
            self.core.assigned_operator_id.as_deref(),
            operator_id,
            now,
        )
    }

    pub fn clear_claim(&mut self) {
        self.claim.clear();
    }

    // -- Subscribers --------------------------------------------------------

    pub fn subscribe(&mut self, tx: mpsc::Sender<Update>) {
        self.subscribers.push(tx);
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscribers.iter().any(|tx| !tx.is_closed())
    }

    /// Broadcast an update to all subscribers, dropping closed channels.
    pub async fn broadcast(&mut self, update: Update) {
        self.subscribers.retain(|tx| !tx.is_closed());
        for tx in &self.subscribers {
            let _ = tx.send(update.clone()).await;
        }
    }
}

fn build_state(core: &SessionCore, store: &MessageStore, presence: &PresenceTracker) -> SessionState {
    SessionState {
        id: core.id.clone(),
        status: core.status,
        escalation_level: core.escalation_level,
        assigned_operator_id: core.assigned_operator_id.clone(),
        needs_attention: core.needs_attention,
        created_at: core.created_at,
        closed_at: core.closed_at,
        origin_context: core.origin_context.clone(),
        current_context: core.current_context.clone(),
        last_activity_at: core.last_activity_at,
        messages: store.messages().to_vec(),
        typists: presence.entries(&core.id),
    }
}
