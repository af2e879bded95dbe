//! Coordinator actor — owns the registry and processes commands sequentially.
//!
//! One tokio task owns every session record. Façade calls, push-channel
//! events, claim-window timers, and presence sweeps all arrive as
//! `Command`s over a single mpsc channel, so merge and arbitration rules
//! run against a consistent snapshot without locks. Lock-free reads go
//! through `ArcSwap` slots shared via the snapshot map.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use liveline_protocol::{
    local_message_id, ClaimResponse, ConnectionState, DeliveryState, PushEvent, SessionSnapshot,
    SessionStatus, SupportMessage, Update,
};

use crate::command::Command;
use crate::config::CoordinatorConfig;
use crate::error::{ApiError, CoordinatorError};
use crate::registry::{Registry, SnapshotMap};
use crate::session::SessionRecord;
use crate::store::{ConfirmOutcome, MergeOutcome};
use crate::transition::Input;

pub struct CoordinatorActor {
    registry: Registry,
    command_rx: mpsc::Receiver<Command>,
    command_tx: mpsc::Sender<Command>,
    connection: Arc<ArcSwap<ConnectionState>>,
    typing_ttl: chrono::Duration,
    config: CoordinatorConfig,
}

impl CoordinatorActor {
    /// Spawn the actor task, returning its command sender.
    pub fn spawn(
        config: CoordinatorConfig,
        snapshots: SnapshotMap,
        connection: Arc<ArcSwap<ConnectionState>>,
    ) -> mpsc::Sender<Command> {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
        let typing_ttl = chrono::Duration::from_std(config.typing_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(4));
        let actor = CoordinatorActor {
            registry: Registry::new(snapshots),
            command_rx,
            command_tx: command_tx.clone(),
            connection,
            typing_ttl,
            config,
        };
        tokio::spawn(actor.run());
        command_tx
    }

    async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.config.presence_sweep_interval);
        loop {
            tokio::select! {
                maybe_cmd = self.command_rx.recv() => match maybe_cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                _ = sweep.tick() => self.sweep_presence().await,
            }
        }
        info!(
            component = "actor",
            event = "actor.loop.ended",
            "Coordinator actor loop ended"
        );
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            // -- Queries ------------------------------------------------
            Command::GetState { session_id, reply } => {
                let _ = reply.send(self.registry.get(&session_id).map(|r| r.state()));
            }
            Command::GetSummaries { reply } => {
                let _ = reply.send(self.registry.summaries());
            }

            // -- Subscriptions -------------------------------------------
            Command::Subscribe {
                session_id,
                tx,
                reply,
            } => match self.registry.get_mut(&session_id) {
                Some(record) => {
                    record.subscribe(tx);
                    let _ = reply.send(Some(record.state()));
                }
                None => {
                    let _ = reply.send(None);
                }
            },
            Command::SubscribeList { tx } => {
                self.registry.subscribe_list(tx);
            }

            // -- Session intake ------------------------------------------
            Command::UpsertSession { snapshot } => {
                self.upsert_session(snapshot).await;
            }
            Command::MergeHistory {
                session_id,
                messages,
            } => {
                self.merge_history(&session_id, messages).await;
            }

            // -- Local actions -------------------------------------------
            Command::BeginSend {
                session_id,
                content,
                sender,
                reply,
            } => {
                let now = Utc::now();
                let result = match self.registry.get_mut(&session_id) {
                    None => Err(CoordinatorError::SessionUnknown(session_id.clone())),
                    Some(record) if record.is_terminal() => {
                        Err(CoordinatorError::SessionEnded(session_id.clone()))
                    }
                    Some(record) => {
                        let message = SupportMessage {
                            id: local_message_id(),
                            session_id: session_id.clone(),
                            sender,
                            content,
                            sent_at: now,
                            delivery: DeliveryState::Sending,
                        };
                        record.append_local(message.clone(), now);
                        Ok(message)
                    }
                };
                let appended = result.as_ref().ok().cloned();
                let _ = reply.send(result);
                if let Some(message) = appended {
                    self.emit(
                        &session_id,
                        vec![Update::MessageAppended {
                            session_id: session_id.clone(),
                            message,
                        }],
                    )
                    .await;
                }
            }
            Command::FinishSend {
                session_id,
                temp_id,
                result,
            } => {
                self.finish_send(&session_id, &temp_id, result).await;
            }
            Command::BeginRetry {
                session_id,
                message_id,
                reply,
            } => {
                let result = match self.registry.get_mut(&session_id) {
                    None => Err(CoordinatorError::SessionUnknown(session_id)),
                    Some(record) => record
                        .mark_retrying(&message_id)
                        .ok_or(CoordinatorError::NotRetryable(message_id)),
                };
                let _ = reply.send(result);
            }
            Command::SetTyping {
                session_id,
                user_id,
                is_typing,
            } => {
                let now = Utc::now();
                let ttl = self.typing_ttl;
                let changed = self
                    .registry
                    .get_mut(&session_id)
                    .and_then(|r| r.set_typing(&user_id, is_typing, now, ttl));
                if let Some(typists) = changed {
                    self.emit(
                        &session_id,
                        vec![Update::TypingChanged {
                            session_id: session_id.clone(),
                            typists,
                        }],
                    )
                    .await;
                }
            }

            // -- Claim ---------------------------------------------------
            Command::BeginClaim {
                session_id,
                operator_id,
                reply,
            } => {
                let now = Utc::now();
                let result = match self.registry.get_mut(&session_id) {
                    None => Err(CoordinatorError::SessionUnknown(session_id)),
                    Some(record) if record.is_terminal() => {
                        Err(CoordinatorError::SessionEnded(session_id))
                    }
                    Some(record) => Ok(record.admit_claim(&operator_id, now)),
                };
                let _ = reply.send(result);
            }
            Command::FinishClaim {
                session_id,
                response,
            } => {
                self.finish_claim(&session_id, response).await;
            }

            // -- Close ---------------------------------------------------
            Command::BeginClose { session_id, reply } => {
                let result = match self.registry.get(&session_id) {
                    None => Err(CoordinatorError::SessionUnknown(session_id)),
                    Some(record) if record.is_terminal() => Ok(false),
                    Some(_) => Ok(true),
                };
                let _ = reply.send(result);
            }
            Command::ApplyClose {
                session_id,
                snapshot,
            } => {
                let now = Utc::now();
                let updates = match self.registry.get_mut(&session_id) {
                    Some(record) => record.reconcile_snapshot(&snapshot, now),
                    None => Vec::new(),
                };
                self.emit(&session_id, updates).await;
            }

            // -- Escalation ----------------------------------------------
            Command::Escalate {
                session_id,
                requeue,
                reply,
            } => {
                let now = Utc::now();
                let result = match self.registry.get_mut(&session_id) {
                    None => Err(CoordinatorError::SessionUnknown(session_id.clone())),
                    Some(record) if record.is_terminal() => {
                        Err(CoordinatorError::SessionEnded(session_id.clone()))
                    }
                    Some(record) => Ok(record.apply_input(Input::Escalated { requeue }, now)),
                };
                match result {
                    Ok(updates) => {
                        let _ = reply.send(Ok(()));
                        self.emit(&session_id, updates).await;
                        self.maybe_schedule_claim_window(&session_id);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }

            // -- Push channel & timers ------------------------------------
            Command::ApplyEvent { event } => {
                self.apply_event(event).await;
            }
            Command::ClaimWindowElapsed { session_id } => {
                let now = Utc::now();
                let updates = match self.registry.get_mut(&session_id) {
                    Some(record) => record.apply_input(Input::ClaimWindowElapsed, now),
                    None => Vec::new(),
                };
                self.emit(&session_id, updates).await;
            }
            Command::SweepPresence => {
                self.sweep_presence().await;
            }
            Command::SetConnectionState { state } => {
                self.connection.store(Arc::new(state));
                let update = Update::ConnectionChanged { state };
                for id in self.registry.session_ids() {
                    if let Some(record) = self.registry.get_mut(&id) {
                        record.broadcast(update.clone()).await;
                    }
                }
                self.registry.broadcast_list(update).await;
            }
            Command::SessionReleased { session_id } => {
                let evictable = self
                    .registry
                    .get(&session_id)
                    .is_some_and(|r| r.is_terminal() && !r.has_subscribers());
                if evictable {
                    self.registry.evict(&session_id);
                    debug!(
                        component = "actor",
                        event = "actor.session.evicted",
                        session_id = %session_id,
                        "Evicted ended session with no remaining views"
                    );
                }
            }
        }
    }

    // -- Push events ---------------------------------------------------------

    async fn apply_event(&mut self, event: PushEvent) {
        let now = Utc::now();
        match event {
            PushEvent::NewSessionCreated { session, .. } => {
                self.upsert_session(session).await;
            }
            PushEvent::MessageReceived {
                session_id,
                message,
                seq,
            } => {
                let inserted = match self.registry.get_mut(&session_id) {
                    None => {
                        debug!(
                            component = "actor",
                            event = "actor.event.unknown_session",
                            session_id = %session_id,
                            "Dropping message for session outside the registry"
                        );
                        return;
                    }
                    Some(record) => {
                        if !record.accept_seq(seq) {
                            return;
                        }
                        record.merge_message(message.clone(), now) == MergeOutcome::Inserted
                    }
                };
                if inserted {
                    self.emit(
                        &session_id,
                        vec![Update::MessageAppended {
                            session_id: session_id.clone(),
                            message,
                        }],
                    )
                    .await;
                }
            }
            PushEvent::SessionClaimed {
                session_id,
                operator_id,
                seq,
            } => {
                self.apply_lifecycle(&session_id, seq, Input::ClaimGranted { operator_id })
                    .await;
            }
            PushEvent::SessionClosed {
                session_id,
                status,
                reason,
                seq,
            } => {
                let status = if status.is_terminal() {
                    status
                } else {
                    warn!(
                        component = "actor",
                        event = "actor.event.bad_close_status",
                        session_id = %session_id,
                        "session_closed carried a non-terminal status; treating as closed"
                    );
                    SessionStatus::Closed
                };
                self.apply_lifecycle(&session_id, seq, Input::Ended { status, reason })
                    .await;
            }
            PushEvent::SessionNeedsAttention {
                session_id,
                escalation_level,
                seq,
            } => {
                self.apply_lifecycle(&session_id, seq, Input::AttentionFlagged { escalation_level })
                    .await;
            }
            PushEvent::UserJoined {
                session_id,
                user_id,
                seq,
            } => {
                let accepted = self
                    .registry
                    .get_mut(&session_id)
                    .map(|r| r.accept_seq(seq))
                    .unwrap_or(false);
                if accepted {
                    self.emit(
                        &session_id,
                        vec![Update::ParticipantJoined {
                            session_id: session_id.clone(),
                            user_id,
                        }],
                    )
                    .await;
                }
            }
            PushEvent::TypingChanged {
                session_id,
                user_id,
                is_typing,
                seq,
            } => {
                let ttl = self.typing_ttl;
                let changed = match self.registry.get_mut(&session_id) {
                    None => None,
                    Some(record) => {
                        if !record.accept_seq(seq) {
                            return;
                        }
                        record.set_typing(&user_id, is_typing, now, ttl)
                    }
                };
                if let Some(typists) = changed {
                    self.emit(
                        &session_id,
                        vec![Update::TypingChanged {
                            session_id: session_id.clone(),
                            typists,
                        }],
                    )
                    .await;
                }
            }
        }
    }

    async fn apply_lifecycle(&mut self, session_id: &str, seq: Option<u64>, input: Input) {
        let now = Utc::now();
        let updates = match self.registry.get_mut(session_id) {
            None => {
                debug!(
                    component = "actor",
                    event = "actor.event.unknown_session",
                    session_id = %session_id,
                    "Dropping lifecycle event for session outside the registry"
                );
                return;
            }
            Some(record) => {
                if !record.accept_seq(seq) {
                    return;
                }
                record.apply_input(input, now)
            }
        };
        self.emit(session_id, updates).await;
        self.maybe_schedule_claim_window(session_id);
    }

    // -- Reconciliation ------------------------------------------------------

    async fn upsert_session(&mut self, snapshot: SessionSnapshot) {
        let now = Utc::now();
        if self.registry.contains(&snapshot.id) {
            let updates = match self.registry.get_mut(&snapshot.id) {
                Some(record) => record.reconcile_snapshot(&snapshot, now),
                None => Vec::new(),
            };
            self.emit(&snapshot.id, updates).await;
        } else {
            let record = SessionRecord::from_snapshot(&snapshot);
            let summary = record.summary();
            self.registry.insert(record);
            info!(
                component = "actor",
                event = "actor.session.tracked",
                session_id = %snapshot.id,
                status = ?snapshot.status,
                "Tracking session"
            );
            self.registry
                .broadcast_list(Update::SessionCreated { session: summary })
                .await;
        }
        self.maybe_schedule_claim_window(&snapshot.id);
    }

    async fn merge_history(&mut self, session_id: &str, messages: Vec<SupportMessage>) {
        let now = Utc::now();
        let inserted: Vec<SupportMessage> = match self.registry.get_mut(session_id) {
            None => {
                debug!(
                    component = "actor",
                    event = "actor.history.unknown_session",
                    session_id = %session_id,
                    "Dropping history batch for session outside the registry"
                );
                return;
            }
            Some(record) => messages
                .into_iter()
                .filter(|m| record.merge_message(m.clone(), now) == MergeOutcome::Inserted)
                .collect(),
        };
        let updates = inserted
            .into_iter()
            .map(|message| Update::MessageAppended {
                session_id: session_id.to_string(),
                message,
            })
            .collect();
        self.emit(session_id, updates).await;
    }

    async fn finish_send(
        &mut self,
        session_id: &str,
        temp_id: &str,
        result: Result<SupportMessage, ApiError>,
    ) {
        let now = Utc::now();
        match result {
            Ok(canonical) => {
                let updates = match self.registry.get_mut(session_id) {
                    None => Vec::new(),
                    Some(record) => match record.confirm_message(canonical.clone(), now) {
                        ConfirmOutcome::Replaced { temp_id }
                        | ConfirmOutcome::Superseded { temp_id } => {
                            vec![Update::MessageReplaced {
                                session_id: session_id.to_string(),
                                temp_id,
                                message: canonical,
                            }]
                        }
                        ConfirmOutcome::Inserted => vec![Update::MessageAppended {
                            session_id: session_id.to_string(),
                            message: canonical,
                        }],
                        ConfirmOutcome::Duplicate => Vec::new(),
                    },
                };
                self.emit(session_id, updates).await;
            }
            Err(e) => {
                warn!(
                    component = "actor",
                    event = "actor.send.failed",
                    session_id = %session_id,
                    message_id = %temp_id,
                    error = %e,
                    "Send failed; marking optimistic message"
                );
                let marked = self
                    .registry
                    .get_mut(session_id)
                    .map(|r| r.mark_send_failed(temp_id))
                    .unwrap_or(false);
                if marked {
                    self.emit(
                        session_id,
                        vec![Update::MessageFailed {
                            session_id: session_id.to_string(),
                            message_id: temp_id.to_string(),
                        }],
                    )
                    .await;
                }
            }
        }
    }

    async fn finish_claim(&mut self, session_id: &str, response: Option<ClaimResponse>) {
        let now = Utc::now();
        let updates = match self.registry.get_mut(session_id) {
            None => return,
            Some(record) => {
                record.clear_claim();
                match response {
                    Some(ClaimResponse::Granted { session }) => {
                        record.reconcile_snapshot(&session, now)
                    }
                    Some(ClaimResponse::Rejected { current_owner }) => {
                        // Converge to the winner; an expected race outcome.
                        info!(
                            component = "actor",
                            event = "actor.claim.lost",
                            session_id = %session_id,
                            winner = %current_owner,
                            "Claim lost; reconciling to winning operator"
                        );
                        record.apply_input(
                            Input::ClaimGranted {
                                operator_id: current_owner,
                            },
                            now,
                        )
                    }
                    None => {
                        warn!(
                            component = "actor",
                            event = "actor.claim.request_failed",
                            session_id = %session_id,
                            "Claim request failed; attempt cleared"
                        );
                        Vec::new()
                    }
                }
            }
        };
        self.emit(session_id, updates).await;
    }

    // -- Presence ------------------------------------------------------------

    async fn sweep_presence(&mut self) {
        let now = Utc::now();
        let mut changed: Vec<(String, Vec<String>)> = Vec::new();
        for record in self.registry.records_mut() {
            if let Some(typists) = record.sweep_presence(now) {
                changed.push((record.id().to_string(), typists));
            }
        }
        for (session_id, typists) in changed {
            self.emit(
                &session_id,
                vec![Update::TypingChanged {
                    session_id: session_id.clone(),
                    typists,
                }],
            )
            .await;
        }
    }

    // -- Dispatch ------------------------------------------------------------

    /// Broadcast updates to session subscribers (and list subscribers for
    /// list-relevant variants), then republish the snapshot.
    async fn emit(&mut self, session_id: &str, updates: Vec<Update>) {
        if updates.is_empty() {
            return;
        }
        if let Some(record) = self.registry.get_mut(session_id) {
            for update in &updates {
                record.broadcast(update.clone()).await;
            }
            record.refresh_snapshot();
        }
        for update in updates {
            if list_relevant(&update) {
                self.registry.broadcast_list(update).await;
            }
        }
    }

    /// Schedule a `Pending -> AiActive` promotion if the session is
    /// currently waiting for a claim. Late fires are structural no-ops.
    fn maybe_schedule_claim_window(&self, session_id: &str) {
        let pending = self
            .registry
            .get(session_id)
            .is_some_and(|r| r.status() == SessionStatus::Pending);
        if !pending {
            return;
        }
        let tx = self.command_tx.clone();
        let id = session_id.to_string();
        let window = self.config.claim_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx
                .send(Command::ClaimWindowElapsed { session_id: id })
                .await;
        });
    }
}

fn list_relevant(update: &Update) -> bool {
    matches!(
        update,
        Update::SessionCreated { .. }
            | Update::SessionDelta { .. }
            | Update::SessionEnded { .. }
            | Update::ConnectionChanged { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pending_snapshot, server_message, ts};
    use dashmap::DashMap;
    use liveline_protocol::{SenderKind, SessionState};
    use tokio::sync::oneshot;

    struct Harness {
        tx: mpsc::Sender<Command>,
        snapshots: SnapshotMap,
        connection: Arc<ArcSwap<ConnectionState>>,
    }

    fn harness() -> Harness {
        harness_with(CoordinatorConfig::default())
    }

    fn harness_with(config: CoordinatorConfig) -> Harness {
        let snapshots: SnapshotMap = Arc::new(DashMap::new());
        let connection = Arc::new(ArcSwap::from_pointee(ConnectionState::Reconnecting));
        let tx = CoordinatorActor::spawn(config, Arc::clone(&snapshots), Arc::clone(&connection));
        Harness {
            tx,
            snapshots,
            connection,
        }
    }

    impl Harness {
        async fn upsert(&self, snapshot: liveline_protocol::SessionSnapshot) {
            self.tx
                .send(Command::UpsertSession { snapshot })
                .await
                .unwrap();
        }

        async fn state(&self, id: &str) -> Option<SessionState> {
            let (reply, rx) = oneshot::channel();
            self.tx
                .send(Command::GetState {
                    session_id: id.to_string(),
                    reply,
                })
                .await
                .unwrap();
            rx.await.unwrap()
        }

        fn snapshot(&self, id: &str) -> Option<Arc<SessionState>> {
            self.snapshots.get(id).map(|slot| slot.load_full())
        }
    }

    #[tokio::test]
    async fn upsert_then_read_through_snapshot_slot() {
        let h = harness();
        h.upsert(pending_snapshot("s1")).await;

        let state = h.state("s1").await.unwrap();
        assert_eq!(state.status, SessionStatus::Pending);
        let snap = h.snapshot("s1").unwrap();
        assert_eq!(snap.id, "s1");
    }

    #[tokio::test]
    async fn push_message_appears_in_order() {
        let h = harness();
        h.upsert(pending_snapshot("s1")).await;

        for (id, secs) in [("m2", 20), ("m1", 10)] {
            h.tx.send(Command::ApplyEvent {
                event: PushEvent::MessageReceived {
                    session_id: "s1".to_string(),
                    message: server_message(id, "s1", secs),
                    seq: None,
                },
            })
            .await
            .unwrap();
        }

        let state = h.state("s1").await.unwrap();
        let ids: Vec<&str> = state.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn redelivered_event_with_stale_seq_is_dropped() {
        let h = harness();
        h.upsert(pending_snapshot("s1")).await;

        let event = PushEvent::SessionClaimed {
            session_id: "s1".to_string(),
            operator_id: "op-1".to_string(),
            seq: Some(5),
        };
        h.tx.send(Command::ApplyEvent {
            event: event.clone(),
        })
        .await
        .unwrap();
        // Re-delivery of the same seq, and an older claim for someone else.
        h.tx.send(Command::ApplyEvent { event }).await.unwrap();
        h.tx.send(Command::ApplyEvent {
            event: PushEvent::SessionClaimed {
                session_id: "s1".to_string(),
                operator_id: "op-2".to_string(),
                seq: Some(4),
            },
        })
        .await
        .unwrap();

        let state = h.state("s1").await.unwrap();
        assert_eq!(state.status, SessionStatus::AdminActive);
        assert_eq!(state.assigned_operator_id.as_deref(), Some("op-1"));
    }

    #[tokio::test]
    async fn begin_claim_admits_exactly_one_attempt() {
        let h = harness();
        h.upsert(pending_snapshot("s1")).await;

        let admit = |tx: mpsc::Sender<Command>, op: &str| {
            let op = op.to_string();
            async move {
                let (reply, rx) = oneshot::channel();
                tx.send(Command::BeginClaim {
                    session_id: "s1".to_string(),
                    operator_id: op,
                    reply,
                })
                .await
                .unwrap();
                rx.await.unwrap().unwrap()
            }
        };

        let first = admit(h.tx.clone(), "op-1").await;
        let second = admit(h.tx.clone(), "op-2").await;
        assert_eq!(first, crate::claim::ClaimAdmission::Proceed);
        assert_eq!(second, crate::claim::ClaimAdmission::AttemptInFlight);
    }

    #[tokio::test]
    async fn losing_claim_converges_to_winner() {
        let h = harness();
        h.upsert(pending_snapshot("s1")).await;

        let (reply, rx) = oneshot::channel();
        h.tx.send(Command::BeginClaim {
            session_id: "s1".to_string(),
            operator_id: "op-1".to_string(),
            reply,
        })
        .await
        .unwrap();
        rx.await.unwrap().unwrap();

        h.tx.send(Command::FinishClaim {
            session_id: "s1".to_string(),
            response: Some(ClaimResponse::Rejected {
                current_owner: "op-9".to_string(),
            }),
        })
        .await
        .unwrap();

        let state = h.state("s1").await.unwrap();
        assert_eq!(state.status, SessionStatus::AdminActive);
        assert_eq!(state.assigned_operator_id.as_deref(), Some("op-9"));
    }

    #[tokio::test]
    async fn send_on_ended_session_is_rejected_locally() {
        let h = harness();
        let mut snap = pending_snapshot("s1");
        snap.status = SessionStatus::Closed;
        snap.closed_at = Some(ts(50));
        h.upsert(snap).await;

        let (reply, rx) = oneshot::channel();
        h.tx.send(Command::BeginSend {
            session_id: "s1".to_string(),
            content: "hello?".to_string(),
            sender: SenderKind::Operator,
            reply,
        })
        .await
        .unwrap();
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, CoordinatorError::SessionEnded(_)));
    }

    #[tokio::test]
    async fn claim_window_promotes_pending_once() {
        let h = harness_with(CoordinatorConfig {
            claim_window: std::time::Duration::from_millis(20),
            ..CoordinatorConfig::default()
        });
        h.upsert(pending_snapshot("s1")).await;

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        let state = h.state("s1").await.unwrap();
        assert_eq!(state.status, SessionStatus::AiActive);
    }

    #[tokio::test]
    async fn connection_state_is_published() {
        let h = harness();
        h.tx.send(Command::SetConnectionState {
            state: ConnectionState::Degraded,
        })
        .await
        .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(**h.connection.load(), ConnectionState::Degraded);
    }
}
