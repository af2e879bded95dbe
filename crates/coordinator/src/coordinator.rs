//! Coordinator façade
//!
//! The public surface used by UI code: join/leave, send, typing, claim,
//! escalate, close, plus lock-free read accessors. Mutations funnel into
//! the actor; suspending API calls run as spawned tasks so they complete
//! and reconcile even if the caller's future is dropped mid-navigation.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use liveline_protocol::{
    ClaimResponse, ConnectionState, SenderKind, SessionState, SessionSummary, SupportMessage,
    Update,
};

use crate::actor::CoordinatorActor;
use crate::api::SupportApi;
use crate::claim::ClaimAdmission;
use crate::command::Command;
use crate::config::CoordinatorConfig;
use crate::error::CoordinatorError;
use crate::push::{AdapterControl, PushAdapter, PushTransport};
use crate::registry::SnapshotMap;

/// Who this client acts as.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub sender: SenderKind,
}

impl Identity {
    /// An end user asking for help.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            sender: SenderKind::User,
        }
    }

    /// A human operator working the queue.
    pub fn operator(operator_id: impl Into<String>) -> Self {
        Self {
            user_id: operator_id.into(),
            sender: SenderKind::Operator,
        }
    }
}

/// Result of a claim attempt. Losing the race is a defined outcome, not
/// an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Won,
    AlreadyClaimed { operator_id: String },
    AttemptInFlight,
}

/// A joined session: the state at subscribe time plus the update stream.
#[derive(Debug)]
pub struct JoinedSession {
    pub state: SessionState,
    pub updates: mpsc::Receiver<Update>,
}

/// Handle to a running coordinator (cheap to Clone).
#[derive(Clone)]
pub struct Coordinator {
    command_tx: mpsc::Sender<Command>,
    control_tx: mpsc::Sender<AdapterControl>,
    api: Arc<dyn SupportApi>,
    snapshots: SnapshotMap,
    connection: Arc<ArcSwap<ConnectionState>>,
    identity: Identity,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Spawn the state-owning actor and push adapter, returning a handle.
    pub fn spawn(
        api: Arc<dyn SupportApi>,
        transport: Arc<dyn PushTransport>,
        identity: Identity,
        config: CoordinatorConfig,
    ) -> Coordinator {
        let snapshots: SnapshotMap = Arc::new(DashMap::new());
        let connection = Arc::new(ArcSwap::from_pointee(ConnectionState::Reconnecting));
        let command_tx = CoordinatorActor::spawn(
            config.clone(),
            Arc::clone(&snapshots),
            Arc::clone(&connection),
        );
        let (adapter, control_tx) = PushAdapter::new(
            transport,
            Arc::clone(&api),
            command_tx.clone(),
            config.clone(),
        );
        tokio::spawn(adapter.run());

        Coordinator {
            command_tx,
            control_tx,
            api,
            snapshots,
            connection,
            identity,
            config,
        }
    }

    // -- Session membership --------------------------------------------------

    /// Join a session: load it, subscribe to its push events, and attach
    /// an update stream.
    pub async fn join(&self, session_id: &str) -> Result<JoinedSession, CoordinatorError> {
        let snapshot = self.api.fetch_session(session_id).await?;
        self.command(Command::UpsertSession { snapshot }).await?;

        match self.api.fetch_history(session_id).await {
            Ok(messages) => {
                self.command(Command::MergeHistory {
                    session_id: session_id.to_string(),
                    messages,
                })
                .await?;
            }
            Err(e) => {
                // Non-fatal: push delivery and polling close the gap.
                tracing::warn!(
                    component = "coordinator",
                    event = "coordinator.join.history_failed",
                    session_id = %session_id,
                    error = %e,
                    "History fetch failed during join"
                );
            }
        }

        let _ = self
            .control_tx
            .send(AdapterControl::Join {
                session_id: session_id.to_string(),
            })
            .await;

        let (tx, updates) = mpsc::channel(self.config.update_buffer);
        let (reply, reply_rx) = oneshot::channel();
        self.command(Command::Subscribe {
            session_id: session_id.to_string(),
            tx,
            reply,
        })
        .await?;
        let state = reply_rx
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?
            .ok_or_else(|| CoordinatorError::SessionUnknown(session_id.to_string()))?;

        Ok(JoinedSession { state, updates })
    }

    /// Advisory: decrements the session's reference count. In-flight
    /// send/claim calls keep running to completion.
    pub async fn leave(&self, session_id: &str) {
        let _ = self
            .control_tx
            .send(AdapterControl::Leave {
                session_id: session_id.to_string(),
            })
            .await;
    }

    // -- Messaging -----------------------------------------------------------

    /// Optimistically append and send a message. Returns the optimistic
    /// entry immediately; confirmation or failure arrives as an update.
    pub async fn send(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<SupportMessage, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::BeginSend {
            session_id: session_id.to_string(),
            content: content.to_string(),
            sender: self.identity.sender,
            reply,
        })
        .await?;
        let optimistic = rx.await.map_err(|_| CoordinatorError::ChannelClosed)??;

        self.spawn_send(session_id, optimistic.id.clone(), optimistic.content.clone());
        Ok(optimistic)
    }

    /// Re-run the send path for a message that previously failed.
    pub async fn retry_send(
        &self,
        session_id: &str,
        message_id: &str,
    ) -> Result<(), CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::BeginRetry {
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
            reply,
        })
        .await?;
        let content = rx.await.map_err(|_| CoordinatorError::ChannelClosed)??;

        self.spawn_send(session_id, message_id.to_string(), content);
        Ok(())
    }

    fn spawn_send(&self, session_id: &str, temp_id: String, content: String) {
        let api = Arc::clone(&self.api);
        let tx = self.command_tx.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            let result = api.send_message(&session_id, &content).await;
            let _ = tx
                .send(Command::FinishSend {
                    session_id,
                    temp_id,
                    result,
                })
                .await;
        });
    }

    // -- Presence ------------------------------------------------------------

    /// Best-effort on both legs: local tracker and outbound signal.
    pub async fn set_typing(&self, session_id: &str, is_typing: bool) {
        let _ = self
            .command_tx
            .send(Command::SetTyping {
                session_id: session_id.to_string(),
                user_id: self.identity.user_id.clone(),
                is_typing,
            })
            .await;
        let _ = self
            .control_tx
            .send(AdapterControl::PublishTyping {
                session_id: session_id.to_string(),
                is_typing,
            })
            .await;
    }

    // -- Claim ---------------------------------------------------------------

    /// Attempt to take ownership of a session. Exactly one operator wins
    /// server-side; losing reconciles to the winner and is reported as
    /// `AlreadyClaimed`.
    pub async fn claim(&self, session_id: &str) -> Result<ClaimOutcome, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::BeginClaim {
            session_id: session_id.to_string(),
            operator_id: self.identity.user_id.clone(),
            reply,
        })
        .await?;

        match rx.await.map_err(|_| CoordinatorError::ChannelClosed)?? {
            ClaimAdmission::AttemptInFlight => Ok(ClaimOutcome::AttemptInFlight),
            ClaimAdmission::AlreadyOwned { operator_id } => {
                Ok(ClaimOutcome::AlreadyClaimed { operator_id })
            }
            ClaimAdmission::Proceed => {
                let api = Arc::clone(&self.api);
                let tx = self.command_tx.clone();
                let sid = session_id.to_string();
                let operator_id = self.identity.user_id.clone();
                // Spawned so the reconciliation lands even if the caller
                // navigates away before the response.
                let request = tokio::spawn(async move {
                    let result = api.claim_session(&sid, &operator_id).await;
                    let response = result.as_ref().ok().cloned();
                    let _ = tx
                        .send(Command::FinishClaim {
                            session_id: sid,
                            response,
                        })
                        .await;
                    result
                });
                match request.await {
                    Ok(Ok(ClaimResponse::Granted { .. })) => Ok(ClaimOutcome::Won),
                    Ok(Ok(ClaimResponse::Rejected { current_owner })) => {
                        Ok(ClaimOutcome::AlreadyClaimed {
                            operator_id: current_owner,
                        })
                    }
                    Ok(Err(e)) => Err(CoordinatorError::Api(e)),
                    Err(_) => Err(CoordinatorError::ChannelClosed),
                }
            }
        }
    }

    // -- Lifecycle -----------------------------------------------------------

    /// Bump the automated-handling escalation level; optionally re-queue
    /// the session for a human.
    pub async fn escalate(&self, session_id: &str, requeue: bool) -> Result<(), CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Escalate {
            session_id: session_id.to_string(),
            requeue,
            reply,
        })
        .await?;
        rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    /// Close a session. A close on an already-ended session is a no-op.
    pub async fn close(
        &self,
        session_id: &str,
        reason: Option<&str>,
    ) -> Result<(), CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::BeginClose {
            session_id: session_id.to_string(),
            reply,
        })
        .await?;
        if !rx.await.map_err(|_| CoordinatorError::ChannelClosed)?? {
            return Ok(());
        }

        let api = Arc::clone(&self.api);
        let tx = self.command_tx.clone();
        let sid = session_id.to_string();
        let reason = reason.map(str::to_string);
        let request = tokio::spawn(async move {
            let result = api.close_session(&sid, reason.as_deref()).await;
            if let Ok(snapshot) = &result {
                let _ = tx
                    .send(Command::ApplyClose {
                        session_id: sid,
                        snapshot: snapshot.clone(),
                    })
                    .await;
            }
            result
        });
        match request.await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(CoordinatorError::Api(e)),
            Err(_) => Err(CoordinatorError::ChannelClosed),
        }
    }

    // -- Reads ---------------------------------------------------------------

    /// Lock-free snapshot of one session.
    pub fn session(&self, session_id: &str) -> Option<Arc<SessionState>> {
        self.snapshots
            .get(session_id)
            .map(|slot| slot.load_full())
    }

    /// Ordered message list of one session.
    pub fn messages(&self, session_id: &str) -> Vec<SupportMessage> {
        self.session(session_id)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// Unexpired typists, filtered at read time.
    pub fn active_typists(&self, session_id: &str) -> Vec<String> {
        let now = Utc::now();
        self.session(session_id)
            .map(|s| {
                s.typists
                    .iter()
                    .filter(|t| t.expires_at > now)
                    .map(|t| t.user_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn connection_state(&self) -> ConnectionState {
        **self.connection.load()
    }

    /// Summaries of every tracked session.
    pub async fn sessions(&self) -> Result<Vec<SessionSummary>, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::GetSummaries { reply }).await?;
        rx.await.map_err(|_| CoordinatorError::ChannelClosed)
    }

    /// Subscribe to list-level updates (session created/ended, deltas,
    /// connection changes).
    pub async fn subscribe_list(&self) -> Result<mpsc::Receiver<Update>, CoordinatorError> {
        let (tx, rx) = mpsc::channel(self.config.update_buffer);
        self.command(Command::SubscribeList { tx }).await?;
        Ok(rx)
    }

    async fn command(&self, cmd: Command) -> Result<(), CoordinatorError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
