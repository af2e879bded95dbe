//! Commands consumed by the coordinator actor.
//!
//! Every mutation — façade calls, push-channel deliveries, claim-window
//! timers, presence sweeps — arrives here, so merge and arbitration rules
//! always run against a consistent snapshot of the registry.

use tokio::sync::{mpsc, oneshot};

use liveline_protocol::{
    ClaimResponse, ConnectionState, PushEvent, SenderKind, SessionSnapshot, SessionState,
    SessionSummary, SupportMessage, Update,
};

use crate::claim::ClaimAdmission;
use crate::error::{ApiError, CoordinatorError};

pub enum Command {
    // -- Queries (use oneshot reply channels) --
    GetState {
        session_id: String,
        reply: oneshot::Sender<Option<SessionState>>,
    },
    GetSummaries {
        reply: oneshot::Sender<Vec<SessionSummary>>,
    },

    // -- Subscriptions --
    /// Attach a session subscriber; replies with the current state, or
    /// None if the session is unknown.
    Subscribe {
        session_id: String,
        tx: mpsc::Sender<Update>,
        reply: oneshot::Sender<Option<SessionState>>,
    },
    SubscribeList {
        tx: mpsc::Sender<Update>,
    },

    // -- Session intake / reconciliation --
    /// Insert a session from a server snapshot, or reconcile the existing
    /// record against it.
    UpsertSession {
        snapshot: SessionSnapshot,
    },
    MergeHistory {
        session_id: String,
        messages: Vec<SupportMessage>,
    },

    // -- Local actions --
    /// Validate and apply the optimistic append for a send; replies with
    /// the optimistic message the UI can render immediately.
    BeginSend {
        session_id: String,
        content: String,
        sender: SenderKind,
        reply: oneshot::Sender<Result<SupportMessage, CoordinatorError>>,
    },
    /// Reconcile the outcome of the send call.
    FinishSend {
        session_id: String,
        temp_id: String,
        result: Result<SupportMessage, ApiError>,
    },
    /// Flip a failed message back to sending; replies with its content so
    /// the caller can re-run the send path.
    BeginRetry {
        session_id: String,
        message_id: String,
        reply: oneshot::Sender<Result<String, CoordinatorError>>,
    },
    SetTyping {
        session_id: String,
        user_id: String,
        is_typing: bool,
    },
    BeginClaim {
        session_id: String,
        operator_id: String,
        reply: oneshot::Sender<Result<ClaimAdmission, CoordinatorError>>,
    },
    /// Reconcile the outcome of the claim call; None means the request
    /// itself failed.
    FinishClaim {
        session_id: String,
        response: Option<ClaimResponse>,
    },
    /// Validate a close; replies Ok(false) for the terminal no-op case.
    BeginClose {
        session_id: String,
        reply: oneshot::Sender<Result<bool, CoordinatorError>>,
    },
    ApplyClose {
        session_id: String,
        snapshot: SessionSnapshot,
    },
    Escalate {
        session_id: String,
        requeue: bool,
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },

    // -- Push channel & timers --
    ApplyEvent {
        event: PushEvent,
    },
    ClaimWindowElapsed {
        session_id: String,
    },
    SweepPresence,
    SetConnectionState {
        state: ConnectionState,
    },
    /// The adapter's reference count for a session dropped to zero.
    SessionReleased {
        session_id: String,
    },
}
