//! Coordinator → UI updates

use serde::{Deserialize, Serialize};

use crate::types::{
    ConnectionState, SessionChanges, SessionStatus, SessionSummary, SupportMessage,
};

/// Incremental updates broadcast to UI subscribers.
///
/// Subscribers receive a full `SessionState` snapshot when they attach and
/// deltas from then on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Update {
    SessionCreated {
        session: SessionSummary,
    },
    SessionDelta {
        session_id: String,
        changes: SessionChanges,
    },
    MessageAppended {
        session_id: String,
        message: SupportMessage,
    },
    /// An optimistic message was replaced by its server-confirmed version.
    MessageReplaced {
        session_id: String,
        temp_id: String,
        message: SupportMessage,
    },
    /// An optimistic message failed to send; the entry stays in place so
    /// the UI can offer retry.
    MessageFailed {
        session_id: String,
        message_id: String,
    },
    TypingChanged {
        session_id: String,
        typists: Vec<String>,
    },
    ParticipantJoined {
        session_id: String,
        user_id: String,
    },
    SessionEnded {
        session_id: String,
        status: SessionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ConnectionChanged {
        state: ConnectionState,
    },
}
