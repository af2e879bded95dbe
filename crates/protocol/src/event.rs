//! Push-channel events (server → client)

use serde::{Deserialize, Serialize};

use crate::types::{SessionSnapshot, SessionStatus, SupportMessage};

/// Events delivered over the push channel.
///
/// Every variant carries enough identity to be applied idempotently; the
/// optional `seq` is the server's per-session delivery counter, used to
/// drop re-deliveries after a reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    MessageReceived {
        session_id: String,
        message: SupportMessage,
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    SessionClaimed {
        session_id: String,
        operator_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    SessionClosed {
        session_id: String,
        /// `Closed` or `TimedOut`; the server decides which.
        status: SessionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    UserJoined {
        session_id: String,
        user_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    TypingChanged {
        session_id: String,
        user_id: String,
        is_typing: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    NewSessionCreated {
        session: SessionSnapshot,
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
    SessionNeedsAttention {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        escalation_level: Option<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
    },
}

impl PushEvent {
    /// The session this event targets.
    pub fn session_id(&self) -> &str {
        match self {
            PushEvent::MessageReceived { session_id, .. }
            | PushEvent::SessionClaimed { session_id, .. }
            | PushEvent::SessionClosed { session_id, .. }
            | PushEvent::UserJoined { session_id, .. }
            | PushEvent::TypingChanged { session_id, .. }
            | PushEvent::SessionNeedsAttention { session_id, .. } => session_id,
            PushEvent::NewSessionCreated { session, .. } => &session.id,
        }
    }

    /// The server's delivery sequence number, when the transport provides
    /// one.
    pub fn seq(&self) -> Option<u64> {
        match self {
            PushEvent::MessageReceived { seq, .. }
            | PushEvent::SessionClaimed { seq, .. }
            | PushEvent::SessionClosed { seq, .. }
            | PushEvent::UserJoined { seq, .. }
            | PushEvent::TypingChanged { seq, .. }
            | PushEvent::NewSessionCreated { seq, .. }
            | PushEvent::SessionNeedsAttention { seq, .. } => *seq,
        }
    }
}
