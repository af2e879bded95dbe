//! Core types shared across the protocol

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Waiting for a human operator to claim the conversation
    Pending,
    /// Handled by the automated assistant
    AiActive,
    /// Owned by a human operator
    AdminActive,
    Closed,
    TimedOut,
}

impl SessionStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Closed | SessionStatus::TimedOut)
    }

    /// States from which an operator claim can succeed.
    pub fn is_claimable(self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::AiActive)
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderKind {
    User,
    Operator,
    Assistant,
    System,
}

/// Client-side delivery state of a message.
///
/// Server-delivered messages are always `Confirmed`; only optimistic local
/// entries pass through `Sending` and possibly `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    #[default]
    Confirmed,
    Sending,
    Failed,
}

/// A message in a support conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportMessage {
    pub id: String,
    pub session_id: String,
    pub sender: SenderKind,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub delivery: DeliveryState,
}

impl SupportMessage {
    /// Ordering key: `sent_at` primary, id as tie-break. Gives a
    /// deterministic total order even when two sources deliver the same
    /// timestamp.
    pub fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.sent_at, self.id.as_str())
    }
}

/// Typing presence for one participant of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingState {
    pub session_id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Maximum escalation level a session can reach.
pub const MAX_ESCALATION_LEVEL: u8 = 3;

/// Server-side snapshot of a session (no message history)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub status: SessionStatus,
    pub escalation_level: u8,
    pub assigned_operator_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,
    #[serde(default)]
    pub needs_attention: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Summary of a session for list views
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub status: SessionStatus,
    pub escalation_level: u8,
    pub assigned_operator_id: Option<String>,
    pub needs_attention: bool,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Full session state as seen by the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    pub status: SessionStatus,
    pub escalation_level: u8,
    pub assigned_operator_id: Option<String>,
    pub needs_attention: bool,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub origin_context: Option<String>,
    pub current_context: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub messages: Vec<SupportMessage>,
    /// Raw typing entries; readers filter by `expires_at` at access time.
    pub typists: Vec<TypingState>,
}

impl SessionState {
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            status: self.status,
            escalation_level: self.escalation_level,
            assigned_operator_id: self.assigned_operator_id.clone(),
            needs_attention: self.needs_attention,
            message_count: self.messages.len(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
        }
    }
}

/// Changes to apply to a session state (delta updates)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_operator_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_attention: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_context: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl SessionChanges {
    /// True when no field is set; empty deltas are not broadcast.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.escalation_level.is_none()
            && self.assigned_operator_id.is_none()
            && self.needs_attention.is_none()
            && self.closed_at.is_none()
            && self.current_context.is_none()
            && self.last_activity_at.is_none()
    }
}

/// Health of the push channel, exposed to the UI as a non-blocking
/// indicator rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Degraded,
    Reconnecting,
}
