//! Pure lifecycle transition function
//!
//! All business logic for session status changes lives here as a pure,
//! synchronous function: `transition(core, input, now) -> (core, effects)`.
//! No IO, no async, no locking — fully unit-testable. Message merging and
//! presence are handled separately (`store`, `presence`); this covers the
//! registry state machine only.

use chrono::{DateTime, Utc};
use liveline_protocol::{
    SessionChanges, SessionSnapshot, SessionStatus, Update, MAX_ESCALATION_LEVEL,
};

// ---------------------------------------------------------------------------
// SessionCore — pure lifecycle data of one session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SessionCore {
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
}

impl SessionCore {
    pub fn from_snapshot(snap: &SessionSnapshot) -> Self {
        Self {
            id: snap.id.clone(),
            status: snap.status,
            escalation_level: snap.escalation_level,
            assigned_operator_id: snap.assigned_operator_id.clone(),
            needs_attention: snap.needs_attention,
            created_at: snap.created_at,
            closed_at: snap.closed_at,
            origin_context: snap.origin_context.clone(),
            current_context: snap.current_context.clone(),
            last_activity_at: snap.last_activity_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Input — one variant per lifecycle event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Input {
    /// The local claim window ran out with no operator claim.
    ClaimWindowElapsed,
    /// An operator claim was confirmed (own request or push broadcast).
    ClaimGranted { operator_id: String },
    /// The assistant handed the session back to the human queue.
    Requeued,
    /// The assistant escalated; optionally re-queues for a human.
    Escalated { requeue: bool },
    /// The `session-needs-attention` push event.
    AttentionFlagged { escalation_level: Option<u8> },
    /// The session reached a terminal state.
    Ended {
        status: SessionStatus,
        reason: Option<String>,
    },
    /// The conversation moved to a different page/feature context.
    ContextChanged { context: Option<String> },
}

// ---------------------------------------------------------------------------
// Effects — describe broadcasts to be executed by the caller
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Effect {
    Emit(Box<Update>),
}

// ---------------------------------------------------------------------------
// transition() — the pure core
// ---------------------------------------------------------------------------

/// Pure, synchronous lifecycle transition.
///
/// Terminal states are closed: any input against a `Closed` or `TimedOut`
/// session returns the state untouched with no effects. A transition that
/// would produce the identical state is a harmless no-op (structural
/// dedup for re-delivered events) and emits nothing.
pub fn transition(
    mut core: SessionCore,
    input: Input,
    now: DateTime<Utc>,
) -> (SessionCore, Vec<Effect>) {
    if core.status.is_terminal() {
        return (core, Vec::new());
    }

    let sid = core.id.clone();
    let mut effects: Vec<Effect> = Vec::new();

    match input {
        Input::ClaimWindowElapsed => {
            if core.status == SessionStatus::Pending {
                core.status = SessionStatus::AiActive;
                core.last_activity_at = Some(now);

                effects.push(Effect::Emit(Box::new(Update::SessionDelta {
                    session_id: sid,
                    changes: SessionChanges {
                        status: Some(SessionStatus::AiActive),
                        last_activity_at: Some(now),
                        ..Default::default()
                    },
                })));
            }
        }

        Input::ClaimGranted { operator_id } => {
            let already_owned =
                core.status == SessionStatus::AdminActive
                    && core.assigned_operator_id.as_deref() == Some(operator_id.as_str());
            if !already_owned {
                let mut changes = SessionChanges {
                    assigned_operator_id: Some(Some(operator_id.clone())),
                    last_activity_at: Some(now),
                    ..Default::default()
                };
                if core.status != SessionStatus::AdminActive {
                    core.status = SessionStatus::AdminActive;
                    changes.status = Some(SessionStatus::AdminActive);
                }
                if core.needs_attention {
                    core.needs_attention = false;
                    changes.needs_attention = Some(false);
                }
                // The server is authoritative: adopt the reported owner
                // even if we believed someone else held the session.
                core.assigned_operator_id = Some(operator_id);
                core.last_activity_at = Some(now);

                effects.push(Effect::Emit(Box::new(Update::SessionDelta {
                    session_id: sid,
                    changes,
                })));
            }
        }

        Input::Requeued => {
            if core.status == SessionStatus::AiActive {
                core.status = SessionStatus::Pending;
                core.last_activity_at = Some(now);

                effects.push(Effect::Emit(Box::new(Update::SessionDelta {
                    session_id: sid,
                    changes: SessionChanges {
                        status: Some(SessionStatus::Pending),
                        last_activity_at: Some(now),
                        ..Default::default()
                    },
                })));
            }
        }

        Input::Escalated { requeue } => {
            if core.status == SessionStatus::AiActive {
                let mut changes = SessionChanges::default();
                if core.escalation_level < MAX_ESCALATION_LEVEL {
                    core.escalation_level += 1;
                    changes.escalation_level = Some(core.escalation_level);
                }
                if requeue {
                    core.status = SessionStatus::Pending;
                    changes.status = Some(SessionStatus::Pending);
                }
                if !changes.is_empty() {
                    core.last_activity_at = Some(now);
                    changes.last_activity_at = Some(now);
                    effects.push(Effect::Emit(Box::new(Update::SessionDelta {
                        session_id: sid,
                        changes,
                    })));
                }
            }
        }

        Input::AttentionFlagged { escalation_level } => {
            let mut changes = SessionChanges::default();
            if !core.needs_attention {
                core.needs_attention = true;
                changes.needs_attention = Some(true);
            }
            // Escalation only ever rises; a lower reported level is stale.
            if let Some(level) = escalation_level {
                if level > core.escalation_level {
                    core.escalation_level = level.min(MAX_ESCALATION_LEVEL);
                    changes.escalation_level = Some(core.escalation_level);
                }
            }
            if !changes.is_empty() {
                core.last_activity_at = Some(now);
                changes.last_activity_at = Some(now);
                effects.push(Effect::Emit(Box::new(Update::SessionDelta {
                    session_id: sid,
                    changes,
                })));
            }
        }

        Input::Ended { status, reason } => {
            debug_assert!(status.is_terminal());
            core.status = status;
            core.closed_at = Some(now);
            core.assigned_operator_id = None;
            core.last_activity_at = Some(now);

            effects.push(Effect::Emit(Box::new(Update::SessionEnded {
                session_id: sid,
                status,
                reason,
            })));
        }

        Input::ContextChanged { context } => {
            if context != core.current_context {
                core.current_context = context.clone();
                core.last_activity_at = Some(now);

                effects.push(Effect::Emit(Box::new(Update::SessionDelta {
                    session_id: sid,
                    changes: SessionChanges {
                        current_context: Some(context),
                        last_activity_at: Some(now),
                        ..Default::default()
                    },
                })));
            }
        }
    }

    (core, effects)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
