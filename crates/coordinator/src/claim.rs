//! Client-side claim arbitration
//!
//! The server performs the authoritative compare-and-swap; this gate is
//! the cooperative client contract: at most one outstanding claim request
//! per session, admitted atomically inside the state-owning actor so two
//! local callers in the same tick cannot both proceed.

use chrono::{DateTime, Utc};
use liveline_protocol::SessionStatus;

/// A transient claim intent, held only while the request is outstanding.
#[derive(Debug, Clone)]
pub struct ClaimAttempt {
    pub operator_id: String,
    pub attempted_at: DateTime<Utc>,
}

/// Result of asking the gate whether a claim request may be issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimAdmission {
    /// No conflict; the caller should issue the request.
    Proceed,
    /// A local claim request is already outstanding for this session.
    AttemptInFlight,
    /// The session is already `AdminActive`; no round trip needed.
    AlreadyOwned { operator_id: String },
}

#[derive(Debug, Default)]
pub struct ClaimGate {
    in_flight: Option<ClaimAttempt>,
}

impl ClaimGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-set: admit a claim attempt against the current session
    /// status. Callers must have excluded terminal sessions already.
    pub fn admit(
        &mut self,
        status: SessionStatus,
        assigned_operator_id: Option<&str>,
        operator_id: &str,
        now: DateTime<Utc>,
    ) -> ClaimAdmission {
        if let Some(attempt) = &self.in_flight {
            tracing::debug!(
                component = "claim",
                event = "claim.attempt.rejected_in_flight",
                operator_id = %operator_id,
                outstanding_operator_id = %attempt.operator_id,
                outstanding_since = %attempt.attempted_at,
                "Claim attempt while another is outstanding"
            );
            return ClaimAdmission::AttemptInFlight;
        }
        if status == SessionStatus::AdminActive {
            return ClaimAdmission::AlreadyOwned {
                operator_id: assigned_operator_id.unwrap_or_default().to_string(),
            };
        }
        self.in_flight = Some(ClaimAttempt {
            operator_id: operator_id.to_string(),
            attempted_at: now,
        });
        ClaimAdmission::Proceed
    }

    /// Clear the outstanding attempt once its request resolved.
    pub fn clear(&mut self) -> Option<ClaimAttempt> {
        self.in_flight.take()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }
}
