//! Request/response payloads for the support backend API

use serde::{Deserialize, Serialize};

use crate::types::SessionSnapshot;

/// Result of a conditional claim write.
///
/// Rejection is an expected race outcome, not an error: another operator
/// won first and the client reconciles to the reported owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimResponse {
    Granted { session: SessionSnapshot },
    Rejected { current_owner: String },
}

/// Body of a send-message call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Body of a close-session call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Body of a claim-session call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimSessionRequest {
    pub operator_id: String,
}
