//! Support backend API
//!
//! The collaborator contract consumed by the coordinator. Exact wire
//! shapes belong to the excluded backend; `HttpSupportApi` is the
//! default JSON-over-HTTP binding.

use async_trait::async_trait;

use liveline_protocol::{
    api::{ClaimSessionRequest, CloseSessionRequest, SendMessageRequest},
    ClaimResponse, SessionSnapshot, SupportMessage,
};

use crate::error::ApiError;

#[async_trait]
pub trait SupportApi: Send + Sync + 'static {
    async fn fetch_session(&self, session_id: &str) -> Result<SessionSnapshot, ApiError>;

    /// Ordered message batch; used for initial load and post-reconnect
    /// reconciliation.
    async fn fetch_history(&self, session_id: &str) -> Result<Vec<SupportMessage>, ApiError>;

    /// Resolves to the canonical message (real id, canonical timestamp).
    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<SupportMessage, ApiError>;

    /// Conditional write: succeeds only if the session is unowned and
    /// claimable. Rejection reports the winning operator.
    async fn claim_session(
        &self,
        session_id: &str,
        operator_id: &str,
    ) -> Result<ClaimResponse, ApiError>;

    async fn close_session(
        &self,
        session_id: &str,
        reason: Option<&str>,
    ) -> Result<SessionSnapshot, ApiError>;
}

/// JSON-over-HTTP implementation of the support backend contract.
pub struct HttpSupportApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSupportApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl SupportApi for HttpSupportApi {
    async fn fetch_session(&self, session_id: &str) -> Result<SessionSnapshot, ApiError> {
        let endpoint = self.url(&format!("/sessions/{session_id}"));
        let resp = self.client.get(&endpoint).send().await?;
        decode(endpoint, resp).await
    }

    async fn fetch_history(&self, session_id: &str) -> Result<Vec<SupportMessage>, ApiError> {
        let endpoint = self.url(&format!("/sessions/{session_id}/messages"));
        let resp = self.client.get(&endpoint).send().await?;
        decode(endpoint, resp).await
    }

    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<SupportMessage, ApiError> {
        let endpoint = self.url(&format!("/sessions/{session_id}/messages"));
        let resp = self
            .client
            .post(&endpoint)
            .json(&SendMessageRequest {
                content: content.to_string(),
            })
            .send()
            .await?;
        decode(endpoint, resp).await
    }

    async fn claim_session(
        &self,
        session_id: &str,
        operator_id: &str,
    ) -> Result<ClaimResponse, ApiError> {
        let endpoint = self.url(&format!("/sessions/{session_id}/claim"));
        let resp = self
            .client
            .post(&endpoint)
            .json(&ClaimSessionRequest {
                operator_id: operator_id.to_string(),
            })
            .send()
            .await?;
        decode(endpoint, resp).await
    }

    async fn close_session(
        &self,
        session_id: &str,
        reason: Option<&str>,
    ) -> Result<SessionSnapshot, ApiError> {
        let endpoint = self.url(&format!("/sessions/{session_id}/close"));
        let resp = self
            .client
            .post(&endpoint)
            .json(&CloseSessionRequest {
                reason: reason.map(str::to_string),
            })
            .send()
            .await?;
        decode(endpoint, resp).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    endpoint: String,
    resp: reqwest::Response,
) -> Result<T, ApiError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(ApiError::Status {
            endpoint,
            status: status.as_u16(),
        });
    }
    Ok(resp.json::<T>().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let api = HttpSupportApi::new("https://support.example.com/");
        assert_eq!(
            api.url("/sessions/s1"),
            "https://support.example.com/sessions/s1"
        );
    }
}
