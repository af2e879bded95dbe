//! In-memory fakes shared by actor, adapter, and coordinator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;

use liveline_protocol::{
    ClaimResponse, DeliveryState, SenderKind, SessionSnapshot, SessionStatus, SupportMessage,
};

use crate::api::SupportApi;
use crate::error::{ApiError, TransportError};
use crate::push::{PushConnection, PushTransport};

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn pending_snapshot(id: &str) -> SessionSnapshot {
    SessionSnapshot {
        id: id.to_string(),
        status: SessionStatus::Pending,
        escalation_level: 0,
        assigned_operator_id: None,
        created_at: ts(0),
        closed_at: None,
        origin_context: Some("billing".to_string()),
        current_context: None,
        needs_attention: false,
        last_activity_at: None,
    }
}

pub fn server_message(id: &str, session_id: &str, secs: i64) -> SupportMessage {
    SupportMessage {
        id: id.to_string(),
        session_id: session_id.to_string(),
        sender: SenderKind::Assistant,
        content: format!("reply {id}"),
        sent_at: ts(secs),
        delivery: DeliveryState::Confirmed,
    }
}

// ---------------------------------------------------------------------------
// FakeApi — in-memory backend with real compare-and-swap claim semantics
// ---------------------------------------------------------------------------

pub struct FakeApi {
    sessions: Mutex<HashMap<String, SessionSnapshot>>,
    history: Mutex<HashMap<String, Vec<SupportMessage>>>,
    sent: Mutex<Vec<(String, String)>>,
    fail_sends: AtomicBool,
    close_calls: AtomicUsize,
    next_message_id: AtomicU64,
    claim_delay: Mutex<Option<std::time::Duration>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            next_message_id: AtomicU64::new(1),
            claim_delay: Mutex::new(None),
        }
    }

    /// Delay claim responses, to hold a claim attempt in flight.
    pub fn set_claim_delay(&self, delay: std::time::Duration) {
        *self.claim_delay.lock().unwrap() = Some(delay);
    }

    pub fn insert_session(&self, snapshot: SessionSnapshot) {
        self.sessions
            .lock()
            .unwrap()
            .insert(snapshot.id.clone(), snapshot);
    }

    pub fn set_history(&self, session_id: &str, messages: Vec<SupportMessage>) {
        self.history
            .lock()
            .unwrap()
            .insert(session_id.to_string(), messages);
    }

    /// Server-side claim, for simulating another operator winning.
    pub fn claim(&self, session_id: &str, operator_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(snap) = sessions.get_mut(session_id) {
            snap.status = SessionStatus::AdminActive;
            snap.assigned_operator_id = Some(operator_id.to_string());
        }
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SupportApi for FakeApi {
    async fn fetch_session(&self, session_id: &str) -> Result<SessionSnapshot, ApiError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                endpoint: format!("/sessions/{session_id}"),
                status: 404,
            })
    }

    async fn fetch_history(&self, session_id: &str) -> Result<Vec<SupportMessage>, ApiError> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<SupportMessage, ApiError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                endpoint: format!("/sessions/{session_id}/messages"),
                status: 503,
            });
        }
        let n = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        let canonical = SupportMessage {
            id: format!("srv-{n}"),
            session_id: session_id.to_string(),
            sender: SenderKind::User,
            content: content.to_string(),
            sent_at: Utc::now(),
            delivery: DeliveryState::Confirmed,
        };
        self.sent
            .lock()
            .unwrap()
            .push((session_id.to_string(), content.to_string()));
        self.history
            .lock()
            .unwrap()
            .entry(session_id.to_string())
            .or_default()
            .push(canonical.clone());
        Ok(canonical)
    }

    async fn claim_session(
        &self,
        session_id: &str,
        operator_id: &str,
    ) -> Result<ClaimResponse, ApiError> {
        let delay = *self.claim_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut sessions = self.sessions.lock().unwrap();
        let snap = sessions.get_mut(session_id).ok_or_else(|| ApiError::Status {
            endpoint: format!("/sessions/{session_id}/claim"),
            status: 404,
        })?;
        if snap.status.is_claimable() && snap.assigned_operator_id.is_none() {
            snap.status = SessionStatus::AdminActive;
            snap.assigned_operator_id = Some(operator_id.to_string());
            Ok(ClaimResponse::Granted {
                session: snap.clone(),
            })
        } else {
            Ok(ClaimResponse::Rejected {
                current_owner: snap
                    .assigned_operator_id
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            })
        }
    }

    async fn close_session(
        &self,
        session_id: &str,
        _reason: Option<&str>,
    ) -> Result<SessionSnapshot, ApiError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let mut sessions = self.sessions.lock().unwrap();
        let snap = sessions.get_mut(session_id).ok_or_else(|| ApiError::Status {
            endpoint: format!("/sessions/{session_id}/close"),
            status: 404,
        })?;
        snap.status = SessionStatus::Closed;
        snap.closed_at = Some(Utc::now());
        snap.assigned_operator_id = None;
        Ok(snap.clone())
    }
}

// ---------------------------------------------------------------------------
// FakeTransport — scripted connections feeding raw JSON frames
// ---------------------------------------------------------------------------

enum ConnScript {
    Fail,
    Conn(mpsc::UnboundedReceiver<String>),
}

pub struct FakeTransport {
    scripts: Mutex<VecDeque<ConnScript>>,
    joins: Arc<Mutex<Vec<String>>>,
    leaves: Arc<Mutex<Vec<String>>>,
    typing: Arc<Mutex<Vec<(String, bool)>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            joins: Arc::new(Mutex::new(Vec::new())),
            leaves: Arc::new(Mutex::new(Vec::new())),
            typing: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Script a successful connection; returns the frame sender. Dropping
    /// it closes the connection.
    pub fn push_connection(&self) -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().unwrap().push_back(ConnScript::Conn(rx));
        tx
    }

    /// Script one failed connect attempt.
    pub fn push_connect_failure(&self) {
        self.scripts.lock().unwrap().push_back(ConnScript::Fail);
    }

    pub fn joins(&self) -> Vec<String> {
        self.joins.lock().unwrap().clone()
    }

    pub fn leaves(&self) -> Vec<String> {
        self.leaves.lock().unwrap().clone()
    }

    pub fn typing(&self) -> Vec<(String, bool)> {
        self.typing.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, TransportError> {
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(ConnScript::Conn(rx)) => Ok(Box::new(FakeConnection {
                frames: rx,
                joins: Arc::clone(&self.joins),
                leaves: Arc::clone(&self.leaves),
                typing: Arc::clone(&self.typing),
            })),
            Some(ConnScript::Fail) => Err(TransportError::Connect("scripted failure".to_string())),
            // Script exhausted: park forever so tests end deterministically.
            None => futures::future::pending().await,
        }
    }
}

struct FakeConnection {
    frames: mpsc::UnboundedReceiver<String>,
    joins: Arc<Mutex<Vec<String>>>,
    leaves: Arc<Mutex<Vec<String>>>,
    typing: Arc<Mutex<Vec<(String, bool)>>>,
}

#[async_trait]
impl PushConnection for FakeConnection {
    async fn join(&mut self, session_id: &str) -> Result<(), TransportError> {
        self.joins.lock().unwrap().push(session_id.to_string());
        Ok(())
    }

    async fn leave(&mut self, session_id: &str) -> Result<(), TransportError> {
        self.leaves.lock().unwrap().push(session_id.to_string());
        Ok(())
    }

    async fn publish_typing(
        &mut self,
        session_id: &str,
        is_typing: bool,
    ) -> Result<(), TransportError> {
        self.typing
            .lock()
            .unwrap()
            .push((session_id.to_string(), is_typing));
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<String> {
        self.frames.recv().await
    }
}
