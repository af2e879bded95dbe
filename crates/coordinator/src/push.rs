//! Push channel adapter
//!
//! Owns the long-lived push transport and translates its frames into
//! actor commands. Joins are reference-counted so leaving one view does
//! not tear down a session another view still needs. On disconnect the
//! adapter degrades to polling the request/response API and reconnects
//! with capped exponential backoff; every (re)join triggers one
//! reconciliation fetch, which the store's merge rules make safe to do
//! unconditionally.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use liveline_protocol::{ConnectionState, PushEvent};

use crate::api::SupportApi;
use crate::command::Command;
use crate::config::CoordinatorConfig;
use crate::error::TransportError;

/// A factory for push connections.
#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn PushConnection>, TransportError>;
}

/// One live push connection. Frames are raw JSON text; the adapter owns
/// decoding so a malformed frame can never take the connection down.
#[async_trait]
pub trait PushConnection: Send {
    async fn join(&mut self, session_id: &str) -> Result<(), TransportError>;

    async fn leave(&mut self, session_id: &str) -> Result<(), TransportError>;

    /// Best-effort outbound typing signal; never retried.
    async fn publish_typing(
        &mut self,
        session_id: &str,
        is_typing: bool,
    ) -> Result<(), TransportError>;

    /// Next frame from the server; None means the connection closed.
    async fn next_frame(&mut self) -> Option<String>;
}

/// Requests from the coordinator façade to the adapter.
pub enum AdapterControl {
    Join { session_id: String },
    Leave { session_id: String },
    PublishTyping { session_id: String, is_typing: bool },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

pub struct PushAdapter {
    transport: Arc<dyn PushTransport>,
    api: Arc<dyn SupportApi>,
    command_tx: mpsc::Sender<Command>,
    control_rx: mpsc::Receiver<AdapterControl>,
    // session_id -> number of views that joined it
    joined: HashMap<String, usize>,
    config: CoordinatorConfig,
}

impl PushAdapter {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        api: Arc<dyn SupportApi>,
        command_tx: mpsc::Sender<Command>,
        config: CoordinatorConfig,
    ) -> (Self, mpsc::Sender<AdapterControl>) {
        let (control_tx, control_rx) = mpsc::channel(config.command_buffer);
        let adapter = Self {
            transport,
            api,
            command_tx,
            control_rx,
            joined: HashMap::new(),
            config,
        };
        (adapter, control_tx)
    }

    pub async fn run(mut self) {
        let mut backoff = self.config.reconnect_initial;
        loop {
            self.set_connection_state(ConnectionState::Reconnecting)
                .await;
            match self.transport.connect().await {
                Ok(mut conn) => {
                    backoff = self.config.reconnect_initial;
                    self.set_connection_state(ConnectionState::Connected).await;
                    info!(
                        component = "push",
                        event = "push.connected",
                        sessions = self.joined.len(),
                        "Push channel connected"
                    );

                    // Re-join everything and close the event gap with one
                    // reconciliation fetch per session.
                    let ids: Vec<String> = self.joined.keys().cloned().collect();
                    for id in ids {
                        if let Err(e) = conn.join(&id).await {
                            warn!(
                                component = "push",
                                event = "push.rejoin.failed",
                                session_id = %id,
                                error = %e,
                                "Re-join failed after reconnect"
                            );
                        }
                        self.reconcile(&id).await;
                    }

                    if self.drive_connected(conn.as_mut()).await == Flow::Shutdown {
                        return;
                    }
                }
                Err(e) => {
                    debug!(
                        component = "push",
                        event = "push.connect.failed",
                        error = %e,
                        "Push connect attempt failed"
                    );
                }
            }

            self.set_connection_state(ConnectionState::Degraded).await;
            if self.drive_degraded(backoff).await == Flow::Shutdown {
                return;
            }
            backoff = (backoff * 2).min(self.config.reconnect_max);
        }
    }

    /// Serve control requests and deliver frames until the connection
    /// drops or the adapter is shut down.
    async fn drive_connected(&mut self, conn: &mut dyn PushConnection) -> Flow {
        loop {
            tokio::select! {
                maybe_ctrl = self.control_rx.recv() => match maybe_ctrl {
                    Some(ctrl) => {
                        if self.handle_control_connected(conn, ctrl).await == Flow::Shutdown {
                            return Flow::Shutdown;
                        }
                    }
                    None => return Flow::Shutdown,
                },
                frame = conn.next_frame() => match frame {
                    Some(text) => self.dispatch_frame(&text).await,
                    None => {
                        warn!(
                            component = "push",
                            event = "push.disconnected",
                            "Push channel dropped; falling back to polling"
                        );
                        return Flow::Continue;
                    }
                },
            }
        }
    }

    /// Poll joined sessions while disconnected, then give the transport
    /// another try once the backoff elapses.
    async fn drive_degraded(&mut self, backoff: std::time::Duration) -> Flow {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let deadline = tokio::time::sleep(backoff);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => return Flow::Continue,
                _ = poll.tick() => self.poll_joined().await,
                maybe_ctrl = self.control_rx.recv() => match maybe_ctrl {
                    Some(ctrl) => {
                        if self.handle_control_degraded(ctrl).await == Flow::Shutdown {
                            return Flow::Shutdown;
                        }
                    }
                    None => return Flow::Shutdown,
                },
            }
        }
    }

    async fn handle_control_connected(
        &mut self,
        conn: &mut dyn PushConnection,
        ctrl: AdapterControl,
    ) -> Flow {
        match ctrl {
            AdapterControl::Join { session_id } => {
                let count = self.joined.entry(session_id.clone()).or_insert(0);
                *count += 1;
                if *count == 1 {
                    if let Err(e) = conn.join(&session_id).await {
                        warn!(
                            component = "push",
                            event = "push.join.failed",
                            session_id = %session_id,
                            error = %e,
                            "Join failed; polling will cover until reconnect"
                        );
                    }
                    self.reconcile(&session_id).await;
                }
            }
            AdapterControl::Leave { session_id } => {
                if self.release(&session_id).await {
                    if let Err(e) = conn.leave(&session_id).await {
                        debug!(
                            component = "push",
                            event = "push.leave.failed",
                            session_id = %session_id,
                            error = %e,
                            "Leave failed"
                        );
                    }
                }
            }
            AdapterControl::PublishTyping {
                session_id,
                is_typing,
            } => {
                // Fire-and-forget: a lost typing signal expires on its own.
                if let Err(e) = conn.publish_typing(&session_id, is_typing).await {
                    debug!(
                        component = "push",
                        event = "push.typing.dropped",
                        session_id = %session_id,
                        error = %e,
                        "Typing signal dropped"
                    );
                }
            }
            AdapterControl::Shutdown => return Flow::Shutdown,
        }
        Flow::Continue
    }

    async fn handle_control_degraded(&mut self, ctrl: AdapterControl) -> Flow {
        match ctrl {
            AdapterControl::Join { session_id } => {
                let count = self.joined.entry(session_id.clone()).or_insert(0);
                *count += 1;
                if *count == 1 {
                    self.reconcile(&session_id).await;
                }
            }
            AdapterControl::Leave { session_id } => {
                self.release(&session_id).await;
            }
            AdapterControl::PublishTyping { session_id, .. } => {
                debug!(
                    component = "push",
                    event = "push.typing.dropped",
                    session_id = %session_id,
                    "Typing signal dropped while degraded"
                );
            }
            AdapterControl::Shutdown => return Flow::Shutdown,
        }
        Flow::Continue
    }

    /// Decrement a session's reference count. Returns true when it hit
    /// zero and the subscription should be torn down.
    async fn release(&mut self, session_id: &str) -> bool {
        match self.joined.get_mut(session_id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.joined.remove(session_id);
                let _ = self
                    .command_tx
                    .send(Command::SessionReleased {
                        session_id: session_id.to_string(),
                    })
                    .await;
                true
            }
            None => false,
        }
    }

    async fn poll_joined(&self) {
        let ids: Vec<String> = self.joined.keys().cloned().collect();
        for id in ids {
            self.reconcile(&id).await;
        }
    }

    /// One status + history fetch; idempotent merges make this safe to
    /// run as often as needed.
    async fn reconcile(&self, session_id: &str) {
        match self.api.fetch_session(session_id).await {
            Ok(snapshot) => {
                let _ = self.command_tx.send(Command::UpsertSession { snapshot }).await;
            }
            Err(e) => {
                debug!(
                    component = "push",
                    event = "push.reconcile.session_failed",
                    session_id = %session_id,
                    error = %e,
                    "Session fetch failed during reconciliation"
                );
            }
        }
        match self.api.fetch_history(session_id).await {
            Ok(messages) => {
                let _ = self
                    .command_tx
                    .send(Command::MergeHistory {
                        session_id: session_id.to_string(),
                        messages,
                    })
                    .await;
            }
            Err(e) => {
                debug!(
                    component = "push",
                    event = "push.reconcile.history_failed",
                    session_id = %session_id,
                    error = %e,
                    "History fetch failed during reconciliation"
                );
            }
        }
    }

    async fn dispatch_frame(&self, text: &str) {
        match serde_json::from_str::<PushEvent>(text) {
            Ok(event) => {
                let _ = self.command_tx.send(Command::ApplyEvent { event }).await;
            }
            Err(e) => {
                warn!(
                    component = "push",
                    event = "push.event.malformed",
                    error = %e,
                    "Dropping malformed push event"
                );
            }
        }
    }

    async fn set_connection_state(&self, state: ConnectionState) {
        let _ = self
            .command_tx
            .send(Command::SetConnectionState { state })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{pending_snapshot, server_message, FakeApi, FakeTransport};
    use liveline_protocol::SessionStatus;
    use std::time::Duration;

    fn test_config() -> CoordinatorConfig {
        CoordinatorConfig {
            poll_interval: Duration::from_millis(30),
            reconnect_initial: Duration::from_millis(40),
            reconnect_max: Duration::from_millis(200),
            ..CoordinatorConfig::default()
        }
    }

    fn spawn_adapter(
        transport: Arc<FakeTransport>,
        api: Arc<FakeApi>,
    ) -> (mpsc::Sender<AdapterControl>, mpsc::Receiver<Command>) {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (adapter, control_tx) =
            PushAdapter::new(transport, api, command_tx, test_config());
        tokio::spawn(adapter.run());
        (control_tx, command_rx)
    }

    async fn next_event(command_rx: &mut mpsc::Receiver<Command>) -> PushEvent {
        loop {
            match command_rx.recv().await.expect("adapter alive") {
                Command::ApplyEvent { event } => return event,
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn frames_are_delivered_in_arrival_order() {
        let transport = Arc::new(FakeTransport::new());
        let frames = transport.push_connection();
        let api = Arc::new(FakeApi::new());
        let (_control, mut command_rx) = spawn_adapter(transport, api);

        for (id, secs) in [("m1", 10), ("m2", 20)] {
            let event = PushEvent::MessageReceived {
                session_id: "s1".to_string(),
                message: server_message(id, "s1", secs),
                seq: None,
            };
            frames.send(serde_json::to_string(&event).unwrap()).unwrap();
        }

        let first = next_event(&mut command_rx).await;
        let second = next_event(&mut command_rx).await;
        assert!(
            matches!(first, PushEvent::MessageReceived { ref message, .. } if message.id == "m1")
        );
        assert!(
            matches!(second, PushEvent::MessageReceived { ref message, .. } if message.id == "m2")
        );
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped_without_killing_the_adapter() {
        let transport = Arc::new(FakeTransport::new());
        let frames = transport.push_connection();
        let api = Arc::new(FakeApi::new());
        let (_control, mut command_rx) = spawn_adapter(transport, api);

        frames.send("{not json".to_string()).unwrap();
        frames
            .send(r#"{"type":"mystery_event","session_id":"s1"}"#.to_string())
            .unwrap();
        let event = PushEvent::UserJoined {
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            seq: None,
        };
        frames.send(serde_json::to_string(&event).unwrap()).unwrap();

        let delivered = next_event(&mut command_rx).await;
        assert!(matches!(delivered, PushEvent::UserJoined { .. }));
    }

    #[tokio::test]
    async fn join_is_reference_counted() {
        let transport = Arc::new(FakeTransport::new());
        let _frames = transport.push_connection();
        let api = Arc::new(FakeApi::new());
        api.insert_session(pending_snapshot("s1"));
        let (control, mut command_rx) = spawn_adapter(Arc::clone(&transport), api);

        for _ in 0..2 {
            control
                .send(AdapterControl::Join {
                    session_id: "s1".to_string(),
                })
                .await
                .unwrap();
        }
        control
            .send(AdapterControl::Leave {
                session_id: "s1".to_string(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        // One transport join despite two view joins, and no leave yet.
        assert_eq!(transport.joins(), vec!["s1"]);
        assert!(transport.leaves().is_empty());

        control
            .send(AdapterControl::Leave {
                session_id: "s1".to_string(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(transport.leaves(), vec!["s1"]);

        // The actor hears about the fully released session.
        let mut released = false;
        while let Ok(cmd) = command_rx.try_recv() {
            if matches!(cmd, Command::SessionReleased { ref session_id } if session_id == "s1") {
                released = true;
            }
        }
        assert!(released);
    }

    #[tokio::test]
    async fn disconnect_degrades_polls_and_reconnects() {
        let transport = Arc::new(FakeTransport::new());
        let frames = transport.push_connection();
        transport.push_connect_failure();
        let _frames2 = transport.push_connection();
        let api = Arc::new(FakeApi::new());
        api.insert_session(pending_snapshot("s2"));
        let (control, mut command_rx) = spawn_adapter(Arc::clone(&transport), api.clone());

        control
            .send(AdapterControl::Join {
                session_id: "s2".to_string(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Server-side a human claims the session during the outage.
        api.claim("s2", "op-7");
        drop(frames); // connection drops

        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut states = Vec::new();
        let mut reconciled_owner = None;
        while let Ok(cmd) = command_rx.try_recv() {
            match cmd {
                Command::SetConnectionState { state } => states.push(state),
                Command::UpsertSession { snapshot } if snapshot.id == "s2" => {
                    if snapshot.status == SessionStatus::AdminActive {
                        reconciled_owner = snapshot.assigned_operator_id.clone();
                    }
                }
                _ => {}
            }
        }

        // Degraded after the drop, reconnecting attempts, connected again.
        assert!(states.contains(&ConnectionState::Degraded));
        assert!(states.contains(&ConnectionState::Connected));
        assert_eq!(
            states.last().copied(),
            Some(ConnectionState::Connected),
            "adapter should settle back on the second scripted connection"
        );
        // The missed claim surfaced through the reconciliation fetch.
        assert_eq!(reconciled_owner.as_deref(), Some("op-7"));
        // Re-join happened on the fresh connection.
        assert_eq!(transport.joins(), vec!["s2", "s2"]);
    }
}
