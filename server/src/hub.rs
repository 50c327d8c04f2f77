use std::collections::HashMap;
use std::sync::Arc;

use classroom_system::{ConnectionId, Message, User};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::oneshot;

use crate::connection_handle::{ConnectionHandle, Delivery, Outgoing};
use crate::server_state::ServerState;

#[derive(Debug)]
pub enum HubCommand {
    Register(ConnectionHandle),
    Unregister(ConnectionId),
    Broadcast(Outgoing),
    Status(oneshot::Sender<HubStatus>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub id: ConnectionId,
    pub user: User,
    pub is_main: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HubStatus {
    pub connections: Vec<ConnectionSummary>,
}

#[derive(Debug, Error)]
#[error("hub loop is not running")]
pub struct HubClosed;

/// Owns the live connection set. Every command is handled to completion
/// before the next one is received.
struct Hub {
    state: Arc<ServerState>,
    connections: HashMap<ConnectionId, ConnectionHandle>,
}

impl Hub {
    fn new(state: Arc<ServerState>) -> Self {
        Self {
            state,
            connections: HashMap::new(),
        }
    }

    async fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register(connection) => self.register(connection).await,
            HubCommand::Unregister(connection_id) => self.unregister(&connection_id).await,
            HubCommand::Broadcast(message) => self.broadcast(message).await,
            HubCommand::Status(tx) => {
                let _ = tx.send(self.status());
            }
        }
    }

    async fn register(&mut self, connection: ConnectionHandle) {
        let connection_id = connection.id;
        log::info!(
            "Connection {} registered (user {}, {:?})",
            connection_id,
            connection.user.id,
            connection.user.role
        );
        self.connections.insert(connection_id, connection.clone());

        if let Some(detail) = self.state.active_course_detail().await {
            let encoded = Message::course_detail(&detail).and_then(|message| message.encode());
            match encoded {
                Ok(text) => {
                    if connection.deliver(text.into()) != Delivery::Queued {
                        log::warn!("Connection {} cannot take the course detail", connection_id);
                        self.unregister(&connection_id).await;
                    }
                }
                Err(err) => log::error!("Failed to encode course detail: {}", err),
            }
        }
        log::debug!("Live connections: {}", self.connections.len());
    }

    async fn unregister(&mut self, connection_id: &ConnectionId) {
        if let Some(connection) = self.connections.remove(connection_id) {
            connection.close();
            if let Some(session_id) = connection.retire_session().await {
                self.state.sessions.end(&session_id).await;
            }
            log::info!(
                "Connection {} unregistered, {} left",
                connection_id,
                self.connections.len()
            );
        }
    }

    async fn broadcast(&mut self, message: Outgoing) {
        let mut unresponsive = Vec::new();
        for (connection_id, connection) in &self.connections {
            match connection.deliver(message.clone()) {
                Delivery::Queued => {}
                Delivery::Full => {
                    log::warn!("Dropping slow connection {}", connection_id);
                    unresponsive.push(*connection_id);
                }
                Delivery::Closed => unresponsive.push(*connection_id),
            }
        }
        for connection_id in unresponsive {
            self.unregister(&connection_id).await;
        }
    }

    fn status(&self) -> HubStatus {
        let mut connections: Vec<ConnectionSummary> = self
            .connections
            .values()
            .map(|connection| ConnectionSummary {
                id: connection.id,
                user: connection.user.clone(),
                is_main: connection.is_main,
            })
            .collect();
        connections.sort_by(|a, b| a.user.id.cmp(&b.user.id).then(a.id.cmp(&b.id)));
        HubStatus { connections }
    }
}

#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: Sender<HubCommand>,
}

impl HubHandle {
    pub async fn register(&self, connection: ConnectionHandle) -> Result<(), HubClosed> {
        self.send(HubCommand::Register(connection)).await
    }

    pub async fn unregister(&self, connection_id: ConnectionId) -> Result<(), HubClosed> {
        self.send(HubCommand::Unregister(connection_id)).await
    }

    pub async fn broadcast(&self, message: Outgoing) -> Result<(), HubClosed> {
        self.send(HubCommand::Broadcast(message)).await
    }

    /// Resolves after every command sent before it has been handled.
    pub async fn status(&self) -> Result<HubStatus, HubClosed> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Status(tx)).await?;
        rx.await.map_err(|_| HubClosed)
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubClosed> {
        self.tx.send(command).await.map_err(|_| HubClosed)
    }
}

async fn run_hub(state: Arc<ServerState>, mut rx: Receiver<HubCommand>) {
    let mut hub = Hub::new(state);
    while let Some(command) = rx.recv().await {
        hub.handle_command(command).await;
    }
    log::info!("Hub stopped");
}

/// Starts the hub loop; it runs until every `HubHandle` is dropped.
pub fn spawn_hub(state: Arc<ServerState>, capacity: usize) -> HubHandle {
    let (tx, rx) = channel::<HubCommand>(capacity.max(1));
    tokio::spawn(run_hub(state, rx));
    HubHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_handle::{OutboundQueue, SessionSlot};
    use classroom_system::serde_json::{self, json, Value};
    use classroom_system::{Course, UserRole};

    fn connect(name: &str, capacity: usize) -> (ConnectionHandle, OutboundQueue) {
        ConnectionHandle::new(User::new(name, name, UserRole::Student), false, capacity)
    }

    fn drain(queue: &mut OutboundQueue) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = queue.rx.try_recv() {
            frames.push(serde_json::from_str(&text).expect(""));
        }
        frames
    }

    async fn live(hub: &HubHandle) -> usize {
        hub.status().await.expect("").connections.len()
    }

    #[tokio::test]
    async fn it_counts_registrations_minus_effective_unregistrations() {
        let hub = spawn_hub(Arc::new(ServerState::new()), 16);
        let (a, _qa) = connect("a", 8);
        let (b, _qb) = connect("b", 8);
        let (c, _qc) = connect("c", 8);
        hub.register(a.clone()).await.expect("");
        hub.register(b.clone()).await.expect("");
        hub.register(c.clone()).await.expect("");
        assert_eq!(live(&hub).await, 3);

        hub.unregister(b.id).await.expect("");
        hub.unregister(b.id).await.expect("");
        assert_eq!(live(&hub).await, 2);
        assert!(b.is_closed());
        assert!(!a.is_closed());

        hub.unregister(a.id).await.expect("");
        hub.unregister(c.id).await.expect("");
        hub.unregister(c.id).await.expect("");
        assert_eq!(live(&hub).await, 0);
    }

    #[tokio::test]
    async fn late_joiner_receives_one_snapshot_when_course_is_active() {
        let state = Arc::new(ServerState::new());
        {
            let mut detail = state.course_detail.write().await;
            detail.select_course("c1");
            detail.merge_attachments(vec![(1, json!({"position": [1, 2, 3]}))]);
        }
        let hub = spawn_hub(state.clone(), 16);
        let (late, mut queue) = connect("late", 8);
        hub.register(late).await.expect("");
        live(&hub).await;

        let frames = drain(&mut queue);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "course_detail");
        let expected = serde_json::to_value(&*state.course_detail.read().await).expect("");
        assert_eq!(frames[0]["data"], expected);
    }

    #[tokio::test]
    async fn joiner_receives_nothing_without_active_course() {
        let hub = spawn_hub(Arc::new(ServerState::new()), 16);
        let (conn, mut queue) = connect("early", 8);
        hub.register(conn).await.expect("");
        live(&hub).await;
        assert!(drain(&mut queue).is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let hub = spawn_hub(Arc::new(ServerState::new()), 16);
        let (a, mut qa) = connect("a", 8);
        let (b, mut qb) = connect("b", 8);
        hub.register(a).await.expect("");
        hub.register(b).await.expect("");

        let text = Message::course_exit().encode().expect("");
        hub.broadcast(text.into()).await.expect("");
        live(&hub).await;

        for queue in [&mut qa, &mut qb] {
            let frames = drain(queue);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0]["type"], "course_exit");
        }
    }

    #[tokio::test]
    async fn saturated_connection_is_dropped_and_its_session_ended() {
        let state = Arc::new(ServerState::new());
        let hub = spawn_hub(state.clone(), 16);
        let (slow, _never_drained) = connect("slow", 1);
        let (fast, mut fast_queue) = connect("fast", 8);

        let session_id = state
            .sessions
            .create(slow.user.clone(), Course::new("c1"))
            .await;
        *slow.session_slot().await = SessionSlot::Active(session_id);

        hub.register(slow.clone()).await.expect("");
        hub.register(fast.clone()).await.expect("");

        hub.broadcast("{\"type\":\"heartbeat_response\"}".into())
            .await
            .expect("");
        assert_eq!(live(&hub).await, 2);

        hub.broadcast("{\"type\":\"heartbeat_response\"}".into())
            .await
            .expect("");
        let status = hub.status().await.expect("");
        assert_eq!(status.connections.len(), 1);
        assert_eq!(status.connections[0].id, fast.id);

        assert!(slow.is_closed());
        assert!(slow.session_slot().await.is_closed());
        assert!(state.sessions.get(&session_id).await.is_none());
        assert_eq!(drain(&mut fast_queue).len(), 2);
    }

    #[tokio::test]
    async fn unregister_ends_active_session() {
        let state = Arc::new(ServerState::new());
        let hub = spawn_hub(state.clone(), 16);
        let (conn, _queue) = connect("a", 8);
        let session_id = state
            .sessions
            .create(conn.user.clone(), Course::new("c1"))
            .await;
        *conn.session_slot().await = SessionSlot::Active(session_id);

        hub.register(conn.clone()).await.expect("");
        hub.unregister(conn.id).await.expect("");
        live(&hub).await;

        assert!(state.sessions.is_empty().await);
        assert!(conn.is_closed());
    }
}
