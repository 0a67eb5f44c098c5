//! The single-owner hub actor and its mailbox handle.

use std::collections::HashMap;

use agent_relay_protocol::{ActorKind, Direction};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::GatewayBridge;
use crate::client::{ClientSender, ConnectionId};
use crate::monitor::MonitorBroadcaster;
use crate::pending::PendingMessageStore;
use crate::registry::ConnectionRegistry;
use crate::router;

/// Hub mailbox error.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub task has stopped")]
    Closed,
}

/// Events fed to the hub actor, in arrival order.
#[derive(Debug)]
pub enum HubEvent {
    /// A socket finished its upgrade. Monitors are classified here;
    /// every other connection stays unclassified until its first
    /// `register` / `register_gateway` envelope.
    Connected { conn: ClientSender, monitor: bool },
    /// One inbound text frame from a connection.
    Frame { conn: ConnectionId, text: String },
    /// The socket closed or errored.
    Disconnected { conn: ConnectionId },
}

/// All mutable routing state, owned exclusively by the actor task.
pub(crate) struct HubState {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) pending: PendingMessageStore,
    pub(crate) bridge: GatewayBridge,
    pub(crate) monitors: MonitorBroadcaster,
}

/// Cloneable handle feeding the hub's ordered mailbox.
///
/// This is the only way any code path reaches the routing state, which
/// is what serializes every mutation without a lock.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubEvent>,
}

impl HubHandle {
    /// Attach a freshly upgraded connection.
    ///
    /// # Errors
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub fn connect(&self, conn: ClientSender, monitor: bool) -> Result<(), HubError> {
        self.send(HubEvent::Connected { conn, monitor })
    }

    /// Hand one inbound frame to the router.
    ///
    /// # Errors
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub fn frame(&self, conn: ConnectionId, text: impl Into<String>) -> Result<(), HubError> {
        self.send(HubEvent::Frame {
            conn,
            text: text.into(),
        })
    }

    /// Report a closed or errored socket.
    ///
    /// # Errors
    /// Returns [`HubError::Closed`] if the hub task has stopped.
    pub fn disconnect(&self, conn: ConnectionId) -> Result<(), HubError> {
        self.send(HubEvent::Disconnected { conn })
    }

    fn send(&self, event: HubEvent) -> Result<(), HubError> {
        self.tx.send(event).map_err(|_| HubError::Closed)
    }
}

/// The routing hub: one logical owner of all in-memory state for its
/// deployment, processing envelopes to completion one at a time.
pub struct Hub {
    state: HubState,
    connections: HashMap<ConnectionId, ClientSender>,
    events: mpsc::UnboundedReceiver<HubEvent>,
}

impl Hub {
    /// Spawn the hub actor; the handle is the only mutation path.
    #[must_use]
    pub fn spawn() -> (HubHandle, JoinHandle<()>) {
        let (tx, events) = mpsc::unbounded_channel();
        let hub = Self {
            state: HubState {
                registry: ConnectionRegistry::new(),
                pending: PendingMessageStore::new(),
                bridge: GatewayBridge::new(),
                monitors: MonitorBroadcaster::new(),
            },
            connections: HashMap::new(),
            events,
        };
        (HubHandle { tx }, tokio::spawn(hub.run()))
    }

    async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.handle(event);
        }
        tracing::info!("hub mailbox closed, stopping");
    }

    fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connected { conn, monitor } => {
                if monitor {
                    tracing::info!(conn = %conn.id(), "monitoring client connected");
                    self.state.monitors.add(conn.clone());
                    self.state
                        .monitors
                        .send_update_to(&conn, &self.state.registry);
                    self.state
                        .monitors
                        .broadcast_connection_update(&self.state.registry);
                } else {
                    tracing::info!(conn = %conn.id(), "connection accepted, awaiting registration");
                    self.connections.insert(conn.id(), conn);
                }
            }
            HubEvent::Frame { conn, text } => {
                let Some(sender) = self.connections.get(&conn).cloned() else {
                    tracing::debug!(conn = %conn, "ignoring frame from unknown connection");
                    return;
                };
                router::route(&mut self.state, &sender, &text);
            }
            HubEvent::Disconnected { conn } => self.handle_disconnect(conn),
        }
    }

    /// Monitor set first, then the registry, then the bridge; whichever
    /// matches names the disconnect log entry.
    fn handle_disconnect(&mut self, conn: ConnectionId) {
        self.connections.remove(&conn);

        let (actor, detail) = if self.state.monitors.remove(conn) {
            (ActorKind::Monitor, Value::Null)
        } else if let Some(removed) = self.state.registry.remove_by_conn(conn) {
            (removed.role, json!({ "id": removed.id }))
        } else if let Some((token, server_id)) = self.state.bridge.remove_by_conn(conn) {
            (
                ActorKind::Gateway,
                json!({ "appToken": token, "serverId": server_id }),
            )
        } else {
            (ActorKind::System, Value::Null)
        };

        tracing::info!(conn = %conn, actor = ?actor, "connection closed");

        let agent_id = match (&actor, &detail) {
            (ActorKind::Agent, Value::Object(map)) => {
                map.get("id").and_then(Value::as_str).map(str::to_string)
            }
            _ => None,
        };
        self.state
            .monitors
            .broadcast_connection_update(&self.state.registry);
        self.state.monitors.broadcast_message_log(
            Direction::System,
            actor,
            agent_id,
            json!({ "event": "disconnected", "detail": detail }),
            "",
        );
    }
}
