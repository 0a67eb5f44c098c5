//! Best-effort observability fan-out.

use std::collections::HashMap;

use agent_relay_protocol::{ActorKind, Direction, Outbound, RouteOutcome, now_millis};
use serde_json::Value;

use crate::client::{ClientSender, ConnectionId};
use crate::registry::ConnectionRegistry;

/// Fan-out of connection-state changes and an audit log to monitoring
/// clients. Side-channel only: a monitor send failure is swallowed and
/// never affects routing.
#[derive(Debug, Default)]
pub struct MonitorBroadcaster {
    monitors: HashMap<ConnectionId, ClientSender>,
}

impl MonitorBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conn: ClientSender) {
        self.monitors.insert(conn.id(), conn);
    }

    pub fn remove(&mut self, conn: ConnectionId) -> bool {
        self.monitors.remove(&conn).is_some()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.monitors.len()
    }

    /// Send the current connection state to one monitor (used right
    /// after a monitor attaches).
    pub fn send_update_to(&self, conn: &ClientSender, registry: &ConnectionRegistry) {
        conn.send_json(&self.connection_update(registry));
    }

    /// Broadcast the current connection state to every monitor.
    pub fn broadcast_connection_update(&self, registry: &ConnectionRegistry) {
        self.broadcast(&self.connection_update(registry));
    }

    /// Broadcast one audit entry describing a routing decision.
    pub fn broadcast_message_log(
        &self,
        direction: Direction,
        actor: ActorKind,
        agent_id: Option<String>,
        payload: Value,
        raw: &str,
    ) {
        self.broadcast(&Outbound::MessageLog {
            timestamp: now_millis(),
            direction,
            actor,
            agent_id,
            payload,
            raw: raw.to_string(),
            outcome: None,
        });
    }

    /// Broadcast how one delivery attempt ended (delivered, queued,
    /// broadcast, bridged), so monitors can reconstruct the full
    /// routing decision and not just the inbound envelope.
    pub fn broadcast_route_outcome(
        &self,
        actor: ActorKind,
        agent_id: Option<String>,
        payload: Value,
        outcome: RouteOutcome,
    ) {
        self.broadcast(&Outbound::MessageLog {
            timestamp: now_millis(),
            direction: Direction::Outgoing,
            actor,
            agent_id,
            payload,
            raw: String::new(),
            outcome: Some(outcome),
        });
    }

    fn connection_update(&self, registry: &ConnectionRegistry) -> Outbound {
        Outbound::ConnectionUpdate {
            timestamp: now_millis(),
            actor: ActorKind::System,
            connected_agents: registry.agent_ids(),
            connected_apps: registry.app_tokens(),
            monitoring_clients: self.count(),
        }
    }

    fn broadcast(&self, envelope: &Outbound) {
        match serde_json::to_string(envelope) {
            Ok(json) => {
                for monitor in self.monitors.values() {
                    monitor.send_text(json.clone());
                }
            }
            Err(e) => tracing::error!("failed to serialize monitor broadcast: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::client::SocketFrame;

    #[test]
    fn test_broadcast_reaches_every_monitor() {
        let mut monitors = MonitorBroadcaster::new();
        let (m1, mut m1_rx) = ClientSender::channel(Uuid::new_v4());
        let (m2, mut m2_rx) = ClientSender::channel(Uuid::new_v4());
        monitors.add(m1);
        monitors.add(m2);

        let registry = ConnectionRegistry::new();
        monitors.broadcast_connection_update(&registry);

        for rx in [&mut m1_rx, &mut m2_rx] {
            let SocketFrame::Text(text) = rx.try_recv().unwrap() else {
                panic!("expected text frame");
            };
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["type"], "connection_update");
            assert_eq!(value["monitoringClients"], 2);
        }
    }

    #[test]
    fn test_closed_monitor_never_affects_others() {
        let mut monitors = MonitorBroadcaster::new();
        let (dead, dead_rx) = ClientSender::channel(Uuid::new_v4());
        drop(dead_rx);
        let (live, mut live_rx) = ClientSender::channel(Uuid::new_v4());
        monitors.add(dead);
        monitors.add(live);

        monitors.broadcast_message_log(
            Direction::Incoming,
            ActorKind::Agent,
            Some("a1".to_string()),
            json!({"cmd": "ping"}),
            "{}",
        );

        let SocketFrame::Text(text) = live_rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "message_log");
        assert_eq!(value["direction"], "incoming");
        assert_eq!(value["agentId"], "a1");
    }

    #[test]
    fn test_route_outcome_entries_are_outgoing() {
        let mut monitors = MonitorBroadcaster::new();
        let (m, mut rx) = ClientSender::channel(Uuid::new_v4());
        monitors.add(m);

        monitors.broadcast_route_outcome(
            ActorKind::App,
            None,
            json!({"cmd": "bid"}),
            RouteOutcome::Delivered,
        );

        let SocketFrame::Text(text) = rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "message_log");
        assert_eq!(value["direction"], "outgoing");
        assert_eq!(value["actor"], "app");
        assert_eq!(value["outcome"], "delivered");
        assert_eq!(value["payload"], json!({"cmd": "bid"}));
    }

    #[test]
    fn test_remove_reports_membership() {
        let mut monitors = MonitorBroadcaster::new();
        let (m, _rx) = ClientSender::channel(Uuid::new_v4());
        let id = m.id();
        monitors.add(m);
        assert!(monitors.remove(id));
        assert!(!monitors.remove(id));
        assert_eq!(monitors.count(), 0);
    }
}
