//! Per-app-token gateway uplinks.

use std::collections::HashMap;

use agent_relay_protocol::Outbound;

use crate::client::{ClientSender, ConnectionId};

#[derive(Debug)]
struct GatewayLink {
    conn: ClientSender,
    server_id: Option<String>,
}

/// At most one gateway socket per app token, plus a queue of envelopes
/// bound for a gateway that is briefly disconnected.
///
/// Gateways are the one identity class with enforced single ownership:
/// registering a replacement closes the superseded socket explicitly.
#[derive(Debug, Default)]
pub struct GatewayBridge {
    gateways: HashMap<String, GatewayLink>,
    queued: HashMap<String, Vec<Outbound>>,
}

impl GatewayBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the gateway for a token, evicting any different prior
    /// socket, then flush the token's queued envelopes in FIFO order.
    pub fn register_gateway(
        &mut self,
        app_token: &str,
        conn: ClientSender,
        server_id: Option<String>,
    ) {
        if let Some(prev) = self.gateways.get(app_token) {
            if prev.conn.id() != conn.id() {
                tracing::info!(
                    app_token,
                    evicted = %prev.conn.id(),
                    "closing superseded gateway socket"
                );
                prev.conn.close();
            }
        }
        self.gateways.insert(
            app_token.to_string(),
            GatewayLink {
                conn: conn.clone(),
                server_id,
            },
        );

        if let Some(queue) = self.queued.remove(app_token) {
            tracing::debug!(app_token, count = queue.len(), "flushing gateway queue");
            for envelope in queue {
                conn.send_json(&envelope);
            }
        }
    }

    /// Send to the token's gateway if one is registered and open,
    /// otherwise queue the envelope for the next registration.
    /// Returns whether the envelope went out immediately.
    pub fn enqueue_or_send(&mut self, app_token: &str, envelope: Outbound) -> bool {
        if let Some(link) = self.gateways.get(app_token) {
            if link.conn.is_open() {
                link.conn.send_json(&envelope);
                return true;
            }
        }
        let queue = self.queued.entry(app_token.to_string()).or_default();
        queue.push(envelope);
        tracing::debug!(app_token, depth = queue.len(), "queued envelope for absent gateway");
        false
    }

    /// Drop the registration owning this socket; queued envelopes are
    /// retained for a reconnecting gateway on the same token.
    pub fn remove_by_conn(&mut self, conn: ConnectionId) -> Option<(String, Option<String>)> {
        let token = self
            .gateways
            .iter()
            .find(|(_, link)| link.conn.id() == conn)
            .map(|(token, _)| token.clone())?;
        let link = self.gateways.remove(&token)?;
        Some((token, link.server_id))
    }

    #[must_use]
    pub fn has_gateway(&self, app_token: &str) -> bool {
        self.gateways.contains_key(app_token)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::client::SocketFrame;

    fn forward_to_app(token: &str, seq: i64) -> Outbound {
        Outbound::ForwardToApp {
            agent_id: None,
            app_id: None,
            app_token: Some(token.to_string()),
            payload: json!({"seq": seq}),
        }
    }

    #[test]
    fn test_replacement_evicts_prior_socket() {
        let mut bridge = GatewayBridge::new();
        let (first, mut first_rx) = ClientSender::channel(Uuid::new_v4());
        let (second, mut second_rx) = ClientSender::channel(Uuid::new_v4());

        bridge.register_gateway("t1", first, None);
        bridge.register_gateway("t1", second, Some("srv-2".to_string()));

        assert_eq!(first_rx.try_recv().unwrap(), SocketFrame::Close);
        assert!(bridge.enqueue_or_send("t1", forward_to_app("t1", 1)));
        assert!(matches!(second_rx.try_recv().unwrap(), SocketFrame::Text(_)));
        assert!(first_rx.try_recv().is_err());
    }

    #[test]
    fn test_reregistering_same_socket_is_not_eviction() {
        let mut bridge = GatewayBridge::new();
        let (conn, mut rx) = ClientSender::channel(Uuid::new_v4());
        bridge.register_gateway("t1", conn.clone(), None);
        bridge.register_gateway("t1", conn, None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_queue_survives_disconnect_and_flushes_in_order() {
        let mut bridge = GatewayBridge::new();
        let (first, first_rx) = ClientSender::channel(Uuid::new_v4());
        bridge.register_gateway("t1", first.clone(), None);
        drop(first_rx);
        bridge.remove_by_conn(first.id()).unwrap();

        bridge.enqueue_or_send("t1", forward_to_app("t1", 1));
        bridge.enqueue_or_send("t1", forward_to_app("t1", 2));

        let (second, mut second_rx) = ClientSender::channel(Uuid::new_v4());
        bridge.register_gateway("t1", second, None);
        for seq in 1..=2 {
            let SocketFrame::Text(text) = second_rx.try_recv().unwrap() else {
                panic!("expected text frame");
            };
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["payload"]["seq"], seq);
        }
        assert!(second_rx.try_recv().is_err());
    }

    #[test]
    fn test_unwritable_gateway_queues_instead_of_sending() {
        let mut bridge = GatewayBridge::new();
        let (conn, rx) = ClientSender::channel(Uuid::new_v4());
        bridge.register_gateway("t1", conn, None);
        drop(rx);

        assert!(!bridge.enqueue_or_send("t1", forward_to_app("t1", 1)));

        let (replacement, mut replacement_rx) = ClientSender::channel(Uuid::new_v4());
        bridge.register_gateway("t1", replacement, None);
        assert!(matches!(
            replacement_rx.try_recv().unwrap(),
            SocketFrame::Text(_)
        ));
    }
}
