//! Store-and-forward queues for disconnected identities.

use std::collections::HashMap;

use serde_json::Value;

use crate::client::ClientSender;

/// Per-identity FIFO queues of opaque payloads awaiting a recipient.
///
/// A queue exists only while its identity has undelivered messages; it
/// is removed entirely (not left empty) by a flush. Queues are
/// unbounded, with no cap or TTL: a permanently offline identity
/// accumulates memory without limit.
#[derive(Debug, Default)]
pub struct PendingMessageStore {
    agents: HashMap<String, Vec<Value>>,
    apps: HashMap<String, Vec<Value>>,
}

impl PendingMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_for_agent(&mut self, agent_id: &str, payload: Value) {
        let queue = self.agents.entry(agent_id.to_string()).or_default();
        queue.push(payload);
        tracing::debug!(agent_id, depth = queue.len(), "queued payload for offline agent");
    }

    pub fn enqueue_for_app(&mut self, app_token: &str, payload: Value) {
        let queue = self.apps.entry(app_token.to_string()).or_default();
        queue.push(payload);
        tracing::debug!(app_token, depth = queue.len(), "queued payload for offline app");
    }

    /// Deliver every queued payload for this agent in insertion order,
    /// then drop the queue. Failed sends are attempted and skipped;
    /// the flush never stops early. Returns the number attempted.
    pub fn flush_agent(&mut self, agent_id: &str, conn: &ClientSender) -> usize {
        self.agents.remove(agent_id).map_or(0, |queue| {
            let count = queue.len();
            for payload in queue {
                conn.send_json(&payload);
            }
            tracing::debug!(agent_id, count, "flushed pending agent queue");
            count
        })
    }

    /// Same as [`Self::flush_agent`], keyed by normalized app token.
    pub fn flush_app(&mut self, app_token: &str, conn: &ClientSender) -> usize {
        self.apps.remove(app_token).map_or(0, |queue| {
            let count = queue.len();
            for payload in queue {
                conn.send_json(&payload);
            }
            tracing::debug!(app_token, count, "flushed pending app queue");
            count
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::client::SocketFrame;

    #[test]
    fn test_flush_preserves_fifo_order_and_drops_queue() {
        let mut store = PendingMessageStore::new();
        store.enqueue_for_agent("a1", json!({"seq": 1}));
        store.enqueue_for_agent("a1", json!({"seq": 2}));
        store.enqueue_for_agent("a1", json!({"seq": 3}));

        let (conn, mut rx) = ClientSender::channel(Uuid::new_v4());
        assert_eq!(store.flush_agent("a1", &conn), 3);
        for seq in 1..=3 {
            let SocketFrame::Text(text) = rx.try_recv().unwrap() else {
                panic!("expected text frame");
            };
            assert_eq!(serde_json::from_str::<Value>(&text).unwrap()["seq"], seq);
        }

        // Queue entry is gone, a second flush delivers nothing.
        assert_eq!(store.flush_agent("a1", &conn), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_flush_attempts_every_send_on_closed_socket() {
        let mut store = PendingMessageStore::new();
        store.enqueue_for_app("acme", json!({"seq": 1}));
        store.enqueue_for_app("acme", json!({"seq": 2}));

        let (conn, rx) = ClientSender::channel(Uuid::new_v4());
        drop(rx);
        assert_eq!(store.flush_app("acme", &conn), 2);
        assert_eq!(store.flush_app("acme", &conn), 0);
    }

    #[test]
    fn test_queues_are_independent_per_identity() {
        let mut store = PendingMessageStore::new();
        store.enqueue_for_agent("a1", json!(1));
        store.enqueue_for_agent("a2", json!(2));

        let (conn, mut rx) = ClientSender::channel(Uuid::new_v4());
        assert_eq!(store.flush_agent("a1", &conn), 1);
        let SocketFrame::Text(text) = rx.try_recv().unwrap() else {
            panic!("expected text frame");
        };
        assert_eq!(text, "1");
        assert_eq!(store.flush_agent("a2", &conn), 1);
    }
}
