//! Per-connection outbound handles.

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier for one live socket.
pub type ConnectionId = Uuid;

/// Frame pushed to a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketFrame {
    /// One JSON message, sent as a single text frame.
    Text(String),
    /// Ask the writer to close the socket and stop.
    Close,
}

/// Cloneable sending half of one connection.
///
/// Sends are fire-and-forget: a failed send is logged and swallowed,
/// never retried and never surfaced to the original sender. This is
/// the hub's at-most-once delivery model made explicit.
#[derive(Debug, Clone)]
pub struct ClientSender {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<SocketFrame>,
}

impl ClientSender {
    /// Create a sender and the frame receiver for its writer task.
    #[must_use]
    pub fn channel(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<SocketFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    /// Identifier of the underlying socket.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the writer task is still draining frames.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Serialize and send one message, reporting whether it was accepted.
    pub fn send_json<T: Serialize>(&self, msg: &T) -> bool {
        match serde_json::to_string(msg) {
            Ok(json) => self.send_text(json),
            Err(e) => {
                tracing::error!(conn = %self.id, "failed to serialize outbound message: {e}");
                false
            }
        }
    }

    /// Send one already-encoded frame, reporting whether it was accepted.
    pub fn send_text(&self, text: String) -> bool {
        if self.tx.send(SocketFrame::Text(text)).is_err() {
            tracing::warn!(conn = %self.id, "dropping frame for closed connection");
            false
        } else {
            true
        }
    }

    /// Ask the writer task to close the socket.
    pub fn close(&self) {
        let _ = self.tx.send(SocketFrame::Close);
    }
}
