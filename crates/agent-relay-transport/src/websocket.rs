//! WebSocket upgrade handling and per-connection lifecycle.

use agent_relay_hub::{ClientSender, HubHandle, SocketFrame};
use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use uuid::Uuid;

/// Header marking a connection as a monitoring client at connect time.
pub const MONITOR_HEADER: &str = "x-relay-monitor";

/// Build the hub's WebSocket router.
///
/// `/ws` accepts actor connections (agents, apps, gateways), which are
/// classified by their first `register`/`register_gateway` envelope.
/// `/monitor` (or `/ws` with `x-relay-monitor: true`) attaches a
/// read-only monitoring client.
#[must_use]
pub fn relay_router(handle: HubHandle) -> Router {
    Router::new()
        .route("/ws", get(actor_handler))
        .route("/monitor", get(monitor_handler))
        .with_state(handle)
}

async fn actor_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(handle): State<HubHandle>,
) -> impl IntoResponse {
    let monitor = headers
        .get(MONITOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    ws.on_upgrade(move |socket| handle_socket(socket, handle, monitor))
}

async fn monitor_handler(
    ws: WebSocketUpgrade,
    State(handle): State<HubHandle>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, handle, true))
}

/// Pump one socket: writer task for hub-to-client frames, read loop
/// feeding the hub mailbox, disconnect notification on the way out.
async fn handle_socket(socket: WebSocket, handle: HubHandle, monitor: bool) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let conn_id = Uuid::new_v4();
    let (sender, mut frames) = ClientSender::channel(conn_id);

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            match frame {
                SocketFrame::Text(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                SocketFrame::Close => {
                    // Explicit eviction by the hub (gateway replacement).
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    if handle.connect(sender, monitor).is_err() {
        tracing::warn!(conn = %conn_id, "hub is gone, refusing connection");
        writer.abort();
        return;
    }

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(conn = %conn_id, "websocket error: {e}");
                break;
            }
        };
        if handle.frame(conn_id, text).is_err() {
            break;
        }
    }

    let _ = handle.disconnect(conn_id);
    writer.abort();
    tracing::info!(conn = %conn_id, "websocket disconnected");
}
