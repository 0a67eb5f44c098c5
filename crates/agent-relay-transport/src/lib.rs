//! WebSocket transport for the agent-relay hub.
//!
//! Provides:
//! - `relay_router` - axum router exposing `/ws` and `/monitor`
//! - Connection lifecycle (accept, classify, pump, deregister)

pub mod websocket;

pub use websocket::{MONITOR_HEADER, relay_router};
