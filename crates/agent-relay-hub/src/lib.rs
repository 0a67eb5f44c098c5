//! Stateful routing core for the agent-relay hub.
//!
//! All mutable routing state (registries, pending queues, the gateway
//! bridge, the monitor set) is owned by a single actor task; the only
//! mutation path is the ordered [`HubEvent`] mailbox behind
//! [`HubHandle`]. This crate provides:
//! - `ClientSender` - per-connection outbound frame handle
//! - `ConnectionRegistry` - agent/app identity to live handle lookup
//! - `PendingMessageStore` - FIFO store-and-forward queues
//! - `GatewayBridge` - per-app-token gateway uplinks
//! - `MonitorBroadcaster` - best-effort observability fan-out
//! - `Hub` / `HubHandle` - the owning actor and its mailbox

pub mod bridge;
pub mod client;
pub mod hub;
pub mod monitor;
pub mod pending;
pub mod registry;
mod router;

pub use bridge::GatewayBridge;
pub use client::{ClientSender, ConnectionId, SocketFrame};
pub use hub::{Hub, HubError, HubEvent, HubHandle};
pub use monitor::MonitorBroadcaster;
pub use pending::PendingMessageStore;
pub use registry::{ConnectionRegistry, RemovedIdentity};
