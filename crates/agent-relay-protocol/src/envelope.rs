//! JSON envelopes exchanged between the hub and its actors.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Actor classes the hub routes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// Remote worker process connected directly to the hub.
    Agent,
    /// Control-plane side, identified by an opaque app token.
    App,
    /// Proxy aggregating many agents behind one app-token uplink.
    Gateway,
    /// Read-only observer connection.
    Monitor,
    /// The hub itself (lifecycle broadcasts).
    System,
}

/// Delivery direction for a `forward` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardTarget {
    Agent,
    App,
}

/// Direction of a `message_log` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
    System,
}

/// How one delivery attempt ended, reported in outgoing
/// `message_log` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteOutcome {
    /// Sent to a live, directly connected recipient.
    Delivered,
    /// No recipient registered; held in its pending queue.
    Queued,
    /// Fanned out to the point-in-time agent set.
    Broadcast,
    /// Mirrored to a live gateway uplink.
    Bridged,
    /// No live gateway for the token; held in the gateway queue.
    GatewayQueued,
}

/// Message from an actor to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// Classify the connection as an agent or app and register it.
    #[serde(rename_all = "camelCase")]
    Register {
        #[serde(default)]
        actor: Option<ActorKind>,
        #[serde(default)]
        agent_id: Option<String>,
        #[serde(default)]
        app_token: Option<String>,
    },
    /// Route a payload towards an agent or an app.
    #[serde(rename_all = "camelCase")]
    Forward {
        #[serde(default)]
        actor: Option<ActorKind>,
        #[serde(default)]
        agent_id: Option<String>,
        #[serde(default)]
        app_token: Option<String>,
        target: ForwardTarget,
        payload: Value,
    },
    /// Register a gateway uplink for an app token.
    #[serde(rename_all = "camelCase")]
    RegisterGateway {
        #[serde(default)]
        server_id: Option<String>,
        #[serde(default)]
        app_token: Option<String>,
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// Gateway-sourced payload bound for an app.
    #[serde(rename_all = "camelCase")]
    ForwardFromAgent {
        #[serde(default)]
        agent_id: Option<String>,
        #[serde(default)]
        app_token: Option<String>,
        payload: Value,
    },
    /// Gateway-sourced payload bound for an agent.
    #[serde(rename_all = "camelCase")]
    ForwardFromApp {
        #[serde(default)]
        agent_id: Option<String>,
        #[serde(default)]
        app_id: Option<String>,
        #[serde(default)]
        app_token: Option<String>,
        payload: Value,
    },
    /// Keepalive.
    Ping {
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// Ask for live registration counts.
    RequestConnections,
}

impl Inbound {
    /// Actor class this envelope is attributed to in monitor logs.
    #[must_use]
    pub fn log_actor(&self) -> ActorKind {
        match self {
            Self::Register {
                actor, agent_id, ..
            } => actor.unwrap_or(if agent_id.is_some() {
                ActorKind::Agent
            } else {
                ActorKind::App
            }),
            Self::Forward { actor, .. } => actor.unwrap_or(ActorKind::System),
            Self::RegisterGateway { .. }
            | Self::ForwardFromAgent { .. }
            | Self::ForwardFromApp { .. } => ActorKind::Gateway,
            Self::Ping { .. } | Self::RequestConnections => ActorKind::System,
        }
    }

    /// Agent identity carried by this envelope, if any.
    #[must_use]
    pub fn log_agent_id(&self) -> Option<&str> {
        match self {
            Self::Register { agent_id, .. }
            | Self::Forward { agent_id, .. }
            | Self::ForwardFromAgent { agent_id, .. }
            | Self::ForwardFromApp { agent_id, .. } => agent_id.as_deref(),
            Self::RegisterGateway { .. } | Self::Ping { .. } | Self::RequestConnections => None,
        }
    }

    /// Routed payload carried by this envelope, if any.
    #[must_use]
    pub fn log_payload(&self) -> Option<&Value> {
        match self {
            Self::Forward { payload, .. }
            | Self::ForwardFromAgent { payload, .. }
            | Self::ForwardFromApp { payload, .. } => Some(payload),
            _ => None,
        }
    }
}

/// Counts reported by `connections_snapshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionsSummary {
    pub agents: usize,
    pub apps: usize,
}

/// Message from the hub to an actor or monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// Registration acknowledgement.
    #[serde(rename_all = "camelCase")]
    Registered {
        actor: ActorKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_token: Option<String>,
    },
    /// Keepalive reply.
    Pong { timestamp: i64 },
    /// Full connection-state broadcast for monitors.
    #[serde(rename_all = "camelCase")]
    ConnectionUpdate {
        timestamp: i64,
        actor: ActorKind,
        connected_agents: Vec<String>,
        connected_apps: Vec<String>,
        monitoring_clients: usize,
    },
    /// Reply to `request_connections`.
    ConnectionsSnapshot {
        summary: ConnectionsSummary,
        timestamp: i64,
    },
    /// Gateway-mirrored payload bound for an agent.
    #[serde(rename_all = "camelCase")]
    ForwardToAgent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_token: Option<String>,
        payload: Value,
    },
    /// Gateway-mirrored payload bound for an app.
    #[serde(rename_all = "camelCase")]
    ForwardToApp {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app_token: Option<String>,
        payload: Value,
    },
    /// Best-effort routing audit entry for monitors.
    #[serde(rename_all = "camelCase")]
    MessageLog {
        timestamp: i64,
        direction: Direction,
        actor: ActorKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        payload: Value,
        raw: String,
        /// Set on outgoing entries only: how the delivery ended.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<RouteOutcome>,
    },
}

/// Why an inbound frame could not be routed.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame was not a JSON object.
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The frame had no string `type` field.
    #[error("envelope missing `type` field")]
    MissingType,
    /// The `type` was unknown, or known with unusable fields.
    #[error("unroutable envelope type `{ty}`: {source}")]
    Unroutable {
        ty: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode one inbound frame.
///
/// Decoding is two-stage so diagnostics can distinguish malformed JSON
/// from a well-formed envelope of unknown `type`; both classes are
/// dropped by the router without a reply.
///
/// # Errors
/// Returns [`DecodeError`] when the frame cannot be routed.
pub fn decode(text: &str) -> Result<Inbound, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
    let ty = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_owned();
    serde_json::from_value(value).map_err(|source| DecodeError::Unroutable { ty, source })
}

/// Current Unix time in milliseconds, used for every outbound timestamp.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
