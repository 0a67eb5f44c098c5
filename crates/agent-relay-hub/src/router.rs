//! Per-envelope dispatch: one delivery path per inbound `type`.

use agent_relay_protocol::{
    ActorKind, ConnectionsSummary, Direction, ForwardTarget, Inbound, Outbound, RouteOutcome,
    decode, normalize_token, now_millis,
};
use serde_json::Value;

use crate::client::ClientSender;
use crate::hub::HubState;

/// Route one raw inbound frame from a classified-or-not actor socket.
///
/// Undeliverable frames (malformed JSON, missing or unknown `type`)
/// are dropped with a diagnostic and no reply. A failed delivery send
/// is never retried and never produces an error reply either; failure
/// visibility is delegated entirely to the monitor channel.
pub(crate) fn route(state: &mut HubState, conn: &ClientSender, text: &str) {
    let envelope = match decode(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(conn = %conn.id(), "dropping frame: {e}");
            return;
        }
    };

    state.monitors.broadcast_message_log(
        Direction::Incoming,
        envelope.log_actor(),
        envelope.log_agent_id().map(str::to_string),
        envelope.log_payload().cloned().unwrap_or(Value::Null),
        text,
    );

    match envelope {
        Inbound::Register {
            agent_id, app_token, ..
        } => handle_register(state, conn, agent_id, app_token),
        Inbound::RegisterGateway {
            server_id,
            app_token,
            ..
        } => handle_register_gateway(state, conn, server_id, app_token),
        Inbound::Forward {
            agent_id,
            app_token,
            target,
            payload,
            ..
        } => handle_forward(state, agent_id, app_token, target, payload),
        Inbound::ForwardFromAgent {
            app_token, payload, ..
        } => {
            // Gateway-sourced: this message *is* the gateway path, so
            // deliver to the direct app only, with no mirroring back.
            let token = normalize_token(app_token.as_deref());
            deliver_to_app(state, &token, payload);
        }
        Inbound::ForwardFromApp {
            agent_id, payload, ..
        } => {
            deliver_to_agent(state, agent_id.as_deref(), payload);
        }
        Inbound::Ping { .. } => {
            conn.send_json(&Outbound::Pong {
                timestamp: now_millis(),
            });
        }
        Inbound::RequestConnections => {
            conn.send_json(&Outbound::ConnectionsSnapshot {
                summary: ConnectionsSummary {
                    agents: state.registry.agent_count(),
                    apps: state.registry.app_count(),
                },
                timestamp: now_millis(),
            });
        }
    }
}

/// Classify by `agentId` presence: agent when present, app otherwise.
/// Register, flush the matching pending queue, acknowledge, broadcast.
fn handle_register(
    state: &mut HubState,
    conn: &ClientSender,
    agent_id: Option<String>,
    app_token: Option<String>,
) {
    if let Some(agent_id) = agent_id {
        tracing::info!(agent_id, conn = %conn.id(), "agent registered");
        state.registry.register_agent(&agent_id, conn.clone());
        state.pending.flush_agent(&agent_id, conn);
        conn.send_json(&Outbound::Registered {
            actor: ActorKind::Agent,
            agent_id: Some(agent_id),
            app_id: None,
            server_id: None,
            app_token: None,
        });
    } else {
        let token = normalize_token(app_token.as_deref());
        tracing::info!(app_token = %token, conn = %conn.id(), "app registered");
        state.registry.register_app(&token, conn.clone());
        state.pending.flush_app(&token, conn);
        conn.send_json(&Outbound::Registered {
            actor: ActorKind::App,
            agent_id: None,
            app_id: None,
            server_id: None,
            app_token: Some(token),
        });
    }
    state.monitors.broadcast_connection_update(&state.registry);
}

fn handle_register_gateway(
    state: &mut HubState,
    conn: &ClientSender,
    server_id: Option<String>,
    app_token: Option<String>,
) {
    let token = normalize_token(app_token.as_deref());
    tracing::info!(app_token = %token, server_id = ?server_id, conn = %conn.id(), "gateway registered");
    state
        .bridge
        .register_gateway(&token, conn.clone(), server_id.clone());
    conn.send_json(&Outbound::Registered {
        actor: ActorKind::Gateway,
        agent_id: None,
        app_id: None,
        server_id,
        app_token: Some(token),
    });
    state.monitors.broadcast_connection_update(&state.registry);
}

/// Dual-path delivery: the direct registry/queue path, plus a mirror
/// onto the gateway bridge so gateway-mediated actors for the same
/// token also receive the payload. Each path reports its outcome to
/// the monitor audit channel.
fn handle_forward(
    state: &mut HubState,
    agent_id: Option<String>,
    app_token: Option<String>,
    target: ForwardTarget,
    payload: Value,
) {
    let token = normalize_token(app_token.as_deref());
    let mirror = match target {
        ForwardTarget::App => {
            deliver_to_app(state, &token, payload.clone());
            Outbound::ForwardToApp {
                agent_id: agent_id.clone(),
                app_id: None,
                app_token: Some(token.clone()),
                payload: payload.clone(),
            }
        }
        ForwardTarget::Agent => {
            deliver_to_agent(state, agent_id.as_deref(), payload.clone());
            Outbound::ForwardToAgent {
                agent_id: agent_id.clone(),
                app_id: None,
                app_token: Some(token.clone()),
                payload: payload.clone(),
            }
        }
    };
    let sent = state.bridge.enqueue_or_send(&token, mirror);
    state.monitors.broadcast_route_outcome(
        ActorKind::Gateway,
        agent_id,
        payload,
        if sent {
            RouteOutcome::Bridged
        } else {
            RouteOutcome::GatewayQueued
        },
    );
}

/// Direct delivery sends the opaque payload verbatim; only the gateway
/// mirror wraps it in a `forward_to_*` envelope.
fn deliver_to_app(state: &mut HubState, token: &str, payload: Value) {
    let outcome = match state.registry.lookup_app(token) {
        Some(app) => {
            app.send_json(&payload);
            RouteOutcome::Delivered
        }
        None => {
            state.pending.enqueue_for_app(token, payload.clone());
            RouteOutcome::Queued
        }
    };
    state
        .monitors
        .broadcast_route_outcome(ActorKind::App, None, payload, outcome);
}

/// With an `agentId`, deliver to that agent or queue for it. Without
/// one, broadcast to a point-in-time snapshot of the connected agent
/// set; agents registering mid-broadcast are not included.
fn deliver_to_agent(state: &mut HubState, agent_id: Option<&str>, payload: Value) {
    match agent_id {
        Some(agent_id) => {
            let outcome = match state.registry.lookup_agent(agent_id) {
                Some(agent) => {
                    agent.send_json(&payload);
                    RouteOutcome::Delivered
                }
                None => {
                    state.pending.enqueue_for_agent(agent_id, payload.clone());
                    RouteOutcome::Queued
                }
            };
            state.monitors.broadcast_route_outcome(
                ActorKind::Agent,
                Some(agent_id.to_string()),
                payload,
                outcome,
            );
        }
        None => {
            let targets = state.registry.agent_connections();
            tracing::debug!(count = targets.len(), "broadcasting payload to all agents");
            for agent in &targets {
                agent.send_json(&payload);
            }
            state.monitors.broadcast_route_outcome(
                ActorKind::Agent,
                None,
                payload,
                RouteOutcome::Broadcast,
            );
        }
    }
}
