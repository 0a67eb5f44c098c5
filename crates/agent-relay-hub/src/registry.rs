//! Authoritative lookup of currently reachable agent and app identities.

use std::collections::HashMap;

use agent_relay_protocol::ActorKind;

use crate::client::{ClientSender, ConnectionId};

/// Identity released by [`ConnectionRegistry::remove_by_conn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedIdentity {
    pub role: ActorKind,
    pub id: String,
}

/// Maps live identities to their sockets.
///
/// Pure map mutations, executed only inside the hub actor's single
/// processing loop; there are no error conditions.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    agents: HashMap<String, ClientSender>,
    apps: HashMap<String, ClientSender>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the agent's entry.
    ///
    /// A superseded entry is not closed; the old socket stays open but
    /// unreachable through routing (known asymmetry with the gateway
    /// bridge, kept because clients may rely on it during reconnection
    /// races).
    pub fn register_agent(&mut self, agent_id: &str, conn: ClientSender) {
        if let Some(prev) = self.agents.insert(agent_id.to_string(), conn) {
            if prev.is_open() {
                tracing::warn!(
                    agent_id,
                    prev_conn = %prev.id(),
                    "agent re-registered while previous socket still open"
                );
            }
        }
    }

    /// Insert or overwrite the app's entry, keyed by normalized token.
    pub fn register_app(&mut self, app_token: &str, conn: ClientSender) {
        if let Some(prev) = self.apps.insert(app_token.to_string(), conn) {
            if prev.is_open() {
                tracing::warn!(
                    app_token,
                    prev_conn = %prev.id(),
                    "app re-registered while previous socket still open"
                );
            }
        }
    }

    #[must_use]
    pub fn lookup_agent(&self, agent_id: &str) -> Option<&ClientSender> {
        self.agents.get(agent_id)
    }

    #[must_use]
    pub fn lookup_app(&self, app_token: &str) -> Option<&ClientSender> {
        self.apps.get(app_token)
    }

    /// Remove whichever identity owns this socket, agents first.
    pub fn remove_by_conn(&mut self, conn: ConnectionId) -> Option<RemovedIdentity> {
        if let Some(agent_id) = self
            .agents
            .iter()
            .find(|(_, c)| c.id() == conn)
            .map(|(id, _)| id.clone())
        {
            self.agents.remove(&agent_id);
            return Some(RemovedIdentity {
                role: ActorKind::Agent,
                id: agent_id,
            });
        }
        if let Some(app_token) = self
            .apps
            .iter()
            .find(|(_, c)| c.id() == conn)
            .map(|(token, _)| token.clone())
        {
            self.apps.remove(&app_token);
            return Some(RemovedIdentity {
                role: ActorKind::App,
                id: app_token,
            });
        }
        None
    }

    /// Point-in-time snapshot of every connected agent socket.
    #[must_use]
    pub fn agent_connections(&self) -> Vec<ClientSender> {
        self.agents.values().cloned().collect()
    }

    /// Sorted agent identities, for connection-state broadcasts.
    #[must_use]
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Sorted app tokens, for connection-state broadcasts.
    #[must_use]
    pub fn app_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.apps.keys().cloned().collect();
        tokens.sort();
        tokens
    }

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn app_count(&self) -> usize {
        self.apps.len()
    }
}
