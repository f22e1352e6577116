//! Connection registry: which connections belong to which user.
//!
//! A plain data structure. Synchronization is the owner's job (see
//! `PresenceHub`), so every mutation here is a short, non-blocking step.

use std::collections::{HashMap, HashSet};
use std::fmt;

/// Process-unique handle for an accepted connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// The user had no connection before this one
    FirstConnection,
    /// The user was already online through another connection
    AdditionalConnection { connections: usize },
    /// This connection was already bound to this user
    AlreadyBound,
    /// This connection is bound to a different user; nothing changed
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbindOutcome {
    pub user_id: String,
    /// The user's connection set became empty; an offline transition is due
    pub last_connection: bool,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    users: HashMap<String, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, connection_id: ConnectionId, user_id: &str) -> BindOutcome {
        if let Some(bound) = self.connections.get(&connection_id) {
            return if bound == user_id {
                BindOutcome::AlreadyBound
            } else {
                BindOutcome::Conflict
            };
        }

        self.connections
            .insert(connection_id, user_id.to_string());
        let set = self.users.entry(user_id.to_string()).or_default();
        set.insert(connection_id);

        if set.len() == 1 {
            BindOutcome::FirstConnection
        } else {
            BindOutcome::AdditionalConnection {
                connections: set.len(),
            }
        }
    }

    /// Remove a connection. `None` if it was never bound.
    pub fn unbind(&mut self, connection_id: ConnectionId) -> Option<UnbindOutcome> {
        let user_id = self.connections.remove(&connection_id)?;

        let last_connection = match self.users.get_mut(&user_id) {
            Some(set) => {
                set.remove(&connection_id);
                set.is_empty()
            },
            None => true,
        };
        if last_connection {
            self.users.remove(&user_id);
        }

        Some(UnbindOutcome {
            user_id,
            last_connection,
        })
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.get(user_id).is_some_and(|set| !set.is_empty())
    }

    pub fn user_of(&self, connection_id: ConnectionId) -> Option<&str> {
        self.connections.get(&connection_id).map(String::as_str)
    }

    pub fn connections_of(&self, user_id: &str) -> usize {
        self.users.get(user_id).map_or(0, HashSet::len)
    }

    pub fn connection_ids_of(&self, user_id: &str) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .users
            .get(user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Total bound connections across all users
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn online_user_count(&self) -> usize {
        self.users.len()
    }

    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users.keys().cloned().collect();
        users.sort();
        users
    }
}
