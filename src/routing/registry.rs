//! Username to connection registry
//!
//! The registry is owned by the server and shared by reference with every
//! session. `DashMap` shards its locks, so concurrent registrations,
//! removals, and broadcast snapshots never block each other for long.

use crate::error::RoutingError;
use crate::network::{Connection, ConnectionId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Live connections keyed by username
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<Connection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register `connection` under `username`
    ///
    /// Atomic: of two concurrent registrations for the same name exactly one
    /// succeeds. On success the connection's username is set as well.
    pub fn register(&self, username: &str, connection: Arc<Connection>) -> Result<(), RoutingError> {
        match self.connections.entry(username.to_string()) {
            Entry::Occupied(_) => Err(RoutingError::DuplicateUsername {
                username: username.to_string(),
            }),
            Entry::Vacant(slot) => {
                connection.set_username(Some(username.to_string()));
                slot.insert(connection);
                Ok(())
            },
        }
    }

    /// Remove `username`, whoever holds it
    ///
    /// Idempotent; returns the removed connection if there was one.
    pub fn unregister(&self, username: &str) -> Option<Arc<Connection>> {
        self.connections.remove(username).map(|(_, conn)| conn)
    }

    /// Remove `username` only if it still belongs to connection `id`
    ///
    /// Returns true if an entry was removed.
    pub fn remove_connection(&self, username: &str, id: ConnectionId) -> bool {
        self.connections
            .remove_if(username, |_, conn| conn.id() == id)
            .is_some()
    }

    /// Find the connection registered under `username`
    pub fn lookup(&self, username: &str) -> Option<Arc<Connection>> {
        self.connections.get(username).map(|entry| entry.value().clone())
    }

    /// Whether `username` is registered
    pub fn contains(&self, username: &str) -> bool {
        self.connections.contains_key(username)
    }

    /// Snapshot of all registrations, sorted by username
    ///
    /// The snapshot is copied out before returning, so callers may send to
    /// its members while other sessions register and unregister.
    pub fn all(&self) -> Vec<(String, Arc<Connection>)> {
        let mut members: Vec<_> = self
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        members.sort_by(|a, b| a.0.cmp(&b.0));
        members
    }

    /// Sorted snapshot of registered usernames
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Number of registered users
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether nobody is registered
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
