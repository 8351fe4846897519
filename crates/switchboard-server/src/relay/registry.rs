//! Authoritative directory of live connections.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::RwLock;
use switchboard_core::ConnectionId;

use super::connection::ClientConnection;
use crate::errors::RegistryError;

/// Live connections indexed by identity.
///
/// The lock is never held across an `.await`; callers that fan out take a
/// [`snapshot`](Self::snapshot) and send after it is released.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Rejects an identity that is already present.
    pub fn insert(&self, connection: Arc<ClientConnection>) -> Result<(), RegistryError> {
        let mut conns = self.connections.write();
        match conns.entry(connection.id().clone()) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateIdentity(entry.key().clone())),
            Entry::Vacant(entry) => {
                let _ = entry.insert(connection);
                Ok(())
            }
        }
    }

    /// Remove a connection. Removing an absent identity returns `None`.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.write().remove(id)
    }

    /// Look up a live connection.
    pub fn lookup(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().get(id).cloned()
    }

    /// Clone every live handle.
    pub fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Identities of every live connection.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use switchboard_core::Origin;
    use tokio::sync::mpsc;

    use super::*;

    fn make_connection(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(32);
        let origin = Arc::new(Origin::parse("ws", "localhost", "/"));
        (Arc::new(ClientConnection::new(id.into(), origin, tx)), rx)
    }

    #[test]
    fn insert_and_lookup() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        registry.insert(conn).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
        let found = registry.lookup(&"c1".into()).unwrap();
        assert_eq!(found.id().as_str(), "c1");
        assert!(registry.lookup(&"c2".into()).is_none());
    }

    #[test]
    fn duplicate_identity_rejected() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = make_connection("dup");
        let (second, _rx2) = make_connection("dup");
        registry.insert(first.clone()).unwrap();

        assert_matches!(
            registry.insert(second),
            Err(RegistryError::DuplicateIdentity(id)) if id.as_str() == "dup"
        );
        // Original handle is untouched.
        assert!(Arc::ptr_eq(&registry.lookup(&"dup".into()).unwrap(), &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        registry.insert(conn).unwrap();

        assert!(registry.remove(&"c1".into()).is_some());
        assert!(registry.remove(&"c1".into()).is_none());
        assert!(registry.lookup(&"c1".into()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_unaffected_by_later_removal() {
        let registry = ConnectionRegistry::new();
        for id in ["a", "b", "c"] {
            let (conn, _rx) = make_connection(id);
            registry.insert(conn).unwrap();
        }
        let snapshot = registry.snapshot();
        let _ = registry.remove(&"b".into());

        assert_eq!(snapshot.len(), 3);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn ids_lists_live_connections() {
        let registry = ConnectionRegistry::new();
        for id in ["a", "b"] {
            let (conn, _rx) = make_connection(id);
            registry.insert(conn).unwrap();
        }
        let mut ids = registry.ids();
        ids.sort();
        assert_eq!(ids, vec![ConnectionId::from("a"), ConnectionId::from("b")]);
    }

    #[test]
    fn concurrent_insert_remove() {
        let registry = Arc::new(ConnectionRegistry::new());
        std::thread::scope(|s| {
            for t in 0..4 {
                let registry = &registry;
                let _ = s.spawn(move || {
                    for i in 0..100 {
                        let (conn, _rx) = make_connection(&format!("t{t}_{i}"));
                        let id = conn.id().clone();
                        registry.insert(conn).unwrap();
                        if i % 2 == 0 {
                            let _ = registry.remove(&id);
                        }
                    }
                });
            }
        });
        assert_eq!(registry.len(), 200);
    }
}
