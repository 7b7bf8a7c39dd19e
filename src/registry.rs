//! Connection registry
//!
//! Tracks every connection between accept and close. The registry is owned
//! by the router actor, so all mutation and iteration happen on one task
//! and a fan-out always sees a consistent membership view.

use std::collections::HashMap;

use crate::connection::Connection;
use crate::types::ConnectionId;

/// Set of live connections keyed by their id
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection unconditionally
    pub fn add(&mut self, connection: Connection) {
        self.connections.insert(connection.id, connection);
    }

    /// Remove a connection; removing an absent id is a no-op
    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    /// Visit every member that is still open
    ///
    /// Liveness is re-checked right before each visit, so a connection whose
    /// socket closed after it was added is skipped. Iteration order is
    /// unspecified. Returns the number of members visited.
    pub fn for_each<F>(&self, mut visitor: F) -> usize
    where
        F: FnMut(&Connection),
    {
        let mut visited = 0;
        for connection in self.connections.values() {
            if !connection.is_open() {
                continue;
            }
            visitor(connection);
            visited += 1;
        }
        visited
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Number of connections added and not yet removed
    pub fn live_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Envelope;
    use tokio::sync::mpsc;

    fn connection() -> (Connection, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(8);
        (Connection::new(ConnectionId::new(), tx), rx)
    }

    #[test]
    fn test_add_remove_count() {
        let mut registry = ConnectionRegistry::new();
        let (a, _rx_a) = connection();
        let (b, _rx_b) = connection();
        let a_id = a.id;

        registry.add(a);
        registry.add(b);
        assert_eq!(registry.live_count(), 2);
        assert!(registry.get(a_id).is_some());

        assert!(registry.remove(a_id).is_some());
        assert_eq!(registry.live_count(), 1);
        assert!(registry.get(a_id).is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let (a, _rx) = connection();
        let a_id = a.id;
        registry.add(a);

        assert!(registry.remove(a_id).is_some());
        assert!(registry.remove(a_id).is_none());
        assert!(registry.remove(ConnectionId::new()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_for_each_skips_closed() {
        let mut registry = ConnectionRegistry::new();
        let (open, _rx_open) = connection();
        let (closed, rx_closed) = connection();
        let open_id = open.id;
        registry.add(open);
        registry.add(closed);

        drop(rx_closed);

        let mut seen = Vec::new();
        let visited = registry.for_each(|c| seen.push(c.id));
        assert_eq!(visited, 1);
        assert_eq!(seen, vec![open_id]);
        // Closed but not yet removed still counts as a member
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn test_for_each_never_visits_removed() {
        let mut registry = ConnectionRegistry::new();
        let (a, _rx_a) = connection();
        let (b, _rx_b) = connection();
        let b_id = b.id;
        registry.add(a);
        registry.add(b);
        registry.remove(b_id);

        let mut seen = Vec::new();
        registry.for_each(|c| seen.push(c.id));
        assert!(!seen.contains(&b_id));
        assert_eq!(seen.len(), 1);
    }
}
