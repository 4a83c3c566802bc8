use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;
use uuid::Uuid;

use courier_types::events::ServerEvent;
use courier_types::models::UserId;

/// Outbound side of one live connection: an id plus the queue its writer
/// task drains.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            tx,
        }
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Queue an event for this connection. Sending to a connection that has
    /// already gone away is a no-op; returns whether the event was queued.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Which users are reachable right now, and on which connection.
///
/// Calls never suspend. `lookup` is best effort: the connection it returns
/// can close before the caller gets to send on it.
pub trait PresenceRegistry: Send + Sync {
    /// Bind `user_id` to `handle`, replacing any earlier connection
    /// (last writer wins).
    fn register(&self, user_id: UserId, handle: ConnectionHandle);

    /// Remove the entry for `user_id` only if it still belongs to `conn_id`.
    /// Returns whether an entry was removed.
    fn unregister(&self, user_id: UserId, conn_id: Uuid) -> bool;

    fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle>;

    fn online_users(&self) -> Vec<UserId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local registry. Only authoritative for connections held by this
/// process.
#[derive(Default)]
pub struct LocalPresence {
    entries: RwLock<HashMap<UserId, ConnectionHandle>>,
}

impl LocalPresence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresenceRegistry for LocalPresence {
    fn register(&self, user_id: UserId, handle: ConnectionHandle) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, handle);
    }

    fn unregister(&self, user_id: UserId, conn_id: Uuid) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let owned = entries
            .get(&user_id)
            .is_some_and(|stored| stored.conn_id == conn_id);
        if owned {
            entries.remove(&user_id);
        }
        owned
    }

    fn lookup(&self, user_id: UserId) -> Option<ConnectionHandle> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()
    }

    fn online_users(&self) -> Vec<UserId> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    #[test]
    fn register_and_lookup() {
        let presence = LocalPresence::new();
        let (h, _rx) = handle();
        presence.register(1, h.clone());

        assert_eq!(presence.lookup(1).map(|h| h.conn_id()), Some(h.conn_id()));
        assert!(presence.lookup(2).is_none());
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn last_writer_wins() {
        let presence = LocalPresence::new();
        let (s1, _rx1) = handle();
        let (s2, _rx2) = handle();

        presence.register(1, s1.clone());
        presence.register(1, s2.clone());
        assert_eq!(presence.lookup(1).unwrap().conn_id(), s2.conn_id());
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn stale_unregister_keeps_newer_connection() {
        let presence = LocalPresence::new();
        let (s1, _rx1) = handle();
        let (s2, _rx2) = handle();

        presence.register(1, s1.clone());
        presence.register(1, s2.clone());

        assert!(!presence.unregister(1, s1.conn_id()));
        assert_eq!(presence.lookup(1).unwrap().conn_id(), s2.conn_id());

        assert!(presence.unregister(1, s2.conn_id()));
        assert!(presence.lookup(1).is_none());
        assert!(presence.is_empty());
    }

    #[test]
    fn send_to_closed_connection_is_noop() {
        let (h, rx) = handle();
        drop(rx);
        assert!(!h.send(ServerEvent::error("gone")));
    }
}
