//! Presence registry.
//!
//! The registry is the single source of truth for who is online and which
//! conversation each online user has open. One mutex guards the whole
//! table so that checks spanning two users see a consistent state. No I/O
//! happens while the lock is held.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::message::UserId;

/// Presence state for a single online user.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    /// The user's registered connection.
    pub connection: Arc<Connection>,
    /// Counterparty of the conversation the user has open.
    pub active_peer: Option<UserId>,
}

impl PresenceEntry {
    fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            active_peer: None,
        }
    }

    fn is_viewing(&self, peer: UserId) -> bool {
        self.active_peer == Some(peer)
    }
}

/// How a message for a user should be delivered.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// The user has the conversation open: push the full message.
    Viewing(Arc<Connection>),
    /// The user is online elsewhere: push a chat list bump.
    Online(Arc<Connection>),
    /// The user is not connected.
    Offline,
}

impl Delivery {
    /// Whether the recipient has the conversation open.
    #[must_use]
    pub fn is_viewing(&self) -> bool {
        matches!(self, Delivery::Viewing(_))
    }
}

/// Process-wide table of connected users.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: Mutex<HashMap<UserId, PresenceEntry>>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for its user.
    ///
    /// The newest connection wins: if the user already had a different
    /// connection registered, that connection is evicted, closed, and
    /// returned.
    pub fn register(&self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let user = connection.user_id();
        let evicted = {
            let mut entries = self.entries.lock();
            if owns(&entries, &connection) {
                return None;
            }
            entries
                .insert(user, PresenceEntry::new(connection.clone()))
                .map(|old| old.connection)
        };

        match &evicted {
            Some(old) => {
                info!(user = %user, old = %old.id(), new = %connection.id(), "Replacing existing connection");
                old.close();
            }
            None => debug!(user = %user, connection = %connection.id(), "Registered"),
        }

        evicted
    }

    /// Unregister a connection and close it.
    ///
    /// The entry is removed only if it still belongs to `connection`, so a
    /// stale or repeated call never disturbs a newer registration. Returns
    /// `true` if an entry was removed.
    pub fn unregister(&self, connection: &Arc<Connection>) -> bool {
        let user = connection.user_id();
        let removed = {
            let mut entries = self.entries.lock();
            owns(&entries, connection) && entries.remove(&user).is_some()
        };

        connection.close();
        if removed {
            debug!(user = %user, connection = %connection.id(), "Unregistered");
        }
        removed
    }

    /// Check if a user is online.
    #[must_use]
    pub fn is_online(&self, user: UserId) -> bool {
        self.entries.lock().contains_key(&user)
    }

    /// Get a user's registered connection.
    #[must_use]
    pub fn lookup(&self, user: UserId) -> Option<Arc<Connection>> {
        self.entries
            .lock()
            .get(&user)
            .map(|entry| entry.connection.clone())
    }

    /// The conversation `connection` has open, if it is still registered.
    #[must_use]
    pub fn active_peer(&self, connection: &Arc<Connection>) -> Option<UserId> {
        self.entries
            .lock()
            .get(&connection.user_id())
            .filter(|entry| Arc::ptr_eq(&entry.connection, connection))
            .and_then(|entry| entry.active_peer)
    }

    /// Set or clear the conversation `connection` has open.
    ///
    /// Returns `false` if the connection is no longer registered.
    pub fn set_active_peer(&self, connection: &Arc<Connection>, peer: Option<UserId>) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(&connection.user_id()) {
            Some(entry) if Arc::ptr_eq(&entry.connection, connection) => {
                entry.active_peer = peer;
                true
            }
            _ => false,
        }
    }

    /// True iff `counterpart` is online and has the conversation with
    /// `viewer` open.
    #[must_use]
    pub fn is_peer_actively_viewing(&self, viewer: UserId, counterpart: UserId) -> bool {
        self.entries
            .lock()
            .get(&counterpart)
            .is_some_and(|entry| entry.is_viewing(viewer))
    }

    /// True iff `a` and `b` both have their conversation open.
    #[must_use]
    pub fn both_actively_viewing(&self, a: UserId, b: UserId) -> bool {
        let entries = self.entries.lock();
        let viewing = |who: UserId, peer: UserId| {
            entries
                .get(&who)
                .is_some_and(|entry| entry.is_viewing(peer))
        };
        viewing(a, b) && viewing(b, a)
    }

    /// Decide how a message from `sender` reaches `receiver`.
    #[must_use]
    pub fn delivery(&self, sender: UserId, receiver: UserId) -> Delivery {
        match self.entries.lock().get(&receiver) {
            Some(entry) if entry.is_viewing(sender) => Delivery::Viewing(entry.connection.clone()),
            Some(entry) => Delivery::Online(entry.connection.clone()),
            None => Delivery::Offline,
        }
    }

    /// Number of online users.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Whether `connection` is the one registered for its user.
fn owns(entries: &HashMap<UserId, PresenceEntry>, connection: &Arc<Connection>) -> bool {
    entries
        .get(&connection.user_id())
        .is_some_and(|entry| Arc::ptr_eq(&entry.connection, connection))
}
