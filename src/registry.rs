//! Concurrency-safe session registry.
//!
//! Maps a client identity (the datagram source address) to the handle of its
//! in-progress transfer session.  The dispatch loop is the only writer, but
//! session workers remove themselves on idle expiry, so every operation goes
//! through one lock.  Insert, lookup, and remove on the same identity are
//! linearizable; there is no ordering guarantee across identities.
//!
//! The registry also allocates session ids: a monotonically increasing
//! counter that distinguishes a session from a later session under the same
//! identity.  [`SessionRegistry::remove_if`] only removes an entry whose id
//! matches, so a worker can never evict its own replacement.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use crate::session::SessionHandle;

/// Thread-safe identity → session map with transfer counters.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

struct RegistryInner {
    map: HashMap<SocketAddr, SessionHandle>,
    next_id: u64,

    // Counters
    started: u64,
    completed: u64,
    expired: u64,
    orphans: u64,
}

/// Snapshot of the registry's transfer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Sessions created (start frames that resolved an artifact).
    pub started: u64,
    /// Sessions removed by an end marker.
    pub completed: u64,
    /// Sessions removed by idle expiry or a dead worker.
    pub expired: u64,
    /// Data frames dropped because no session was open for the sender.
    pub orphans: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                map: HashMap::new(),
                next_id: 0,
                started: 0,
                completed: 0,
                expired: 0,
                orphans: 0,
            })),
        }
    }

    /// Allocate a fresh session id.
    pub fn allocate_id(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        id
    }

    /// Install a session for `identity`, returning the displaced handle when
    /// one was already open (the caller decides how to retire it).
    pub fn insert(&self, identity: SocketAddr, handle: SessionHandle) -> Option<SessionHandle> {
        let mut inner = self.inner.lock().unwrap();
        inner.started += 1;
        inner.map.insert(identity, handle)
    }

    /// Look up the open session for `identity`.
    ///
    /// A miss is an orphan data frame and is counted as such.
    pub fn get(&self, identity: &SocketAddr) -> Option<SessionHandle> {
        let mut inner = self.inner.lock().unwrap();
        match inner.map.get(identity) {
            Some(handle) => Some(handle.clone()),
            None => {
                inner.orphans += 1;
                None
            }
        }
    }

    /// Remove and return the session for `identity`, if present.
    pub fn remove(&self, identity: &SocketAddr) -> Option<SessionHandle> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner.map.remove(identity);
        if removed.is_some() {
            inner.completed += 1;
        }
        removed
    }

    /// Remove the session for `identity` only if its id matches `id`.
    ///
    /// Used by workers retiring themselves; returns `true` when an entry was
    /// removed.
    pub fn remove_if(&self, identity: &SocketAddr, id: u64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.map.get(identity).is_some_and(|h| h.id() == id) {
            inner.map.remove(identity);
            inner.expired += 1;
            true
        } else {
            false
        }
    }

    /// Number of currently open sessions.
    pub fn active(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    /// Transfer counters.
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock().unwrap();
        RegistryStats {
            started: inner.started,
            completed: inner.completed,
            expired: inner.expired,
            orphans: inner.orphans,
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn identity(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn handle(id: u64) -> SessionHandle {
        let (tx, _rx) = mpsc::channel(1);
        SessionHandle::new(id, tx)
    }

    #[test]
    fn insert_then_get() {
        let reg = SessionRegistry::new();
        reg.insert(identity(1000), handle(0));
        assert!(reg.get(&identity(1000)).is_some());
        assert_eq!(reg.active(), 1);
    }

    #[test]
    fn miss_counts_as_orphan() {
        let reg = SessionRegistry::new();
        assert!(reg.get(&identity(1000)).is_none());
        assert_eq!(reg.stats().orphans, 1);
    }

    #[test]
    fn remove_returns_handle_once() {
        let reg = SessionRegistry::new();
        reg.insert(identity(1000), handle(0));
        assert!(reg.remove(&identity(1000)).is_some());
        assert!(reg.remove(&identity(1000)).is_none());
        assert_eq!(reg.stats().completed, 1);
    }

    #[test]
    fn insert_displaces_previous_session() {
        let reg = SessionRegistry::new();
        assert!(reg.insert(identity(1000), handle(0)).is_none());
        let old = reg.insert(identity(1000), handle(1)).unwrap();
        assert_eq!(old.id(), 0);
        assert_eq!(reg.active(), 1);
        assert_eq!(reg.stats().started, 2);
    }

    #[test]
    fn distinct_identities_are_independent() {
        let reg = SessionRegistry::new();
        reg.insert(identity(1000), handle(0));
        reg.insert(identity(1001), handle(1));
        assert_eq!(reg.active(), 2);
        reg.remove(&identity(1000));
        assert!(reg.get(&identity(1001)).is_some());
    }

    #[test]
    fn remove_if_respects_session_id() {
        let reg = SessionRegistry::new();
        reg.insert(identity(1000), handle(7));

        // Wrong id: the entry must survive.
        assert!(!reg.remove_if(&identity(1000), 3));
        assert_eq!(reg.active(), 1);

        // Matching id: removed, counted as expired.
        assert!(reg.remove_if(&identity(1000), 7));
        assert_eq!(reg.active(), 0);
        assert_eq!(reg.stats().expired, 1);
    }

    #[test]
    fn allocated_ids_are_unique() {
        let reg = SessionRegistry::new();
        let a = reg.allocate_id();
        let b = reg.allocate_id();
        assert_ne!(a, b);
    }
}
