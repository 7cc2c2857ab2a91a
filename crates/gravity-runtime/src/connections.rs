//! Live connection tracking.
//!
//! The set is consulted by the idle watchdog only. Entries are added on
//! accept and removed when the returned [`ConnectionGuard`] drops, which
//! happens on orderly close, read faults, and session panics alike.
//!
//! A session only notices a disconnect when it next reads, so a client that
//! leaves mid-request stays counted until the handler for that request
//! returns.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifier assigned to each accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Set of currently open client connections.
#[derive(Debug, Default)]
pub struct ConnectionSet {
    next_id: AtomicU64,
    live: Mutex<HashSet<ConnectionId>>,
}

impl ConnectionSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly accepted connection.
    ///
    /// The connection stays in the set until the guard is dropped.
    #[must_use = "dropping the guard removes the connection immediately"]
    pub fn on_accept(self: &Arc<Self>) -> ConnectionGuard {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.lock().insert(id);
        ConnectionGuard {
            set: Arc::clone(self),
            id,
        }
    }

    /// Removes a connection. Removing an absent id is a no-op.
    ///
    /// Returns true when the connection was present.
    pub fn on_close(&self, id: ConnectionId) -> bool {
        self.lock().remove(&id)
    }

    /// Number of open connections at the time of the call.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<ConnectionId>> {
        // The set stays consistent even if a holder panicked mid-call.
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Membership token for one open connection.
#[derive(Debug)]
pub struct ConnectionGuard {
    set: Arc<ConnectionSet>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Identifier of the guarded connection.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.set.on_close(self.id);
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn set() -> Arc<ConnectionSet> {
        Arc::new(ConnectionSet::new())
    }

    #[rstest]
    fn accept_and_drop_track_membership(set: Arc<ConnectionSet>) {
        let first = set.on_accept();
        let second = set.on_accept();
        assert_eq!(set.open_count(), 2);
        assert_ne!(first.id(), second.id());

        drop(first);
        assert_eq!(set.open_count(), 1);
        drop(second);
        assert_eq!(set.open_count(), 0);
    }

    #[rstest]
    fn closing_is_idempotent(set: Arc<ConnectionSet>) {
        let guard = set.on_accept();
        let id = guard.id();
        assert!(set.on_close(id));
        assert!(!set.on_close(id));
        drop(guard);
        assert_eq!(set.open_count(), 0);
    }

    #[rstest]
    fn ids_render_with_prefix(set: Arc<ConnectionSet>) {
        let guard = set.on_accept();
        assert!(guard.id().to_string().starts_with("conn-"));
    }
}
