//! Active-session table.
//!
//! The registry is the only state visible to more than one task: the
//! listener inserts an entry when it creates a session, the session's own
//! dispatcher removes it on exit, and the server drains the table during
//! shutdown to enforce the grace period.  Everything else a session owns
//! (socket, counters, state) stays inside its dispatcher task.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use tokio::task::JoinHandle;

/// Map of client address → dispatcher task handle.
///
/// At most one entry per client address, enforced by the listener checking
/// [`contains`] before spawning (the listener is the only inserter, so the
/// check-then-insert is race-free).
///
/// [`contains`]: SessionRegistry::contains
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: Mutex<HashMap<SocketAddr, JoinHandle<()>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when a live session exists for `peer`.
    pub fn contains(&self, peer: SocketAddr) -> bool {
        self.lock().contains_key(&peer)
    }

    /// Record a newly spawned dispatcher for `peer`.
    pub fn insert(&self, peer: SocketAddr, handle: JoinHandle<()>) {
        self.lock().insert(peer, handle);
    }

    /// Remove the entry for `peer`, returning its handle if present.
    ///
    /// Called by the dispatcher itself on every exit path; removing an
    /// already-removed entry (shutdown race) is a no-op.
    pub fn remove(&self, peer: SocketAddr) -> Option<JoinHandle<()>> {
        self.lock().remove(&peer)
    }

    /// Take every entry out of the table (shutdown).
    pub fn drain(&self) -> Vec<(SocketAddr, JoinHandle<()>)> {
        self.lock().drain().collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SocketAddr, JoinHandle<()>>> {
        // A poisoned lock only means another task panicked mid-update; the
        // map itself is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
