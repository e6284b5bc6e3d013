//! Port access arbitration between discovery and provisioning
//!
//! Discovery takes a cycle permit before touching any port; provisioning
//! suspends discovery and then waits for the running cycle to drain. Only one
//! side ever holds the ports.

use std::sync::Arc;

use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{debug, info};

/// Shared suspend flag plus the port access lock
#[derive(Debug, Clone)]
pub struct PortArbiter {
    suspended: Arc<watch::Sender<bool>>,
    access: Arc<Mutex<()>>,
}

/// Permit for one discovery cycle
#[derive(Debug)]
pub struct CyclePermit {
    _guard: OwnedMutexGuard<()>,
}

/// Exclusive port access for a provisioning run
///
/// Dropping the guard releases the ports and resumes discovery.
#[derive(Debug)]
pub struct ExclusiveAccess {
    suspended: Arc<watch::Sender<bool>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for ExclusiveAccess {
    fn drop(&mut self) {
        self.suspended.send_replace(false);
        info!("Discovery resumed");
    }
}

impl PortArbiter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            suspended: Arc::new(tx),
            access: Arc::new(Mutex::new(())),
        }
    }

    /// Whether discovery is currently suspended
    pub fn is_suspended(&self) -> bool {
        *self.suspended.borrow()
    }

    /// Take a cycle permit, or `None` while suspended
    pub async fn try_begin_cycle(&self) -> Option<CyclePermit> {
        if self.is_suspended() {
            return None;
        }
        let guard = Arc::clone(&self.access).lock_owned().await;
        // A run may have started while we waited for the lock
        if self.is_suspended() {
            return None;
        }
        Some(CyclePermit { _guard: guard })
    }

    /// Wait until discovery is no longer suspended
    pub async fn wait_resumed(&self) {
        let mut rx = self.suspended.subscribe();
        // The sender lives in self, so this only fails if it is dropped
        let _ = rx.wait_for(|suspended| !*suspended).await;
    }

    /// Wait until discovery is suspended
    pub async fn wait_suspended(&self) {
        let mut rx = self.suspended.subscribe();
        let _ = rx.wait_for(|suspended| *suspended).await;
    }

    /// Suspend discovery and wait for exclusive port access
    pub async fn suspend(&self) -> ExclusiveAccess {
        self.suspended.send_replace(true);
        info!("Discovery suspended");
        let guard = Arc::clone(&self.access).lock_owned().await;
        debug!("Exclusive port access acquired");
        ExclusiveAccess {
            suspended: Arc::clone(&self.suspended),
            _guard: guard,
        }
    }
}

impl Default for PortArbiter {
    fn default() -> Self {
        Self::new()
    }
}
