//! Per-hostname serialization
//!
//! kube-runtime never reconciles one object twice at the same time, but two
//! Services may carry the same hostname annotation and so address the same
//! remote resources. Reconciliations take the hostname's lock first.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async mutex, one entry per hostname with a holder or waiter
#[derive(Clone, Default)]
pub struct HostLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Held while a hostname is being reconciled; released on drop
pub struct HostGuard {
    host: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl HostLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `host`
    pub async fn lock(&self, host: &str) -> HostGuard {
        let mutex = self.locks.entry(host.to_string()).or_default().clone();
        let guard = mutex.lock_owned().await;
        HostGuard {
            host: host.to_string(),
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Number of hostnames currently locked or waited on
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True when no hostname is locked
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for HostGuard {
    fn drop(&mut self) {
        // Release first so the count below only sees the table and waiters
        drop(self.guard.take());
        self.locks
            .remove_if(&self.host, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
