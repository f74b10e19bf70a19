//! Bookkeeping of live connections, used to drain on shutdown.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Shared set of active connections.
///
/// Cloning is cheap; all clones see the same set.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    active: Mutex<HashMap<u64, SocketAddr>>,
    next_id: AtomicU64,
    idle: Notify,
}

/// Keeps a connection registered until dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: u64,
    registry: ConnectionRegistry,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn active(&self) -> MutexGuard<'_, HashMap<u64, SocketAddr>> {
        self.inner
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, peer: SocketAddr) -> ConnectionGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.active().insert(id, peer);

        ConnectionGuard {
            id,
            registry: self.clone(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active().len()
    }

    pub fn peers(&self) -> Vec<SocketAddr> {
        self.active().values().copied().collect()
    }

    fn remove(&self, id: u64) {
        let mut active = self.active();
        active.remove(&id);
        if active.is_empty() {
            self.inner.idle.notify_waiters();
        }
    }

    /// Resolves once no connection is registered.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.inner.idle.notified();
            if self.active_count() == 0 {
                return;
            }
            idle.await;
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
