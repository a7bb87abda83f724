use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

/// A counting semaphore whose unit is bytes, not permits (SPEC_FULL.md
/// §4.7). `tokio::sync::Semaphore` counts `u32` permits one at a time;
/// charging memory and disk-spill bytes per in-flight item needs a
/// `u64`-sized counter where a single `acquire` can ask for an arbitrary
/// quantity, so this is hand-rolled on the same primitive
/// `tokio::sync::Semaphore` itself is built from: an atomic counter
/// guarded by a `Mutex`, with a `Notify` broadcasting every release so
/// that every blocked waiter gets a chance to recheck.
#[derive(Clone)]
pub struct ByteBudget {
    inner: Arc<Inner>,
}

struct Inner {
    capacity: u64,
    available: Mutex<u64>,
    notify: Notify,
}

impl ByteBudget {
    pub fn new(capacity: u64) -> Self {
        ByteBudget {
            inner: Arc::new(Inner {
                capacity,
                available: Mutex::new(capacity),
                notify: Notify::new(),
            }),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.inner.capacity
    }

    /// Current available bytes. Used by tests asserting the conservation
    /// invariant (§5): at quiescence this must equal `capacity()`.
    pub async fn available(&self) -> u64 {
        *self.inner.available.lock().await
    }

    /// Blocks until at least `n` bytes are available, then subtracts
    /// them. A request larger than `capacity()` blocks forever by
    /// design — callers are expected to size per-item charges well
    /// under the configured capacity (SPEC_FULL.md's defaults exist
    /// precisely so this never happens in practice).
    pub async fn acquire(&self, n: u64) {
        if n == 0 {
            return;
        }
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut avail = self.inner.available.lock().await;
                if *avail >= n {
                    *avail -= n;
                    return;
                }
            }
            notified.await;
        }
    }

    pub async fn release(&self, n: u64) {
        if n == 0 {
            return;
        }
        {
            let mut avail = self.inner.available.lock().await;
            *avail += n;
        }
        self.inner.notify.notify_waiters();
    }
}
