use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use import_stream::ByteBudget;
use tokio::sync::watch;

/// Default capacities (SPEC_FULL.md §4.7): high enough that, in the
/// common case, accounting is the only thing these semaphores do —
/// back-pressure only bites when a run's real working set exceeds them.
pub const DEFAULT_MEMORY_CAPACITY: u64 = 40 * 1024 * 1024 * 1024;
pub const DEFAULT_DISK_CAPACITY: u64 = 100 * 1024 * 1024 * 1024;

/// The pair of byte-budget semaphores the orchestrator charges every
/// in-flight item against, plus the in-flight counter itself. Bundled
/// together because every terminal notification touches all three at
/// once (SPEC_FULL.md §4.8's "single choke point").
#[derive(Clone)]
pub struct Budgets {
    pub memory: ByteBudget,
    pub disk: ByteBudget,
    in_flight: Arc<AtomicI64>,
    in_flight_tx: watch::Sender<i64>,
}

impl Budgets {
    pub fn new(memory_capacity: u64, disk_capacity: u64) -> Self {
        let (in_flight_tx, _rx) = watch::channel(0);
        Budgets {
            memory: ByteBudget::new(memory_capacity),
            disk: ByteBudget::new(disk_capacity),
            in_flight: Arc::new(AtomicI64::new(0)),
            in_flight_tx,
        }
    }

    /// Charges an item's declared `(mem, file)` bytes and counts it as
    /// in-flight. Must be paired with exactly one `complete` call.
    pub async fn acquire(&self, mem: u64, file: u64) {
        self.memory.acquire(mem).await;
        self.disk.acquire(file).await;
        let n = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.in_flight_tx.send(n);
    }

    /// Releases an item's charge at its terminal notification.
    pub async fn release(&self, mem: u64, file: u64) {
        self.memory.release(mem).await;
        self.disk.release(file).await;
        let n = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        let _ = self.in_flight_tx.send(n);
    }

    pub fn in_flight_count(&self) -> i64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<i64> {
        self.in_flight_tx.subscribe()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn acquire_release_restores_capacity_and_in_flight() {
        let budgets = Budgets::new(100, 100);
        budgets.acquire(10, 20).await;
        assert_eq!(budgets.in_flight_count(), 1);
        assert_eq!(budgets.memory.available().await, 90);
        assert_eq!(budgets.disk.available().await, 80);

        budgets.release(10, 20).await;
        assert_eq!(budgets.in_flight_count(), 0);
        assert_eq!(budgets.memory.available().await, 100);
        assert_eq!(budgets.disk.available().await, 100);
    }
}
