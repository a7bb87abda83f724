use std::sync::{Arc, Mutex};

use import_model::{ErrorKind, ImportItem, ImportNotification, Outcome};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::budgets::Budgets;

/// Running tallies over every notification a run has emitted so far.
/// `Orchestrator::statistics` reads a snapshot of this rather than
/// draining the notification channel itself — §4.10 gives the caller
/// sole ownership of the `UnboundedReceiver`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Statistics {
    pub items_completed: u64,
    pub items_extracted: u64,
    pub items_imported: u64,
    pub items_failed: u64,
    pub lines_imported: u64,
    pub bytes_extracted: u64,
}

/// The single choke point every terminal path for an item passes
/// through (SPEC_FULL.md §4.8): releases the item's byte charges,
/// decrements in-flight, and emits its `ImportNotification`, all three in
/// one place so Invariant 2 (§3 — one acquire, one release) is
/// structurally guaranteed rather than merely tested.
#[derive(Clone)]
pub struct NotificationSink {
    budgets: Budgets,
    tx: mpsc::UnboundedSender<ImportNotification>,
    stats: Arc<Mutex<Statistics>>,
}

impl NotificationSink {
    pub fn new(budgets: Budgets, tx: mpsc::UnboundedSender<ImportNotification>) -> Self {
        NotificationSink {
            budgets,
            tx,
            stats: Arc::new(Mutex::new(Statistics::default())),
        }
    }

    /// Completes `item` with `outcome`, using the byte charges already
    /// recorded on it (set when the item was charged in `send_request`).
    pub async fn complete(&self, item: &ImportItem, outcome: Outcome) {
        let (mem, file) = item.bytes_charged();
        self.budgets.release(mem, file).await;

        let notification = ImportNotification::from_item(item, outcome);
        trace!(
            name = %notification.name,
            full_name = %notification.full_name,
            success = notification.is_success(),
            "item reached terminal state"
        );

        {
            let mut stats = self.stats.lock().expect("stats mutex is never held across a panic");
            stats.items_completed += 1;
            stats.lines_imported += notification.lines_imported;
            stats.bytes_extracted += notification.bytes_extracted;
            match &notification.outcome {
                Outcome::Extracted => stats.items_extracted += 1,
                Outcome::Imported => stats.items_imported += 1,
                Outcome::Failed(_) => stats.items_failed += 1,
            }
        }

        if self.tx.send(notification).is_err() {
            warn!("notification receiver dropped; no one is listening for results");
        }
    }

    /// Convenience for the common failure path.
    pub async fn fail(&self, item: &ImportItem, kind: ErrorKind) {
        self.complete(item, Outcome::Failed(kind)).await;
    }

    pub fn statistics(&self) -> Statistics {
        *self.stats.lock().expect("stats mutex is never held across a panic")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use import_model::Format;

    #[tokio::test]
    async fn statistics_tally_across_outcomes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = NotificationSink::new(Budgets::new(1024, 1024), tx);

        let mut ok = ImportItem::new("a", "a", Format::Text);
        ok.mem_bytes_charged = 10;
        ok.lines_imported = 3;
        sink.complete(&ok, Outcome::Imported).await;

        let bad = ImportItem::new("b", "b", Format::Text);
        sink.fail(&bad, ErrorKind::InvalidData).await;

        let stats = sink.statistics();
        assert_eq!(stats.items_completed, 2);
        assert_eq!(stats.items_imported, 1);
        assert_eq!(stats.items_failed, 1);
        assert_eq!(stats.lines_imported, 3);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
    }
}
