//! The outstanding-work counter that decides when a run is finished.
//!
//! Every job enqueued adds one; every job fully handled (success, dropped,
//! or handed to a retry timer that later re-enqueues it) releases exactly
//! one. The run terminates when the count reaches zero, so a leak here shows
//! up as a hang and a double-release as a premature exit; keep the
//! add/done pairing obvious at every call site.

use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::Notify;
use tracing::error;

#[derive(Debug, Default)]
pub(crate) struct WorkTracker {
    count: AtomicI64,
    idle: Notify,
}

impl WorkTracker {
    pub(crate) fn add(&self, n: i64) {
        self.count.fetch_add(n, Ordering::SeqCst);
    }

    pub(crate) fn done(&self) {
        let previous = self.count.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 {
            self.idle.notify_waiters();
        } else if previous <= 0 {
            error!(count = previous - 1, "work tracker released below zero");
        }
    }

    pub(crate) fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Resolves once the count is zero. Zero at call time resolves
    /// immediately.
    pub(crate) async fn wait_idle(&self) {
        loop {
            if self.count() == 0 {
                return;
            }
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before re-checking so a release between the check and
            // the await is not missed.
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_idle_resolves_immediately_when_empty() {
        let tracker = WorkTracker::default();
        tokio::time::timeout(Duration::from_millis(100), tracker.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_idle_blocks_until_all_work_is_released() {
        let tracker = Arc::new(WorkTracker::default());
        tracker.add(2);

        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.wait_idle().await })
        };

        tracker.done();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        tracker.done();
        tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
