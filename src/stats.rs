//! Run statistics.
//!
//! The [`StatCollector`] tracks what happened to requests and items over the
//! lifetime of a run: how many were enqueued, how many succeeded, failed,
//! were retried, or dropped. Counters are atomics so every worker updates
//! them without coordination. The scavenger logs a summary when a run ends;
//! [`Scavenger::stats`](crate::Scavenger::stats) exposes the collector for
//! programmatic access.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct StatCollector {
    pub requests_enqueued: AtomicUsize,
    pub requests_succeeded: AtomicUsize,
    pub requests_failed: AtomicUsize,
    pub requests_retried: AtomicUsize,
    pub requests_dropped: AtomicUsize,
    pub items_enqueued: AtomicUsize,
    pub items_processed: AtomicUsize,
    pub items_failed: AtomicUsize,
    pub items_retried: AtomicUsize,
}

macro_rules! increment {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(pub fn $name(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        })*
    };
}

impl StatCollector {
    pub fn new() -> Self {
        Self::default()
    }

    increment! {
        increment_requests_enqueued => requests_enqueued,
        increment_requests_succeeded => requests_succeeded,
        increment_requests_failed => requests_failed,
        increment_requests_retried => requests_retried,
        increment_requests_dropped => requests_dropped,
        increment_items_enqueued => items_enqueued,
        increment_items_processed => items_processed,
        increment_items_failed => items_failed,
        increment_items_retried => items_retried,
    }
}

impl fmt::Display for StatCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requests: enqueued: {}, ok: {}, fail: {}, retry: {}, drop: {}; \
             items: enqueued: {}, ok: {}, fail: {}, retry: {}",
            self.requests_enqueued.load(Ordering::Relaxed),
            self.requests_succeeded.load(Ordering::Relaxed),
            self.requests_failed.load(Ordering::Relaxed),
            self.requests_retried.load(Ordering::Relaxed),
            self.requests_dropped.load(Ordering::Relaxed),
            self.items_enqueued.load(Ordering::Relaxed),
            self.items_processed.load(Ordering::Relaxed),
            self.items_failed.load(Ordering::Relaxed),
            self.items_retried.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = StatCollector::new();
        stats.increment_requests_enqueued();
        stats.increment_requests_enqueued();
        stats.increment_requests_succeeded();

        assert_eq!(stats.requests_enqueued.load(Ordering::Relaxed), 2);
        assert_eq!(stats.requests_succeeded.load(Ordering::Relaxed), 1);
        assert!(stats.to_string().contains("enqueued: 2"));
    }
}
