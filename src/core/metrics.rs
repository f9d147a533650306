//! Counters for dispatcher and queue health
//!
//! All counters are relaxed atomics: cheap to bump from any thread and good
//! enough for monitoring. `clone()` takes an independent snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Dispatcher-wide counters
///
/// ```
/// use rust_log_dispatch::DispatchMetrics;
///
/// let metrics = DispatchMetrics::new();
/// metrics.record_dispatched();
/// metrics.record_delivered();
///
/// assert_eq!(metrics.dispatched(), 1);
/// assert_eq!(metrics.failure_rate(), 0.0);
/// ```
#[derive(Debug)]
pub struct DispatchMetrics {
    /// Records that passed the global gate and were offered to bindings
    dispatched: AtomicU64,

    /// Records stopped by the global minimum level or a muted logger name
    suppressed: AtomicU64,

    /// Binding visits skipped by the binding minimum or its filter
    filtered: AtomicU64,

    /// Successful sink writes
    delivered: AtomicU64,

    filter_failures: AtomicU64,
    format_failures: AtomicU64,
    write_failures: AtomicU64,
    flush_failures: AtomicU64,
    close_failures: AtomicU64,
}

impl DispatchMetrics {
    pub const fn new() -> Self {
        Self {
            dispatched: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            filter_failures: AtomicU64::new(0),
            format_failures: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            flush_failures: AtomicU64::new(0),
            close_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn filter_failures(&self) -> u64 {
        self.filter_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn format_failures(&self) -> u64 {
        self.format_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn flush_failures(&self) -> u64 {
        self.flush_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn close_failures(&self) -> u64 {
        self.close_failures.load(Ordering::Relaxed)
    }

    /// Failures across every stage
    pub fn total_failures(&self) -> u64 {
        self.filter_failures()
            + self.format_failures()
            + self.write_failures()
            + self.flush_failures()
            + self.close_failures()
    }

    #[inline]
    pub fn record_dispatched(&self) -> u64 {
        self.dispatched.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_suppressed(&self) -> u64 {
        self.suppressed.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_filtered(&self) -> u64 {
        self.filtered.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_delivered(&self) -> u64 {
        self.delivered.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_filter_failure(&self) -> u64 {
        self.filter_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_format_failure(&self) -> u64 {
        self.format_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_write_failure(&self) -> u64 {
        self.write_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_flush_failure(&self) -> u64 {
        self.flush_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_close_failure(&self) -> u64 {
        self.close_failures.fetch_add(1, Ordering::Relaxed)
    }

    /// Share of per-binding attempts that failed, as a percentage (0.0 - 100.0)
    ///
    /// Returns 0.0 if nothing was attempted.
    pub fn failure_rate(&self) -> f64 {
        let failed = (self.filter_failures() + self.format_failures() + self.write_failures()) as f64;
        let total = self.delivered() as f64 + failed;
        if total == 0.0 {
            0.0
        } else {
            (failed / total) * 100.0
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.dispatched,
            &self.suppressed,
            &self.filtered,
            &self.delivered,
            &self.filter_failures,
            &self.format_failures,
            &self.write_failures,
            &self.flush_failures,
            &self.close_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for DispatchMetrics {
    fn clone(&self) -> Self {
        Self {
            dispatched: AtomicU64::new(self.dispatched()),
            suppressed: AtomicU64::new(self.suppressed()),
            filtered: AtomicU64::new(self.filtered()),
            delivered: AtomicU64::new(self.delivered()),
            filter_failures: AtomicU64::new(self.filter_failures()),
            format_failures: AtomicU64::new(self.format_failures()),
            write_failures: AtomicU64::new(self.write_failures()),
            flush_failures: AtomicU64::new(self.flush_failures()),
            close_failures: AtomicU64::new(self.close_failures()),
        }
    }
}

/// Counters for a queued sink
#[derive(Debug)]
pub struct QueueMetrics {
    /// Outputs handed to the wrapped sink successfully
    written: AtomicU64,

    /// Outputs lost to overflow (newest or evicted oldest)
    dropped: AtomicU64,

    /// Number of times the queue was found full
    queue_full_events: AtomicU64,

    /// Number of times a writer waited for queue space
    block_events: AtomicU64,

    /// Writes the wrapped sink rejected
    write_failures: AtomicU64,
}

impl QueueMetrics {
    pub const fn new() -> Self {
        Self {
            written: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            queue_full_events: AtomicU64::new(0),
            block_events: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn queue_full_events(&self) -> u64 {
        self.queue_full_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn block_events(&self) -> u64 {
        self.block_events.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn record_written(&self) -> u64 {
        self.written.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_queue_full(&self) -> u64 {
        self.queue_full_events.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_block(&self) -> u64 {
        self.block_events.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_write_failure(&self) -> u64 {
        self.write_failures.fetch_add(1, Ordering::Relaxed)
    }

    /// Get drop rate as a percentage (0.0 - 100.0)
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.dropped_count() as f64;
        let total = self.written() as f64 + dropped;
        if total == 0.0 {
            0.0
        } else {
            (dropped / total) * 100.0
        }
    }

    pub fn reset(&self) {
        self.written.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.queue_full_events.store(0, Ordering::Relaxed);
        self.block_events.store(0, Ordering::Relaxed);
        self.write_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for QueueMetrics {
    fn clone(&self) -> Self {
        Self {
            written: AtomicU64::new(self.written()),
            dropped: AtomicU64::new(self.dropped_count()),
            queue_full_events: AtomicU64::new(self.queue_full_events()),
            block_events: AtomicU64::new(self.block_events()),
            write_failures: AtomicU64::new(self.write_failures()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_metrics_record_returns_previous() {
        let metrics = DispatchMetrics::new();
        assert_eq!(metrics.record_dispatched(), 0);
        assert_eq!(metrics.record_dispatched(), 1);
        assert_eq!(metrics.dispatched(), 2);
    }

    #[test]
    fn test_failure_rate() {
        let metrics = DispatchMetrics::new();
        assert_eq!(metrics.failure_rate(), 0.0);

        for _ in 0..90 {
            metrics.record_delivered();
        }
        for _ in 0..5 {
            metrics.record_write_failure();
        }
        for _ in 0..5 {
            metrics.record_format_failure();
        }
        metrics.record_flush_failure();

        let rate = metrics.failure_rate();
        assert!((9.9..=10.1).contains(&rate), "Failure rate was {}", rate);
        assert_eq!(metrics.total_failures(), 11);
    }

    #[test]
    fn test_dispatch_snapshot_and_reset() {
        let metrics = DispatchMetrics::new();
        metrics.record_suppressed();
        metrics.record_filtered();

        let snapshot = metrics.clone();
        metrics.reset();

        assert_eq!(metrics.suppressed(), 0);
        assert_eq!(metrics.filtered(), 0);
        assert_eq!(snapshot.suppressed(), 1);
        assert_eq!(snapshot.filtered(), 1);
    }

    #[test]
    fn test_queue_drop_rate() {
        let metrics = QueueMetrics::new();
        assert_eq!(metrics.drop_rate(), 0.0);

        for _ in 0..100 {
            metrics.record_written();
        }
        for _ in 0..10 {
            metrics.record_dropped();
        }
        let rate = metrics.drop_rate();
        assert!(rate > 9.0 && rate < 10.0, "Drop rate was {}", rate);

        metrics.record_queue_full();
        let snapshot = metrics.clone();
        metrics.reset();
        assert_eq!(metrics.written(), 0);
        assert_eq!(snapshot.queue_full_events(), 1);
    }
}
