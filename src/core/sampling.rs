//! Volume-reducing filters for high-throughput loggers
//!
//! [`SamplingFilter`] passes a random fraction of records while letting
//! important levels through untouched. [`RateLimitFilter`] caps the number of
//! records per time window.
//!
//! # Example
//!
//! ```
//! use rust_log_dispatch::prelude::*;
//!
//! // Keep 10% of chatter, every warning and above
//! let sampler = SamplingFilter::new(0.1).with_always_sample(Level::WARNING);
//! assert_eq!(sampler.rate(), 0.1);
//! ```

use super::error::Result;
use super::filter::Filter;
use super::level::Level;
use super::record::Record;
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters describing what a volume filter let through
#[derive(Debug)]
pub struct SamplerMetrics {
    sampled_count: AtomicU64,
    dropped_count: AtomicU64,
    total_count: AtomicU64,
}

impl SamplerMetrics {
    pub const fn new() -> Self {
        Self {
            sampled_count: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
            total_count: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn sampled_count(&self) -> u64 {
        self.sampled_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total_count(&self) -> u64 {
        self.total_count.load(Ordering::Relaxed)
    }

    #[inline]
    fn record(&self, passed: bool) -> bool {
        if passed {
            self.sampled_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped_count.fetch_add(1, Ordering::Relaxed);
        }
        self.total_count.fetch_add(1, Ordering::Relaxed);
        passed
    }

    /// Observed pass ratio; 1.0 before anything was seen
    pub fn effective_sample_rate(&self) -> f64 {
        let total = self.total_count();
        if total == 0 {
            1.0
        } else {
            self.sampled_count() as f64 / total as f64
        }
    }

    pub fn reset(&self) {
        self.sampled_count.store(0, Ordering::Relaxed);
        self.dropped_count.store(0, Ordering::Relaxed);
        self.total_count.store(0, Ordering::Relaxed);
    }
}

impl Default for SamplerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SamplerMetrics {
    fn clone(&self) -> Self {
        Self {
            sampled_count: AtomicU64::new(self.sampled_count()),
            dropped_count: AtomicU64::new(self.dropped_count()),
            total_count: AtomicU64::new(self.total_count()),
        }
    }
}

/// Random sampling filter.
///
/// Records at or above the `always_sample` level always pass. Everything else
/// passes with probability `rate`.
#[derive(Debug)]
pub struct SamplingFilter {
    rate: f64,
    always_sample: Option<Level>,
    metrics: SamplerMetrics,
}

impl SamplingFilter {
    /// `rate` is clamped to `0.0..=1.0`
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
            always_sample: Some(Level::ERROR),
            metrics: SamplerMetrics::new(),
        }
    }

    /// Let every record at or above `level` through regardless of the rate
    #[must_use]
    pub fn with_always_sample(mut self, level: Level) -> Self {
        self.always_sample = Some(level);
        self
    }

    /// Sample every level, including errors
    #[must_use]
    pub fn without_bypass(mut self) -> Self {
        self.always_sample = None;
        self
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn metrics(&self) -> &SamplerMetrics {
        &self.metrics
    }
}

impl Filter for SamplingFilter {
    fn evaluate(&self, record: &Record) -> Result<bool> {
        if self.always_sample.is_some_and(|floor| record.level() >= floor) {
            return Ok(self.metrics.record(true));
        }

        let passed = if self.rate >= 1.0 {
            true
        } else if self.rate <= 0.0 {
            false
        } else {
            rand::thread_rng().gen::<f64>() < self.rate
        };
        Ok(self.metrics.record(passed))
    }

    fn name(&self) -> &str {
        "sample"
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Passes at most `max_records` per `window`; the rest are dropped until the
/// window rolls over.
#[derive(Debug)]
pub struct RateLimitFilter {
    max_records: u32,
    window: Duration,
    state: Mutex<Window>,
    metrics: SamplerMetrics,
}

impl RateLimitFilter {
    pub fn new(max_records: u32, window: Duration) -> Self {
        Self {
            max_records,
            window,
            state: Mutex::new(Window {
                started: Instant::now(),
                count: 0,
            }),
            metrics: SamplerMetrics::new(),
        }
    }

    pub fn per_second(max_records: u32) -> Self {
        Self::new(max_records, Duration::from_secs(1))
    }

    pub fn metrics(&self) -> &SamplerMetrics {
        &self.metrics
    }
}

impl Filter for RateLimitFilter {
    fn evaluate(&self, _record: &Record) -> Result<bool> {
        let mut state = self.state.lock();
        let now = Instant::now();
        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.count = 0;
        }
        let passed = state.count < self.max_records;
        if passed {
            state.count += 1;
        }
        Ok(self.metrics.record(passed))
    }

    fn name(&self) -> &str {
        "rate_limit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(level: Level) -> Record {
        Record::new(level, "test", "msg")
    }

    #[test]
    fn test_rate_is_clamped() {
        assert_eq!(SamplingFilter::new(1.5).rate(), 1.0);
        assert_eq!(SamplingFilter::new(-0.5).rate(), 0.0);
    }

    #[test]
    fn test_always_sample_bypass() {
        let sampler = SamplingFilter::new(0.0);

        assert!(sampler.evaluate(&record(Level::ERROR)).unwrap());
        assert!(sampler.evaluate(&record(Level::CRITICAL)).unwrap());
        for _ in 0..10 {
            assert!(!sampler.evaluate(&record(Level::DEBUG)).unwrap());
            assert!(!sampler.evaluate(&record(Level::INFO)).unwrap());
        }

        let strict = SamplingFilter::new(0.0).without_bypass();
        assert!(!strict.evaluate(&record(Level::CRITICAL)).unwrap());
    }

    #[test]
    fn test_full_rate_passes_everything() {
        let sampler = SamplingFilter::new(1.0);
        for _ in 0..100 {
            assert!(sampler.evaluate(&record(Level::TRACE)).unwrap());
        }
        assert_eq!(sampler.metrics().effective_sample_rate(), 1.0);
    }

    #[test]
    fn test_statistical_rate() {
        let sampler = SamplingFilter::new(0.5);
        let total = 10_000;
        let passed = (0..total)
            .filter(|_| sampler.evaluate(&record(Level::INFO)).unwrap())
            .count();

        let rate = passed as f64 / total as f64;
        assert!(
            (0.45..=0.55).contains(&rate),
            "Expected ~50% sample rate, got {}%",
            rate * 100.0
        );
        assert_eq!(sampler.metrics().total_count(), total as u64);
        assert_eq!(
            sampler.metrics().sampled_count() + sampler.metrics().dropped_count(),
            total as u64
        );
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = SamplerMetrics::new();
        metrics.record(true);
        metrics.record(true);
        metrics.record(false);
        assert!((metrics.effective_sample_rate() - 0.666).abs() < 0.01);

        let snapshot = metrics.clone();
        metrics.reset();
        assert_eq!(metrics.total_count(), 0);
        assert_eq!(snapshot.total_count(), 3);
    }

    #[test]
    fn test_rate_limit_window() {
        let limiter = RateLimitFilter::new(3, Duration::from_millis(50));
        let passed = (0..10)
            .filter(|_| limiter.evaluate(&record(Level::INFO)).unwrap())
            .count();
        assert_eq!(passed, 3);
        assert_eq!(limiter.metrics().dropped_count(), 7);

        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.evaluate(&record(Level::INFO)).unwrap());
    }
}
