//! Fetcher configuration and metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use contracts::{FetcherSettings, RetryPolicy, SourceConfig};

/// Per-source fetcher configuration
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout applied to every adapter call
    pub timeout: Duration,

    /// In-cycle retry policy
    pub retry: RetryPolicy,

    /// Concurrent fetches allowed per interval
    pub concurrency: u32,

    /// Polling interval the token bucket refills over
    pub interval: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            concurrency: 1,
            interval: Duration::from_secs(60),
        }
    }
}

impl FetcherConfig {
    /// Build from the global fetcher settings and one source
    pub fn for_source(settings: &FetcherSettings, source: &SourceConfig) -> Self {
        Self {
            timeout: settings.timeout(),
            retry: settings.retry.clone(),
            concurrency: source.concurrency.max(1),
            interval: source.interval(),
        }
    }

    /// Token bucket capacity
    ///
    /// Every in-cycle retry spends a token, so the bucket holds enough for a
    /// full retry sequence per concurrent fetch.
    pub fn bucket_capacity(&self) -> f64 {
        f64::from(self.concurrency) * f64::from(self.retry.max_attempts.max(1))
    }
}

/// Fetcher metrics
#[derive(Debug, Default)]
pub struct FetchMetrics {
    /// Adapter calls made (including retries)
    pub attempts: AtomicU64,

    /// Cycles that returned a batch
    pub successes: AtomicU64,

    /// Cycles that surfaced an error
    pub failures: AtomicU64,

    /// Raw records fetched
    pub records: AtomicU64,

    /// Calls that hit the timeout
    pub timeouts: AtomicU64,
}

impl FetchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, records: usize) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> FetchMetricsSnapshot {
        FetchMetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchMetricsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub records: u64,
    pub timeouts: u64,
}
