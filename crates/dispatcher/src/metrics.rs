//! Sink and publisher metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Batches written successfully
    write_count: AtomicU64,
    /// Readings written successfully
    readings_written: AtomicU64,
    /// Failed write attempts (including ones later retried)
    failure_count: AtomicU64,
    /// Retries scheduled
    retry_count: AtomicU64,
    /// Batches moved to the dead-letter log
    dead_lettered: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    pub fn record_write(&self, readings: usize) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.readings_written
            .fetch_add(readings as u64, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retry_count(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }

    pub fn inc_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            write_count: self.write_count(),
            readings_written: self.readings_written.load(Ordering::Relaxed),
            failure_count: self.failure_count(),
            retry_count: self.retry_count.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub write_count: u64,
    pub readings_written: u64,
    pub failure_count: u64,
    pub retry_count: u64,
    pub dead_lettered: u64,
}

/// Publisher intake / batching counters
#[derive(Debug, Default)]
pub struct PublisherMetrics {
    readings_received: AtomicU64,
    batches_sealed: AtomicU64,
    intake_timeouts: AtomicU64,
}

impl PublisherMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_received(&self) {
        self.readings_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sealed(&self) {
        self.batches_sealed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_intake_timeouts(&self) {
        self.intake_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PublisherSnapshot {
        PublisherSnapshot {
            readings_received: self.readings_received.load(Ordering::Relaxed),
            batches_sealed: self.batches_sealed.load(Ordering::Relaxed),
            intake_timeouts: self.intake_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherSnapshot {
    pub readings_received: u64,
    pub batches_sealed: u64,
    pub intake_timeouts: u64,
}
