//! Coordination state shared by all source workers
//!
//! The dedup set, per-source cursors and per-sensor history sit behind a
//! single lock. Workers never hold it across an await.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use contracts::{CanonicalReading, Cursor, PipelineSettings};
use quality::{AnomalyScorer, DedupStats, Deduplicator, SensorHistory};

struct Shared {
    dedup: Deduplicator,
    cursors: HashMap<String, Cursor>,
    history: SensorHistory,
}

/// Readings that made it past scoring and dedup
#[derive(Debug, Default)]
pub struct Admitted {
    pub readings: Vec<CanonicalReading>,
    pub duplicates: u64,
}

pub struct CoordinationState {
    inner: Mutex<Shared>,
}

impl CoordinationState {
    pub fn new(dedup_ttl: Duration, max_entries: usize, history_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Shared {
                dedup: Deduplicator::new(dedup_ttl, max_entries),
                cursors: HashMap::new(),
                history: SensorHistory::new(history_capacity),
            }),
        }
    }

    pub fn from_settings(settings: &PipelineSettings, dedup_ttl: Duration, max_entries: usize) -> Self {
        Self::new(dedup_ttl, max_entries, settings.history_capacity)
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Resumption point for the next fetch
    pub fn cursor(&self, source_id: &str) -> Option<Cursor> {
        self.lock().cursors.get(source_id).cloned()
    }

    /// Record a completed cycle's cursor; `None` keeps the previous one
    pub fn advance_cursor(&self, source_id: &str, next: Option<Cursor>) {
        if let Some(next) = next {
            self.lock().cursors.insert(source_id.to_string(), next);
        }
    }

    /// Score against sensor history, then drop duplicates
    ///
    /// Readings are handled in the given order so per-sensor history
    /// follows fetch order.
    pub fn admit(
        &self,
        readings: Vec<CanonicalReading>,
        scorer: &AnomalyScorer,
        resolution: Duration,
        now: Instant,
    ) -> Admitted {
        let mut guard = self.lock();
        let Shared { dedup, history, .. } = &mut *guard;
        let mut admitted = Admitted::default();

        for reading in readings {
            let score = scorer.score(&reading, history.prior(&reading.sensor_id));
            let reading = reading.with_anomaly_score(score);

            // Suppressed duplicates never move the rate-of-change baseline.
            if dedup.should_publish(&reading, resolution, now) {
                history.record(&reading);
                admitted.readings.push(reading);
            } else {
                admitted.duplicates += 1;
            }
        }
        admitted
    }

    pub fn set_dedup_ttl(&self, ttl: Duration) {
        self.lock().dedup.set_ttl(ttl);
    }

    pub fn dedup_stats(&self) -> DedupStats {
        self.lock().dedup.stats()
    }
}
