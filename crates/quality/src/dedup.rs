//! Deduplicator
//!
//! TTL-bounded key set over `(sensor_id, timestamp bucket)`. Eviction is by
//! age; a hard entry ceiling evicts the oldest keys early and counts it.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use contracts::CanonicalReading;
use tracing::warn;

/// `(sensor_id, timestamp truncated to the reporting resolution)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub sensor_id: String,
    /// Timestamp in whole resolution units since the epoch
    pub bucket: i64,
}

impl DedupKey {
    pub fn new(reading: &CanonicalReading, resolution: Duration) -> Self {
        let resolution = resolution.as_secs().max(1) as i64;
        Self {
            sensor_id: reading.sensor_id.clone(),
            bucket: reading.timestamp.timestamp().div_euclid(resolution),
        }
    }
}

/// Dedup counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub entries: usize,
    pub suppressed: u64,
    pub expired: u64,
    pub evicted_early: u64,
}

#[derive(Debug)]
pub struct Deduplicator {
    ttl: Duration,
    max_entries: usize,
    /// key -> first-seen instant
    seen: HashMap<DedupKey, Instant>,
    /// insertion order; entries whose instant no longer matches `seen` are stale
    order: VecDeque<(DedupKey, Instant)>,
    stats: DedupStats,
}

impl Deduplicator {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            seen: HashMap::new(),
            order: VecDeque::new(),
            stats: DedupStats::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Change the TTL (config refresh); existing keys keep their first-seen time
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    /// First sighting of the key within the TTL window
    ///
    /// Inserts the key and returns true; later sightings within the window
    /// return false. The window is not extended by duplicates.
    pub fn should_publish(&mut self, reading: &CanonicalReading, resolution: Duration, now: Instant) -> bool {
        self.evict_expired(now);

        let key = DedupKey::new(reading, resolution);
        if self.seen.contains_key(&key) {
            self.stats.suppressed += 1;
            return false;
        }

        while self.seen.len() >= self.max_entries {
            if !self.evict_oldest() {
                break;
            }
            self.stats.evicted_early += 1;
            metrics::counter!("airq_ingest_dedup_evicted_early_total").increment(1);
        }

        self.seen.insert(key.clone(), now);
        self.order.push_back((key, now));
        self.stats.entries = self.seen.len();
        true
    }

    /// Drop keys older than the TTL, returns how many were dropped
    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        while let Some((_, inserted)) = self.order.front() {
            if now.saturating_duration_since(*inserted) < self.ttl {
                break;
            }
            if let Some((key, inserted)) = self.order.pop_front() {
                if self.seen.get(&key) == Some(&inserted) {
                    self.seen.remove(&key);
                    expired += 1;
                }
            }
        }
        self.stats.expired += expired as u64;
        self.stats.entries = self.seen.len();
        expired
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((key, inserted)) = self.order.pop_front() {
            if self.seen.get(&key) == Some(&inserted) {
                self.seen.remove(&key);
                if self.stats.evicted_early == 0 {
                    warn!(
                        max_entries = self.max_entries,
                        "dedup set full, evicting oldest keys early; duplicates may slip through"
                    );
                }
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }
}
