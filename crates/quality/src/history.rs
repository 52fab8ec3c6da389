//! Per-sensor history for rate-of-change scoring
//!
//! Keeps the latest accepted reading per sensor, bounded by sensor count.
//! When full, the sensor updated longest ago is forgotten.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use contracts::CanonicalReading;

/// The previous reading of a sensor
#[derive(Debug, Clone, PartialEq)]
pub struct PriorReading {
    pub timestamp: DateTime<Utc>,
    pub measurements: BTreeMap<String, f64>,
}

impl From<&CanonicalReading> for PriorReading {
    fn from(reading: &CanonicalReading) -> Self {
        Self {
            timestamp: reading.timestamp,
            measurements: reading.measurements.clone(),
        }
    }
}

#[derive(Debug)]
pub struct SensorHistory {
    capacity: usize,
    latest: HashMap<String, (PriorReading, u64)>,
    /// (sensor_id, seq) in update order; stale pairs are skipped lazily
    order: VecDeque<(String, u64)>,
    seq: u64,
}

impl SensorHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            latest: HashMap::new(),
            order: VecDeque::new(),
            seq: 0,
        }
    }

    pub fn prior(&self, sensor_id: &str) -> Option<&PriorReading> {
        self.latest.get(sensor_id).map(|(prior, _)| prior)
    }

    /// Remember `reading` unless an equal or newer one is already known
    pub fn record(&mut self, reading: &CanonicalReading) {
        if let Some((prior, _)) = self.latest.get(&reading.sensor_id) {
            if prior.timestamp >= reading.timestamp {
                return;
            }
        }

        self.seq += 1;
        self.latest
            .insert(reading.sensor_id.clone(), (PriorReading::from(reading), self.seq));
        self.order.push_back((reading.sensor_id.clone(), self.seq));

        while self.latest.len() > self.capacity {
            let Some((sensor_id, seq)) = self.order.pop_front() else {
                break;
            };
            if self.latest.get(&sensor_id).is_some_and(|(_, s)| *s == seq) {
                self.latest.remove(&sensor_id);
            }
        }
        // drop stale order entries so the queue stays proportional to the map
        if self.order.len() > self.capacity * 2 {
            let latest = &self.latest;
            self.order
                .retain(|(id, seq)| latest.get(id).is_some_and(|(_, s)| s == seq));
        }
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}
