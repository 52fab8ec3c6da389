//! Anomaly scorer
//!
//! Additive combination of an extreme-value signal and, when a prior
//! reading of the same sensor is known, a rate-of-change signal. The result
//! is clamped to [0, 1]. Scoring never rejects a reading.

use contracts::CanonicalReading;

use crate::history::PriorReading;
use crate::ranges::{RATE_THRESHOLDS, SOFT_THRESHOLDS};

/// Maximum contribution of the rate-of-change signal
const RATE_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyScorer;

impl AnomalyScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, reading: &CanonicalReading, prior: Option<&PriorReading>) -> f64 {
        let total = self.extreme_value(reading) + prior.map_or(0.0, |p| self.rate_of_change(reading, p));
        total.clamp(0.0, 1.0)
    }

    /// Sum of soft-threshold contributions
    pub fn extreme_value(&self, reading: &CanonicalReading) -> f64 {
        SOFT_THRESHOLDS
            .iter()
            .filter(|t| reading.measurement(t.key).is_some_and(|v| t.exceeded(v)))
            .map(|t| t.weight)
            .sum()
    }

    /// Largest per-pollutant rate contribution
    ///
    /// Zero when the prior is not strictly older than `reading`.
    pub fn rate_of_change(&self, reading: &CanonicalReading, prior: &PriorReading) -> f64 {
        let minutes = reading
            .timestamp
            .signed_duration_since(prior.timestamp)
            .num_milliseconds() as f64
            / 60_000.0;
        if minutes <= 0.0 {
            return 0.0;
        }

        RATE_THRESHOLDS
            .iter()
            .filter_map(|&(key, threshold)| {
                let current = reading.measurement(key)?;
                let previous = prior.measurements.get(key).copied()?;
                let rate = (current - previous).abs() / minutes;
                (rate > threshold)
                    .then(|| RATE_WEIGHT * ((rate - threshold) / threshold).min(1.0))
            })
            .fold(0.0, f64::max)
    }
}
