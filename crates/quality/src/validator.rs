//! Reading validator
//!
//! Pure function of `(reading, now)`. Every check runs and every failure
//! is collected; a reading is accepted iff no issue was found.

use std::time::Duration;

use chrono::{DateTime, Utc};
use contracts::{CanonicalReading, PipelineSettings};

use crate::ranges::{display_name, hard_range};

/// Validation outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Issues in check order
    pub issues: Vec<String>,
}

impl ValidationReport {
    pub fn accepted(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    staleness: chrono::Duration,
    max_clock_skew: chrono::Duration,
    staleness_secs: u64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600), Duration::from_secs(60))
    }
}

impl Validator {
    pub fn new(staleness: Duration, max_clock_skew: Duration) -> Self {
        Self {
            staleness: chrono::Duration::from_std(staleness).unwrap_or(chrono::Duration::MAX),
            max_clock_skew: chrono::Duration::from_std(max_clock_skew)
                .unwrap_or(chrono::Duration::zero()),
            staleness_secs: staleness.as_secs(),
        }
    }

    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self::new(settings.staleness(), settings.max_clock_skew())
    }

    /// Run all checks against `reading` as of `now`
    pub fn check(&self, reading: &CanonicalReading, now: DateTime<Utc>) -> ValidationReport {
        let mut issues = Vec::new();
        self.check_required(reading, &mut issues);
        self.check_location(reading, &mut issues);
        self.check_timestamp(reading, now, &mut issues);
        self.check_measurements(reading, &mut issues);
        ValidationReport { issues }
    }

    /// Check and stamp the result into `quality_flags`
    pub fn validate(
        &self,
        reading: CanonicalReading,
        now: DateTime<Utc>,
    ) -> (CanonicalReading, ValidationReport) {
        let report = self.check(&reading, now);
        let reading = reading.with_validation(report.issues.clone());
        (reading, report)
    }

    fn check_required(&self, reading: &CanonicalReading, issues: &mut Vec<String>) {
        if reading.sensor_id.trim().is_empty() {
            issues.push(missing("sensorId"));
        }
        if reading.location.lat.is_none() {
            issues.push(missing("location.lat"));
        }
        if reading.location.lon.is_none() {
            issues.push(missing("location.lon"));
        }
        if reading.measurements.is_empty() {
            issues.push(missing("measurements"));
        }
    }

    fn check_location(&self, reading: &CanonicalReading, issues: &mut Vec<String>) {
        if let Some(lat) = reading.location.lat {
            if !(-90.0..=90.0).contains(&lat) {
                issues.push(format!("Latitude {lat} out of range [-90, 90]"));
            }
        }
        if let Some(lon) = reading.location.lon {
            if !(-180.0..=180.0).contains(&lon) {
                issues.push(format!("Longitude {lon} out of range [-180, 180]"));
            }
        }
    }

    fn check_timestamp(
        &self,
        reading: &CanonicalReading,
        now: DateTime<Utc>,
        issues: &mut Vec<String>,
    ) {
        let age = now.signed_duration_since(reading.timestamp);
        if -age > self.max_clock_skew {
            issues.push("Timestamp cannot be in the future".to_string());
        } else if age > self.staleness {
            issues.push(format!(
                "Timestamp older than staleness window ({}s)",
                self.staleness_secs
            ));
        }
    }

    fn check_measurements(&self, reading: &CanonicalReading, issues: &mut Vec<String>) {
        for (key, &value) in &reading.measurements {
            if !value.is_finite() {
                issues.push(format!("{} value is not a finite number", display_name(key)));
                continue;
            }
            if let Some(range) = hard_range(key) {
                if !range.contains(value) {
                    issues.push(format!(
                        "{} value {} out of range [{}, {}]",
                        range.display, value, range.min, range.max
                    ));
                }
            }
        }
    }
}

fn missing(field: &str) -> String {
    format!("Missing required field: {field}")
}
