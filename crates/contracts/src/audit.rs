//! Quarantine and dead-letter records
//!
//! Both are append-only audit trails kept for manual inspection / replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CanonicalReading;

/// Why a record left the pipeline before publishing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuarantineKind {
    /// `transform` failed
    Malformed,
    /// Validation collected at least one issue
    Rejected,
}

/// A rejected or malformed record kept for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub source_id: String,
    /// Present when the transform got far enough to know it
    pub sensor_id: Option<String>,
    pub kind: QuarantineKind,
    /// Every reason collected, in check order
    pub reasons: Vec<String>,
    /// Upstream payload as fetched
    pub raw_payload: serde_json::Value,
    pub quarantined_at: DateTime<Utc>,
}

/// A batch (or one sink's share of it) that exhausted its retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub batch_id: u64,
    pub source_id: String,
    pub sink: String,
    pub reason: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
    pub readings: Vec<CanonicalReading>,
}
