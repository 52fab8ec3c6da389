//! Per-source ingestion status surface

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scheduler state of one source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    #[default]
    Idle,
    Fetching,
    Processing,
    Backoff,
    /// Auth failure; excluded from scheduling until its config changes
    Degraded,
    Stopped,
}

/// Status snapshot of one source, for external health reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub source_id: String,
    pub state: SourceState,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub readings_accepted: u64,
    pub readings_rejected: u64,
    pub malformed_records: u64,
    pub duplicates_suppressed: u64,
}

impl SourceStatus {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            ..Default::default()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.state == SourceState::Degraded
    }
}
