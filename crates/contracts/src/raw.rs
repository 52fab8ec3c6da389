//! Raw upstream records and fetch cursors

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque per-source resumption state
///
/// Adapters decide what goes in here ("since" timestamp, page token, ...);
/// the scheduler only stores it and hands it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One untyped record as returned by a manufacturer API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Source config that fetched it
    pub source_id: String,

    /// When the fetch completed
    pub fetched_at: DateTime<Utc>,

    /// Upstream payload, kept verbatim for quarantine
    pub payload: serde_json::Value,
}

impl RawRecord {
    pub fn new(source_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            source_id: source_id.into(),
            fetched_at: Utc::now(),
            payload,
        }
    }
}

/// Result of one successful fetch
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    /// Records in upstream order
    pub records: Vec<RawRecord>,

    /// Cursor for the next fetch; `None` keeps the current one
    pub next_cursor: Option<Cursor>,
}

impl FetchBatch {
    pub fn new(records: Vec<RawRecord>, next_cursor: Option<Cursor>) -> Self {
        Self {
            records,
            next_cursor,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
