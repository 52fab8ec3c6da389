//! ReadingSink trait - Batch Publisher output interface
//!
//! Defines the batch unit and the abstract interface for sinks.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{CanonicalReading, ContractError};

/// A micro-batch of accepted, scored and deduplicated readings
///
/// Readings are shared read-only; cloning a batch only bumps refcounts.
#[derive(Debug, Clone)]
pub struct ReadingBatch {
    /// Monotonic batch sequence number
    pub batch_id: u64,

    /// When the batch was sealed
    pub sealed_at: DateTime<Utc>,

    /// Readings in arrival order
    pub readings: Vec<Arc<CanonicalReading>>,
}

impl ReadingBatch {
    pub fn new(batch_id: u64, readings: Vec<Arc<CanonicalReading>>) -> Self {
        Self {
            batch_id,
            sealed_at: Utc::now(),
            readings,
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Split readings by originating source, keeping arrival order
    pub fn by_source(&self) -> BTreeMap<String, Vec<Arc<CanonicalReading>>> {
        let mut groups: BTreeMap<String, Vec<Arc<CanonicalReading>>> = BTreeMap::new();
        for reading in &self.readings {
            groups
                .entry(reading.source_id().to_string())
                .or_default()
                .push(Arc::clone(reading));
        }
        groups
    }
}

/// Batch output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(ReadingSink: Send)]
pub trait LocalReadingSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one batch
    ///
    /// # Errors
    /// Returns write error (should include context). The caller retries
    /// the whole batch, so implementations must tolerate replays.
    async fn write_batch(&mut self, batch: &ReadingBatch) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
