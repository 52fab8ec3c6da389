//! SourceAdapter trait - manufacturer API abstraction
//!
//! One implementation per manufacturer, selected at startup from the
//! configured `source_type`. Adding a manufacturer touches nothing else.

use async_trait::async_trait;

use crate::{
    CanonicalReading, ContractError, Cursor, FetchBatch, FetchError, MalformedRecord, RawRecord,
    SourceConfig,
};

/// Uniform capability set over a manufacturer API
///
/// Adapters are stateless across calls except for the cursor they return.
/// The only side effect of `fetch` is the outbound request.
///
/// # Example
///
/// ```ignore
/// let batch = adapter.fetch(cursor.as_ref()).await?;
/// for record in &batch.records {
///     match adapter.transform(record) {
///         Ok(reading) => { /* validate, score, publish */ }
///         Err(malformed) => { /* quarantine */ }
///     }
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source configuration ID this adapter serves
    fn source_id(&self) -> &str;

    /// Manufacturer name written into `SourceMetadata`
    fn manufacturer(&self) -> &str;

    /// Fetch raw records newer than `cursor`
    ///
    /// # Errors
    /// `UpstreamUnavailable`, `UpstreamRateLimited` or `UpstreamAuthError`
    async fn fetch(&self, cursor: Option<&Cursor>) -> Result<FetchBatch, FetchError>;

    /// Map one raw record to the canonical shape
    ///
    /// Only `sensor_id`, `timestamp` and at least one measurement are
    /// mandatory; missing optional fields never fail the transform.
    fn transform(&self, record: &RawRecord) -> Result<CanonicalReading, MalformedRecord>;
}

/// Source of `SourceConfig` records
///
/// Polled by the scheduler on a bounded refresh interval.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Load the current set of source configurations
    async fn load_sources(&self) -> Result<Vec<SourceConfig>, ContractError>;
}
