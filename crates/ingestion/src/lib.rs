//! # Ingestion
//!
//! Upstream side of the pipeline.
//!
//! Responsibilities:
//! - Manufacturer adapters (`purpleair`, `clarity`) and synthetic/scripted mocks
//! - `AdapterRegistry`: configured `source_type` → adapter constructor
//! - `RateLimitedFetcher`: token bucket + timeout + in-cycle backoff per source
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{AdapterRegistry, FetcherConfig, RateLimitedFetcher};
//!
//! let registry = AdapterRegistry::with_defaults();
//! let adapter = registry.build(&source)?;
//! let fetcher = RateLimitedFetcher::new(adapter, FetcherConfig::for_source(&settings, &source));
//!
//! let outcome = fetcher.fetch(cursor.as_ref()).await;
//! if let Ok(batch) = outcome.result {
//!     for record in &batch.records {
//!         let reading = fetcher.adapter().transform(record);
//!     }
//! }
//! ```

mod adapters;
mod config;
mod error;
mod fetcher;
mod mock;
mod registry;
mod token_bucket;

// Re-exports
pub use adapters::{ClarityAdapter, PurpleAirAdapter};
pub use config::{FetchMetrics, FetchMetricsSnapshot, FetcherConfig};
pub use error::{IngestionError, Result};
pub use fetcher::{FetchOutcome, JitterFn, RateLimitedFetcher};
pub use mock::{MockReading, ScriptedAdapter, ScriptedCall, SyntheticAdapter, SyntheticConfig};
pub use registry::{resolve_credentials, AdapterConstructor, AdapterRegistry};
pub use token_bucket::TokenBucket;
