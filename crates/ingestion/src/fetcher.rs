//! Rate-limited fetcher
//!
//! Wraps one adapter with a token bucket, a per-call timeout and in-cycle
//! exponential backoff. Each source owns its own fetcher, so nothing here
//! can hold up another source.

use std::sync::Arc;
use std::time::Duration;

use contracts::{Cursor, FetchBatch, FetchError, SourceAdapter};
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::config::{FetchMetrics, FetchMetricsSnapshot, FetcherConfig};
use crate::token_bucket::TokenBucket;

/// Jitter source returning a sample in [0, 1)
pub type JitterFn = fn() -> f64;

fn random_jitter() -> f64 {
    rand::random::<f64>()
}

/// Result of one fetch cycle
#[derive(Debug)]
pub struct FetchOutcome {
    pub result: Result<FetchBatch, FetchError>,

    /// Adapter calls made in this cycle
    pub attempts: u32,

    /// Delays slept between attempts
    pub retry_delays: Vec<Duration>,
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct RateLimitedFetcher {
    adapter: Arc<dyn SourceAdapter>,
    config: FetcherConfig,
    bucket: TokenBucket,
    metrics: Arc<FetchMetrics>,
    jitter: JitterFn,
}

impl RateLimitedFetcher {
    pub fn new(adapter: Arc<dyn SourceAdapter>, config: FetcherConfig) -> Self {
        let bucket = TokenBucket::new(config.bucket_capacity(), config.interval);
        Self {
            adapter,
            config,
            bucket,
            metrics: Arc::new(FetchMetrics::new()),
            jitter: random_jitter,
        }
    }

    /// Replace the jitter source (deterministic delays in tests)
    pub fn with_jitter(mut self, jitter: JitterFn) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn adapter(&self) -> &Arc<dyn SourceAdapter> {
        &self.adapter
    }

    pub fn source_id(&self) -> &str {
        self.adapter.source_id()
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    pub fn metrics(&self) -> FetchMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Fetch with rate limiting, timeout and retries
    ///
    /// `UpstreamAuthError` is returned after the first attempt. Other errors
    /// are retried up to `max_attempts` and then surfaced for this cycle.
    #[instrument(
        name = "fetch_cycle",
        skip(self, cursor),
        fields(source_id = %self.adapter.source_id())
    )]
    pub async fn fetch(&self, cursor: Option<&Cursor>) -> FetchOutcome {
        let source_id = self.adapter.source_id().to_string();
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut retry_delays = Vec::new();
        let mut attempts = 0;

        loop {
            let result = self.attempt(cursor).await;
            attempts += 1;

            let err = match result {
                Ok(batch) => {
                    self.metrics.record_success(batch.len());
                    metrics::counter!("airq_ingest_fetch_records_total", "source_id" => source_id.clone())
                        .increment(batch.len() as u64);
                    debug!(attempts, records = batch.len(), "fetch succeeded");
                    return FetchOutcome {
                        result: Ok(batch),
                        attempts,
                        retry_delays,
                    };
                }
                Err(err) => err,
            };

            metrics::counter!(
                "airq_ingest_fetch_errors_total",
                "source_id" => source_id.clone(),
                "kind" => err.kind()
            )
            .increment(1);

            if !err.is_retryable() || attempts >= max_attempts {
                self.metrics.record_failure();
                warn!(attempts, error = %err, "fetch failed");
                return FetchOutcome {
                    result: Err(err),
                    attempts,
                    retry_delays,
                };
            }

            let delay = self.retry_delay(attempts - 1, &err);
            debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, error = %err, "retrying fetch");
            retry_delays.push(delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// One rate-limited, time-bounded adapter call
    async fn attempt(&self, cursor: Option<&Cursor>) -> Result<FetchBatch, FetchError> {
        let source_id = self.adapter.source_id();
        if !self.bucket.acquire(self.config.timeout).await {
            return Err(FetchError::rate_limited(source_id, None));
        }

        self.metrics.record_attempt();
        let started = Instant::now();
        let result = tokio::time::timeout(self.config.timeout, self.adapter.fetch(cursor)).await;
        metrics::histogram!("airq_ingest_fetch_duration_seconds", "source_id" => source_id.to_string())
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(inner) => inner,
            Err(_) => {
                self.metrics.record_timeout();
                Err(FetchError::unavailable(
                    source_id,
                    format!("fetch timed out after {:?}", self.config.timeout),
                ))
            }
        }
    }

    /// Backoff before retry `retry`; honors a `Retry-After` hint up to the cap
    fn retry_delay(&self, retry: u32, err: &FetchError) -> Duration {
        let policy = &self.config.retry;
        let delay = policy.delay(retry, (self.jitter)());
        match err {
            FetchError::UpstreamRateLimited {
                retry_after: Some(hint),
                ..
            } => delay.max(*hint).min(policy.max_delay()),
            _ => delay,
        }
    }
}
