//! SinkHandle - manages a sink with isolated queue, retry and dead-letter

use std::sync::Arc;

use chrono::Utc;
use contracts::{DeadLetterRecord, ReadingBatch, ReadingSink, RetryPolicy};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::audit::DeadLetterLog;
use crate::metrics::SinkMetrics;

/// Per-sink worker settings
#[derive(Debug, Clone)]
pub struct SinkWorkerConfig {
    /// Batches buffered ahead of the sink
    pub queue_capacity: usize,
    /// Retry policy for failed writes
    pub retry: RetryPolicy,
}

impl Default for SinkWorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            retry: RetryPolicy::default(),
        }
    }
}

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Channel to send batches to worker
    tx: mpsc::Sender<Arc<ReadingBatch>>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    dead_letters: DeadLetterLog,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    ///
    /// Once `abort` turns true the worker stops retrying and dead-letters
    /// whatever it still holds.
    pub fn spawn<S: ReadingSink + Send + 'static>(
        sink: S,
        config: SinkWorkerConfig,
        dead_letters: DeadLetterLog,
        abort: watch::Receiver<bool>,
    ) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker = SinkWorker {
            name: name.clone(),
            metrics: Arc::clone(&metrics),
            retry: config.retry.clone(),
            dead_letters: Arc::clone(&dead_letters),
        };
        let worker_handle = tokio::spawn(async move {
            worker.run(sink, rx, abort).await;
        });

        Self {
            name,
            tx,
            metrics,
            dead_letters,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Enqueue without waiting for queue space
    ///
    /// A batch that finds the queue full (or the worker gone) is
    /// dead-lettered at once, so a stalled sink never holds up the caller.
    /// Returns whether the batch was queued.
    pub async fn send(&self, batch: Arc<ReadingBatch>) -> bool {
        let (batch, reason) = match self.tx.try_send(batch) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                return true;
            }
            Err(mpsc::error::TrySendError::Full(b)) => (b, "sink queue full"),
            Err(mpsc::error::TrySendError::Closed(b)) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                (b, "sink worker closed")
            }
        };
        warn!(sink = %self.name, batch_id = batch.batch_id, reason, "batch not queued");
        self.metrics.inc_dead_lettered();
        dead_letter_batch(&self.dead_letters, &batch, &self.name, reason, 0).await;
        false
    }

    /// Shutdown the sink worker gracefully
    ///
    /// Queued batches are still delivered (or dead-lettered on abort).
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        // Wait for worker to finish
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

struct SinkWorker {
    name: String,
    metrics: Arc<SinkMetrics>,
    retry: RetryPolicy,
    dead_letters: DeadLetterLog,
}

impl SinkWorker {
    /// Worker loop that consumes batches and writes to sink
    #[instrument(name = "sink_worker_loop", skip_all, fields(sink = %self.name))]
    async fn run<S: ReadingSink>(
        self,
        mut sink: S,
        mut rx: mpsc::Receiver<Arc<ReadingBatch>>,
        mut abort: watch::Receiver<bool>,
    ) {
        debug!("Sink worker started");

        while let Some(batch) = rx.recv().await {
            self.metrics.set_queue_len(rx.len());

            if *abort.borrow() {
                self.abandon(&batch, "shutdown deadline exceeded", 0).await;
                continue;
            }
            self.deliver(&mut sink, &batch, &mut abort).await;
        }

        // Cleanup
        if let Err(e) = sink.flush().await {
            error!(error = %e, "Flush failed on shutdown");
        }
        if let Err(e) = sink.close().await {
            error!(error = %e, "Close failed on shutdown");
        }

        debug!("Sink worker stopped");
    }

    /// Write with retry; dead-letter after the last attempt
    async fn deliver<S: ReadingSink>(
        &self,
        sink: &mut S,
        batch: &ReadingBatch,
        abort: &mut watch::Receiver<bool>,
    ) {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = tokio::select! {
                result = sink.write_batch(batch) => result,
                _ = aborted(abort) => {
                    self.abandon(batch, "aborted at shutdown deadline", attempt).await;
                    return;
                }
            };

            let err = match result {
                Ok(()) => {
                    self.metrics.record_write(batch.len());
                    metrics::counter!("airq_ingest_sink_batches_total", "sink" => self.name.clone(), "outcome" => "ok")
                        .increment(1);
                    return;
                }
                Err(e) => e,
            };

            self.metrics.inc_failure_count();
            metrics::counter!("airq_ingest_sink_batches_total", "sink" => self.name.clone(), "outcome" => "error")
                .increment(1);

            if attempt >= max_attempts {
                error!(
                    batch_id = batch.batch_id,
                    attempts = attempt,
                    error = %err,
                    "Write failed, dead-lettering batch"
                );
                self.abandon(batch, &err.to_string(), attempt).await;
                return;
            }

            let delay = self.retry.delay(attempt - 1, rand::random::<f64>());
            self.metrics.inc_retry_count();
            warn!(
                batch_id = batch.batch_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Write failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = aborted(abort) => {
                    self.abandon(batch, &format!("aborted at shutdown deadline: {err}"), attempt).await;
                    return;
                }
            }
        }
    }

    async fn abandon(&self, batch: &ReadingBatch, reason: &str, attempts: u32) {
        self.metrics.inc_dead_lettered();
        dead_letter_batch(&self.dead_letters, batch, &self.name, reason, attempts).await;
    }
}

/// Resolves once the abort flag is raised; pends forever if the sender is gone
async fn aborted(abort: &mut watch::Receiver<bool>) {
    if abort.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Write one dead-letter record per originating source
pub(crate) async fn dead_letter_batch(
    log: &DeadLetterLog,
    batch: &ReadingBatch,
    sink: &str,
    reason: &str,
    attempts: u32,
) {
    let failed_at = Utc::now();
    for (source_id, readings) in batch.by_source() {
        let record = DeadLetterRecord {
            batch_id: batch.batch_id,
            source_id,
            sink: sink.to_string(),
            reason: reason.to_string(),
            attempts,
            failed_at,
            readings: readings.iter().map(|r| r.as_ref().clone()).collect(),
        };
        metrics::counter!("airq_ingest_dead_letters_total", "sink" => sink.to_string())
            .increment(1);
        if let Err(e) = log.append(&record).await {
            error!(
                sink,
                batch_id = batch.batch_id,
                source_id = %record.source_id,
                readings = record.readings.len(),
                error = %e,
                "Dead-letter append failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audit::MemoryLog;
    use crate::sinks::MemorySink;
    use chrono::Utc;
    use contracts::{CanonicalReading, Location, SourceMetadata};

    fn batch(id: u64, sources: &[&str]) -> Arc<ReadingBatch> {
        let readings = sources
            .iter()
            .enumerate()
            .map(|(i, source)| {
                Arc::new(CanonicalReading {
                    sensor_id: format!("sensor-{i}"),
                    timestamp: Utc::now(),
                    location: Location::new(0.0, 0.0),
                    measurements: [("pm25".to_string(), 5.0)].into_iter().collect(),
                    source_metadata: SourceMetadata {
                        source_id: source.to_string(),
                        manufacturer: "Test".into(),
                        model: None,
                    },
                    quality_flags: Default::default(),
                })
            })
            .collect();
        Arc::new(ReadingBatch::new(id, readings))
    }

    fn fast_retry() -> SinkWorkerConfig {
        SinkWorkerConfig {
            queue_capacity: 8,
            retry: RetryPolicy {
                base_delay_ms: 10,
                factor: 2.0,
                max_delay_ms: 100,
                max_attempts: 3,
                jitter: 0.0,
            },
        }
    }

    #[tokio::test]
    async fn test_sink_handle_basic() {
        let sink = MemorySink::new("mem");
        let dead = Arc::new(MemoryLog::new("dead"));
        let (_abort_tx, abort_rx) = watch::channel(false);
        let handle = SinkHandle::spawn(sink.clone(), fast_retry(), dead.clone(), abort_rx);

        for i in 0..5 {
            assert!(handle.send(batch(i, &["s1"])).await);
        }

        handle.shutdown().await;
        assert_eq!(sink.batches().len(), 5);
        assert!(dead.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retried() {
        let sink = MemorySink::new("mem");
        sink.fail_next(2);
        let dead = Arc::new(MemoryLog::new("dead"));
        let (_abort_tx, abort_rx) = watch::channel(false);
        let handle = SinkHandle::spawn(sink.clone(), fast_retry(), dead.clone(), abort_rx);

        handle.send(batch(1, &["s1"])).await;
        let metrics = Arc::clone(handle.metrics());
        handle.shutdown().await;

        assert_eq!(sink.batches().len(), 1);
        assert_eq!(sink.attempts(), 3);
        assert_eq!(metrics.snapshot().retry_count, 2);
        assert!(dead.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_dead_letter_per_source() {
        let sink = MemorySink::new("mem");
        sink.set_failing(true);
        let dead = Arc::new(MemoryLog::new("dead"));
        let (_abort_tx, abort_rx) = watch::channel(false);
        let handle = SinkHandle::spawn(sink.clone(), fast_retry(), dead.clone(), abort_rx);

        handle.send(batch(7, &["s1", "s2", "s1"])).await;
        handle.shutdown().await;

        let records = dead.entries();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_id, "s1");
        assert_eq!(records[0].readings.len(), 2);
        assert_eq!(records[1].source_id, "s2");
        assert!(records.iter().all(|r| r.attempts == 3 && r.batch_id == 7 && r.sink == "mem"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_dead_letters_remaining() {
        let sink = MemorySink::new("mem");
        sink.set_failing(true);
        let dead = Arc::new(MemoryLog::new("dead"));
        let (abort_tx, abort_rx) = watch::channel(false);
        let mut config = fast_retry();
        config.retry.base_delay_ms = 60_000;
        config.retry.max_delay_ms = 60_000;
        let handle = SinkHandle::spawn(sink.clone(), config, dead.clone(), abort_rx);

        handle.send(batch(1, &["s1"])).await;
        handle.send(batch(2, &["s1"])).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        abort_tx.send(true).unwrap();
        handle.shutdown().await;

        let records = dead.entries();
        assert_eq!(records.len(), 2);
        assert!(records[0].reason.contains("shutdown deadline"), "got: {}", records[0].reason);
        assert_eq!(sink.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_dead_letters_without_waiting() {
        let sink = MemorySink::new("slow").with_delay(Duration::from_secs(60));
        let dead = Arc::new(MemoryLog::new("dead"));
        let (_abort_tx, abort_rx) = watch::channel(false);
        let mut config = fast_retry();
        config.queue_capacity = 1;
        let handle = SinkHandle::spawn(sink.clone(), config, dead.clone(), abort_rx);

        assert!(handle.send(batch(1, &["s1"])).await);
        tokio::task::yield_now().await;
        assert!(handle.send(batch(2, &["s1"])).await);
        let started = tokio::time::Instant::now();
        assert!(!handle.send(batch(3, &["s1"])).await);
        assert_eq!(started.elapsed(), Duration::ZERO);

        assert_eq!(dead.len(), 1);
        assert_eq!(dead.entries()[0].reason, "sink queue full");
        assert_eq!(dead.entries()[0].batch_id, 3);
        handle.shutdown().await;
    }
}
