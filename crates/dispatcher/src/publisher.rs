//! BatchPublisher - micro-batches accepted readings and fans them out to sinks

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use contracts::{
    BatchSettings, CanonicalReading, DeadLetterRecord, IngestBlueprint, ReadingBatch,
    ReadingSink, RetryPolicy, SinkConfig, SinkRole, SinkType,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::audit::DeadLetterLog;
use crate::error::DispatcherError;
use crate::handle::{SinkHandle, SinkWorkerConfig};
use crate::metrics::{MetricsSnapshot, PublisherMetrics, PublisherSnapshot, SinkMetrics};
use crate::sinks::{FileSink, HttpBusSink, InfluxSink, LogSink};

/// Time the publisher grants sink workers to dead-letter after an abort
const ABORT_GRACE: Duration = Duration::from_secs(2);

/// Micro-batching configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Seal a batch once it holds this many readings
    pub max_size: usize,
    /// Seal a batch this long after its first reading arrived
    pub max_wait: Duration,
    /// Readings buffered between source workers and the batcher
    pub intake_capacity: usize,
    /// How long `publish` waits for intake space
    pub intake_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self::from(&BatchSettings::default())
    }
}

impl From<&BatchSettings> for PublisherConfig {
    fn from(settings: &BatchSettings) -> Self {
        Self {
            max_size: settings.max_size.max(1),
            max_wait: settings.max_wait(),
            intake_capacity: settings.queue_capacity.max(1),
            intake_timeout: Duration::from_secs(10),
        }
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "publisher_create_sink_handle",
    skip(config, retry, dead_letters, abort),
    fields(sink = %config.name, sink_type = ?config.sink_type, role = ?config.role)
)]
pub async fn create_sink_handle(
    config: &SinkConfig,
    retry: &RetryPolicy,
    dead_letters: DeadLetterLog,
    abort: watch::Receiver<bool>,
) -> Result<SinkHandle, DispatcherError> {
    let worker = SinkWorkerConfig {
        queue_capacity: config.queue_capacity,
        retry: retry.clone(),
        ..SinkWorkerConfig::default()
    };
    let creation = |e: contracts::ContractError| DispatcherError::sink_creation(&config.name, e.to_string());

    let handle = match config.sink_type {
        SinkType::Log => SinkHandle::spawn(
            LogSink::new(&config.name, config.role),
            worker,
            dead_letters,
            abort,
        ),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params, config.role)
                .await
                .map_err(creation)?;
            SinkHandle::spawn(sink, worker, dead_letters, abort)
        }
        SinkType::Http => {
            if config.role != SinkRole::MessageBus {
                warn!(sink = %config.name, "http sink speaks the message-bus protocol");
            }
            let sink = HttpBusSink::from_params(&config.name, &config.params).map_err(creation)?;
            SinkHandle::spawn(sink, worker, dead_letters, abort)
        }
        SinkType::Influxdb => {
            if config.role != SinkRole::TimeSeries {
                warn!(sink = %config.name, "influxdb sink writes time-series points");
            }
            let sink = InfluxSink::from_params(&config.name, &config.params).map_err(creation)?;
            SinkHandle::spawn(sink, worker, dead_letters, abort)
        }
    };
    Ok(handle)
}

/// Builder for a BatchPublisher and its sink workers
pub struct PublisherBuilder {
    config: PublisherConfig,
    sink_retry: RetryPolicy,
    dead_letters: DeadLetterLog,
    abort_tx: watch::Sender<bool>,
    handles: Vec<SinkHandle>,
}

impl PublisherBuilder {
    pub fn new(config: PublisherConfig, sink_retry: RetryPolicy, dead_letters: DeadLetterLog) -> Self {
        let (abort_tx, _) = watch::channel(false);
        Self {
            config,
            sink_retry,
            dead_letters,
            abort_tx,
            handles: Vec::new(),
        }
    }

    /// Builder preloaded with every sink in the blueprint
    #[instrument(
        name = "publisher_from_blueprint",
        skip(blueprint, dead_letters),
        fields(sink_count = blueprint.sinks.len())
    )]
    pub async fn from_blueprint(
        blueprint: &IngestBlueprint,
        dead_letters: DeadLetterLog,
    ) -> Result<Self, DispatcherError> {
        let mut builder = Self::new(
            PublisherConfig::from(&blueprint.batch),
            blueprint.sink_retry.clone(),
            dead_letters,
        );
        for sink in &blueprint.sinks {
            builder = builder.with_sink_config(sink).await?;
        }
        Ok(builder)
    }

    pub fn intake_timeout(mut self, timeout: Duration) -> Self {
        self.config.intake_timeout = timeout;
        self
    }

    /// Add a sink described by configuration
    pub async fn with_sink_config(mut self, config: &SinkConfig) -> Result<Self, DispatcherError> {
        let handle = create_sink_handle(
            config,
            &self.sink_retry,
            Arc::clone(&self.dead_letters),
            self.abort_tx.subscribe(),
        )
        .await?;
        self.handles.push(handle);
        Ok(self)
    }

    /// Add an already constructed sink (tests, embedding)
    pub fn with_sink<S: ReadingSink + Send + 'static>(mut self, sink: S, queue_capacity: usize) -> Self {
        let worker = SinkWorkerConfig {
            queue_capacity,
            retry: self.sink_retry.clone(),
            ..SinkWorkerConfig::default()
        };
        let handle = SinkHandle::spawn(
            sink,
            worker,
            Arc::clone(&self.dead_letters),
            self.abort_tx.subscribe(),
        );
        self.handles.push(handle);
        self
    }

    /// Start the batching loop
    pub fn spawn(self) -> PublisherHandle {
        let (tx, rx) = async_channel::bounded(self.config.intake_capacity);
        let metrics = Arc::new(PublisherMetrics::new());
        let sink_metrics = self
            .handles
            .iter()
            .map(|h| (h.name().to_string(), Arc::clone(h.metrics())))
            .collect();

        let sender = ReadingSender {
            tx,
            timeout: self.config.intake_timeout,
            dead_letters: Arc::clone(&self.dead_letters),
            metrics: Arc::clone(&metrics),
        };
        let publisher = BatchPublisher {
            config: self.config,
            intake: rx,
            handles: self.handles,
            metrics: Arc::clone(&metrics),
            next_batch_id: 1,
        };
        let task = tokio::spawn(publisher.run());

        PublisherHandle {
            sender,
            task,
            abort_tx: self.abort_tx,
            metrics,
            sink_metrics,
        }
    }
}

/// Cloneable entry point used by source workers
#[derive(Clone)]
pub struct ReadingSender {
    tx: async_channel::Sender<Arc<CanonicalReading>>,
    timeout: Duration,
    dead_letters: DeadLetterLog,
    metrics: Arc<PublisherMetrics>,
}

impl ReadingSender {
    /// Hand a reading to the batcher
    ///
    /// Waits at most the intake timeout; a reading that cannot be queued is
    /// dead-lettered so it is never silently dropped.
    pub async fn publish(&self, reading: CanonicalReading) -> Result<(), DispatcherError> {
        let reading = Arc::new(reading);
        match tokio::time::timeout(self.timeout, self.tx.send(Arc::clone(&reading))).await {
            Ok(Ok(())) => {
                self.metrics.inc_received();
                Ok(())
            }
            Ok(Err(_)) => {
                self.dead_letter(&reading, "publisher closed").await;
                Err(DispatcherError::Closed)
            }
            Err(_) => {
                self.metrics.inc_intake_timeouts();
                self.dead_letter(&reading, "publisher intake timeout").await;
                Err(DispatcherError::IntakeTimeout {
                    sensor_id: reading.sensor_id.clone(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Readings waiting to be batched
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    async fn dead_letter(&self, reading: &CanonicalReading, reason: &str) {
        let record = DeadLetterRecord {
            batch_id: 0,
            source_id: reading.source_id().to_string(),
            sink: "publisher".to_string(),
            reason: reason.to_string(),
            attempts: 0,
            failed_at: Utc::now(),
            readings: vec![reading.clone()],
        };
        metrics::counter!("airq_ingest_dead_letters_total", "sink" => "publisher").increment(1);
        if let Err(e) = self.dead_letters.append(&record).await {
            error!(sensor_id = %reading.sensor_id, error = %e, "Dead-letter append failed");
        }
    }
}

/// The batching loop
struct BatchPublisher {
    config: PublisherConfig,
    intake: async_channel::Receiver<Arc<CanonicalReading>>,
    handles: Vec<SinkHandle>,
    metrics: Arc<PublisherMetrics>,
    next_batch_id: u64,
}

impl BatchPublisher {
    /// Consume readings until every sender is gone, then drain and stop sinks
    #[instrument(name = "publisher_run", skip(self), fields(sinks = self.handles.len()))]
    async fn run(mut self) -> Vec<(String, MetricsSnapshot)> {
        info!(
            max_size = self.config.max_size,
            max_wait_ms = self.config.max_wait.as_millis() as u64,
            "Batch publisher started"
        );

        let mut closed = false;
        while !closed {
            // The window opens with the first reading, not on a fixed tick.
            let first = match self.intake.recv().await {
                Ok(reading) => reading,
                Err(_) => break,
            };
            let deadline = Instant::now() + self.config.max_wait;
            let mut readings = Vec::with_capacity(self.config.max_size);
            readings.push(first);

            while readings.len() < self.config.max_size {
                match tokio::time::timeout_at(deadline, self.intake.recv()).await {
                    Ok(Ok(reading)) => readings.push(reading),
                    Ok(Err(_)) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }
            self.seal(readings).await;
        }

        info!(batches = self.next_batch_id - 1, "Publisher intake closed, stopping sinks");
        let mut snapshots = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            let name = handle.name().to_string();
            let metrics = Arc::clone(handle.metrics());
            handle.shutdown().await;
            snapshots.push((name, metrics.snapshot()));
        }
        snapshots
    }

    async fn seal(&mut self, readings: Vec<Arc<CanonicalReading>>) {
        let batch = Arc::new(ReadingBatch::new(self.next_batch_id, readings));
        self.next_batch_id += 1;
        self.metrics.inc_sealed();
        metrics::counter!("airq_ingest_batches_sealed_total").increment(1);
        metrics::histogram!("airq_ingest_batch_size").record(batch.len() as f64);
        debug!(batch_id = batch.batch_id, readings = batch.len(), "Batch sealed");

        // Never waits on a sink: a full queue dead-letters only that sink's copy.
        for handle in &self.handles {
            handle.send(Arc::clone(&batch)).await;
        }
    }
}

/// Running publisher
pub struct PublisherHandle {
    sender: ReadingSender,
    task: JoinHandle<Vec<(String, MetricsSnapshot)>>,
    abort_tx: watch::Sender<bool>,
    metrics: Arc<PublisherMetrics>,
    sink_metrics: Vec<(String, Arc<SinkMetrics>)>,
}

impl PublisherHandle {
    pub fn sender(&self) -> ReadingSender {
        self.sender.clone()
    }

    pub fn metrics(&self) -> PublisherSnapshot {
        self.metrics.snapshot()
    }

    /// Per-sink counters
    pub fn sink_metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.sink_metrics
            .iter()
            .map(|(name, m)| (name.clone(), m.snapshot()))
            .collect()
    }

    /// Flush and stop
    ///
    /// Every other `ReadingSender` clone must already be dropped. Batches
    /// still undelivered at `deadline` are dead-lettered.
    #[instrument(name = "publisher_shutdown", skip_all)]
    pub async fn shutdown(self, deadline: Instant) -> PublisherReport {
        let Self {
            sender,
            mut task,
            abort_tx,
            metrics,
            sink_metrics,
        } = self;
        drop(sender);

        let graceful = match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(snapshots)) => {
                log_sink_summary(&snapshots);
                true
            }
            Ok(Err(e)) => {
                error!(error = ?e, "Publisher task panicked");
                false
            }
            Err(_) => {
                warn!("Shutdown deadline reached, dead-lettering undelivered batches");
                // Receivers may all be gone already; nothing left to abort then.
                let _ = abort_tx.send(true);
                match tokio::time::timeout(ABORT_GRACE, &mut task).await {
                    Ok(Ok(snapshots)) => log_sink_summary(&snapshots),
                    Ok(Err(e)) => error!(error = ?e, "Publisher task panicked"),
                    Err(_) => {
                        error!("Publisher did not stop after abort");
                        task.abort();
                    }
                }
                false
            }
        };

        PublisherReport {
            graceful,
            publisher: metrics.snapshot(),
            sinks: sink_metrics
                .iter()
                .map(|(name, m)| (name.clone(), m.snapshot()))
                .collect(),
        }
    }
}

/// Final counters of a stopped publisher
#[derive(Debug, Clone)]
pub struct PublisherReport {
    /// False when the deadline forced an abort
    pub graceful: bool,
    pub publisher: PublisherSnapshot,
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

fn log_sink_summary(snapshots: &[(String, MetricsSnapshot)]) {
    for (sink, m) in snapshots {
        info!(
            sink = %sink,
            batches = m.write_count,
            readings = m.readings_written,
            failures = m.failure_count,
            dead_lettered = m.dead_lettered,
            "Sink stopped"
        );
    }
}
