//! Scheduler - owns source workers, config refresh and shutdown

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use contracts::{IngestBlueprint, MetadataStore, SourceConfig, SourceState, SourceStatus};
use dispatcher::{
    DeadLetterLog, JsonlLog, MetricsSnapshot, PublisherBuilder, PublisherHandle,
    PublisherSnapshot, QuarantineLog, ReadingSender,
};
use ingestion::{AdapterRegistry, JitterFn};
use observability::MetricsCollector;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::coordination::CoordinationState;
use crate::error::{Result, SchedulerError};
use crate::pipeline::Pipeline;
use crate::worker::{shutdown_requested, SourceWorker, WorkerContext};

fn random_jitter() -> f64 {
    rand::random::<f64>()
}

/// Pool size for `sources` concurrently due sources
fn pool_size(sources: usize, max_workers: usize) -> usize {
    sources.min(max_workers).max(1)
}

/// Scheduler configuration and collaborators
pub struct Scheduler {
    blueprint: IngestBlueprint,
    registry: Arc<AdapterRegistry>,
    quarantine: QuarantineLog,
    collector: Arc<MetricsCollector>,
    store: Option<Arc<dyn MetadataStore>>,
    jitter: JitterFn,
}

impl Scheduler {
    pub fn new(blueprint: IngestBlueprint, registry: AdapterRegistry, quarantine: QuarantineLog) -> Self {
        Self {
            blueprint,
            registry: Arc::new(registry),
            quarantine,
            collector: Arc::new(MetricsCollector::new()),
            store: None,
            jitter: random_jitter,
        }
    }

    /// Use a collector created elsewhere (the binary keeps a clone)
    pub fn with_collector(mut self, collector: Arc<MetricsCollector>) -> Self {
        self.collector = collector;
        self
    }

    /// Poll `store` every `config_refresh_secs` for source changes
    pub fn with_metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the jitter source for fetch retries and cycle backoff
    pub fn with_jitter(mut self, jitter: JitterFn) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    /// Build the publisher and audit logs from the blueprint, then start
    #[instrument(name = "scheduler_start", skip_all)]
    pub async fn start(
        blueprint: IngestBlueprint,
        registry: AdapterRegistry,
        collector: Arc<MetricsCollector>,
        store: Option<Arc<dyn MetadataStore>>,
    ) -> Result<SchedulerHandle> {
        let dead_letters: DeadLetterLog = Arc::new(JsonlLog::new(
            "dead_letter",
            blueprint.audit.dead_letter_path.clone(),
        ));
        let quarantine: QuarantineLog = Arc::new(JsonlLog::new(
            "quarantine",
            blueprint.audit.quarantine_path.clone(),
        ));
        let publisher = PublisherBuilder::from_blueprint(&blueprint, dead_letters)
            .await?
            .spawn();

        let mut scheduler = Self::new(blueprint, registry, quarantine).with_collector(collector);
        if let Some(store) = store {
            scheduler = scheduler.with_metadata_store(store);
        }
        scheduler.spawn(publisher)
    }

    /// Start one worker per enabled source, feeding `publisher`
    pub fn spawn(self, publisher: PublisherHandle) -> Result<SchedulerHandle> {
        let sources: Vec<SourceConfig> = self.blueprint.enabled_sources().cloned().collect();
        if sources.is_empty() && self.store.is_none() {
            return Err(SchedulerError::NoSources);
        }

        let settings = &self.blueprint.pipeline;
        let size = pool_size(sources.len(), settings.max_workers);
        let coordination = Arc::new(CoordinationState::from_settings(
            settings,
            self.blueprint.effective_dedup_ttl(),
            self.blueprint.dedup.max_entries,
        ));

        let ctx = WorkerContext {
            registry: self.registry,
            fetcher_settings: self.blueprint.fetcher.clone(),
            pipeline: Arc::new(Pipeline::from_settings(settings)),
            coordination,
            sender: publisher.sender(),
            quarantine: self.quarantine,
            collector: Arc::clone(&self.collector),
            pool: Arc::new(Semaphore::new(size)),
            jitter: self.jitter,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let deadline = settings.shutdown_deadline();
        let supervisor = Supervisor {
            blueprint: self.blueprint,
            ctx,
            store: self.store,
            workers: JoinSet::new(),
            slots: HashMap::new(),
            pool_size: size,
            shutdown: shutdown_rx,
        };

        info!(sources = sources.len(), pool_size = size, "Scheduler starting");
        let task = tokio::spawn(supervisor.run(sources));

        Ok(SchedulerHandle {
            shutdown_tx,
            supervisor: task,
            publisher,
            collector: self.collector,
            deadline,
        })
    }
}

/// Owns the worker tasks; dropping it aborts every worker
struct Supervisor {
    blueprint: IngestBlueprint,
    ctx: WorkerContext,
    store: Option<Arc<dyn MetadataStore>>,
    workers: JoinSet<()>,
    slots: HashMap<String, watch::Sender<Arc<SourceConfig>>>,
    pool_size: usize,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    #[instrument(name = "scheduler_supervisor", skip_all)]
    async fn run(mut self, initial: Vec<SourceConfig>) {
        for source in initial {
            self.start_worker(source);
        }

        metrics::gauge!("airq_ingest_active_sources").set(self.slots.len() as f64);

        let period = self.blueprint.pipeline.config_refresh();
        let mut refresh = tokio::time::interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => break,
                Some(joined) = self.workers.join_next(), if !self.workers.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "source worker panicked");
                    }
                }
                _ = refresh.tick(), if self.store.is_some() => self.refresh().await,
            }
        }

        info!(workers = self.workers.len(), "Waiting for in-flight cycles");
        // Workers see the shutdown flag themselves; release our sender so the
        // publisher can close once they are done.
        let Self { ctx, mut workers, slots, .. } = self;
        drop(ctx);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "source worker panicked");
            }
        }
        drop(slots);
        debug!("All source workers stopped");
    }

    fn start_worker(&mut self, source: SourceConfig) {
        let id = source.id.clone();
        let (config_tx, config_rx) = watch::channel(Arc::new(source));
        let worker = SourceWorker::new(self.ctx.clone(), config_rx, self.shutdown.clone());
        self.workers.spawn(worker.run());
        self.slots.insert(id, config_tx);
    }

    /// Reconcile running workers with the metadata store
    #[instrument(name = "scheduler_refresh", skip_all)]
    async fn refresh(&mut self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let sources = match store.load_sources().await {
            Ok(sources) => sources,
            Err(e) => {
                warn!(error = %e, "config refresh failed, keeping current sources");
                return;
            }
        };

        // The new sources must still satisfy the dedup TTL floor.
        let mut candidate = self.blueprint.clone();
        candidate.sources = sources;
        let dedup_ttl = match candidate.checked_dedup_ttl() {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!(error = %e, "config refresh rejected, keeping current sources");
                metrics::counter!("airq_ingest_config_refresh_rejected_total").increment(1);
                return;
            }
        };

        let enabled: HashMap<String, SourceConfig> = candidate
            .sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| (s.id.clone(), s.clone()))
            .collect();

        // Dropping a slot's sender tells its worker to stop.
        let removed: Vec<String> = self
            .slots
            .keys()
            .filter(|id| !enabled.contains_key(*id))
            .cloned()
            .collect();
        for id in &removed {
            self.slots.remove(id);
            info!(source_id = %id, "source removed or disabled");
        }

        let mut added = 0;
        for (id, source) in enabled {
            match self.slots.get(&id) {
                Some(tx) => {
                    tx.send_if_modified(|current| {
                        if **current == source {
                            return false;
                        }
                        *current = Arc::new(source);
                        true
                    });
                }
                None => {
                    info!(source_id = %id, "source added");
                    self.start_worker(source);
                    added += 1;
                }
            }
        }

        self.blueprint = candidate;
        self.ctx.coordination.set_dedup_ttl(dedup_ttl);

        metrics::gauge!("airq_ingest_active_sources").set(self.slots.len() as f64);
        let wanted = pool_size(self.slots.len(), self.blueprint.pipeline.max_workers);
        if wanted > self.pool_size {
            self.ctx.pool.add_permits(wanted - self.pool_size);
            self.pool_size = wanted;
        }
        debug!(
            sources = self.slots.len(),
            added,
            removed = removed.len(),
            "config refresh applied"
        );
    }
}

/// Result of a shutdown
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// False when the hard deadline forced an abort
    pub graceful: bool,
    pub sources: Vec<SourceStatus>,
    pub publisher: PublisherSnapshot,
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

/// Running scheduler
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    supervisor: JoinHandle<()>,
    publisher: PublisherHandle,
    collector: Arc<MetricsCollector>,
    deadline: Duration,
}

impl SchedulerHandle {
    /// Per-source status for health reporting
    pub fn status(&self) -> Vec<SourceStatus> {
        self.collector.snapshot()
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    pub fn publisher_metrics(&self) -> PublisherSnapshot {
        self.publisher.metrics()
    }

    pub fn sink_metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.publisher.sink_metrics()
    }

    /// Extra sender for readings produced outside the source workers
    pub fn sender(&self) -> ReadingSender {
        self.publisher.sender()
    }

    /// Stop scheduling, let in-flight cycles finish, flush the publisher
    ///
    /// Anything still undelivered at the hard deadline is dead-lettered.
    #[instrument(name = "scheduler_shutdown", skip(self))]
    pub async fn shutdown(self) -> ShutdownReport {
        let deadline = Instant::now() + self.deadline;
        info!(deadline_secs = self.deadline.as_secs(), "Scheduler shutting down");
        // The supervisor may already be gone; nothing to signal then.
        let _ = self.shutdown_tx.send(true);

        let mut supervisor = self.supervisor;
        let mut graceful = true;
        match tokio::time::timeout_at(deadline, &mut supervisor).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "Scheduler supervisor panicked");
                graceful = false;
            }
            Err(_) => {
                warn!("Source workers still busy at deadline, aborting them");
                supervisor.abort();
                let _ = supervisor.await;
                graceful = false;
            }
        }

        let published = self.publisher.shutdown(deadline).await;
        for source in self.collector.snapshot() {
            self.collector.set_state(&source.source_id, SourceState::Stopped);
        }

        let report = ShutdownReport {
            graceful: graceful && published.graceful,
            sources: self.collector.snapshot(),
            publisher: published.publisher,
            sinks: published.sinks,
        };
        info!(graceful = report.graceful, "Scheduler stopped");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size() {
        assert_eq!(pool_size(3, 8), 3);
        assert_eq!(pool_size(20, 8), 8);
        assert_eq!(pool_size(0, 8), 1);
    }
}
