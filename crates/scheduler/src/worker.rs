//! Per-source worker
//!
//! `Idle → Fetching → Processing → Idle`, or `Fetching → Backoff → Idle` on
//! failure. An auth error parks the source in `Degraded` until a changed
//! config arrives on its watch channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use contracts::{FetchError, FetcherSettings, SourceConfig, SourceState};
use dispatcher::{QuarantineLog, ReadingSender};
use ingestion::{AdapterRegistry, FetcherConfig, JitterFn, RateLimitedFetcher};
use observability::MetricsCollector;
use tokio::sync::{watch, Semaphore};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::coordination::CoordinationState;
use crate::pipeline::Pipeline;

/// Everything a worker shares with its siblings
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub registry: Arc<AdapterRegistry>,
    pub fetcher_settings: FetcherSettings,
    pub pipeline: Arc<Pipeline>,
    pub coordination: Arc<CoordinationState>,
    pub sender: ReadingSender,
    pub quarantine: QuarantineLog,
    pub collector: Arc<MetricsCollector>,
    pub pool: Arc<Semaphore>,
    pub jitter: JitterFn,
}

enum CycleEnd {
    Continue,
    Shutdown,
}

pub(crate) struct SourceWorker {
    source: Arc<SourceConfig>,
    ctx: WorkerContext,
    fetcher: Option<RateLimitedFetcher>,
    degraded: bool,
    config_rx: watch::Receiver<Arc<SourceConfig>>,
    shutdown: watch::Receiver<bool>,
}

impl SourceWorker {
    pub(crate) fn new(
        ctx: WorkerContext,
        config_rx: watch::Receiver<Arc<SourceConfig>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let source = Arc::clone(&*config_rx.borrow());
        Self {
            source,
            ctx,
            fetcher: None,
            degraded: false,
            config_rx,
            shutdown,
        }
    }

    fn id(&self) -> &str {
        &self.source.id
    }

    /// Build adapter + fetcher for the current config; degrade on failure
    fn rebuild(&mut self) {
        match self.ctx.registry.build(&self.source) {
            Ok(adapter) => {
                let config = FetcherConfig::for_source(&self.ctx.fetcher_settings, &self.source);
                self.fetcher = Some(RateLimitedFetcher::new(adapter, config).with_jitter(self.ctx.jitter));
                self.degraded = false;
            }
            Err(e) => {
                error!(source_id = %self.source.id, error = %e, "adapter construction failed");
                self.fetcher = None;
                self.degraded = true;
                self.ctx.collector.mark_degraded(&self.source.id, &e.to_string());
            }
        }
    }

    #[instrument(name = "source_worker", skip(self), fields(source_id = %self.source.id))]
    pub(crate) async fn run(mut self) {
        self.ctx.collector.register(self.id());
        self.rebuild();
        let mut ticker = new_ticker(self.source.interval());
        info!(interval_secs = self.source.interval_secs, "source worker started");

        let mut removed = false;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => break,
                changed = self.config_rx.changed() => {
                    if changed.is_err() {
                        info!("source removed from configuration");
                        removed = true;
                        break;
                    }
                    let next = Arc::clone(&*self.config_rx.borrow_and_update());
                    self.apply_config(next, &mut ticker);
                    continue;
                }
                _ = ticker.tick() => {}
            }

            if self.degraded {
                debug!("source degraded, cycle skipped");
                continue;
            }
            if let CycleEnd::Shutdown = self.cycle().await {
                break;
            }
        }

        if removed {
            self.ctx.collector.remove(self.id());
        } else {
            self.ctx.collector.set_state(self.id(), SourceState::Stopped);
        }
        info!("source worker stopped");
    }

    fn apply_config(&mut self, next: Arc<SourceConfig>, ticker: &mut Interval) {
        if *next == *self.source {
            return;
        }
        let interval_changed = next.interval_secs != self.source.interval_secs;
        self.source = next;

        if self.degraded && self.ctx.collector.clear_degraded(&self.source.id) {
            info!("configuration refreshed, leaving degraded state");
        }
        self.rebuild();
        if interval_changed {
            *ticker = new_ticker(self.source.interval());
        }
        debug!("source configuration applied");
    }

    async fn cycle(&mut self) -> CycleEnd {
        let Some(fetcher) = self.fetcher.as_ref() else {
            return CycleEnd::Continue;
        };
        let source_id = self.source.id.clone();
        let collector = Arc::clone(&self.ctx.collector);

        let pool = Arc::clone(&self.ctx.pool);
        let permit = tokio::select! {
            permit = pool.acquire_owned() => permit,
            _ = shutdown_requested(&mut self.shutdown) => return CycleEnd::Shutdown,
        };
        let Ok(permit) = permit else {
            return CycleEnd::Shutdown;
        };

        collector.set_state(&source_id, SourceState::Fetching);
        let started = Instant::now();
        let cursor = self.ctx.coordination.cursor(&source_id);

        // An in-flight fetch is abandoned on shutdown; the cursor stays put.
        let outcome = tokio::select! {
            outcome = fetcher.fetch(cursor.as_ref()) => outcome,
            _ = shutdown_requested(&mut self.shutdown) => {
                collector.set_state(&source_id, SourceState::Idle);
                return CycleEnd::Shutdown;
            }
        };

        match outcome.result {
            Ok(batch) => {
                collector.set_state(&source_id, SourceState::Processing);
                let now = Utc::now();
                let work = self.ctx.pipeline.process(
                    fetcher.adapter().as_ref(),
                    &self.source,
                    &batch,
                    &self.ctx.coordination,
                    now,
                    Instant::now().into_std(),
                );

                for entry in &work.quarantine {
                    if let Err(e) = self.ctx.quarantine.append(entry).await {
                        error!(error = %e, "quarantine append failed");
                    }
                }
                for reading in work.publish {
                    if let Err(e) = self.ctx.sender.publish(reading).await {
                        warn!(error = %e, "reading handed to dead-letter");
                    }
                }

                // Rejections are routine; the cursor moves regardless.
                self.ctx.coordination.advance_cursor(&source_id, batch.next_cursor);
                drop(permit);

                collector.record_success(&source_id, &work.counts, started.elapsed());
                observability::metrics::record_dedup_entries(self.ctx.coordination.dedup_stats().entries);
                collector.set_state(&source_id, SourceState::Idle);
                debug!(
                    records = batch.records.len(),
                    accepted = work.counts.accepted,
                    rejected = work.counts.rejected,
                    duplicates = work.counts.duplicates,
                    "cycle complete"
                );
                CycleEnd::Continue
            }
            Err(err @ FetchError::UpstreamAuthError { .. }) => {
                drop(permit);
                warn!(error = %err, "auth failure, source degraded until its config changes");
                self.degraded = true;
                collector.mark_degraded(&source_id, &err.to_string());
                CycleEnd::Continue
            }
            Err(err) => {
                drop(permit);
                let failures = collector.record_failure(&source_id, err.kind(), &err.to_string());
                let delay = self.backoff_delay(failures);
                collector.set_state(&source_id, SourceState::Backoff);
                warn!(
                    consecutive_failures = failures,
                    attempts = outcome.attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "fetch cycle failed, backing off"
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_requested(&mut self.shutdown) => return CycleEnd::Shutdown,
                }
                collector.set_state(&source_id, SourceState::Idle);
                CycleEnd::Continue
            }
        }
    }

    /// Backoff after `failures` consecutive failed cycles
    fn backoff_delay(&self, failures: u32) -> Duration {
        self.ctx
            .fetcher_settings
            .retry
            .delay(failures.saturating_sub(1), (self.ctx.jitter)())
    }
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Resolves once shutdown is requested; pends forever if the sender is gone
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}
