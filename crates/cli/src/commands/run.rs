//! `run` command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use config_loader::FileMetadataStore;
use contracts::{IngestBlueprint, MetadataStore};
use ingestion::AdapterRegistry;
use observability::MetricsCollector;
use scheduler::{Scheduler, SchedulerHandle, ShutdownReport};
use tracing::{error, info, warn};

use super::{check_sources, load_blueprint};
use crate::cli::RunArgs;
use crate::error::CliError;

/// Why the run loop ended
#[derive(Debug)]
enum StopReason {
    Signal,
    MaxRuntime,
}

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");
    let blueprint = load_blueprint(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        sources = blueprint.sources.len(),
        enabled = blueprint.enabled_sources().count(),
        sinks = blueprint.sinks.len(),
        dedup_ttl_secs = blueprint.effective_dedup_ttl().as_secs(),
        "Configuration loaded"
    );

    let registry = AdapterRegistry::with_defaults();
    let problems = check_sources(&blueprint, &registry);

    if args.dry_run {
        print_config_summary(&blueprint);
        if !problems.is_empty() {
            return Err(CliError::source_setup(&problems).into());
        }
        info!("Dry run mode - configuration is valid, exiting");
        return Ok(());
    }

    // Broken sources start degraded; a config refresh can still fix them.
    for problem in &problems {
        warn!(problem = %problem, "Source cannot start until its config changes");
    }

    let store: Option<Arc<dyn MetadataStore>> = if args.no_refresh {
        None
    } else {
        let store = FileMetadataStore::new(&args.config).context("Failed to open metadata store")?;
        Some(Arc::new(store))
    };

    let collector = Arc::new(MetricsCollector::new());
    let handle = Scheduler::start(blueprint, registry, Arc::clone(&collector), store)
        .await
        .map_err(CliError::from)
        .context("Failed to start scheduler")?;

    info!("Pipeline running, press Ctrl+C to stop");
    let reason = supervise(&handle, args).await;
    match reason {
        StopReason::Signal => warn!("Received shutdown signal, stopping pipeline..."),
        StopReason::MaxRuntime => info!(max_runtime_secs = args.max_runtime, "Max runtime reached"),
    }

    let report = handle.shutdown().await;
    print_report(&collector, &report);

    if !report.graceful {
        warn!("Shutdown deadline reached, undelivered readings were dead-lettered");
    }
    info!("airq-ingest finished");
    Ok(())
}

/// Wait for a stop condition, logging status on the way
async fn supervise(handle: &SchedulerHandle, args: &RunArgs) -> StopReason {
    let max_runtime = async {
        if args.max_runtime == 0 {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(Duration::from_secs(args.max_runtime)).await;
    };
    tokio::pin!(max_runtime);

    let status_period = Duration::from_secs(args.status_interval.max(1));
    let mut status = tokio::time::interval_at(tokio::time::Instant::now() + status_period, status_period);
    let signal = shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            _ = &mut signal => return StopReason::Signal,
            _ = &mut max_runtime => return StopReason::MaxRuntime,
            _ = status.tick(), if args.status_interval > 0 => log_status(handle),
        }
    }
}

fn log_status(handle: &SchedulerHandle) {
    for s in handle.status() {
        info!(
            source_id = %s.source_id,
            state = ?s.state,
            consecutive_failures = s.consecutive_failures,
            accepted = s.readings_accepted,
            rejected = s.readings_rejected,
            duplicates = s.duplicates_suppressed,
            "Source status"
        );
    }
    let publisher = handle.publisher_metrics();
    info!(
        received = publisher.readings_received,
        batches = publisher.batches_sealed,
        intake_timeouts = publisher.intake_timeouts,
        "Publisher status"
    );
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_report(collector: &MetricsCollector, report: &ShutdownReport) {
    println!("\n{}", collector.summary());
    println!(
        "Publisher: received={} batches={} intake_timeouts={}",
        report.publisher.readings_received,
        report.publisher.batches_sealed,
        report.publisher.intake_timeouts
    );
    for (name, m) in &report.sinks {
        println!(
            "  sink {name}: batches={} readings={} failures={} retries={} dead_lettered={}",
            m.write_count, m.readings_written, m.failure_count, m.retry_count, m.dead_lettered
        );
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &IngestBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Sources ({}):", blueprint.sources.len());
    for source in &blueprint.sources {
        println!(
            "  - {} ({}) every {}s{}",
            source.id,
            source.source_type,
            source.interval_secs,
            if source.enabled { "" } else { " [disabled]" }
        );
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?}, {:?})", sink.name, sink.role, sink.sink_type);
        }
    }

    println!("\nDedup TTL: {}s", blueprint.effective_dedup_ttl().as_secs());
    println!(
        "Batching: {} readings / {} ms",
        blueprint.batch.max_size, blueprint.batch.max_wait_ms
    );
    println!();
}
