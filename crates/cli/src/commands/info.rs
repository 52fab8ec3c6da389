//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::IngestBlueprint;
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    pipeline: PipelineInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sources: Vec<SourceInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct PipelineInfo {
    source_count: usize,
    enabled_sources: usize,
    max_workers: usize,
    dedup_ttl_secs: u64,
    batch_max_size: usize,
    batch_max_wait_ms: u64,
    shutdown_deadline_secs: u64,
}

#[derive(Serialize)]
struct SourceInfo {
    id: String,
    source_type: String,
    interval_secs: u64,
    enabled: bool,
    concurrency: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    credentials_env: Option<String>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    role: String,
    sink_type: String,
    queue_capacity: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &IngestBlueprint, args: &InfoArgs) -> ConfigInfo {
    let sources = if args.sources {
        blueprint
            .sources
            .iter()
            .map(|s| SourceInfo {
                id: s.id.clone(),
                source_type: s.source_type.clone(),
                interval_secs: s.interval_secs,
                enabled: s.enabled,
                concurrency: s.concurrency,
                credentials_env: s.credentials_env.clone(),
                params: s.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                role: format!("{:?}", s.role),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        pipeline: PipelineInfo {
            source_count: blueprint.sources.len(),
            enabled_sources: blueprint.enabled_sources().count(),
            max_workers: blueprint.pipeline.max_workers,
            dedup_ttl_secs: blueprint.effective_dedup_ttl().as_secs(),
            batch_max_size: blueprint.batch.max_size,
            batch_max_wait_ms: blueprint.batch.max_wait_ms,
            shutdown_deadline_secs: blueprint.pipeline.shutdown_deadline_secs,
        },
        sources,
        sinks,
    }
}

fn print_config_info(blueprint: &IngestBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               airq-ingest Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let p = &blueprint.pipeline;
    println!("⚙️  Pipeline");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Workers: {}", p.max_workers);
    println!(
        "   ├─ Staleness: {}s, clock skew: {}s",
        p.staleness_secs, p.max_clock_skew_secs
    );
    println!(
        "   ├─ Dedup TTL: {}s (max {} entries)",
        blueprint.effective_dedup_ttl().as_secs(),
        blueprint.dedup.max_entries
    );
    println!(
        "   ├─ Batching: {} readings / {} ms",
        blueprint.batch.max_size, blueprint.batch.max_wait_ms
    );
    println!("   └─ Config refresh: every {}s", p.config_refresh_secs);

    println!(
        "\n📡 Sources ({}, {} enabled)",
        blueprint.sources.len(),
        blueprint.enabled_sources().count()
    );
    for (i, source) in blueprint.sources.iter().enumerate() {
        let is_last = i == blueprint.sources.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        let disabled = if source.enabled { "" } else { " [disabled]" };
        println!(
            "   {} {} ({}, every {}s){}",
            prefix, source.id, source.source_type, source.interval_secs, disabled
        );
        if args.sources {
            if let Some(env) = &source.credentials_env {
                println!("   {}  ├─ credentials: ${}", child_prefix, env);
            }
            if let Some(endpoint) = &source.endpoint {
                println!("   {}  ├─ endpoint: {}", child_prefix, endpoint);
            }
            println!(
                "   {}  └─ concurrency: {}, resolution: {}s",
                child_prefix, source.concurrency, source.reporting_resolution_secs
            );
        }
    }

    if !blueprint.sinks.is_empty() {
        println!("\n📤 Sinks ({})", blueprint.sinks.len());
        for (i, sink) in blueprint.sinks.iter().enumerate() {
            let is_last = i == blueprint.sinks.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            if args.sinks {
                println!(
                    "   {} {} ({:?} → {:?}, queue {})",
                    prefix, sink.name, sink.sink_type, sink.role, sink.queue_capacity
                );
            } else {
                println!("   {} {} ({:?})", prefix, sink.name, sink.sink_type);
            }
        }
    }

    println!();
}
