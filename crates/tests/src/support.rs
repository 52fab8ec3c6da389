//! 测试夹具：scripted 数据源 + 内存 sink / 审计日志

use std::sync::Arc;

use chrono::{DateTime, Utc};
use config_loader::StaticMetadataStore;
use contracts::{
    DeadLetterRecord, IngestBlueprint, QuarantineEntry, SourceAdapter, SourceConfig, SourceStatus,
};
use dispatcher::{MemoryLog, MemorySink, PublisherBuilder, PublisherConfig};
use ingestion::{AdapterRegistry, MockReading, ScriptedAdapter};
use scheduler::{Scheduler, SchedulerHandle};

pub const SCRIPTED: &str = "scripted";

/// Registry whose `scripted` type hands out pre-built adapters by source id
pub fn registry(adapters: &[Arc<ScriptedAdapter>]) -> AdapterRegistry {
    let adapters: Vec<Arc<ScriptedAdapter>> = adapters.to_vec();
    let mut registry = AdapterRegistry::new();
    registry.register(SCRIPTED, move |source: &SourceConfig| {
        let adapter = adapters
            .iter()
            .find(|a| a.source_id() == source.id)
            .cloned()
            .ok_or_else(|| ingestion::IngestionError::UnknownSourceType {
                source_id: source.id.clone(),
                source_type: SCRIPTED.to_string(),
            })?;
        Ok(adapter as Arc<dyn SourceAdapter>)
    });
    registry
}

pub fn source(id: &str, interval_secs: u64) -> SourceConfig {
    SourceConfig::new(id, SCRIPTED, interval_secs)
}

pub fn blueprint(sources: Vec<SourceConfig>) -> IngestBlueprint {
    IngestBlueprint {
        sources,
        ..Default::default()
    }
}

/// PM2.5 reading at a fixed location
pub fn pm25(sensor_id: &str, timestamp: DateTime<Utc>, value: f64) -> MockReading {
    MockReading::new(sensor_id, timestamp)
        .at(47.61, -122.33)
        .with("pm25", value)
}

fn no_jitter() -> f64 {
    0.0
}

/// A running scheduler wired to in-memory outputs
pub struct Harness {
    pub handle: SchedulerHandle,
    pub sinks: Vec<MemorySink>,
    pub quarantine: Arc<MemoryLog<QuarantineEntry>>,
    pub dead_letters: Arc<MemoryLog<DeadLetterRecord>>,
}

impl Harness {
    pub fn start(blueprint: IngestBlueprint, registry: AdapterRegistry) -> Self {
        Self::build(blueprint, registry, None, &["bus"])
    }

    pub fn with_store(
        blueprint: IngestBlueprint,
        registry: AdapterRegistry,
        store: Arc<StaticMetadataStore>,
    ) -> Self {
        Self::build(blueprint, registry, Some(store), &["bus"])
    }

    pub fn build(
        blueprint: IngestBlueprint,
        registry: AdapterRegistry,
        store: Option<Arc<StaticMetadataStore>>,
        sink_names: &[&str],
    ) -> Self {
        let quarantine = Arc::new(MemoryLog::<QuarantineEntry>::new("quarantine"));
        let dead_letters = Arc::new(MemoryLog::<DeadLetterRecord>::new("dead_letter"));

        let sinks: Vec<MemorySink> = sink_names.iter().map(|name| MemorySink::new(*name)).collect();
        let mut builder = PublisherBuilder::new(
            PublisherConfig::from(&blueprint.batch),
            blueprint.sink_retry,
            dead_letters.clone(),
        );
        for sink in &sinks {
            builder = builder.with_sink(sink.clone(), 64);
        }
        let publisher = builder.spawn();

        let mut scheduler =
            Scheduler::new(blueprint, registry, quarantine.clone()).with_jitter(no_jitter);
        if let Some(store) = store {
            scheduler = scheduler.with_metadata_store(store);
        }
        let handle = scheduler.spawn(publisher).unwrap();

        Self {
            handle,
            sinks,
            quarantine,
            dead_letters,
        }
    }

    pub fn status(&self, source_id: &str) -> SourceStatus {
        self.handle.collector().status(source_id).unwrap()
    }
}
