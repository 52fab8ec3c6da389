//! End-to-end: scripted upstream → scheduler → publisher → sinks

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use contracts::{
    FetchBatch, QuarantineKind, RawRecord, SinkConfig, SinkRole, SinkType, SourceState,
};
use ingestion::ScriptedAdapter;
use observability::MetricsCollector;
use scheduler::Scheduler;
use serde_json::json;

use crate::support::{blueprint, pm25, registry, source, Harness};

/// One cycle with every kind of record: accepted, rejected, malformed
#[tokio::test(start_paused = true)]
async fn test_e2e_mixed_batch() {
    let now = Utc::now();
    let adapter = Arc::new(
        ScriptedAdapter::new("mock-1")
            .then_readings(
                vec![
                    pm25("s-good", now, 12.0),
                    pm25("s-future", now + ChronoDuration::hours(1), 12.0),
                    pm25("s-range", now, 1500.0),
                    pm25("s-soft", now, 600.0),
                ],
                Some("c1"),
            ),
    );
    let harness = Harness::start(blueprint(vec![source("mock-1", 60)]), registry(&[adapter.clone()]));

    tokio::time::sleep(Duration::from_secs(1)).await;
    let report = harness.handle.shutdown().await;
    assert!(report.graceful);

    let published: Vec<String> = harness
        .sinks[0]
        .readings()
        .iter()
        .map(|r| r.sensor_id.clone())
        .collect();
    assert_eq!(published, ["s-good", "s-soft"]);

    let soft = harness.sinks[0]
        .readings()
        .into_iter()
        .find(|r| r.sensor_id == "s-soft")
        .unwrap();
    assert!(soft.quality_flags.validated);
    assert!(soft.quality_flags.anomaly_score >= 0.5);

    let quarantined = harness.quarantine.entries();
    assert_eq!(quarantined.len(), 2);
    assert_eq!(quarantined[0].sensor_id.as_deref(), Some("s-future"));
    assert_eq!(quarantined[0].reasons, ["Timestamp cannot be in the future"]);
    assert_eq!(quarantined[1].reasons, ["PM2.5 value 1500 out of range [0, 1000]"]);
    assert!(quarantined.iter().all(|q| q.kind == QuarantineKind::Rejected));

    let status = &report.sources[0];
    assert_eq!(status.readings_accepted, 2);
    assert_eq!(status.readings_rejected, 2);
    assert_eq!(status.state, SourceState::Stopped);
    assert_eq!(report.publisher.readings_received, 2);
}

#[tokio::test(start_paused = true)]
async fn test_e2e_malformed_records_quarantined() {
    let now = Utc::now();
    let good = pm25("s1", now, 8.0).into_record("mock-1");
    let no_sensor = RawRecord::new("mock-1", json!({"timestamp": now, "measurements": {"pm25": 3.0}}));
    let garbage = RawRecord::new("mock-1", json!("not an object"));

    let adapter = Arc::new(ScriptedAdapter::new("mock-1").then_batch(vec![no_sensor, good, garbage], None));
    let harness = Harness::start(blueprint(vec![source("mock-1", 60)]), registry(&[adapter]));

    tokio::time::sleep(Duration::from_secs(1)).await;
    let report = harness.handle.shutdown().await;

    assert_eq!(harness.sinks[0].readings().len(), 1);
    let quarantined = harness.quarantine.entries();
    assert_eq!(quarantined.len(), 2);
    assert!(quarantined.iter().all(|q| q.kind == QuarantineKind::Malformed));
    assert!(quarantined.iter().all(|q| q.sensor_id.is_none()));
    assert_eq!(quarantined[1].raw_payload, json!("not an object"));
    assert_eq!(report.sources[0].malformed_records, 2);
}

/// 250 readings in one cycle seal as 100 + 100 + 50
#[tokio::test(start_paused = true)]
async fn test_e2e_batch_boundaries() {
    let now = Utc::now();
    let readings = (0..250).map(|i| pm25(&format!("s{i:03}"), now, 10.0)).collect();
    let adapter = Arc::new(ScriptedAdapter::new("bulk").then_readings(readings, None));
    let harness = Harness::start(blueprint(vec![source("bulk", 60)]), registry(&[adapter]));

    // Past max_wait so the tail batch seals on its timer.
    tokio::time::sleep(Duration::from_secs(6)).await;
    let sizes: Vec<usize> = harness.sinks[0].batches().iter().map(|b| b.len()).collect();
    assert_eq!(sizes, [100, 100, 50]);

    let report = harness.handle.shutdown().await;
    assert_eq!(report.publisher.batches_sealed, 3);
    assert_eq!(report.sinks[0].1.readings_written, 250);
}

/// Same reading every cycle: suppressed within the TTL, published again after
#[tokio::test(start_paused = true)]
async fn test_e2e_dedup_ttl() {
    let now = Utc::now();
    let record = pm25("s1", now, 20.0).into_record("repeat");
    let adapter = Arc::new(
        ScriptedAdapter::new("repeat").otherwise(Ok(FetchBatch::new(vec![record], None))),
    );
    let mut bp = blueprint(vec![source("repeat", 60)]);
    bp.dedup.ttl_secs = Some(90);
    let harness = Harness::start(bp, registry(&[adapter.clone()]));

    // Cycles at 0s, 60s (duplicate) and 120s (expired, published again).
    tokio::time::sleep(Duration::from_secs(150)).await;
    assert_eq!(adapter.call_count(), 3);
    let report = harness.handle.shutdown().await;

    assert_eq!(harness.sinks[0].readings().len(), 2);
    assert_eq!(report.sources[0].duplicates_suppressed, 1);
    assert_eq!(report.sources[0].readings_accepted, 2);
}

/// A failing sink dead-letters; the healthy sink still gets everything
#[tokio::test(start_paused = true)]
async fn test_e2e_failing_sink_isolated() {
    let now = Utc::now();
    let adapter = Arc::new(ScriptedAdapter::new("pa").then_readings(
        vec![pm25("s1", now, 5.0), pm25("s2", now, 6.0)],
        None,
    ));
    let mut bp = blueprint(vec![source("pa", 60)]);
    bp.sink_retry.max_attempts = 2;
    let harness = Harness::build(bp, registry(&[adapter]), None, &["bus", "tsdb"]);
    harness.sinks[1].set_failing(true);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let report = harness.handle.shutdown().await;

    assert_eq!(harness.sinks[0].readings().len(), 2);
    assert!(harness.sinks[1].readings().is_empty());

    let dead = harness.dead_letters.entries();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].sink, "tsdb");
    assert_eq!(dead[0].source_id, "pa");
    assert_eq!(dead[0].attempts, 2);
    assert_eq!(dead[0].readings.len(), 2);

    let (name, tsdb) = &report.sinks[1];
    assert_eq!(name, "tsdb");
    assert_eq!(tsdb.dead_lettered, 1);
}

/// Blueprint-driven start: file sink and JSONL audit logs on disk
#[tokio::test]
async fn test_e2e_file_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out/readings.jsonl");
    let now = Utc::now();

    let adapter = Arc::new(ScriptedAdapter::new("pa").then_readings(
        vec![pm25("s1", now, 5.0), pm25("s2", now, 1500.0)],
        None,
    ));
    let mut bp = blueprint(vec![source("pa", 60)]);
    bp.batch.max_wait_ms = 50;
    bp.audit.quarantine_path = dir.path().join("audit/quarantine.jsonl");
    bp.audit.dead_letter_path = dir.path().join("audit/dead_letter.jsonl");
    bp.sinks.push(SinkConfig {
        name: "bus-file".to_string(),
        role: SinkRole::MessageBus,
        sink_type: SinkType::File,
        queue_capacity: 8,
        params: HashMap::from([("path".to_string(), out.display().to_string())]),
    });

    let collector = Arc::new(MetricsCollector::new());
    let handle = Scheduler::start(bp, registry(&[adapter]), Arc::clone(&collector), None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let report = handle.shutdown().await;
    assert!(report.graceful);

    let written = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<serde_json::Value> = written
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 1);

    let quarantine = std::fs::read_to_string(dir.path().join("audit/quarantine.jsonl")).unwrap();
    assert_eq!(quarantine.lines().count(), 1);
    assert!(quarantine.contains("out of range"));
    assert!(!dir.path().join("audit/dead_letter.jsonl").exists());

    assert_eq!(collector.summary().readings_accepted, 1);
}
