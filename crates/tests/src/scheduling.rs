//! Scheduler behaviour: backoff isolation, auth degradation, config refresh, shutdown

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use config_loader::StaticMetadataStore;
use contracts::{Cursor, DeadLetterRecord, FetchBatch, FetchError, QuarantineEntry, SourceState};
use dispatcher::{MemoryLog, MemorySink, PublisherBuilder, PublisherConfig};
use ingestion::ScriptedAdapter;
use scheduler::Scheduler;
use tokio::time::Instant;

use crate::support::{blueprint, pm25, registry, source, Harness};

#[tokio::test(start_paused = true)]
async fn test_auth_error_degrades_without_retry() {
    let adapter = Arc::new(
        ScriptedAdapter::new("clarity-east")
            .then_fail(FetchError::auth("clarity-east", 401))
            .otherwise(Ok(FetchBatch::empty())),
    );
    let mut bp = blueprint(vec![source("clarity-east", 10)]);
    bp.pipeline.config_refresh_secs = 5;
    let store = Arc::new(StaticMetadataStore::new(bp.sources.clone()));
    let harness = Harness::with_store(bp, registry(&[adapter.clone()]), Arc::clone(&store));

    // Several intervals pass; the degraded source is never polled again.
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(adapter.call_count(), 1);
    let status = harness.status("clarity-east");
    assert_eq!(status.state, SourceState::Degraded);
    assert!(status.last_error.as_deref().unwrap_or_default().contains("401"));

    // Rotated credentials arrive through the metadata store.
    assert!(store.update("clarity-east", |s| {
        s.params.insert("key_version".to_string(), "2".to_string());
    }));
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert!(adapter.call_count() >= 2);
    let status = harness.status("clarity-east");
    assert_ne!(status.state, SourceState::Degraded);
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.last_success_at.is_some());

    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_refresh_keeps_source_degraded() {
    let adapter = Arc::new(ScriptedAdapter::new("cl").otherwise(Err(FetchError::auth("cl", 403))));
    let mut bp = blueprint(vec![source("cl", 10)]);
    bp.pipeline.config_refresh_secs = 5;
    let store = Arc::new(StaticMetadataStore::new(bp.sources.clone()));
    let harness = Harness::with_store(bp, registry(&[adapter.clone()]), store);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(adapter.call_count(), 1);
    assert!(harness.status("cl").is_degraded());

    harness.handle.shutdown().await;
}

/// A failing source backs off on its own; its neighbour keeps its cadence
#[tokio::test(start_paused = true)]
async fn test_backoff_isolated_per_source() {
    let now = Utc::now();
    let flaky = Arc::new(
        ScriptedAdapter::new("flaky").otherwise(Err(FetchError::unavailable("flaky", "HTTP 503"))),
    );
    let steady = Arc::new(
        ScriptedAdapter::new("steady").then_readings(vec![pm25("s1", now, 9.0)], None),
    );
    let bp = blueprint(vec![source("flaky", 10), source("steady", 10)]);
    let harness = Harness::start(bp, registry(&[flaky.clone(), steady.clone()]));

    tokio::time::sleep(Duration::from_secs(65)).await;

    let calls = steady.calls();
    assert!(calls.len() >= 6, "steady polled {} times", calls.len());
    for pair in calls.windows(2) {
        let gap = pair[1].at - pair[0].at;
        assert!(gap >= Duration::from_secs(10) && gap < Duration::from_secs(11), "gap {gap:?}");
    }
    let steady_status = harness.status("steady");
    assert_eq!(steady_status.consecutive_failures, 0);
    assert_eq!(steady_status.readings_accepted, 1);

    let flaky_status = harness.status("flaky");
    assert!(flaky_status.consecutive_failures >= 2);
    assert!(flaky_status.last_success_at.is_none());
    assert_eq!(flaky_status.last_error.as_deref(), Some("upstream unavailable for source 'flaky': HTTP 503"));
    assert!(flaky.call_count() >= 6);

    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cursor_not_advanced_on_failure() {
    let now = Utc::now();
    let adapter = Arc::new(
        ScriptedAdapter::new("pa")
            .then_readings(vec![pm25("s1", now, 4.0)], Some("c1"))
            .then_fail(FetchError::unavailable("pa", "timeout"))
            .otherwise(Ok(FetchBatch::empty())),
    );
    let mut bp = blueprint(vec![source("pa", 10)]);
    bp.fetcher.retry.max_attempts = 1;
    let harness = Harness::start(bp, registry(&[adapter.clone()]));

    tokio::time::sleep(Duration::from_secs(35)).await;
    harness.handle.shutdown().await;

    let cursors: Vec<Option<Cursor>> = adapter.calls().into_iter().map(|c| c.cursor).collect();
    assert!(cursors.len() >= 3);
    assert_eq!(cursors[0], None);
    // The failed fetch and the one after it both resume from c1.
    assert_eq!(cursors[1], Some(Cursor::new("c1")));
    assert_eq!(cursors[2], Some(Cursor::new("c1")));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_adds_and_removes_sources() {
    let a = Arc::new(ScriptedAdapter::new("a"));
    let b = Arc::new(ScriptedAdapter::new("b"));
    let mut bp = blueprint(vec![source("a", 10)]);
    bp.pipeline.config_refresh_secs = 5;
    let store = Arc::new(StaticMetadataStore::new(bp.sources.clone()));
    let harness = Harness::with_store(bp, registry(&[a.clone(), b.clone()]), Arc::clone(&store));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(b.call_count(), 0);

    store.replace(vec![source("a", 10), source("b", 10)]);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(b.call_count(), 1);

    store.replace(vec![source("b", 10)]);
    tokio::time::sleep(Duration::from_secs(6)).await;
    let a_calls = a.call_count();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(a.call_count(), a_calls);

    let ids: Vec<String> = harness.handle.status().into_iter().map(|s| s.source_id).collect();
    assert_eq!(ids, ["b"]);

    harness.handle.shutdown().await;
}

/// A refresh that would push the dedup TTL below 2x the longest interval is
/// rejected and the running sources stay as they were
#[tokio::test(start_paused = true)]
async fn test_refresh_rejected_when_explicit_ttl_too_short() {
    let a = Arc::new(ScriptedAdapter::new("a"));
    let b = Arc::new(ScriptedAdapter::new("b"));
    let mut bp = blueprint(vec![source("a", 10)]);
    bp.pipeline.config_refresh_secs = 5;
    bp.dedup.ttl_secs = Some(120);
    let store = Arc::new(StaticMetadataStore::new(bp.sources.clone()));
    let harness = Harness::with_store(bp, registry(&[a.clone(), b.clone()]), Arc::clone(&store));

    // a slows to 600s: the 120s TTL no longer covers two polls.
    store.replace(vec![source("a", 600), source("b", 10)]);
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(b.call_count(), 0);
    assert!(a.call_count() >= 3, "a polled {} times", a.call_count());
    let ids: Vec<String> = harness.handle.status().into_iter().map(|s| s.source_id).collect();
    assert_eq!(ids, ["a"]);

    harness.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_refresh_rejected_when_default_ttl_would_be_capped() {
    let a = Arc::new(ScriptedAdapter::new("a"));
    let b = Arc::new(ScriptedAdapter::new("b"));
    let mut bp = blueprint(vec![source("a", 10)]);
    bp.pipeline.config_refresh_secs = 5;
    bp.dedup.max_ttl_secs = 300;
    let store = Arc::new(StaticMetadataStore::new(bp.sources.clone()));
    let harness = Harness::with_store(bp, registry(&[a.clone(), b.clone()]), Arc::clone(&store));

    store.replace(vec![source("a", 10), source("b", 600)]);
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(b.call_count(), 0);

    // Back within the cap, the same source is accepted.
    store.replace(vec![source("a", 10), source("b", 100)]);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(b.call_count(), 1);

    harness.handle.shutdown().await;
}

/// An in-flight fetch is abandoned at shutdown; nothing waits on it
#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_slow_fetch() {
    let now = Utc::now();
    let adapter = Arc::new(
        ScriptedAdapter::new("slow")
            .with_delay(Duration::from_secs(300))
            .then_readings(vec![pm25("s1", now, 4.0)], Some("c1")),
    );
    let mut bp = blueprint(vec![source("slow", 600)]);
    bp.fetcher.timeout_secs = 600;
    let harness = Harness::start(bp, registry(&[adapter.clone()]));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.status("slow").state, SourceState::Fetching);

    let started = Instant::now();
    let report = harness.handle.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(report.graceful);
    assert_eq!(report.sources[0].state, SourceState::Stopped);
    assert!(harness.sinks[0].readings().is_empty());
    assert!(harness.dead_letters.is_empty());
}

/// A stuck sink is cut off at the hard deadline and its batch dead-lettered
#[tokio::test(start_paused = true)]
async fn test_shutdown_deadline_dead_letters() {
    let now = Utc::now();
    let adapter = Arc::new(ScriptedAdapter::new("pa").then_readings(vec![pm25("s1", now, 4.0)], None));
    let mut bp = blueprint(vec![source("pa", 60)]);
    bp.pipeline.shutdown_deadline_secs = 2;
    bp.batch.max_wait_ms = 100;

    let quarantine = Arc::new(MemoryLog::<QuarantineEntry>::new("quarantine"));
    let dead_letters = Arc::new(MemoryLog::<DeadLetterRecord>::new("dead_letter"));
    let stuck = MemorySink::new("stuck").with_delay(Duration::from_secs(3_600));
    let publisher = PublisherBuilder::new(PublisherConfig::from(&bp.batch), bp.sink_retry, dead_letters.clone())
        .with_sink(stuck, 4)
        .spawn();
    let handle = Scheduler::new(bp, registry(&[adapter]), quarantine)
        .spawn(publisher)
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    let started = Instant::now();
    let report = handle.shutdown().await;

    assert!(!report.graceful);
    assert!(started.elapsed() <= Duration::from_secs(5));
    let dead = dead_letters.entries();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].sink, "stuck");
    assert_eq!(dead[0].readings[0].sensor_id, "s1");
    assert_eq!(report.sinks[0].1.dead_lettered, 1);
}
