//! 数据源状态收集器
//!
//! 由调度器持有，按 source 汇总状态与计数；每次更新同时写入 metrics facade。

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use contracts::{SourceState, SourceStatus};

use crate::metrics::{self, CycleCounts, RunningStats, StatsSummary};

#[derive(Debug, Default)]
struct SourceEntry {
    status: SourceStatus,
    cycle_ms: RunningStats,
}

/// Per-source ingestion status surface
#[derive(Debug, Default)]
pub struct MetricsCollector {
    sources: Mutex<BTreeMap<String, SourceEntry>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, SourceEntry>> {
        self.sources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_entry<R>(&self, source_id: &str, f: impl FnOnce(&mut SourceEntry) -> R) -> R {
        let mut sources = self.lock();
        let entry = sources
            .entry(source_id.to_string())
            .or_insert_with(|| SourceEntry {
                status: SourceStatus::new(source_id),
                ..Default::default()
            });
        f(entry)
    }

    /// 注册数据源（已存在时不重置计数）
    pub fn register(&self, source_id: &str) {
        self.with_entry(source_id, |_| ());
        metrics::record_source_state(source_id, SourceState::Idle);
    }

    /// 删除已移出配置的数据源
    pub fn remove(&self, source_id: &str) -> bool {
        self.lock().remove(source_id).is_some()
    }

    pub fn set_state(&self, source_id: &str, state: SourceState) {
        self.with_entry(source_id, |e| e.status.state = state);
        metrics::record_source_state(source_id, state);
    }

    /// 周期成功：重置连续失败并累加计数
    pub fn record_success(&self, source_id: &str, counts: &CycleCounts, duration: Duration) {
        let now = Utc::now();
        self.with_entry(source_id, |e| {
            let s = &mut e.status;
            s.last_success_at = Some(now);
            s.consecutive_failures = 0;
            s.readings_accepted += counts.accepted;
            s.readings_rejected += counts.rejected;
            s.malformed_records += counts.malformed;
            s.duplicates_suppressed += counts.duplicates;
            e.cycle_ms.push(duration.as_secs_f64() * 1000.0);
        });
        metrics::record_cycle(source_id, counts, duration);
        metrics::record_last_success(source_id, now.timestamp());
    }

    /// 周期失败，返回连续失败次数
    pub fn record_failure(&self, source_id: &str, kind: &str, error: &str) -> u32 {
        let now = Utc::now();
        let failures = self.with_entry(source_id, |e| {
            let s = &mut e.status;
            s.last_error_at = Some(now);
            s.last_error = Some(error.to_string());
            s.consecutive_failures = s.consecutive_failures.saturating_add(1);
            s.consecutive_failures
        });
        metrics::record_cycle_failure(source_id, kind, failures);
        failures
    }

    /// 认证失败：标记 degraded
    pub fn mark_degraded(&self, source_id: &str, error: &str) {
        self.record_failure(source_id, "upstream_auth_error", error);
        self.set_state(source_id, SourceState::Degraded);
    }

    /// 配置刷新后解除 degraded
    pub fn clear_degraded(&self, source_id: &str) -> bool {
        let cleared = self.with_entry(source_id, |e| {
            if e.status.state != SourceState::Degraded {
                return false;
            }
            e.status.state = SourceState::Idle;
            e.status.consecutive_failures = 0;
            true
        });
        if cleared {
            metrics::record_source_state(source_id, SourceState::Idle);
        }
        cleared
    }

    pub fn status(&self, source_id: &str) -> Option<SourceStatus> {
        self.lock().get(source_id).map(|e| e.status.clone())
    }

    /// 所有数据源状态（按 id 排序）
    pub fn snapshot(&self) -> Vec<SourceStatus> {
        self.lock().values().map(|e| e.status.clone()).collect()
    }

    pub fn summary(&self) -> IngestionSummary {
        let sources = self.lock();
        let mut summary = IngestionSummary::default();
        for entry in sources.values() {
            let s = &entry.status;
            summary.readings_accepted += s.readings_accepted;
            summary.readings_rejected += s.readings_rejected;
            summary.malformed_records += s.malformed_records;
            summary.duplicates_suppressed += s.duplicates_suppressed;
            if s.is_degraded() {
                summary.degraded_sources += 1;
            }
            summary.sources.push(SourceSummary {
                status: s.clone(),
                cycle_ms: StatsSummary::from(&entry.cycle_ms),
            });
        }
        summary
    }
}

/// 单个数据源摘要
#[derive(Debug, Clone)]
pub struct SourceSummary {
    pub status: SourceStatus,
    pub cycle_ms: StatsSummary,
}

/// 运行摘要
#[derive(Debug, Clone, Default)]
pub struct IngestionSummary {
    pub readings_accepted: u64,
    pub readings_rejected: u64,
    pub malformed_records: u64,
    pub duplicates_suppressed: u64,
    pub degraded_sources: usize,
    pub sources: Vec<SourceSummary>,
}

fn fmt_time(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Ingestion Summary ===")?;
        writeln!(
            f,
            "Accepted: {}  Rejected: {}  Malformed: {}  Duplicates: {}",
            self.readings_accepted,
            self.readings_rejected,
            self.malformed_records,
            self.duplicates_suppressed
        )?;
        if self.degraded_sources > 0 {
            writeln!(f, "Degraded sources: {}", self.degraded_sources)?;
        }
        for source in &self.sources {
            let s = &source.status;
            writeln!(
                f,
                "  {} [{:?}] ok={} err={} failures={} accepted={} rejected={}",
                s.source_id,
                s.state,
                fmt_time(s.last_success_at),
                fmt_time(s.last_error_at),
                s.consecutive_failures,
                s.readings_accepted,
                s.readings_rejected
            )?;
            if let Some(err) = &s.last_error {
                writeln!(f, "    last error: {err}")?;
            }
            writeln!(f, "    cycle ms: {}", source.cycle_ms)?;
        }
        Ok(())
    }
}
