//! 采集指标记录模块
//!
//! 对 `metrics` facade 的薄封装，统一指标名前缀 `airq_ingest_` 与标签。

use std::time::Duration;

use contracts::SourceState;
use metrics::{counter, gauge, histogram};

/// 单个采集周期的处理结果计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleCounts {
    /// 通过校验并进入发布的读数
    pub accepted: u64,
    /// 校验失败、写入 quarantine 的读数
    pub rejected: u64,
    /// transform 失败的原始记录
    pub malformed: u64,
    /// 被去重抑制的读数
    pub duplicates: u64,
}

impl CycleCounts {
    /// 本周期看到的记录总数
    pub fn total(&self) -> u64 {
        self.accepted + self.rejected + self.malformed + self.duplicates
    }
}

/// 状态机状态的数值编码（用于 gauge）
pub fn state_code(state: SourceState) -> f64 {
    match state {
        SourceState::Idle => 0.0,
        SourceState::Fetching => 1.0,
        SourceState::Processing => 2.0,
        SourceState::Backoff => 3.0,
        SourceState::Degraded => 4.0,
        SourceState::Stopped => 5.0,
    }
}

/// 记录数据源状态变化
pub fn record_source_state(source_id: &str, state: SourceState) {
    gauge!("airq_ingest_source_state", "source_id" => source_id.to_string()).set(state_code(state));
    gauge!("airq_ingest_source_degraded", "source_id" => source_id.to_string())
        .set(if state == SourceState::Degraded { 1.0 } else { 0.0 });
}

/// 记录一个成功周期
pub fn record_cycle(source_id: &str, counts: &CycleCounts, duration: Duration) {
    let source = source_id.to_string();
    counter!("airq_ingest_cycles_total", "source_id" => source.clone(), "outcome" => "ok")
        .increment(1);
    counter!("airq_ingest_readings_accepted_total", "source_id" => source.clone())
        .increment(counts.accepted);
    counter!("airq_ingest_readings_rejected_total", "source_id" => source.clone())
        .increment(counts.rejected);
    counter!("airq_ingest_records_malformed_total", "source_id" => source.clone())
        .increment(counts.malformed);
    counter!("airq_ingest_duplicates_suppressed_total", "source_id" => source.clone())
        .increment(counts.duplicates);
    histogram!("airq_ingest_cycle_duration_seconds", "source_id" => source)
        .record(duration.as_secs_f64());
}

/// 记录一个失败周期
pub fn record_cycle_failure(source_id: &str, kind: &str, consecutive_failures: u32) {
    counter!(
        "airq_ingest_cycles_total",
        "source_id" => source_id.to_string(),
        "outcome" => kind.to_string()
    )
    .increment(1);
    gauge!("airq_ingest_consecutive_failures", "source_id" => source_id.to_string())
        .set(consecutive_failures as f64);
}

/// 记录成功时间戳（unix 秒）
pub fn record_last_success(source_id: &str, unix_secs: i64) {
    gauge!("airq_ingest_last_success_timestamp_seconds", "source_id" => source_id.to_string())
        .set(unix_secs as f64);
    gauge!("airq_ingest_consecutive_failures", "source_id" => source_id.to_string()).set(0.0);
}

/// 记录去重表大小
pub fn record_dedup_entries(entries: usize) {
    gauge!("airq_ingest_dedup_entries").set(entries as f64);
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [120.0, 80.0, 100.0, 90.0, 110.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 100.0).abs() < 1e-10);
        assert!((stats.min() - 80.0).abs() < 1e-10);
        assert!((stats.max() - 120.0).abs() < 1e-10);
        assert!((stats.variance() - 250.0).abs() < 1e-10);
    }

    #[test]
    fn test_stats_summary_display() {
        assert_eq!(StatsSummary::default().to_string(), "N/A");

        let mut stats = RunningStats::default();
        stats.push(2.0);
        let text = StatsSummary::from(&stats).to_string();
        assert!(text.contains("n=1"));
    }

    #[test]
    fn test_cycle_counts_total() {
        let counts = CycleCounts {
            accepted: 3,
            rejected: 1,
            malformed: 1,
            duplicates: 2,
        };
        assert_eq!(counts.total(), 7);
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_source_state("s", SourceState::Degraded);
        record_cycle("s", &CycleCounts::default(), Duration::from_millis(5));
        record_cycle_failure("s", "upstream_unavailable", 2);
    }
}
