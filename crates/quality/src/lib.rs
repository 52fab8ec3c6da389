//! # Quality
//!
//! 读数质量控制：校验、异常评分、去重。
//!
//! 负责：
//! - `Validator`: 必填字段 / 坐标 / 时间戳 / 量程校验，收集全部问题
//! - `AnomalyScorer`: 软阈值 + 变化率评分
//! - `Deduplicator`: `(sensor_id, 时间桶)` TTL 去重
//! - `SensorHistory`: 变化率评分所需的每传感器上一条读数
//!
//! 全部为同步纯逻辑，由调度器在持锁区间内驱动。
//!
//! ## 使用示例
//!
//! ```ignore
//! use quality::{AnomalyScorer, Deduplicator, SensorHistory, Validator};
//!
//! let (reading, report) = validator.validate(reading, Utc::now());
//! if report.accepted() {
//!     let score = scorer.score(&reading, history.prior(&reading.sensor_id));
//!     let reading = reading.with_anomaly_score(score);
//!     if dedup.should_publish(&reading, resolution, Instant::now()) {
//!         // publish
//!     }
//! }
//! ```

mod dedup;
mod history;
pub mod ranges;
mod scorer;
mod validator;

// Re-exports
pub use dedup::{DedupKey, DedupStats, Deduplicator};
pub use history::{PriorReading, SensorHistory};
pub use scorer::AnomalyScorer;
pub use validator::{ValidationReport, Validator};
