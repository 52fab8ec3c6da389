//! # Dispatcher
//!
//! 批量发布模块。
//!
//! 负责：
//! - 将通过校验的读数按大小/时间聚合为微批次
//! - Fan-out 到消息总线与时序库等 sinks，每个 sink 独立队列、独立重试
//! - 重试耗尽或关停超时的批次写入死信记录，隔离记录写入 quarantine

pub mod audit;
pub mod encode;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod publisher;
pub mod sinks;

pub use audit::{AuditLog, DeadLetterLog, JsonlLog, MemoryLog, QuarantineLog};
pub use contracts::{ReadingBatch, ReadingSink};
pub use error::DispatcherError;
pub use handle::{SinkHandle, SinkWorkerConfig};
pub use metrics::{MetricsSnapshot, PublisherMetrics, PublisherSnapshot, SinkMetrics};
pub use publisher::{
    PublisherBuilder, PublisherConfig, PublisherHandle, PublisherReport, ReadingSender,
    create_sink_handle,
};
pub use sinks::{FileSink, HttpBusSink, InfluxSink, LogSink, MemorySink};
