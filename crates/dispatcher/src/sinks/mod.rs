//! Sink implementations
//!
//! Contains LogSink, FileSink, HttpBusSink, InfluxSink and MemorySink.

mod file;
mod http;
mod influx;
mod log;
mod memory;

pub use self::file::{FileFormat, FileSink, FileSinkConfig};
pub use self::http::{HttpBusConfig, HttpBusSink};
pub use self::influx::{InfluxConfig, InfluxSink};
pub use self::log::LogSink;
pub use self::memory::MemorySink;
