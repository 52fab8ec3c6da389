//! LogSink - logs batch summary via tracing

use contracts::{ContractError, ReadingBatch, ReadingSink, SinkRole};
use tracing::{debug, info, instrument};

/// Sink that logs batch summaries for debugging and dry runs
pub struct LogSink {
    name: String,
    role: SinkRole,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>, role: SinkRole) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }

    fn log_batch_summary(&self, batch: &ReadingBatch) {
        let sources = batch.by_source();
        let max_score = batch
            .readings
            .iter()
            .map(|r| r.quality_flags.anomaly_score)
            .fold(0.0, f64::max);

        info!(
            sink = %self.name,
            role = ?self.role,
            batch_id = batch.batch_id,
            readings = batch.len(),
            sources = sources.len(),
            max_anomaly_score = max_score,
            "ReadingBatch received"
        );
        for reading in &batch.readings {
            debug!(
                sink = %self.name,
                sensor_id = %reading.sensor_id,
                timestamp = %reading.timestamp,
                measurements = ?reading.measurements,
                "reading"
            );
        }
    }
}

impl ReadingSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, batch),
        fields(sink = %self.name, batch_id = batch.batch_id)
    )]
    async fn write_batch(&mut self, batch: &ReadingBatch) -> Result<(), ContractError> {
        self.log_batch_summary(batch);
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sink_write() {
        let mut sink = LogSink::new("test_log", SinkRole::MessageBus);
        let batch = ReadingBatch::new(1, vec![]);
        assert!(sink.write_batch(&batch).await.is_ok());
        assert_eq!(sink.name(), "test_log");
    }
}
