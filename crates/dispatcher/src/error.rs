//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Publisher intake did not accept the reading in time
    #[error("publisher intake full, reading from sensor '{sensor_id}' not accepted within {timeout_ms}ms")]
    IntakeTimeout { sensor_id: String, timeout_ms: u64 },

    /// Publisher already shut down
    #[error("publisher is closed")]
    Closed,
}

impl DispatcherError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}
