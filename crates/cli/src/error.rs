//! Error types for CLI operations.

use contracts::ContractError;
use scheduler::SchedulerError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Parse or validation failure from the loader
    #[error("Invalid configuration: {0}")]
    Config(#[from] ContractError),

    /// Sources whose adapter cannot be built
    #[error("{count} source(s) cannot be started: {details}")]
    SourceSetup { count: usize, details: String },

    /// Scheduler failed to start
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn source_setup(problems: &[String]) -> Self {
        Self::SourceSetup {
            count: problems.len(),
            details: problems.join("; "),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
