//! Scheduler error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Publisher or sink setup failed
    #[error("publisher error: {0}")]
    Dispatcher(#[from] dispatcher::DispatcherError),

    #[error("no enabled sources configured")]
    NoSources,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
