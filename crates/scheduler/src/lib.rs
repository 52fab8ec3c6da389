//! # Scheduler
//!
//! Owns the polling cadence of every source. One task per source runs the
//! `Idle → Fetching → Processing → Idle` cycle on a shared, bounded worker
//! pool; failures back off locally and never delay another source.
//!
//! Shared mutable state (dedup set, cursors, sensor history) lives in
//! [`CoordinationState`] behind a single lock.
//!
//! ```ignore
//! let handle = Scheduler::new(blueprint, AdapterRegistry::with_defaults(), quarantine)
//!     .with_collector(collector)
//!     .spawn(publisher)?;
//! // ...
//! let report = handle.shutdown().await;
//! ```

mod coordination;
mod error;
mod pipeline;
mod scheduler;
mod worker;

pub use coordination::{Admitted, CoordinationState};
pub use error::{Result, SchedulerError};
pub use pipeline::{CycleWork, Pipeline};
pub use scheduler::{Scheduler, SchedulerHandle, ShutdownReport};
