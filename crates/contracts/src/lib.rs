//! # Contracts
//!
//! Frozen interface contracts shared by every pipeline crate: data shapes,
//! configuration, error taxonomy and the adapter / sink / metadata traits.
//! Business crates depend on this crate only, never on each other's internals.
//!
//! ## Time Model
//! - Reading timestamps are UTC instants (`chrono::DateTime<Utc>`)
//! - TTLs, backoff and batch timers use the monotonic clock

mod adapter;
mod audit;
mod blueprint;
mod error;
mod raw;
mod reading;
mod retry;
mod sink;
mod status;

pub use adapter::{MetadataStore, SourceAdapter};
pub use audit::*;
pub use blueprint::*;
pub use error::*;
pub use raw::*;
pub use reading::*;
pub use retry::RetryPolicy;
pub use sink::*;
pub use status::*;
