//! Manufacturer adapter implementations

pub(crate) mod common;
mod clarity;
mod purpleair;

pub use clarity::ClarityAdapter;
pub use purpleair::PurpleAirAdapter;
