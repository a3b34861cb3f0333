//! Core business logic abstractions

pub mod allocation;
pub mod cache;
pub mod config;
pub mod fx;
pub mod log;
pub mod market;

// Re-export main types for cleaner imports
pub use allocation::{Allocation, AllocationError, AllocationRow, allocate};
pub use fx::{FxProvider, FxResolver, RateResult, RateSource};
pub use market::{Instrument, MarketDataProvider};
