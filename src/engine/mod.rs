//! Time-series storage behind a pluggable trait
//!
//! - [`TimeSeriesStore`]: append / range-query / cleanup contract
//! - [`MemoryStore`]: in-memory implementation with a postings index
//! - [`LabelMatcher`]: exact or regex selection on one label

pub mod memory;
pub mod traits;

pub use memory::{MemoryStore, MemoryStoreConfig, DEFAULT_RETENTION};
pub use traits::{LabelMatcher, MatchMode, Series, StoreStats, TimeSeriesStore};
