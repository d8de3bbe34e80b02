//! Time-series store SDK
//!
//! Provides the store contract used by the sentiment pipeline together with
//! two backends: a client for Redis with the RedisTimeSeries module, and
//! an in-memory store with the same duplicate, bucketing and compaction
//! semantics.

mod client;
mod error;
mod memory;
mod store;
mod types;

pub use client::{ClientOptions, RedisTsClient};
pub use error::{Result, TsdbError};
pub use memory::MemoryStore;
pub use store::{open, KeyValueStore, Store, TimeSeriesStore};
pub use types::*;
