pub mod memory;

use crate::core::{FetchResult, Protocol};
pub use memory::{CacheEntry, CacheStore};

/// The process-wide yield cache, keyed by protocol.
pub type YieldCache = CacheStore<Protocol, FetchResult>;
