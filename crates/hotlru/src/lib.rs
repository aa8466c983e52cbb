//! # hotlru
//!
//! Fixed-capacity, thread-safe LRU cache for bounding hot in-memory data.
//!
//! ## Architecture
//! - **Index**: AHash map from key to arena slot (O(1))
//! - **Recency list**: doubly-linked list threaded through the arena by slot
//!   index, bounded by two sentinel slots (O(1) touch and eviction)
//! - **Guard**: a single `parking_lot::RwLock` over index and list together
//!
//! Evicted entries are handed back to the caller synchronously, from
//! [`Lru::set_evicted`] and [`Lru::resize`].

#![warn(missing_docs)]

mod cache;
mod error;
mod lru;
mod stats;

pub use cache::{Lru, DEFAULT_SIZE};
pub use error::{Error, Result};
pub use stats::CacheStats;
