//! Versioned response caching for offline support.
//!
//! This module provides a generation-based request cache that:
//! - Keeps named cache stores, one per generation tag
//! - Maps request identity (method + URL) to response snapshots
//! - Resolves requests cache-first and writes network results back in the background

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, CachedResponse, SqliteStorage};
pub use traits::{CacheResult, CacheSource, RequestKey};
