//! Asset caching layer
//!
//! Concurrent store of immutable entries keyed by normalized path, with a
//! background sweeper evicting entries older than the configured TTL.

pub mod asset_cache;
pub mod store;
pub mod sweeper;

pub use asset_cache::{AssetCache, CacheOptions};
