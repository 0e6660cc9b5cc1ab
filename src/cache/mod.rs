//! Entity cache layer
//!
//! - **keys**: logical view keys and their invalidation groups
//! - **view**: list-shape detection and the tagged cached value
//! - **store**: the shared keyed store with patch / snapshot / restore

pub mod keys;
pub mod store;
pub mod view;

pub use keys::{CacheGroup, CacheKey, ListQuery, View, FUNNEL, KPIS, LEADS};
pub use store::{CacheEntry, CacheStats, CacheStore, EntityCache, Snapshot};
pub use view::{CachedValue, ListShape, ListView};
