//! Invalidation scheduler
//!
//! Marks cache groups stale once a mutation has been confirmed, and announces
//! each marking on a broadcast channel. Whoever owns a query (see
//! [`crate::query`]) listens and refetches; groups are independent and no
//! ordering between them is promised.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

use crate::cache::{CacheGroup, CacheStore};

/// Default capacity of the invalidation channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A group was marked stale
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationEvent {
    pub group: CacheGroup,
    /// Number of cached keys that were marked
    pub marked: usize,
    pub at: DateTime<Utc>,
}

pub struct InvalidationScheduler {
    cache: CacheStore,
    events_tx: broadcast::Sender<InvalidationEvent>,
    marked_total: AtomicU64,
}

impl InvalidationScheduler {
    pub fn new(cache: CacheStore) -> Self {
        Self::with_capacity(cache, DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(cache: CacheStore, capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            cache,
            events_tx,
            marked_total: AtomicU64::new(0),
        }
    }

    /// Subscribe to invalidation events
    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationEvent> {
        self.events_tx.subscribe()
    }

    /// Mark one group stale and announce it.
    ///
    /// Announced even when nothing is cached for the group, so a collaborator
    /// with an in-flight fetch still learns its result is outdated.
    pub fn mark_stale(&self, group: CacheGroup) -> usize {
        let marked = self.cache.mark_stale(&group);
        self.marked_total.fetch_add(marked as u64, Ordering::Relaxed);
        debug!(group = %group, marked = marked, "Cache group marked stale");

        // No subscribers is fine.
        let _ = self.events_tx.send(InvalidationEvent {
            group,
            marked,
            at: Utc::now(),
        });
        marked
    }

    /// Groups touched by a confirmed single-lead mutation
    pub fn after_update(&self, lead_id: &str) {
        self.mark_stale(CacheGroup::LeadLists);
        self.mark_stale(CacheGroup::LeadDetail(lead_id.to_string()));
        self.mark_stale(CacheGroup::KpiAggregates);
    }

    /// Groups touched by a confirmed bulk operation.
    ///
    /// Detail views are left alone; bulk paths never resolve ids to them.
    pub fn after_bulk(&self) {
        self.mark_stale(CacheGroup::LeadLists);
        self.mark_stale(CacheGroup::KpiAggregates);
    }

    /// Total keys marked since creation
    pub fn marked_total(&self) -> u64 {
        self.marked_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, EntityCache, ListQuery};
    use serde_json::json;

    fn seeded() -> CacheStore {
        let cache = EntityCache::shared();
        cache.set(CacheKey::lead("L1"), json!({"id": "L1"}));
        cache.set(CacheKey::lead("L2"), json!({"id": "L2"}));
        cache.set(CacheKey::lead_list(ListQuery::new()), json!([]));
        cache.set(CacheKey::kpis(), json!({}));
        cache.set(CacheKey::funnel(), json!({}));
        cache
    }

    #[test]
    fn test_after_update_groups() {
        let cache = seeded();
        let scheduler = InvalidationScheduler::new(cache.clone());
        scheduler.after_update("L1");

        assert!(cache.is_stale(&CacheKey::lead("L1")));
        assert!(cache.is_stale(&CacheKey::lead_list(ListQuery::new())));
        assert!(cache.is_stale(&CacheKey::kpis()));
        assert!(!cache.is_stale(&CacheKey::lead("L2")));
        assert!(!cache.is_stale(&CacheKey::funnel()));
        assert_eq!(scheduler.marked_total(), 3);
    }

    #[test]
    fn test_after_bulk_skips_details() {
        let cache = seeded();
        let scheduler = InvalidationScheduler::new(cache.clone());
        scheduler.after_bulk();

        assert!(!cache.is_stale(&CacheKey::lead("L1")));
        assert!(cache.is_stale(&CacheKey::lead_list(ListQuery::new())));
        assert!(cache.is_stale(&CacheKey::kpis()));
    }

    #[tokio::test]
    async fn test_events_broadcast() {
        let cache = seeded();
        let scheduler = InvalidationScheduler::new(cache);
        let mut rx = scheduler.subscribe();

        scheduler.after_bulk();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.group, CacheGroup::LeadLists);
        assert_eq!(first.marked, 1);
        assert_eq!(second.group, CacheGroup::KpiAggregates);
    }

    #[test]
    fn test_mark_without_subscribers_or_entries() {
        let scheduler = InvalidationScheduler::new(EntityCache::shared());
        assert_eq!(scheduler.mark_stale(CacheGroup::FunnelAggregates), 0);
    }
}
