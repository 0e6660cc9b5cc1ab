//! Read-side data access
//!
//! Fetches lists, single leads and rollups through the backend and ingests
//! them into the cache (id normalization and list-shape detection happen in
//! [`EntityCache::set`](crate::cache::EntityCache::set)). Fresh entries are
//! served from the cache; stale or missing ones go to the backend.
//!
//! [`spawn_refetch_task`] listens to invalidation events and refetches the
//! stale keys of each announced group.

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{BackendResult, LeadBackend};
use crate::cache::{CacheGroup, CacheKey, CacheStore, CachedValue, ListQuery, View, FUNNEL, KPIS};
use crate::invalidation::InvalidationEvent;
use crate::types::{BackendError, Result};

/// Outcome of a refresh pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
}

pub struct LeadQueries<B: LeadBackend> {
    cache: CacheStore,
    backend: Arc<B>,
    fetches: AtomicU64,
}

impl<B: LeadBackend> LeadQueries<B> {
    pub fn new(cache: CacheStore, backend: Arc<B>) -> Self {
        Self {
            cache,
            backend,
            fetches: AtomicU64::new(0),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub async fn fetch_list(&self, query: ListQuery) -> Result<CachedValue> {
        self.load(CacheKey::lead_list(query)).await
    }

    pub async fn fetch_one(&self, id: &str) -> Result<CachedValue> {
        self.load(CacheKey::lead(id)).await
    }

    pub async fn fetch_kpis(&self) -> Result<CachedValue> {
        self.load(CacheKey::kpis()).await
    }

    pub async fn fetch_funnel(&self) -> Result<CachedValue> {
        self.load(CacheKey::funnel()).await
    }

    /// Cached value when fresh, otherwise fetch and ingest.
    pub async fn load(&self, key: CacheKey) -> Result<CachedValue> {
        if !self.cache.is_stale(&key) {
            if let Some(value) = self.cache.get(&key) {
                return Ok(value);
            }
        }
        self.refetch(key).await
    }

    /// Fetch from the backend regardless of cache state and ingest the result.
    pub async fn refetch(&self, key: CacheKey) -> Result<CachedValue> {
        let value = self.fetch_key(&key).await?;
        self.fetches.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Ingested backend response");
        self.cache.set(key.clone(), value);
        self.cache
            .entry(&key)
            .map(|entry| entry.value)
            .ok_or_else(|| BackendError::new(format!("Cache entry vanished for {key}")).into())
    }

    async fn fetch_key(&self, key: &CacheKey) -> BackendResult<Value> {
        match &key.view {
            View::Detail(id) => self.backend.fetch_one(id).await,
            View::List(query) => self.backend.fetch_list(query).await,
            View::Aggregate(name) if name == KPIS => self.backend.fetch_kpis().await,
            View::Aggregate(name) if name == FUNNEL => self.backend.fetch_funnel().await,
            View::Aggregate(name) => Err(BackendError::new(format!("Unknown aggregate: {name}"))),
        }
    }

    /// Refetch every stale key, or only those of `group`, concurrently.
    pub async fn refresh_stale(&self, group: Option<&CacheGroup>) -> RefreshSummary {
        let keys: Vec<CacheKey> = self
            .cache
            .stale_keys()
            .into_iter()
            .filter(|key| group.map_or(true, |g| &key.group() == g))
            .collect();

        let results = join_all(keys.iter().map(|key| self.refetch(key.clone()))).await;

        let mut summary = RefreshSummary::default();
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(_) => summary.refreshed += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(key = %key, error = %e, "Refetch failed, entry stays stale");
                }
            }
        }
        summary
    }

    /// Backend fetches performed so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

/// Refetch stale keys whenever a group is invalidated.
///
/// Runs until the invalidation channel closes. A lagging receiver falls back
/// to refreshing everything stale.
pub fn spawn_refetch_task<B>(
    queries: Arc<LeadQueries<B>>,
    mut events: broadcast::Receiver<InvalidationEvent>,
) -> JoinHandle<()>
where
    B: LeadBackend + 'static,
{
    tokio::spawn(async move {
        info!("Refetch task started");
        loop {
            let summary = match events.recv().await {
                Ok(event) => {
                    if event.marked == 0 {
                        continue;
                    }
                    queries.refresh_stale(Some(&event.group)).await
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Refetch task lagged behind invalidations");
                    queries.refresh_stale(None).await
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            debug!(refreshed = summary.refreshed, failed = summary.failed, "Refetch pass done");
        }
        info!("Refetch task stopped");
    })
}
