//! Session wiring
//!
//! One [`LeadSession`] owns the cache for a user session and the components
//! that share it. Components are built around a single backend handle.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::backend::LeadBackend;
use crate::bulk::BulkOperationExecutor;
use crate::cache::{CacheStore, EntityCache};
use crate::config::CoreConfig;
use crate::invalidation::InvalidationScheduler;
use crate::mutation::MutationCoordinator;
use crate::query::{spawn_refetch_task, LeadQueries};

pub struct LeadSession<B: LeadBackend> {
    pub cache: CacheStore,
    pub invalidation: Arc<InvalidationScheduler>,
    pub queries: Arc<LeadQueries<B>>,
    pub mutations: MutationCoordinator<B>,
    pub bulk: BulkOperationExecutor<B>,
}

impl<B: LeadBackend + 'static> LeadSession<B> {
    pub fn new(backend: Arc<B>, config: &CoreConfig) -> Self {
        let cache = EntityCache::shared();
        let invalidation = Arc::new(InvalidationScheduler::with_capacity(
            cache.clone(),
            config.event_channel_capacity,
        ));

        info!(
            serialize_same_entity = config.mutation.serialize_same_entity,
            event_channel_capacity = config.event_channel_capacity,
            "Lead session created"
        );

        Self {
            queries: Arc::new(LeadQueries::new(cache.clone(), backend.clone())),
            mutations: MutationCoordinator::new(
                cache.clone(),
                backend.clone(),
                invalidation.clone(),
                config.mutation.clone(),
            ),
            bulk: BulkOperationExecutor::new(backend, invalidation.clone()),
            cache,
            invalidation,
        }
    }

    /// Start refetching stale keys in the background as they are invalidated.
    pub fn spawn_refetch(&self) -> JoinHandle<()> {
        spawn_refetch_task(self.queries.clone(), self.invalidation.subscribe())
    }
}
