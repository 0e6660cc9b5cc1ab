//! Bulk operations over the current selection
//!
//! A bulk assign or delete sends the whole selected id set in one backend
//! request. Nothing is patched optimistically: the cache changes only through
//! invalidation once the backend confirms, and the backend's count is reported
//! as-is (it may be lower than the selection size).
//!
//! An empty selection or a blank agent name is a local no-op: no backend call,
//! no state change.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::LeadBackend;
use crate::invalidation::InvalidationScheduler;
use crate::selection::SelectionSet;
use crate::types::Result;

/// Why a bulk operation did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptySelection,
    MissingAgent,
}

/// Result of a bulk operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BulkOutcome {
    Skipped { reason: SkipReason },
    Assigned { updated: u64 },
    Deleted { deleted: u64 },
}

impl BulkOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, BulkOutcome::Skipped { .. })
    }

    /// Count confirmed by the backend (0 when skipped)
    pub fn affected(&self) -> u64 {
        match self {
            BulkOutcome::Skipped { .. } => 0,
            BulkOutcome::Assigned { updated } => *updated,
            BulkOutcome::Deleted { deleted } => *deleted,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkStats {
    pub skipped: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    skipped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

pub struct BulkOperationExecutor<B: LeadBackend> {
    backend: Arc<B>,
    invalidation: Arc<InvalidationScheduler>,
    counters: Counters,
}

impl<B: LeadBackend> BulkOperationExecutor<B> {
    pub fn new(backend: Arc<B>, invalidation: Arc<InvalidationScheduler>) -> Self {
        Self {
            backend,
            invalidation,
            counters: Counters::default(),
        }
    }

    fn skip(&self, operation: &str, reason: SkipReason) -> Result<BulkOutcome> {
        self.counters.skipped.fetch_add(1, Ordering::Relaxed);
        debug!(operation = operation, reason = ?reason, "Bulk operation skipped");
        Ok(BulkOutcome::Skipped { reason })
    }

    /// Assign every selected lead to `agent_name`.
    ///
    /// On success the selection is cleared; on failure it is left as it was.
    pub async fn bulk_assign(&self, selection: &mut SelectionSet, agent_name: &str) -> Result<BulkOutcome> {
        if selection.is_empty() {
            return self.skip("bulk_assign", SkipReason::EmptySelection);
        }
        let agent_name = agent_name.trim();
        if agent_name.is_empty() {
            return self.skip("bulk_assign", SkipReason::MissingAgent);
        }

        let ids = selection.ids();
        let response = match self.backend.bulk_assign(&ids, agent_name).await {
            Ok(response) => response,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(selected = ids.len(), agent = agent_name, error = %e, "Bulk assign failed");
                return Err(e.into());
            }
        };

        self.invalidation.after_bulk();
        selection.clear();
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        info!(
            selected = ids.len(),
            updated = response.updated,
            agent = agent_name,
            "Bulk assign completed"
        );
        Ok(BulkOutcome::Assigned {
            updated: response.updated,
        })
    }

    /// Delete every selected lead.
    ///
    /// Deleted leads are not dropped from cached views one by one; the stale
    /// lists are refetched instead.
    pub async fn bulk_delete(&self, selection: &mut SelectionSet) -> Result<BulkOutcome> {
        if selection.is_empty() {
            return self.skip("bulk_delete", SkipReason::EmptySelection);
        }

        let ids = selection.ids();
        let response = match self.backend.bulk_delete(&ids).await {
            Ok(response) => response,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(selected = ids.len(), error = %e, "Bulk delete failed");
                return Err(e.into());
            }
        };

        self.invalidation.after_bulk();
        selection.clear();
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        info!(selected = ids.len(), deleted = response.deleted, "Bulk delete completed");
        Ok(BulkOutcome::Deleted {
            deleted: response.deleted,
        })
    }

    pub fn stats(&self) -> BulkStats {
        BulkStats {
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, BulkAssignResponse, BulkDeleteResponse};
    use crate::cache::{CacheKey, EntityCache, ListQuery};
    use crate::types::BackendError;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Records bulk calls; acknowledges only ids starting with "L".
    #[derive(Default)]
    struct MockBackend {
        calls: AtomicUsize,
        last_ids: Mutex<Vec<String>>,
        fail: bool,
    }

    impl MockBackend {
        fn record(&self, ids: &[String]) -> BackendResult<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_ids.lock().unwrap() = ids.to_vec();
            if self.fail {
                return Err(BackendError::with_status(500, "Bulk operation failed"));
            }
            Ok(ids.iter().filter(|id| id.starts_with('L')).count() as u64)
        }
    }

    #[async_trait::async_trait]
    impl LeadBackend for MockBackend {
        async fn fetch_list(&self, _query: &ListQuery) -> BackendResult<Value> {
            Ok(json!([]))
        }

        async fn fetch_one(&self, id: &str) -> BackendResult<Value> {
            Ok(json!({ "id": id }))
        }

        async fn update(&self, _id: &str, _fields: &Map<String, Value>) -> BackendResult<Value> {
            Ok(Value::Null)
        }

        async fn delete(&self, _id: &str) -> BackendResult<()> {
            Ok(())
        }

        async fn bulk_assign(&self, ids: &[String], _agent: &str) -> BackendResult<BulkAssignResponse> {
            self.record(ids).map(|updated| BulkAssignResponse { updated })
        }

        async fn bulk_delete(&self, ids: &[String]) -> BackendResult<BulkDeleteResponse> {
            self.record(ids).map(|deleted| BulkDeleteResponse { deleted })
        }

        async fn fetch_kpis(&self) -> BackendResult<Value> {
            Ok(json!({}))
        }

        async fn fetch_funnel(&self) -> BackendResult<Value> {
            Ok(json!([]))
        }
    }

    fn setup(fail: bool) -> (BulkOperationExecutor<MockBackend>, Arc<MockBackend>, Arc<EntityCache>) {
        let cache = EntityCache::shared();
        cache.set(CacheKey::lead("L1"), json!({"id": "L1", "stage": "New Lead"}));
        cache.set(
            CacheKey::lead_list(ListQuery::new()),
            json!([{"id": "L1", "stage": "New Lead"}, {"id": "L2", "stage": "Working"}]),
        );
        cache.set(CacheKey::kpis(), json!({"totalLeads": 2}));

        let backend = Arc::new(MockBackend {
            fail,
            ..Default::default()
        });
        let invalidation = Arc::new(InvalidationScheduler::new(cache.clone()));
        (BulkOperationExecutor::new(backend.clone(), invalidation), backend, cache)
    }

    #[tokio::test]
    async fn test_empty_selection_is_noop() {
        let (executor, backend, cache) = setup(false);
        let before = cache.export();
        let mut selection = SelectionSet::with_visible(["L1", "L2"]);

        let outcome = executor.bulk_assign(&mut selection, "Jane").await.unwrap();
        assert_eq!(outcome, BulkOutcome::Skipped { reason: SkipReason::EmptySelection });
        let outcome = executor.bulk_delete(&mut selection).await.unwrap();
        assert!(outcome.is_skipped());

        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.export(), before);
        assert_eq!(executor.stats().skipped, 2);
    }

    #[tokio::test]
    async fn test_blank_agent_is_noop() {
        let (executor, backend, _) = setup(false);
        let mut selection = SelectionSet::with_visible(["L1"]);
        selection.select("L1");

        let outcome = executor.bulk_assign(&mut selection, "   ").await.unwrap();
        assert_eq!(outcome, BulkOutcome::Skipped { reason: SkipReason::MissingAgent });
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(selection.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_success_reports_backend_count() {
        let (executor, backend, cache) = setup(false);
        let mut selection = SelectionSet::with_visible(["L1", "L2", "X3"]);
        selection.select_all_visible();

        let outcome = executor.bulk_assign(&mut selection, "Jane").await.unwrap();
        assert_eq!(outcome, BulkOutcome::Assigned { updated: 2 });
        assert_eq!(outcome.affected(), 2);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.last_ids.lock().unwrap().len(), 3);
        assert!(selection.is_empty());

        assert!(cache.is_stale(&CacheKey::lead_list(ListQuery::new())));
        assert!(cache.is_stale(&CacheKey::kpis()));
        // No optimistic patch and no detail invalidation.
        assert!(!cache.is_stale(&CacheKey::lead("L1")));
        let detail = cache.get(&CacheKey::lead("L1")).unwrap();
        assert_eq!(detail.as_entity().unwrap().get("assignedAgent"), None);
    }

    #[tokio::test]
    async fn test_delete_keeps_cached_items_until_refetch() {
        let (executor, _, cache) = setup(false);
        let mut selection = SelectionSet::with_visible(["L1", "L2"]);
        selection.select("L2");

        let outcome = executor.bulk_delete(&mut selection).await.unwrap();
        assert_eq!(outcome, BulkOutcome::Deleted { deleted: 1 });

        let list = cache.get(&CacheKey::lead_list(ListQuery::new())).unwrap();
        assert_eq!(list.as_list().unwrap().items.len(), 2);
        assert!(cache.is_stale(&CacheKey::lead_list(ListQuery::new())));
    }

    #[tokio::test]
    async fn test_failure_leaves_selection_and_cache() {
        let (executor, _, cache) = setup(true);
        let before = cache.export();
        let mut selection = SelectionSet::with_visible(["L1", "L2"]);
        selection.select_all_visible();

        let err = executor.bulk_delete(&mut selection).await.unwrap_err();
        assert_eq!(err.user_message(), "Bulk operation failed");
        assert_eq!(selection.len(), 2);
        assert_eq!(cache.export(), before);
        assert_eq!(executor.stats().failed, 1);
    }
}
