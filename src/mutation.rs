//! Mutation coordinator
//!
//! Drives one single-lead mutation through
//!
//! ```text
//! Idle → Applying → InFlight → Committed
//!                            ↘ RolledBack
//! ```
//!
//! `begin_update` snapshots every key that could hold the lead, patches the lead
//! into all of them at once (optimistic), then hands the backend call to a
//! spawned task. On success the affected groups are marked stale; on failure the
//! snapshot is written back verbatim. The caller awaits the [`MutationHandle`];
//! dropping it does not cancel the backend call.
//!
//! ## Overlapping mutations
//!
//! With `serialize_same_entity` on (default), a mutation against a lead that
//! already has one in flight stays `Idle` until the earlier one resolves, and
//! only then takes its snapshot. Each lead keeps a chain of completion
//! signals; a mutation's place in the chain is fixed inside `begin_update`, so
//! queued mutations run in the order they were begun. With it off, each mutation keeps an independent
//! snapshot from its own start time, so a rollback can overwrite a later
//! mutation's optimistic write.

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::LeadBackend;
use crate::cache::{CacheGroup, CacheKey, CacheStore, Snapshot, LEADS};
use crate::invalidation::InvalidationScheduler;
use crate::lead::{merge_fields, normalize_entity, LeadPatch, ID_FIELD};
use crate::types::{CoreError, Result};

/// Lifecycle state of one mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    /// Created, waiting for its turn on the lead
    Idle,
    /// Snapshot taken, optimistic patch being written
    Applying,
    /// Optimistic patch visible, backend call outstanding
    InFlight,
    Committed,
    RolledBack,
}

impl MutationState {
    pub fn is_final(&self) -> bool {
        matches!(self, MutationState::Committed | MutationState::RolledBack)
    }
}

#[derive(Debug, Clone)]
pub struct MutationConfig {
    /// Queue mutations against the same lead instead of letting them overlap
    pub serialize_same_entity: bool,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            serialize_same_entity: true,
        }
    }
}

/// Caller's view of an outstanding mutation
pub struct MutationHandle {
    id: Uuid,
    entity_id: String,
    state_rx: watch::Receiver<MutationState>,
    outcome_rx: oneshot::Receiver<Result<Value>>,
}

impl MutationHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn state(&self) -> MutationState {
        *self.state_rx.borrow()
    }

    /// Receiver that sees every state transition
    pub fn watch_state(&self) -> watch::Receiver<MutationState> {
        self.state_rx.clone()
    }

    /// Wait for the backend. Ok carries the confirmed lead (or the applied
    /// fields when the backend answered without a body).
    pub async fn outcome(self) -> Result<Value> {
        let id = self.id;
        self.outcome_rx
            .await
            .unwrap_or(Err(CoreError::Abandoned(id)))
    }
}

/// Mutation counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct MutationStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub deleted: u64,
    pub delete_failures: u64,
}

impl MutationStats {
    pub fn in_flight(&self) -> u64 {
        self.begun.saturating_sub(self.committed + self.rolled_back)
    }
}

#[derive(Default)]
struct Counters {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    deleted: AtomicU64,
    delete_failures: AtomicU64,
}

/// Completion signal of the newest mutation queued on a lead
struct ChainLink {
    seq: u64,
    done: oneshot::Receiver<()>,
}

type EntityChains = Arc<DashMap<String, ChainLink>>;

/// A mutation's place in its lead's chain. Finishing it wakes the successor.
struct Turn {
    entity_id: String,
    seq: u64,
    done_tx: oneshot::Sender<()>,
    chains: EntityChains,
}

impl Turn {
    fn finish(self) {
        let seq = self.seq;
        self.chains.remove_if(&self.entity_id, |_, link| link.seq == seq);
        // No successor means nobody is listening.
        let _ = self.done_tx.send(());
    }
}

pub struct MutationCoordinator<B: LeadBackend> {
    cache: CacheStore,
    backend: Arc<B>,
    invalidation: Arc<InvalidationScheduler>,
    config: MutationConfig,
    chains: EntityChains,
    next_seq: AtomicU64,
    counters: Arc<Counters>,
}

impl<B: LeadBackend + 'static> MutationCoordinator<B> {
    pub fn new(
        cache: CacheStore,
        backend: Arc<B>,
        invalidation: Arc<InvalidationScheduler>,
        config: MutationConfig,
    ) -> Self {
        Self {
            cache,
            backend,
            invalidation,
            config,
            chains: Arc::new(DashMap::new()),
            next_seq: AtomicU64::new(0),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    /// Join the lead's chain. Returns the turn plus the predecessor's signal
    /// when a predecessor is still running.
    fn join_chain(&self, entity_id: &str) -> (Turn, Option<oneshot::Receiver<()>>) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done) = oneshot::channel();
        let previous = self
            .chains
            .insert(entity_id.to_string(), ChainLink { seq, done });
        let pending = previous.and_then(|mut link| match link.done.try_recv() {
            Err(TryRecvError::Empty) => Some(link.done),
            _ => None,
        });
        let turn = Turn {
            entity_id: entity_id.to_string(),
            seq,
            done_tx,
            chains: self.chains.clone(),
        };
        (turn, pending)
    }

    /// Start an optimistic update of one lead.
    ///
    /// When the lead is free the patch is visible in every cached view by the
    /// time this returns. Must be called within a Tokio runtime.
    pub fn begin_update(&self, entity_id: &str, patch: LeadPatch) -> MutationHandle {
        let id = Uuid::new_v4();
        let (state_tx, state_rx) = watch::channel(MutationState::Idle);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        self.counters.begun.fetch_add(1, Ordering::Relaxed);

        let (turn, pending) = if self.config.serialize_same_entity {
            let (turn, pending) = self.join_chain(entity_id);
            (Some(turn), pending)
        } else {
            (None, None)
        };

        let flight = Flight {
            id,
            entity_id: entity_id.to_string(),
            fields: patch.into_fields(),
            cache: self.cache.clone(),
            backend: self.backend.clone(),
            invalidation: self.invalidation.clone(),
            counters: self.counters.clone(),
            turn,
            state_tx,
            outcome_tx,
        };

        match pending {
            None => {
                let snapshot = flight.apply();
                tokio::spawn(flight.resolve(snapshot));
            }
            Some(previous) => {
                debug!(mutation = %id, lead = entity_id, "Lead busy, mutation queued");
                tokio::spawn(async move {
                    // A dropped sender also means the predecessor is gone.
                    let _ = previous.await;
                    let snapshot = flight.apply();
                    flight.resolve(snapshot).await;
                });
            }
        }

        MutationHandle {
            id,
            entity_id: entity_id.to_string(),
            state_rx,
            outcome_rx,
        }
    }

    /// Update and wait for the backend
    pub async fn update(&self, entity_id: &str, patch: LeadPatch) -> Result<Value> {
        self.begin_update(entity_id, patch).outcome().await
    }

    /// Assign one lead (or unassign with `None`)
    pub async fn assign(&self, entity_id: &str, agent: Option<&str>) -> Result<Value> {
        let patch = match agent {
            Some(name) => LeadPatch::new().assign_to(name),
            None => LeadPatch::new().unassign(),
        };
        self.update(entity_id, patch).await
    }

    /// Delete one lead.
    ///
    /// Not optimistic: cached views lose the lead only after the backend
    /// acknowledges. On failure the cache is untouched.
    pub async fn delete(&self, entity_id: &str) -> Result<()> {
        let turn = if self.config.serialize_same_entity {
            let (turn, pending) = self.join_chain(entity_id);
            if let Some(previous) = pending {
                let _ = previous.await;
            }
            Some(turn)
        } else {
            None
        };

        let result = self.backend.delete(entity_id).await;
        if result.is_ok() {
            let removed = self.cache.remove_entity_everywhere(LEADS, entity_id);
            self.invalidation.after_update(entity_id);
            self.counters.deleted.fetch_add(1, Ordering::Relaxed);
            info!(lead = entity_id, removed = removed, "Lead deleted");
        }

        if let Some(turn) = turn {
            turn.finish();
        }

        result.map_err(|e| {
            self.counters.delete_failures.fetch_add(1, Ordering::Relaxed);
            warn!(lead = entity_id, error = %e, "Lead delete failed");
            CoreError::from(e)
        })
    }

    pub fn stats(&self) -> MutationStats {
        MutationStats {
            begun: self.counters.begun.load(Ordering::Relaxed),
            committed: self.counters.committed.load(Ordering::Relaxed),
            rolled_back: self.counters.rolled_back.load(Ordering::Relaxed),
            deleted: self.counters.deleted.load(Ordering::Relaxed),
            delete_failures: self.counters.delete_failures.load(Ordering::Relaxed),
        }
    }
}

/// Everything a spawned mutation needs after `begin_update` returns
struct Flight<B: LeadBackend> {
    id: Uuid,
    entity_id: String,
    fields: Map<String, Value>,
    cache: CacheStore,
    backend: Arc<B>,
    invalidation: Arc<InvalidationScheduler>,
    counters: Arc<Counters>,
    turn: Option<Turn>,
    state_tx: watch::Sender<MutationState>,
    outcome_tx: oneshot::Sender<Result<Value>>,
}

impl<B: LeadBackend + 'static> Flight<B> {
    /// Snapshot and optimistic patch, synchronously.
    fn apply(&self) -> Snapshot {
        self.state_tx.send_replace(MutationState::Applying);
        let (snapshot, touched) = self
            .cache
            .snapshot_and_patch(LEADS, &self.entity_id, |lead| merge_fields(lead, &self.fields));
        self.state_tx.send_replace(MutationState::InFlight);
        debug!(
            mutation = %self.id,
            lead = %self.entity_id,
            snapshot_keys = snapshot.len(),
            touched = touched,
            "Optimistic patch applied"
        );
        snapshot
    }

    /// Await the backend, then commit or roll back.
    async fn resolve(mut self, snapshot: Snapshot) {
        let result = self.backend.update(&self.entity_id, &self.fields).await;

        let outcome = match result {
            Ok(confirmed) => {
                drop(snapshot);
                self.invalidation.after_update(&self.entity_id);
                self.counters.committed.fetch_add(1, Ordering::Relaxed);
                self.state_tx.send_replace(MutationState::Committed);
                info!(mutation = %self.id, lead = %self.entity_id, "Mutation committed");
                Ok(self.confirmed_entity(confirmed))
            }
            Err(e) => {
                let superseded = self.cache.restore(snapshot);
                self.reannounce(&superseded);
                self.counters.rolled_back.fetch_add(1, Ordering::Relaxed);
                self.state_tx.send_replace(MutationState::RolledBack);
                warn!(mutation = %self.id, lead = %self.entity_id, error = %e, "Mutation rolled back");
                Err(CoreError::Backend(e))
            }
        };

        if let Some(turn) = self.turn.take() {
            turn.finish();
        }

        // Receiver gone means the caller stopped waiting; the work is done regardless.
        let _ = self.outcome_tx.send(outcome);
    }

    /// Keys invalidated while this mutation was in flight were restored stale;
    /// announce their groups again so refetchers pick them up.
    fn reannounce(&self, superseded: &[CacheKey]) {
        let mut groups: Vec<CacheGroup> = Vec::new();
        for key in superseded {
            let group = key.group();
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
        for group in groups {
            debug!(mutation = %self.id, group = %group, "Rollback kept newer invalidation");
            self.invalidation.mark_stale(group);
        }
    }

    fn confirmed_entity(&self, mut confirmed: Value) -> Value {
        if confirmed.is_null() {
            let mut applied = self.fields.clone();
            applied.insert(ID_FIELD.to_string(), Value::String(self.entity_id.clone()));
            return Value::Object(applied);
        }
        normalize_entity(&mut confirmed);
        confirmed
    }
}
