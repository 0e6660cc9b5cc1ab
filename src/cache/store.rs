//! Entity cache
//!
//! Keyed store of fetched views. Thread-safe via DashMap; composite operations
//! that must observe a consistent set of keys (snapshot + optimistic patch,
//! restore) additionally hold a write gate so no other writer interleaves.
//!
//! The store is created once per session and shared as a [`CacheStore`]; there
//! is no global instance.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::keys::{CacheGroup, CacheKey, View};
use super::view::CachedValue;
use crate::lead::entity_id;

/// Shared handle to the session's cache.
pub type CacheStore = Arc<EntityCache>;

/// One cached view
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: CachedValue,
    /// Marked stale by invalidation; still readable until refetched
    pub stale: bool,
    pub fetched_at: DateTime<Utc>,
    /// Cache-wide revision of the last fetch or invalidation of this key
    pub revision: u64,
}

/// Prior state of a set of keys, captured before an optimistic write.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// `None` means the key was absent and must be absent again after restore
    entries: Vec<(CacheKey, Option<CacheEntry>)>,
    /// Cache revision when the snapshot was taken
    revision: u64,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn covers(&self, key: &CacheKey) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub stale_entries: usize,
    pub list_views: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entity occurrences updated in place by patches
    pub patched_entries: u64,
}

impl CacheStats {
    /// Calculate hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

pub struct EntityCache {
    entries: DashMap<CacheKey, CacheEntry>,
    write_gate: Mutex<()>,
    revision: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    patched: AtomicU64,
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            write_gate: Mutex::new(()),
            revision: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            patched: AtomicU64::new(0),
        }
    }

    /// Create the session's shared store.
    pub fn shared() -> CacheStore {
        Arc::new(Self::new())
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        // The gate guards no data, so a poisoned lock is still usable.
        self.write_gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Callers hold the gate.
    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Full entry including staleness
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.clone())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.entries.get(key).map(|e| e.stale).unwrap_or(false)
    }

    pub fn stale_keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|e| e.stale)
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Every key currently cached, sorted
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Sorted copy of every entry, for comparing whole-cache states
    pub fn export(&self) -> Vec<(CacheKey, CacheEntry)> {
        let mut all: Vec<(CacheKey, CacheEntry)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Store a wire value under `key`, classifying it by the key's view.
    ///
    /// Entity ids are normalized and list shapes detected here, once.
    pub fn set(&self, key: CacheKey, value: Value) {
        let cached = match key.view {
            View::Detail(_) => CachedValue::entity(value),
            View::List(_) => CachedValue::list(value),
            View::Aggregate(_) => CachedValue::Aggregate(value),
        };
        self.set_cached(key, cached);
    }

    pub fn set_cached(&self, key: CacheKey, value: CachedValue) {
        let _gate = self.gate();
        debug!(key = %key, "Cache set");
        let revision = self.next_revision();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                stale: false,
                fetched_at: Utc::now(),
                revision,
            },
        );
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        let _gate = self.gate();
        self.entries.remove(key).is_some()
    }

    /// Apply `updater` to the value under `key`. No-op when the key is absent.
    ///
    /// The updater works on a copy, so it may read the cache. It must not
    /// write to it: the write gate is held for the whole call.
    pub fn patch(&self, key: &CacheKey, updater: impl FnOnce(&mut CachedValue)) -> bool {
        let _gate = self.gate();
        let Some(mut value) = self.entries.get(key).map(|entry| entry.value.clone()) else {
            return false;
        };
        updater(&mut value);
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.value = value;
        }
        true
    }

    /// Apply `updater` to every cached occurrence of entity `id`: its detail
    /// view and every item with that id in any list view of `entity`.
    ///
    /// Views that do not contain the id are untouched. Returns the number of
    /// occurrences updated. The updater runs while cache shards are locked and
    /// must not touch the cache.
    pub fn patch_entity_everywhere(
        &self,
        entity: &str,
        id: &str,
        updater: impl Fn(&mut Value),
    ) -> usize {
        let _gate = self.gate();
        self.patch_everywhere_locked(entity, id, &updater)
    }

    fn patch_everywhere_locked(&self, entity: &str, id: &str, updater: &dyn Fn(&mut Value)) -> usize {
        let mut touched = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.key().entity != entity {
                continue;
            }
            match &mut entry.value_mut().value {
                CachedValue::Entity(value) if entity_id(value) == Some(id) => {
                    updater(value);
                    touched += 1;
                }
                CachedValue::List(view) => {
                    touched += view.patch_matching(id, updater);
                }
                _ => {}
            }
        }

        self.patched.fetch_add(touched as u64, Ordering::Relaxed);
        debug!(entity = entity, id = id, touched = touched, "Patched entity in cached views");
        touched
    }

    /// Drop entity `id` from its detail view and every list view of `entity`.
    ///
    /// Returns the number of occurrences removed.
    pub fn remove_entity_everywhere(&self, entity: &str, id: &str) -> usize {
        let _gate = self.gate();
        let mut removed = 0;
        if self.entries.remove(&CacheKey::detail(entity, id)).is_some() {
            removed += 1;
        }
        for mut entry in self.entries.iter_mut() {
            if entry.key().entity != entity {
                continue;
            }
            if let CachedValue::List(view) = &mut entry.value_mut().value {
                removed += view.remove_matching(id);
            }
        }
        debug!(entity = entity, id = id, removed = removed, "Removed entity from cached views");
        removed
    }

    // ========================================================================
    // Snapshot / restore
    // ========================================================================

    /// Every key that could hold entity `id`: its detail key (present or not)
    /// plus every list and aggregate key of `entity`.
    pub fn keys_for_entity(&self, entity: &str, id: &str) -> Vec<CacheKey> {
        let detail = CacheKey::detail(entity, id);
        let mut keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|e| {
                e.key().entity == entity && matches!(e.key().view, View::List(_) | View::Aggregate(_))
            })
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        keys.insert(0, detail);
        keys
    }

    /// Capture the current state of `keys`.
    pub fn snapshot(&self, keys: &[CacheKey]) -> Snapshot {
        let _gate = self.gate();
        self.snapshot_locked(keys)
    }

    fn snapshot_locked(&self, keys: &[CacheKey]) -> Snapshot {
        Snapshot {
            entries: keys
                .iter()
                .map(|k| (k.clone(), self.entries.get(k).map(|e| e.clone())))
                .collect(),
            revision: self.revision.load(Ordering::Relaxed),
            taken_at: Utc::now(),
        }
    }

    /// Snapshot every key that could hold entity `id`, then patch it
    /// everywhere, with no other writer in between.
    pub fn snapshot_and_patch(
        &self,
        entity: &str,
        id: &str,
        updater: impl Fn(&mut Value),
    ) -> (Snapshot, usize) {
        let _gate = self.gate();
        let keys = self.keys_for_entity(entity, id);
        let snapshot = self.snapshot_locked(&keys);
        let touched = self.patch_everywhere_locked(entity, id, &updater);
        (snapshot, touched)
    }

    /// Put every snapshotted key back as it was (absent keys removed).
    ///
    /// A key fetched or invalidated after the snapshot was taken gets its old
    /// value back but stays stale, carrying the newer revision. Those keys are
    /// returned so their invalidation can be announced again.
    pub fn restore(&self, snapshot: Snapshot) -> Vec<CacheKey> {
        let _gate = self.gate();
        let count = snapshot.entries.len();
        let mut superseded = Vec::new();
        for (key, prior) in snapshot.entries {
            match prior {
                Some(mut entry) => {
                    let newer = self
                        .entries
                        .get(&key)
                        .map(|current| current.revision)
                        .filter(|revision| *revision > snapshot.revision);
                    if let Some(revision) = newer {
                        entry.stale = true;
                        entry.revision = revision;
                        superseded.push(key.clone());
                    }
                    self.entries.insert(key, entry);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
        debug!(keys = count, superseded = superseded.len(), "Restored cache snapshot");
        superseded
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Mark every key in `group` stale; returns how many were marked.
    pub fn mark_stale(&self, group: &CacheGroup) -> usize {
        let _gate = self.gate();
        let revision = self.next_revision();
        let mut marked = 0;
        for mut entry in self.entries.iter_mut() {
            if &entry.key().group() == group {
                let entry = entry.value_mut();
                entry.stale = true;
                entry.revision = revision;
                marked += 1;
            }
        }
        marked
    }

    /// Drop every entry
    pub fn clear(&self) {
        let _gate = self.gate();
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            patched_entries: self.patched.load(Ordering::Relaxed),
            ..Default::default()
        };
        for entry in self.entries.iter() {
            stats.entries += 1;
            if entry.stale {
                stats.stale_entries += 1;
            }
            if entry.key().is_list() {
                stats.list_views += 1;
            }
        }
        stats
    }
}
