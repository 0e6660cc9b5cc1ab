//! Shared fixtures for integration tests

#![allow(dead_code)]

use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use lead_cache_core::backend::{
    BackendResult, BulkAssignResponse, BulkDeleteResponse, InMemoryLeadBackend, LeadBackend,
};
use lead_cache_core::cache::ListQuery;
use lead_cache_core::config::CoreConfig;
use lead_cache_core::types::BackendError;
use lead_cache_core::LeadSession;

/// In-memory backend with call counting, a gate on updates and a reject switch.
pub struct ScriptedBackend {
    pub inner: InMemoryLeadBackend,
    pub calls: AtomicUsize,
    pub reject_updates: AtomicBool,
    gated: AtomicBool,
    gate: Semaphore,
}

impl ScriptedBackend {
    pub fn new(leads: Vec<Value>) -> Self {
        Self {
            inner: InMemoryLeadBackend::with_leads(leads),
            calls: AtomicUsize::new(0),
            reject_updates: AtomicBool::new(false),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }

    /// Hold update calls until `release` is called.
    pub fn hold_updates(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl LeadBackend for ScriptedBackend {
    async fn fetch_list(&self, query: &ListQuery) -> BackendResult<Value> {
        self.count();
        self.inner.fetch_list(query).await
    }

    async fn fetch_one(&self, id: &str) -> BackendResult<Value> {
        self.count();
        self.inner.fetch_one(id).await
    }

    async fn update(&self, id: &str, fields: &Map<String, Value>) -> BackendResult<Value> {
        self.count();
        if self.gated.load(Ordering::SeqCst) {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| BackendError::new("gate closed"))?;
            permit.forget();
        }
        if self.reject_updates.load(Ordering::SeqCst) {
            return Err(BackendError::with_status(400, "Invalid stage transition"));
        }
        self.inner.update(id, fields).await
    }

    async fn delete(&self, id: &str) -> BackendResult<()> {
        self.count();
        self.inner.delete(id).await
    }

    async fn bulk_assign(&self, ids: &[String], agent_name: &str) -> BackendResult<BulkAssignResponse> {
        self.count();
        self.inner.bulk_assign(ids, agent_name).await
    }

    async fn bulk_delete(&self, ids: &[String]) -> BackendResult<BulkDeleteResponse> {
        self.count();
        self.inner.bulk_delete(ids).await
    }

    async fn fetch_kpis(&self) -> BackendResult<Value> {
        self.count();
        self.inner.fetch_kpis().await
    }

    async fn fetch_funnel(&self) -> BackendResult<Value> {
        self.count();
        self.inner.fetch_funnel().await
    }
}

pub fn sample_leads() -> Vec<Value> {
    vec![
        json!({"_id": "L1", "stage": "New Lead", "priority": "A", "assignedAgent": null, "companyName": "Acme"}),
        json!({"_id": "L3", "stage": "Working", "priority": "B", "assignedAgent": "Sam", "companyName": "Globex"}),
    ]
}

pub fn session() -> (LeadSession<ScriptedBackend>, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend::new(sample_leads()));
    (LeadSession::new(backend.clone(), &CoreConfig::default()), backend)
}
