//! Backend API collaborator
//!
//! The REST backend is consumed, not implemented, by this crate. Every call is
//! an opaque async operation resolving to a value or a [`BackendError`] with a
//! human-readable message. Timeouts belong to the transport.
//!
//! - **http**: reqwest client for the CRM REST API
//! - **memory**: in-process backend for local runs and tests

pub mod http;
pub mod memory;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::ListQuery;
use crate::types::BackendError;

pub use http::HttpLeadBackend;
pub use memory::InMemoryLeadBackend;

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Backend answer to a bulk assign. `updated` is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkAssignResponse {
    pub updated: u64,
}

/// Backend answer to a bulk delete. `deleted` is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
}

/// Operations the backend exposes for leads (allows mocking in tests)
#[async_trait::async_trait]
pub trait LeadBackend: Send + Sync {
    /// List query; answers in any of the three list shapes
    async fn fetch_list(&self, query: &ListQuery) -> BackendResult<Value>;

    /// Single lead
    async fn fetch_one(&self, id: &str) -> BackendResult<Value>;

    /// Apply partial fields; answers with the updated lead or the applied fields
    async fn update(&self, id: &str, fields: &Map<String, Value>) -> BackendResult<Value>;

    async fn delete(&self, id: &str) -> BackendResult<()>;

    /// Assign every id to `agent_name` in one request
    async fn bulk_assign(&self, ids: &[String], agent_name: &str)
        -> BackendResult<BulkAssignResponse>;

    /// Delete every id in one request
    async fn bulk_delete(&self, ids: &[String]) -> BackendResult<BulkDeleteResponse>;

    /// KPI rollup for the dashboards
    async fn fetch_kpis(&self) -> BackendResult<Value>;

    /// Stage funnel rollup
    async fn fetch_funnel(&self) -> BackendResult<Value>;
}
