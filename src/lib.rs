//! Lead lifecycle consistency core
//!
//! Keeps the cached views of sales leads consistent while single edits,
//! assignments, deletes and bulk operations race against an asynchronous REST
//! backend that can fail.
//!
//! ## Components
//!
//! - **pipeline**: the eleven stages, terminal subset, priorities
//! - **quality**: advisory seven-rule completeness gate
//! - **cache**: keyed store of detail, list and aggregate views
//! - **invalidation**: marks groups stale after confirmed mutations
//! - **mutation**: optimistic apply / commit / rollback for one lead
//! - **bulk**: bulk assign and delete over a selection
//! - **query**: read-side fetch, ingest and refetch
//! - **backend**: the REST collaborator (HTTP and in-memory)

pub mod backend;
pub mod bulk;
pub mod cache;
pub mod config;
pub mod invalidation;
pub mod lead;
pub mod mutation;
pub mod pipeline;
pub mod quality;
pub mod query;
pub mod selection;
pub mod session;
pub mod types;

pub use config::{Args, CoreConfig};
pub use pipeline::{is_terminal, list_stages, Priority, Stage};
pub use quality::{evaluate, QualityReport};
pub use session::LeadSession;
pub use types::{BackendError, CoreError, Result};
