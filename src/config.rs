//! Configuration
//!
//! CLI arguments and environment variable handling using clap, plus the
//! library-side [`CoreConfig`] the session is built from.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::invalidation::DEFAULT_EVENT_CAPACITY;
use crate::mutation::MutationConfig;
use crate::types::{CoreError, Result};

/// Default REST backend base URL
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Lead lifecycle core - pipeline, quality gate and cache reconciliation for the lead CRM
#[derive(Parser, Debug, Clone)]
#[command(name = "lead-cache-core")]
#[command(about = "Lead pipeline, quality gate and optimistic cache reconciliation")]
pub struct Args {
    /// REST backend base URL
    #[arg(long, env = "LEAD_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Serve from an in-memory backend seeded with this JSON array of leads
    /// instead of calling the REST backend
    #[arg(long, env = "LEAD_SEED_FILE")]
    pub seed_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Backend request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,

    /// Queue mutations against the same lead instead of letting them overlap
    #[arg(long, env = "SERIALIZE_SAME_ENTITY", default_value = "true", action = clap::ArgAction::Set)]
    pub serialize_same_entity: bool,

    /// Capacity of the invalidation broadcast channel
    #[arg(long, env = "EVENT_CHANNEL_CAPACITY", default_value_t = DEFAULT_EVENT_CAPACITY)]
    pub event_channel_capacity: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List pipeline stages in order with their affordance flags
    Stages,

    /// Run the quality gate over a lead JSON file
    Evaluate {
        /// Path to a JSON lead record
        file: PathBuf,
    },

    /// List leads, optionally filtered by key=value query parameters
    List {
        /// Query parameters (e.g. stage=Qualified)
        params: Vec<String>,
    },

    /// Show one lead with its quality report
    Show { id: String },

    /// Update stage, priority or assignment of one lead
    Update {
        id: String,
        #[arg(long)]
        stage: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        /// Agent name; an empty string unassigns
        #[arg(long)]
        agent: Option<String>,
    },

    /// Assign several leads to one agent
    BulkAssign {
        agent: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Delete several leads
    BulkDelete {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Show KPI and funnel rollups
    Kpis,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.seed_file.is_none() && !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(format!("LEAD_API_URL must be an http(s) URL, got {}", self.api_url));
        }

        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be greater than 0".to_string());
        }

        if self.event_channel_capacity == 0 {
            return Err("EVENT_CHANNEL_CAPACITY must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            api_url: self.api_url.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            mutation: MutationConfig {
                serialize_same_entity: self.serialize_same_entity,
            },
            event_channel_capacity: self.event_channel_capacity,
        }
    }
}

/// Settings for one session of the core
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub api_url: String,
    pub request_timeout: Duration,
    pub mutation: MutationConfig,
    pub event_channel_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            mutation: MutationConfig::default(),
            event_channel_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CoreConfig {
    /// Read settings from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            api_url: std::env::var("LEAD_API_URL").unwrap_or(defaults.api_url),
            request_timeout: env_parse("REQUEST_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            mutation: MutationConfig {
                serialize_same_entity: env_parse("SERIALIZE_SAME_ENTITY")?
                    .unwrap_or(defaults.mutation.serialize_same_entity),
            },
            event_channel_capacity: env_parse("EVENT_CHANNEL_CAPACITY")?
                .unwrap_or(defaults.event_channel_capacity),
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| CoreError::Config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(None),
    }
}
