//! Cache key definitions
//!
//! A key names one logical view of an entity type: a single record, a list
//! query, or an aggregate rollup. Every key belongs to exactly one
//! invalidation group.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Entity type name for leads.
pub const LEADS: &str = "leads";
/// Aggregate name for the KPI rollup.
pub const KPIS: &str = "kpis";
/// Aggregate name for the stage funnel rollup.
pub const FUNNEL: &str = "funnel";

/// Query parameters of a list view, kept sorted so equal queries hash equally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ListQuery(BTreeMap<String, String>);

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Short stable hash of the parameters ("empty" when there are none)
    pub fn args_hash(&self) -> String {
        if self.0.is_empty() {
            return "empty".to_string();
        }
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        for (k, v) in &self.0 {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update(b"&");
        }
        let hash = hasher.finalize();
        hex::encode(&hash[..8])
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ListQuery {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Which view of the entity type a key addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum View {
    /// A single entity by id
    Detail(String),
    /// A list query result
    List(ListQuery),
    /// A named rollup
    Aggregate(String),
}

/// Cache key for one logical view
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    /// Entity type (e.g. "leads")
    pub entity: String,
    pub view: View,
}

impl CacheKey {
    pub fn detail(entity: &str, id: &str) -> Self {
        Self {
            entity: entity.to_string(),
            view: View::Detail(id.to_string()),
        }
    }

    pub fn list(entity: &str, query: ListQuery) -> Self {
        Self {
            entity: entity.to_string(),
            view: View::List(query),
        }
    }

    pub fn aggregate(entity: &str, name: &str) -> Self {
        Self {
            entity: entity.to_string(),
            view: View::Aggregate(name.to_string()),
        }
    }

    pub fn lead(id: &str) -> Self {
        Self::detail(LEADS, id)
    }

    pub fn lead_list(query: ListQuery) -> Self {
        Self::list(LEADS, query)
    }

    pub fn kpis() -> Self {
        Self::aggregate(LEADS, KPIS)
    }

    pub fn funnel() -> Self {
        Self::aggregate(LEADS, FUNNEL)
    }

    pub fn is_list(&self) -> bool {
        matches!(self.view, View::List(_))
    }

    /// Invalidation group this key belongs to
    pub fn group(&self) -> CacheGroup {
        match (&self.view, self.entity.as_str()) {
            (View::List(_), LEADS) => CacheGroup::LeadLists,
            (View::Detail(id), LEADS) => CacheGroup::LeadDetail(id.clone()),
            (View::Aggregate(name), LEADS) if name == KPIS => CacheGroup::KpiAggregates,
            (View::Aggregate(name), LEADS) if name == FUNNEL => CacheGroup::FunnelAggregates,
            _ => CacheGroup::Other(self.entity.clone()),
        }
    }

    /// Convert to storage key string
    /// Format: entity:detail:id, entity:list:args_hash or entity:agg:name
    pub fn to_storage_key(&self) -> String {
        match &self.view {
            View::Detail(id) => format!("{}:detail:{}", self.entity, id),
            View::List(query) => format!("{}:list:{}", self.entity, query.args_hash()),
            View::Aggregate(name) => format!("{}:agg:{}", self.entity, name),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_storage_key())
    }
}

/// Set of keys a collaborator refetches together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "group", content = "id", rename_all = "kebab-case")]
pub enum CacheGroup {
    LeadLists,
    LeadDetail(String),
    KpiAggregates,
    FunnelAggregates,
    /// Views of other entity types (agents, calls...)
    Other(String),
}

impl fmt::Display for CacheGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheGroup::LeadLists => f.write_str("lead-lists"),
            CacheGroup::LeadDetail(id) => write!(f, "lead-detail({id})"),
            CacheGroup::KpiAggregates => f.write_str("kpi-aggregates"),
            CacheGroup::FunnelAggregates => f.write_str("funnel-aggregates"),
            CacheGroup::Other(entity) => write!(f, "{entity}"),
        }
    }
}
