//! Lead record and partial-update payloads
//!
//! Leads travel as JSON. The backend is inconsistent about the identity field
//! (`id` on some routes, `_id` on others), so every entity passes through
//! [`normalize_entity`] once when it enters the cache; past that point only the
//! canonical `id` field is consulted.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::{Priority, Stage};
use crate::types::Result;

/// Canonical identity field.
pub const ID_FIELD: &str = "id";
/// Alias some backend routes use instead of `id`.
pub const ID_ALIAS: &str = "_id";

/// A sales lead as the backend returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub stage: Stage,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assigned_agent: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub website: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub company_linkedin_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub person_linkedin_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub segment: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub work_direct_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub mobile_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub home_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub source_channel: Option<String>,

    /// Fields this core does not interpret (notes, timestamps, call counts...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Lead {
    /// Parse a raw entity, normalizing its identity field first.
    pub fn from_value(mut value: Value) -> Result<Self> {
        normalize_entity(&mut value);
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Contact fields arrive as numbers from some imports (phones, zip-like
/// states). Any non-null scalar or structure is kept as its JSON text.
fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

/// Rewrite `_id` into `id` (and numeric ids into strings) in place.
///
/// When both fields are present `id` wins and `_id` is dropped.
pub fn normalize_entity(value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };

    if let Some(alias) = obj.remove(ID_ALIAS) {
        obj.entry(ID_FIELD.to_string()).or_insert(alias);
    }

    let numeric = match obj.get(ID_FIELD) {
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    if let Some(id) = numeric {
        obj.insert(ID_FIELD.to_string(), Value::String(id));
    }
}

/// Canonical id of an already-normalized entity.
pub fn entity_id(value: &Value) -> Option<&str> {
    value.get(ID_FIELD).and_then(Value::as_str)
}

/// Partial update for a single lead.
///
/// Only the fields that are set are sent to the backend and merged into cached
/// views. `assigned_agent: Some(None)` unassigns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadPatch {
    pub stage: Option<Stage>,
    pub priority: Option<Priority>,
    pub assigned_agent: Option<Option<String>>,
    /// Any other field, by wire name
    pub fields: Map<String, Value>,
}

impl LeadPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn assign_to(mut self, agent: impl Into<String>) -> Self {
        self.assigned_agent = Some(Some(agent.into()));
        self
    }

    pub fn unassign(mut self) -> Self {
        self.assigned_agent = Some(None);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stage.is_none()
            && self.priority.is_none()
            && self.assigned_agent.is_none()
            && self.fields.is_empty()
    }

    /// Wire representation: a JSON object holding only the changed fields.
    pub fn into_fields(self) -> Map<String, Value> {
        let mut out = self.fields;
        // Identity is never patched.
        out.remove(ID_FIELD);
        out.remove(ID_ALIAS);
        if let Some(stage) = self.stage {
            out.insert("stage".into(), Value::String(stage.key().to_string()));
        }
        if let Some(priority) = self.priority {
            out.insert("priority".into(), Value::String(priority.key().to_string()));
        }
        if let Some(agent) = self.assigned_agent {
            out.insert(
                "assignedAgent".into(),
                agent.map(Value::String).unwrap_or(Value::Null),
            );
        }
        out
    }
}

/// Shallow-merge `fields` into an entity object. Non-objects are left alone.
pub fn merge_fields(entity: &mut Value, fields: &Map<String, Value>) {
    if let Some(obj) = entity.as_object_mut() {
        for (k, v) in fields {
            obj.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_alias_id() {
        let mut v = json!({"_id": "L1", "stage": "New Lead"});
        normalize_entity(&mut v);
        assert_eq!(v, json!({"id": "L1", "stage": "New Lead"}));
        assert_eq!(entity_id(&v), Some("L1"));
    }

    #[test]
    fn test_normalize_keeps_canonical_id() {
        let mut v = json!({"id": "L1", "_id": "mongo-oid"});
        normalize_entity(&mut v);
        assert_eq!(v, json!({"id": "L1"}));
    }

    #[test]
    fn test_normalize_numeric_id() {
        let mut v = json!({"id": 42});
        normalize_entity(&mut v);
        assert_eq!(entity_id(&v), Some("42"));
    }

    #[test]
    fn test_lead_from_value() {
        let lead = Lead::from_value(json!({
            "_id": "L9",
            "stage": "Qualified",
            "priority": "A",
            "assignedAgent": "Jane",
            "companyName": "Acme",
            "notes": "call back Tuesday"
        }))
        .unwrap();

        assert_eq!(lead.id, "L9");
        assert_eq!(lead.stage, Stage::Qualified);
        assert_eq!(lead.priority, Some(Priority::High));
        assert_eq!(lead.assigned_agent.as_deref(), Some("Jane"));
        assert_eq!(lead.extra.get("notes"), Some(&json!("call back Tuesday")));
    }

    #[test]
    fn test_lead_accepts_numeric_contact_fields() {
        let lead = Lead::from_value(json!({
            "id": "L3",
            "stage": "Working",
            "workDirectPhone": 5551234567u64,
            "mobilePhone": null,
            "state": 10
        }))
        .unwrap();

        assert_eq!(lead.work_direct_phone.as_deref(), Some("5551234567"));
        assert_eq!(lead.mobile_phone, None);
        assert_eq!(lead.state.as_deref(), Some("10"));
        assert_eq!(lead.home_phone, None);
    }

    #[test]
    fn test_lead_rejects_unknown_stage() {
        assert!(Lead::from_value(json!({"id": "L1", "stage": "Won"})).is_err());
    }

    #[test]
    fn test_patch_fields() {
        let fields = LeadPatch::new()
            .stage(Stage::MeetingBooked)
            .unassign()
            .field("_id", json!("x"))
            .field("notes", json!("hot"))
            .into_fields();

        assert_eq!(fields.get("stage"), Some(&json!("Meeting Booked")));
        assert_eq!(fields.get("assignedAgent"), Some(&Value::Null));
        assert_eq!(fields.get("notes"), Some(&json!("hot")));
        assert!(!fields.contains_key("_id"));
    }

    #[test]
    fn test_merge_fields() {
        let mut lead = json!({"id": "L1", "stage": "New Lead", "priority": "B"});
        let fields = LeadPatch::new().stage(Stage::Working).into_fields();
        merge_fields(&mut lead, &fields);
        assert_eq!(lead, json!({"id": "L1", "stage": "Working", "priority": "B"}));
    }
}
