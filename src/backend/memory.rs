//! In-memory backend
//!
//! Holds leads in a map and answers the same calls the REST backend does.
//! Lists come back in the nested `{leads: [...], total}` shape; query
//! parameters filter by exact match on the field of the same name.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{BackendResult, BulkAssignResponse, BulkDeleteResponse, LeadBackend};
use crate::cache::ListQuery;
use crate::lead::{entity_id, merge_fields, normalize_entity, ID_FIELD};
use crate::pipeline::list_stages;
use crate::types::BackendError;

pub struct InMemoryLeadBackend {
    leads: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl InMemoryLeadBackend {
    pub fn new() -> Self {
        Self {
            leads: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Build from raw lead records; records without an id are skipped.
    pub fn with_leads(records: impl IntoIterator<Item = Value>) -> Self {
        let mut leads = BTreeMap::new();
        for mut record in records {
            normalize_entity(&mut record);
            if let Some(id) = entity_id(&record).map(str::to_string) {
                leads.insert(id, record);
            }
        }
        Self {
            leads: Arc::new(RwLock::new(leads)),
        }
    }

    pub async fn insert(&self, mut record: Value) {
        normalize_entity(&mut record);
        if let Some(id) = entity_id(&record).map(str::to_string) {
            self.leads.write().await.insert(id, record);
        }
    }

    pub async fn len(&self) -> usize {
        self.leads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.leads.read().await.is_empty()
    }
}

impl Default for InMemoryLeadBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(id: &str) -> BackendError {
    BackendError::with_status(404, format!("Lead not found: {id}"))
}

fn matches_query(lead: &Value, query: &ListQuery) -> bool {
    query.params().all(|(field, wanted)| match lead.get(field) {
        Some(Value::String(s)) => s == wanted,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == wanted,
    })
}

#[async_trait::async_trait]
impl LeadBackend for InMemoryLeadBackend {
    async fn fetch_list(&self, query: &ListQuery) -> BackendResult<Value> {
        let leads = self.leads.read().await;
        let items: Vec<Value> = leads
            .values()
            .filter(|lead| matches_query(lead, query))
            .cloned()
            .collect();
        Ok(json!({ "total": items.len(), "leads": items }))
    }

    async fn fetch_one(&self, id: &str) -> BackendResult<Value> {
        self.leads
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn update(&self, id: &str, fields: &Map<String, Value>) -> BackendResult<Value> {
        let mut leads = self.leads.write().await;
        let lead = leads.get_mut(id).ok_or_else(|| not_found(id))?;
        let mut fields = fields.clone();
        fields.remove(ID_FIELD);
        merge_fields(lead, &fields);
        Ok(lead.clone())
    }

    async fn delete(&self, id: &str) -> BackendResult<()> {
        self.leads
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    async fn bulk_assign(&self, ids: &[String], agent_name: &str) -> BackendResult<BulkAssignResponse> {
        let mut leads = self.leads.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(lead) = leads.get_mut(id) {
                lead["assignedAgent"] = Value::String(agent_name.to_string());
                updated += 1;
            }
        }
        Ok(BulkAssignResponse { updated })
    }

    async fn bulk_delete(&self, ids: &[String]) -> BackendResult<BulkDeleteResponse> {
        let mut leads = self.leads.write().await;
        let deleted = ids.iter().filter(|id| leads.remove(id.as_str()).is_some()).count();
        Ok(BulkDeleteResponse {
            deleted: deleted as u64,
        })
    }

    async fn fetch_kpis(&self) -> BackendResult<Value> {
        let leads = self.leads.read().await;
        let assigned = leads
            .values()
            .filter(|l| l.get("assignedAgent").map(|a| !a.is_null()).unwrap_or(false))
            .count();
        let closed_won = leads
            .values()
            .filter(|l| l.get("stage").and_then(Value::as_str) == Some("Closed Won"))
            .count();
        Ok(json!({
            "totalLeads": leads.len(),
            "assigned": assigned,
            "unassigned": leads.len() - assigned,
            "closedWon": closed_won,
        }))
    }

    async fn fetch_funnel(&self) -> BackendResult<Value> {
        let leads = self.leads.read().await;
        let funnel: Vec<Value> = list_stages()
            .iter()
            .map(|stage| {
                let count = leads
                    .values()
                    .filter(|l| l.get("stage").and_then(Value::as_str) == Some(stage.key()))
                    .count();
                json!({ "stage": stage.key(), "count": count })
            })
            .collect();
        Ok(Value::Array(funnel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> InMemoryLeadBackend {
        InMemoryLeadBackend::with_leads(vec![
            json!({"_id": "L1", "stage": "New Lead", "assignedAgent": null}),
            json!({"id": "L2", "stage": "Qualified", "assignedAgent": "Jane"}),
            json!({"stage": "Working"}),
        ])
    }

    #[tokio::test]
    async fn test_list_and_filter() {
        let backend = backend();
        assert_eq!(backend.len().await, 2);

        let all = backend.fetch_list(&ListQuery::new()).await.unwrap();
        assert_eq!(all["total"], json!(2));

        let jane = backend
            .fetch_list(&ListQuery::new().param("assignedAgent", "Jane"))
            .await
            .unwrap();
        assert_eq!(jane["leads"].as_array().unwrap().len(), 1);
        assert_eq!(jane["leads"][0]["id"], json!("L2"));
    }

    #[tokio::test]
    async fn test_update_and_missing() {
        let backend = backend();
        let mut fields = Map::new();
        fields.insert("stage".into(), json!("Working"));
        fields.insert("id".into(), json!("hijack"));

        let updated = backend.update("L1", &fields).await.unwrap();
        assert_eq!(updated["stage"], json!("Working"));
        assert_eq!(updated["id"], json!("L1"));

        let err = backend.update("L9", &fields).await.unwrap_err();
        assert_eq!(err.status, Some(404));
    }

    #[tokio::test]
    async fn test_bulk_counts_only_existing() {
        let backend = backend();
        let ids = vec!["L1".to_string(), "L404".to_string()];
        assert_eq!(backend.bulk_assign(&ids, "Sam").await.unwrap().updated, 1);
        assert_eq!(backend.fetch_one("L1").await.unwrap()["assignedAgent"], json!("Sam"));
        assert_eq!(backend.bulk_delete(&ids).await.unwrap().deleted, 1);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_rollups() {
        let backend = backend();
        let kpis = backend.fetch_kpis().await.unwrap();
        assert_eq!(kpis["assigned"], json!(1));
        assert_eq!(kpis["unassigned"], json!(1));

        let funnel = backend.fetch_funnel().await.unwrap();
        let funnel = funnel.as_array().unwrap();
        assert_eq!(funnel.len(), 11);
        assert_eq!(funnel[3], json!({"stage": "Qualified", "count": 1}));
    }
}
