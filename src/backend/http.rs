//! REST client for the CRM backend
//!
//! Routes:
//!
//! ```text
//! GET    /leads?<query>        list
//! GET    /leads/{id}           detail
//! PUT    /leads/{id}           partial update
//! DELETE /leads/{id}           delete
//! POST   /leads/bulk-assign    {ids, agentName} -> {updated}
//! POST   /leads/bulk-delete    {ids}            -> {deleted}
//! GET    /dashboard/kpis
//! GET    /dashboard/funnel
//! ```

use reqwest::{Client, RequestBuilder, Url};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{BackendResult, BulkAssignResponse, BulkDeleteResponse, LeadBackend};
use crate::cache::ListQuery;
use crate::types::{BackendError, CoreError, Result};

pub struct HttpLeadBackend {
    client: Client,
    base_url: String,
}

impl HttpLeadBackend {
    /// Create a client for `base_url` (e.g. "http://localhost:5000/api")
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| CoreError::Config(format!("HTTP client init failed: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn lead_url(&self, id: &str) -> String {
        let base = self.url("/leads");
        let Ok(mut url) = Url::parse(&base) else {
            return format!("{base}/{id}");
        };
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id);
        }
        url.to_string()
    }

    /// Send a request and decode the JSON body (empty body → `null`).
    async fn send(&self, request: RequestBuilder) -> BackendResult<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::new(format!("Request failed: {e}")))?;

        let status = response.status();
        let url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::new(format!("Body read failed: {e}")))?;

        if !status.is_success() {
            let message = error_message(&body).unwrap_or_else(|| format!("HTTP {status} from {url}"));
            warn!(status = status.as_u16(), url = %url, message = %message, "Backend rejected request");
            return Err(BackendError::with_status(status.as_u16(), message));
        }

        debug!(status = status.as_u16(), url = %url, bytes = body.len(), "Backend response");
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| BackendError::with_status(status.as_u16(), format!("Invalid JSON from {url}: {e}")))
    }
}

/// Human-readable message from an error body: `message`, then `error`.
fn error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|field| parsed.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> BackendResult<T> {
    serde_json::from_value(value).map_err(|e| BackendError::new(format!("Unexpected response: {e}")))
}

#[async_trait::async_trait]
impl LeadBackend for HttpLeadBackend {
    async fn fetch_list(&self, query: &ListQuery) -> BackendResult<Value> {
        let mut url = self.url("/leads");
        if !query.is_empty() {
            let qs = serde_urlencoded::to_string(query)
                .map_err(|e| BackendError::new(format!("Query encoding failed: {e}")))?;
            url = format!("{url}?{qs}");
        }
        self.send(self.client.get(url)).await
    }

    async fn fetch_one(&self, id: &str) -> BackendResult<Value> {
        self.send(self.client.get(self.lead_url(id))).await
    }

    async fn update(&self, id: &str, fields: &Map<String, Value>) -> BackendResult<Value> {
        self.send(self.client.put(self.lead_url(id)).json(fields)).await
    }

    async fn delete(&self, id: &str) -> BackendResult<()> {
        self.send(self.client.delete(self.lead_url(id))).await?;
        Ok(())
    }

    async fn bulk_assign(&self, ids: &[String], agent_name: &str) -> BackendResult<BulkAssignResponse> {
        let body = json!({ "ids": ids, "agentName": agent_name });
        let value = self
            .send(self.client.post(self.url("/leads/bulk-assign")).json(&body))
            .await?;
        decode(value)
    }

    async fn bulk_delete(&self, ids: &[String]) -> BackendResult<BulkDeleteResponse> {
        let body = json!({ "ids": ids });
        let value = self
            .send(self.client.post(self.url("/leads/bulk-delete")).json(&body))
            .await?;
        decode(value)
    }

    async fn fetch_kpis(&self) -> BackendResult<Value> {
        self.send(self.client.get(self.url("/dashboard/kpis"))).await
    }

    async fn fetch_funnel(&self) -> BackendResult<Value> {
        self.send(self.client.get(self.url("/dashboard/funnel"))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_fields() {
        assert_eq!(error_message(r#"{"message":"Lead not found"}"#).as_deref(), Some("Lead not found"));
        assert_eq!(error_message(r#"{"error":"Forbidden"}"#).as_deref(), Some("Forbidden"));
        assert_eq!(error_message("<html>502</html>"), None);
        assert_eq!(error_message(r#"{"status":500}"#), None);
    }

    #[test]
    fn test_urls() {
        let backend = HttpLeadBackend::new("http://localhost:5000/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:5000/api");
        assert_eq!(backend.lead_url("L1"), "http://localhost:5000/api/leads/L1");
        assert_eq!(backend.lead_url("a b"), "http://localhost:5000/api/leads/a%20b");
    }

    #[test]
    fn test_bulk_response_decoding() {
        let resp: BulkAssignResponse = decode(json!({"updated": 1, "message": "ok"})).unwrap();
        assert_eq!(resp.updated, 1);
        assert!(decode::<BulkDeleteResponse>(json!({"ok": true})).is_err());
    }
}
