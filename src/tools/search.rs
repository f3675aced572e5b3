//! External search adapter
//!
//! Calls `POST {SEARCH_API_BASE_URL}/search` with `{query, limit}` and
//! expects `{results: [{title, snippet, source}]}` back. Failures surface as
//! `ToolError` and never abort the turn.

use super::{wrong_request, Tool, ToolInput, ToolKind, ToolOutput, ToolRequest};
use crate::error::OrchestrationError;
use crate::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub limit: u32,
}

impl SearchQuery {
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(OrchestrationError::InvalidToolInput(
                "search query is empty".to_string(),
            ));
        }
        if self.limit == 0 {
            return Err(OrchestrationError::InvalidToolInput(
                "search limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Clone)]
pub struct SearchApiClient {
    client: Client,
    base_url: String,
}

impl SearchApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Option<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .ok()?;

        Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                OrchestrationError::ToolError(format!("Search request failed for {}: {}", path, e))
            })?;

        let status = response.status();
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| OrchestrationError::ToolError(format!("Invalid JSON response: {}", e)))?;

        if !status.is_success() {
            return Err(OrchestrationError::ToolError(format!(
                "Search API returned {} for {}: {}",
                status, path, body
            )));
        }

        Ok(body)
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let body = self
            .post_json(
                "/search",
                &json!({
                    "query": query.query,
                    "limit": query.limit,
                }),
            )
            .await?;

        let parsed: SearchResponse = serde_json::from_value(body).map_err(|e| {
            OrchestrationError::ToolError(format!("Unexpected search response shape: {}", e))
        })?;

        Ok(parsed
            .results
            .into_iter()
            .filter(|hit| !hit.title.trim().is_empty())
            .take(query.limit as usize)
            .collect())
    }
}

pub struct ExternalSearchTool {
    api: Option<SearchApiClient>,
}

impl ExternalSearchTool {
    pub fn new(api: Option<SearchApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl Tool for ExternalSearchTool {
    fn name(&self) -> &'static str {
        "external_search"
    }

    fn description(&self) -> &'static str {
        "Search the web for vendor reviews, prices and availability"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::ExternalSearch
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let ToolRequest::ExternalSearch(query) = &input.request else {
            return Err(wrong_request(self.name(), &input.request));
        };
        let api = self.api.as_ref().ok_or_else(|| {
            OrchestrationError::ToolError("SEARCH_API_BASE_URL is not configured".to_string())
        })?;

        let hits = api.search(query).await?;
        debug!(query = %query.query, hits = hits.len(), "External search finished");
        Ok(ToolOutput::ExternalSearch(hits))
    }
}
