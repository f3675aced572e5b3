//! Tool trait and registry
//!
//! Every tool takes a typed [`ToolRequest`] and returns a typed
//! [`ToolOutput`]; no untyped JSON crosses the router/coordinator boundary.
//! Read tools (catalog, search, calculator, schedule lookup) are
//! side-effect free. The record tool only *describes* writes as
//! [`RecordChange`]s; the memory merge applies them.

pub mod calculator;
pub mod catalog;
pub mod records;
pub mod schedule;
pub mod search;

use crate::config::OrchestratorConfig;
use crate::error::OrchestrationError;
use crate::memory::MemoryStore;
use crate::models::{MemorySnapshot, UserId};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use calculator::{Allocation, CalcRequest, CalcResult, CalculatorTool};
pub use catalog::{CatalogEntry, CatalogLookupTool, CatalogQuery, CatalogSource, InMemoryCatalog};
pub use records::{
    BudgetWrite, EventDraft, EventPatch, ProfilePatch, RecordChange, RecordMutationTool,
    RecordRequest,
};
pub use schedule::{ScheduleLookupTool, ScheduleQuery, ScheduleView};
pub use search::{ExternalSearchTool, SearchApiClient, SearchHit, SearchQuery};

/// Closed set of tool kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    CatalogLookup,
    ExternalSearch,
    Calculator,
    RecordMutation,
    ScheduleLookup,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::CatalogLookup => "catalog_lookup",
            ToolKind::ExternalSearch => "external_search",
            ToolKind::Calculator => "calculator",
            ToolKind::RecordMutation => "record_mutation",
            ToolKind::ScheduleLookup => "schedule_lookup",
        }
    }

    /// Mutating tools run at most once and are never cancelled mid-flight.
    pub fn is_mutating(&self) -> bool {
        matches!(self, ToolKind::RecordMutation)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================
// Payloads
// =============================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "tool", content = "params", rename_all = "snake_case")]
pub enum ToolRequest {
    CatalogLookup(CatalogQuery),
    ExternalSearch(SearchQuery),
    Calculator(CalcRequest),
    RecordMutation(RecordRequest),
    ScheduleLookup(ScheduleQuery),
}

impl ToolRequest {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolRequest::CatalogLookup(_) => ToolKind::CatalogLookup,
            ToolRequest::ExternalSearch(_) => ToolKind::ExternalSearch,
            ToolRequest::Calculator(_) => ToolKind::Calculator,
            ToolRequest::RecordMutation(_) => ToolKind::RecordMutation,
            ToolRequest::ScheduleLookup(_) => ToolKind::ScheduleLookup,
        }
    }

    /// Checked by the coordinator before dispatch.
    pub fn validate(&self) -> Result<()> {
        match self {
            ToolRequest::CatalogLookup(q) => q.validate(),
            ToolRequest::ExternalSearch(q) => q.validate(),
            ToolRequest::Calculator(r) => r.validate(),
            ToolRequest::RecordMutation(r) => r.validate(),
            ToolRequest::ScheduleLookup(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "tool", content = "data", rename_all = "snake_case")]
pub enum ToolOutput {
    CatalogLookup(Vec<crate::models::OfferingMatch>),
    ExternalSearch(Vec<SearchHit>),
    Calculator(CalcResult),
    RecordMutation(Vec<RecordChange>),
    ScheduleLookup(ScheduleView),
}

impl ToolOutput {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolOutput::CatalogLookup(_) => ToolKind::CatalogLookup,
            ToolOutput::ExternalSearch(_) => ToolKind::ExternalSearch,
            ToolOutput::Calculator(_) => ToolKind::Calculator,
            ToolOutput::RecordMutation(_) => ToolKind::RecordMutation,
            ToolOutput::ScheduleLookup(_) => ToolKind::ScheduleLookup,
        }
    }
}

/// What a tool receives: its own request plus outputs of the invocations
/// it depends on, in dependency order.
#[derive(Debug, Clone)]
pub struct ToolInput {
    pub user_id: UserId,
    pub request: ToolRequest,
    pub upstream: Vec<ToolOutput>,
}

impl ToolInput {
    pub fn new(user_id: UserId, request: ToolRequest) -> Self {
        Self {
            user_id,
            request,
            upstream: Vec::new(),
        }
    }
}

pub(crate) fn wrong_request(tool: &str, request: &ToolRequest) -> OrchestrationError {
    OrchestrationError::InvalidToolInput(format!(
        "{} cannot handle a {} request",
        tool,
        request.kind()
    ))
}

// =============================
// Trait & registry
// =============================

/// Trait for a single tool
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn kind(&self) -> ToolKind;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Tool registry keyed by kind
pub struct ToolRegistry {
    tools: HashMap<ToolKind, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.kind(), tool);
    }

    pub fn get(&self, kind: ToolKind) -> Option<Arc<dyn Tool>> {
        self.tools.get(&kind).cloned()
    }

    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.tools.values().map(|t| t.name()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with every production tool wired to the given collaborators.
pub fn create_default_registry(
    config: &OrchestratorConfig,
    catalog: Arc<dyn CatalogSource>,
    store: Arc<dyn MemoryStore>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(CatalogLookupTool::new(catalog)));
    registry.register(Arc::new(ExternalSearchTool::new(
        config
            .search_api_base_url
            .as_deref()
            .and_then(|url| SearchApiClient::new(url, config.tool_timeout)),
    )));
    registry.register(Arc::new(CalculatorTool));
    registry.register(Arc::new(RecordMutationTool));
    registry.register(Arc::new(ScheduleLookupTool::new(store)));

    registry
}

/// Budget range a catalog query inherits from a stored preference.
pub fn budget_range(snapshot: &MemorySnapshot, category: &str) -> (Option<i64>, Option<i64>) {
    snapshot
        .budget_for(category)
        .map(|b| (b.min_amount, b.max_amount))
        .unwrap_or((None, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    #[test]
    fn test_default_registry_has_every_kind() {
        let config = OrchestratorConfig::default();
        let registry = create_default_registry(
            &config,
            Arc::new(InMemoryCatalog::demo()),
            Arc::new(InMemoryStore::new()),
        );

        for kind in [
            ToolKind::CatalogLookup,
            ToolKind::ExternalSearch,
            ToolKind::Calculator,
            ToolKind::RecordMutation,
            ToolKind::ScheduleLookup,
        ] {
            assert!(registry.get(kind).is_some(), "missing {}", kind);
        }
        assert_eq!(registry.list().len(), 5);
    }

    #[test]
    fn test_only_record_tool_mutates() {
        assert!(ToolKind::RecordMutation.is_mutating());
        assert!(!ToolKind::CatalogLookup.is_mutating());
        assert!(!ToolKind::Calculator.is_mutating());
    }

    #[test]
    fn test_request_serializes_with_tag() {
        let request = ToolRequest::ExternalSearch(SearchQuery {
            query: "Gangnam studio wedding".into(),
            limit: 5,
        });
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tool"], "external_search");
        assert_eq!(json["params"]["limit"], 5);
    }
}
