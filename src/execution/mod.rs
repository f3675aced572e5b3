//! Tool execution coordinator
//!
//! Runs a routed plan in dependency waves. Invocations inside a wave run
//! concurrently; each is bounded by the tool timeout. Read tools retry once
//! after a timeout and stop when the turn is cancelled. Mutating tools run
//! exactly once and always finish.
//!
//! No LLM calls happen here.

use crate::error::OrchestrationError;
use crate::models::UserId;
use crate::router::PlannedInvocation;
use crate::tools::{ToolInput, ToolKind, ToolOutput, ToolRegistry};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maximum invocations allowed per plan
const MAX_INVOCATIONS_PER_PLAN: usize = 16;
/// Attempts for a read tool that timed out
const READ_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Succeeded,
    Failed,
    /// The tool refused its input; retrying cannot help.
    Rejected,
    TimedOut,
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationOutcome {
    pub id: usize,
    pub kind: ToolKind,
    pub status: InvocationStatus,
    pub output: Option<ToolOutput>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub attempts: u32,
}

impl InvocationOutcome {
    fn skipped(invocation: &PlannedInvocation, reason: String) -> Self {
        Self {
            id: invocation.id,
            kind: invocation.request.kind(),
            status: InvocationStatus::Skipped,
            output: None,
            error: Some(reason),
            elapsed_ms: 0,
            attempts: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == InvocationStatus::Succeeded
    }
}

/// Outcomes of one plan, ordered by invocation id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub outcomes: Vec<InvocationOutcome>,
}

impl ExecutionReport {
    /// Nothing succeeded although something was dispatched.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && !self.outcomes.iter().any(InvocationOutcome::succeeded)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &ToolOutput> {
        self.outcomes.iter().filter_map(|o| o.output.as_ref())
    }

    pub fn failures(&self) -> impl Iterator<Item = &InvocationOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    /// Everything failed because of the user's input: at least one tool
    /// rejected it and the rest were skipped behind it.
    pub fn rejected_input(&self) -> bool {
        self.all_failed()
            && self.outcomes.iter().any(|o| o.status == InvocationStatus::Rejected)
            && self.outcomes.iter().all(|o| {
                matches!(o.status, InvocationStatus::Rejected | InvocationStatus::Skipped)
            })
    }

    /// Error texts of rejected invocations, in plan order.
    pub fn rejections(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.status == InvocationStatus::Rejected)
            .filter_map(|o| o.error.as_deref())
    }

    pub fn outcome_for(&self, kind: ToolKind) -> Option<&InvocationOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }
}

pub struct ExecutionCoordinator {
    registry: ToolRegistry,
    tool_timeout: Duration,
}

impl ExecutionCoordinator {
    pub fn new(registry: ToolRegistry, tool_timeout: Duration) -> Self {
        Self {
            registry,
            tool_timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn execute(
        &self,
        user_id: UserId,
        plan: &[PlannedInvocation],
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        if plan.len() > MAX_INVOCATIONS_PER_PLAN {
            warn!(invocations = plan.len(), "Plan exceeds invocation limit, skipping all");
            return ExecutionReport {
                outcomes: plan
                    .iter()
                    .map(|p| {
                        InvocationOutcome::skipped(
                            p,
                            format!("plan exceeds {} invocations", MAX_INVOCATIONS_PER_PLAN),
                        )
                    })
                    .collect(),
            };
        }

        let known: HashMap<usize, &PlannedInvocation> = plan.iter().map(|p| (p.id, p)).collect();
        let mut done: HashMap<usize, InvocationOutcome> = HashMap::with_capacity(plan.len());
        let mut pending: Vec<&PlannedInvocation> = plan.iter().collect();
        let mut wave = 0;

        while !pending.is_empty() {
            let (ready, waiting): (Vec<_>, Vec<_>) = pending.into_iter().partition(|p| {
                p.depends_on
                    .iter()
                    .all(|dep| done.contains_key(dep) || !known.contains_key(dep))
            });
            pending = waiting;

            if ready.is_empty() {
                // Only a dependency cycle leaves nothing runnable.
                for invocation in pending.drain(..) {
                    warn!(id = invocation.id, "Skipping invocation in dependency cycle");
                    done.insert(
                        invocation.id,
                        InvocationOutcome::skipped(invocation, "cyclic dependency".to_string()),
                    );
                }
                break;
            }

            let mut runnable = Vec::new();
            for invocation in ready {
                match blocked_by(invocation, &known, &done) {
                    Some(reason) => {
                        debug!(id = invocation.id, %reason, "Skipping invocation");
                        done.insert(invocation.id, InvocationOutcome::skipped(invocation, reason));
                    }
                    None => runnable.push(invocation),
                }
            }

            debug!(wave, invocations = runnable.len(), "Dispatching wave");
            let results = join_all(runnable.into_iter().map(|invocation| {
                let upstream = invocation
                    .depends_on
                    .iter()
                    .filter_map(|dep| done.get(dep).and_then(|o| o.output.clone()))
                    .collect();
                self.run_invocation(user_id, invocation, upstream, cancel)
            }))
            .await;

            for outcome in results {
                done.insert(outcome.id, outcome);
            }
            wave += 1;
        }

        let mut outcomes: Vec<InvocationOutcome> = done.into_values().collect();
        outcomes.sort_by_key(|o| o.id);
        debug!(outcomes = outcomes.len(), waves = wave, "Plan execution completed");

        ExecutionReport { outcomes }
    }

    async fn run_invocation(
        &self,
        user_id: UserId,
        invocation: &PlannedInvocation,
        upstream: Vec<ToolOutput>,
        cancel: &CancellationToken,
    ) -> InvocationOutcome {
        let kind = invocation.request.kind();
        let start = Instant::now();
        let finish = |status: InvocationStatus, output: Option<ToolOutput>, error: Option<String>, attempts: u32| InvocationOutcome {
            id: invocation.id,
            kind,
            status,
            output,
            error,
            elapsed_ms: start.elapsed().as_millis() as u64,
            attempts,
        };

        if let Err(e) = invocation.request.validate() {
            warn!(id = invocation.id, tool = %kind, error = %e, "Rejected tool input");
            return finish(InvocationStatus::Rejected, None, Some(e.user_message()), 0);
        }

        let Some(tool) = self.registry.get(kind) else {
            warn!(tool = %kind, "Tool not registered");
            return finish(InvocationStatus::Failed, None, Some("tool not registered".to_string()), 0);
        };

        let input = ToolInput {
            user_id,
            request: invocation.request.clone(),
            upstream,
        };

        if kind.is_mutating() {
            return match tokio::time::timeout(self.tool_timeout, tool.execute(&input)).await {
                Ok(Ok(output)) => finish(InvocationStatus::Succeeded, Some(output), None, 1),
                Ok(Err(e)) => {
                    warn!(tool = %kind, error = %e, "Mutating tool failed");
                    let (status, error) = failure(&e);
                    finish(status, None, Some(error), 1)
                }
                Err(_) => {
                    warn!(tool = %kind, "Mutating tool timed out");
                    finish(InvocationStatus::TimedOut, None, Some(self.timeout_message(kind)), 1)
                }
            };
        }

        let mut attempts = 0;
        loop {
            if cancel.is_cancelled() {
                return finish(InvocationStatus::Cancelled, None, Some("turn cancelled".to_string()), attempts);
            }
            attempts += 1;

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(tool = %kind, "Read tool cancelled");
                    return finish(InvocationStatus::Cancelled, None, Some("turn cancelled".to_string()), attempts);
                }
                result = tokio::time::timeout(self.tool_timeout, tool.execute(&input)) => result,
            };

            match result {
                Ok(Ok(output)) => {
                    debug!(tool = %kind, attempts, "Tool succeeded");
                    return finish(InvocationStatus::Succeeded, Some(output), None, attempts);
                }
                Ok(Err(e)) => {
                    warn!(tool = %kind, error = %e, "Tool execution failed");
                    let (status, error) = failure(&e);
                    return finish(status, None, Some(error), attempts);
                }
                Err(_) if attempts < READ_ATTEMPTS => {
                    warn!(tool = %kind, attempts, "Tool timed out, retrying");
                }
                Err(_) => {
                    warn!(tool = %kind, attempts, "Tool timed out");
                    return finish(InvocationStatus::TimedOut, None, Some(self.timeout_message(kind)), attempts);
                }
            }
        }
    }

    fn timeout_message(&self, kind: ToolKind) -> String {
        OrchestrationError::ToolTimeout {
            tool: kind.to_string(),
            timeout_ms: self.tool_timeout.as_millis() as u64,
        }
        .to_string()
    }
}

fn failure(error: &OrchestrationError) -> (InvocationStatus, String) {
    if error.is_input_error() {
        (InvocationStatus::Rejected, error.user_message())
    } else {
        (InvocationStatus::Failed, error.to_string())
    }
}

/// Why an invocation cannot run, if a dependency is unknown or did not succeed.
fn blocked_by(
    invocation: &PlannedInvocation,
    known: &HashMap<usize, &PlannedInvocation>,
    done: &HashMap<usize, InvocationOutcome>,
) -> Option<String> {
    invocation.depends_on.iter().find_map(|dep| {
        if !known.contains_key(dep) {
            return Some(format!("unknown dependency {}", dep));
        }
        match done.get(dep) {
            Some(outcome) if outcome.succeeded() => None,
            Some(_) => Some(format!("dependency {} did not succeed", dep)),
            None => Some(format!("dependency {} never ran", dep)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BudgetSplit;
    use crate::tools::{
        CalcRequest, CalculatorTool, RecordMutationTool, RecordRequest, SearchQuery, Tool,
        ToolRequest,
    };
    use crate::Result;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    /// Search stand-in that sleeps, fails, or answers.
    struct FakeSearch {
        delay: Duration,
        fail: bool,
        calls: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl Tool for FakeSearch {
        fn name(&self) -> &'static str {
            "external_search"
        }
        fn description(&self) -> &'static str {
            "fake"
        }
        fn kind(&self) -> ToolKind {
            ToolKind::ExternalSearch
        }
        async fn execute(&self, _input: &ToolInput) -> Result<ToolOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(OrchestrationError::ToolError("search backend down".into()));
            }
            Ok(ToolOutput::ExternalSearch(vec![]))
        }
    }

    fn coordinator(search: FakeSearch, timeout_ms: u64) -> ExecutionCoordinator {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(search));
        registry.register(Arc::new(CalculatorTool));
        registry.register(Arc::new(RecordMutationTool));
        ExecutionCoordinator::new(registry, Duration::from_millis(timeout_ms))
    }

    fn search_invocation(id: usize) -> PlannedInvocation {
        PlannedInvocation {
            id,
            request: ToolRequest::ExternalSearch(SearchQuery { query: "Gangnam hall wedding".into(), limit: 3 }),
            depends_on: vec![],
        }
    }

    fn split_plan(splits: Vec<BudgetSplit>) -> Vec<PlannedInvocation> {
        vec![
            PlannedInvocation {
                id: 0,
                request: ToolRequest::Calculator(CalcRequest::Split { total: 50_000_000, splits }),
                depends_on: vec![],
            },
            PlannedInvocation {
                id: 1,
                request: ToolRequest::RecordMutation(RecordRequest::AllocateSplit { confirm: false }),
                depends_on: vec![0],
            },
        ]
    }

    #[tokio::test]
    async fn test_dependent_receives_upstream_output() {
        let calls = Arc::new(AtomicU32::new(0));
        let coordinator = coordinator(FakeSearch { delay: Duration::ZERO, fail: false, calls }, 1_000);
        let plan = split_plan(vec![BudgetSplit { category: "hall".into(), percentage: 60.0 }]);

        let report = coordinator.execute(Uuid::new_v4(), &plan, &CancellationToken::new()).await;

        assert!(report.outcomes.iter().all(InvocationOutcome::succeeded));
        let Some(ToolOutput::RecordMutation(changes)) = &report.outcomes[1].output else {
            panic!("record tool produced no changes");
        };
        assert_eq!(changes.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_dependent() {
        let calls = Arc::new(AtomicU32::new(0));
        let coordinator = coordinator(FakeSearch { delay: Duration::ZERO, fail: false, calls }, 1_000);
        let plan = split_plan(vec![BudgetSplit { category: "hall".into(), percentage: 160.0 }]);

        let report = coordinator.execute(Uuid::new_v4(), &plan, &CancellationToken::new()).await;

        assert_eq!(report.outcomes[0].status, InvocationStatus::Rejected);
        assert_eq!(report.outcomes[1].status, InvocationStatus::Skipped);
        assert!(report.all_failed());
        assert!(report.rejected_input());
        assert_eq!(
            report.rejections().collect::<Vec<_>>(),
            vec!["percentage 160 is outside 0-100"]
        );
    }

    #[tokio::test]
    async fn test_read_tool_retries_once_then_times_out() {
        let calls = Arc::new(AtomicU32::new(0));
        let coordinator = coordinator(
            FakeSearch { delay: Duration::from_millis(300), fail: false, calls: calls.clone() },
            30,
        );

        let report = coordinator
            .execute(Uuid::new_v4(), &[search_invocation(0)], &CancellationToken::new())
            .await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.status, InvocationStatus::TimedOut);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tool_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let coordinator = coordinator(
            FakeSearch { delay: Duration::ZERO, fail: true, calls: calls.clone() },
            1_000,
        );
        let report = coordinator
            .execute(Uuid::new_v4(), &[search_invocation(0)], &CancellationToken::new())
            .await;

        assert_eq!(report.outcomes[0].status, InvocationStatus::Failed);
        assert!(!report.rejected_input());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_reads_but_not_writes() {
        let calls = Arc::new(AtomicU32::new(0));
        let coordinator = coordinator(
            FakeSearch { delay: Duration::from_secs(5), fail: false, calls },
            10_000,
        );
        let plan = vec![
            search_invocation(0),
            PlannedInvocation {
                id: 1,
                request: ToolRequest::RecordMutation(RecordRequest::CancelEvent { event_id: 3 }),
                depends_on: vec![],
            },
        ];

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let report = coordinator.execute(Uuid::new_v4(), &plan, &cancel).await;
        assert_eq!(report.outcomes[0].status, InvocationStatus::Cancelled);
        assert_eq!(report.outcomes[1].status, InvocationStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_cycles_and_unknown_dependencies_are_skipped() {
        let calls = Arc::new(AtomicU32::new(0));
        let coordinator = coordinator(FakeSearch { delay: Duration::ZERO, fail: false, calls }, 1_000);
        let mut a = search_invocation(0);
        a.depends_on = vec![1];
        let mut b = search_invocation(1);
        b.depends_on = vec![0];
        let mut c = search_invocation(2);
        c.depends_on = vec![9];

        let report = coordinator.execute(Uuid::new_v4(), &[a, b, c], &CancellationToken::new()).await;
        assert!(report
            .outcomes
            .iter()
            .all(|o| o.status == InvocationStatus::Skipped));
    }

    #[tokio::test]
    async fn test_unregistered_tool_fails() {
        let coordinator = ExecutionCoordinator::new(ToolRegistry::new(), Duration::from_millis(100));
        let report = coordinator
            .execute(Uuid::new_v4(), &[search_invocation(0)], &CancellationToken::new())
            .await;
        assert_eq!(report.outcomes[0].status, InvocationStatus::Failed);
        assert_eq!(report.outcomes[0].attempts, 0);
    }
}
