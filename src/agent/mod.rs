//! Turn orchestrator
//!
//! PARSE → ROUTE → {EXECUTE_TOOLS} → MERGE → RESPOND → END, with
//! ROUTE → CLARIFY → RESPOND when a slot is missing and
//! EXECUTE_TOOLS → DEGRADED_RESPOND when every dispatched tool failed.
//!
//! Per-user state lives in the memory store and the engine's history book;
//! a [`TurnTrace`] records the states one turn passed through.

use crate::config::OrchestratorConfig;
use crate::error::OrchestrationError;
use crate::execution::{ExecutionCoordinator, ExecutionReport, InvocationOutcome};
use crate::gemini::GeminiClient;
use crate::memory::{HistoryBook, InMemoryStore, MemoryStore, PostgresMemoryStore, Summarizer, Turn};
use crate::merge::{slot_changes, MemoryMerge, MergeBatch};
use crate::models::{Intent, MemorySnapshot, Slots, UserId};
use crate::parser::{GeminiUnderstanding, IntentParser, LanguageUnderstanding, RuleBasedUnderstanding};
use crate::router::{route, PlannedInvocation, RouteContext, RoutingDecision};
use crate::scheduler::FollowUp;
use crate::synthesizer::{
    GeminiGeneration, GenerationRequest, LanguageGeneration, QuickAction, Reply, Synthesizer,
    TurnFacts,
};
use crate::tools::{create_default_registry, CatalogSource, InMemoryCatalog, ToolOutput};
use crate::Result;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// =============================
// State machine
// =============================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Parse,
    Route,
    ExecuteTools,
    Clarify,
    Merge,
    Respond,
    DegradedRespond,
    End,
}

impl TurnState {
    pub fn can_transition_to(&self, next: TurnState) -> bool {
        use TurnState::*;
        matches!(
            (self, next),
            (Parse, Route)
                | (Route, ExecuteTools)
                | (Route, Clarify)
                | (Route, Merge)
                | (ExecuteTools, Merge)
                | (ExecuteTools, DegradedRespond)
                | (Clarify, Respond)
                | (Merge, Respond)
                | (Respond, End)
                | (DegradedRespond, End)
        )
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Parse => "PARSE",
            TurnState::Route => "ROUTE",
            TurnState::ExecuteTools => "EXECUTE_TOOLS",
            TurnState::Clarify => "CLARIFY",
            TurnState::Merge => "MERGE",
            TurnState::Respond => "RESPOND",
            TurnState::DegradedRespond => "DEGRADED_RESPOND",
            TurnState::End => "END",
        };
        f.write_str(name)
    }
}

/// States visited by one turn, starting at `Parse`.
#[derive(Debug, Clone)]
pub struct TurnTrace {
    states: Vec<TurnState>,
}

impl TurnTrace {
    pub fn start() -> Self {
        Self {
            states: vec![TurnState::Parse],
        }
    }

    pub fn current(&self) -> TurnState {
        self.states
            .last()
            .copied()
            .unwrap_or(TurnState::Parse)
    }

    pub fn advance(&mut self, next: TurnState) -> Result<()> {
        let current = self.current();
        if self.states.contains(&next) {
            return Err(OrchestrationError::InvalidTransition(format!(
                "{} revisited after {}",
                next, current
            )));
        }
        if !current.can_transition_to(next) {
            return Err(OrchestrationError::InvalidTransition(format!(
                "{} -> {}",
                current, next
            )));
        }
        self.states.push(next);
        Ok(())
    }

    pub fn states(&self) -> &[TurnState] {
        &self.states
    }

    pub fn into_states(self) -> Vec<TurnState> {
        self.states
    }
}

// =============================
// Outcome
// =============================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Clarification,
    ConfirmationRequired,
    Degraded,
    /// Tools refused the user's input; the reply says why.
    InputRejected,
    PersistenceFailed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub reply: String,
    pub quick_actions: Vec<QuickAction>,
    pub status: TurnStatus,
    pub intent: Intent,
    pub trace: Vec<TurnState>,
    pub tool_outcomes: Vec<InvocationOutcome>,
    /// Follow-ups for the host to schedule
    pub follow_ups: Vec<FollowUp>,
}

// =============================
// Orchestrator
// =============================

/// Main orchestrator that coordinates one turn at a time per call.
pub struct Orchestrator {
    parser: IntentParser,
    coordinator: ExecutionCoordinator,
    merge: MemoryMerge,
    summarizer: Summarizer,
    synthesizer: Synthesizer,
    history: HistoryBook,
    config: OrchestratorConfig,
    fixed_today: Option<NaiveDate>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        parser: IntentParser,
        coordinator: ExecutionCoordinator,
        merge: MemoryMerge,
        summarizer: Summarizer,
        synthesizer: Synthesizer,
    ) -> Self {
        Self {
            parser,
            coordinator,
            merge,
            summarizer,
            synthesizer,
            history: HistoryBook::new(),
            config,
            fixed_today: None,
        }
    }

    /// Wire every component from configuration. Gemini backs parsing,
    /// summaries and replies when a key is set; keyword rules and templates
    /// otherwise.
    pub fn build(
        config: OrchestratorConfig,
        store: Arc<dyn MemoryStore>,
        catalog: Arc<dyn CatalogSource>,
    ) -> Self {
        let gemini = config
            .gemini_api_key
            .clone()
            .map(|key| Arc::new(GeminiClient::new(key, config.llm_timeout)));

        let understanding: Arc<dyn LanguageUnderstanding> = match &gemini {
            Some(client) => Arc::new(GeminiUnderstanding::new(client.clone())),
            None => Arc::new(RuleBasedUnderstanding),
        };
        let generation: Option<Arc<dyn LanguageGeneration>> = gemini
            .clone()
            .map(|client| Arc::new(GeminiGeneration::new(client)) as Arc<dyn LanguageGeneration>);

        let registry = create_default_registry(&config, catalog, store.clone());
        let coordinator = ExecutionCoordinator::new(registry, config.tool_timeout);

        info!(
            understanding = understanding.name(),
            store = store.backend(),
            tools = ?coordinator.registry().list(),
            "Orchestrator wired"
        );

        Self::new(
            config.clone(),
            IntentParser::new(understanding),
            coordinator,
            MemoryMerge::new(store),
            Summarizer::new(gemini, config.llm_timeout),
            Synthesizer::new(generation, config.llm_timeout, config.follow_up_delay),
        )
    }

    /// Postgres-backed store and catalog when a database URL is configured,
    /// in-memory ones with the demo catalog otherwise.
    pub fn from_config(config: OrchestratorConfig) -> Result<Self> {
        let (store, catalog): (Arc<dyn MemoryStore>, Arc<dyn CatalogSource>) =
            match &config.database_url {
                Some(url) => {
                    let postgres = Arc::new(PostgresMemoryStore::connect_lazy(url)?);
                    (postgres.clone(), postgres)
                }
                None => {
                    warn!("No database configured; planner memory will not survive a restart");
                    (Arc::new(InMemoryStore::new()), Arc::new(InMemoryCatalog::demo()))
                }
            };
        Ok(Self::build(config, store, catalog))
    }

    /// Pin "today" for date-relative routing and schedule views.
    pub fn with_fixed_date(mut self, today: NaiveDate) -> Self {
        self.fixed_today = Some(today);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        self.merge.store()
    }

    fn today(&self) -> NaiveDate {
        self.fixed_today
            .unwrap_or_else(|| Local::now().date_naive())
    }

    /// Run one turn. Every per-turn failure becomes a reply; an `Err` only
    /// signals an illegal state transition.
    pub async fn handle_turn(
        &self,
        user_id: UserId,
        utterance: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let start = Instant::now();
        let today = self.today();
        let mut trace = TurnTrace::start();

        debug!(user_id = %user_id, "Turn started");

        let snapshot = match self.load_snapshot(user_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Snapshot unavailable, continuing with empty state");
                MemorySnapshot::empty(user_id)
            }
        };
        let window = self
            .history
            .window(user_id, self.config.context_window_turns)
            .await;

        // === PARSE ===
        let parsed = self.parser.parse(utterance, &window, &snapshot).await;
        if let Some(reason) = &parsed.fallback_reason {
            debug!(user_id = %user_id, reason = %reason, "Parsed as general chat");
        }
        let intent = parsed.intent;
        let slots = parsed.slots;

        // === ROUTE ===
        trace.advance(TurnState::Route)?;
        let ctx = RouteContext::new(today, self.config.catalog_result_limit);
        let decision = route(intent, &slots, &snapshot, &ctx);
        debug!(user_id = %user_id, intent = %intent, decision = ?decision, "Routed");

        let outcome = match decision {
            RoutingDecision::Clarify(slot) => {
                trace.advance(TurnState::Clarify)?;
                debug!(
                    user_id = %user_id,
                    intent = %intent,
                    error = %OrchestrationError::MissingSlot(slot.to_string()),
                    "Asking for a missing slot"
                );
                let reply = self.synthesizer.clarify(intent, slot, &snapshot);
                trace.advance(TurnState::Respond)?;
                self.history
                    .record(user_id, Turn::new(utterance, reply.text.clone(), intent))
                    .await;
                self.finish(trace, reply, TurnStatus::Clarification, intent, Vec::new(), Vec::new())?
            }

            RoutingDecision::GeneralReply => {
                trace.advance(TurnState::Merge)?;
                let execution = ExecutionReport::default();
                let draft = self.synthesizer.general(utterance, intent, &snapshot);
                let (reply, status, tool_outcomes) = self
                    .merge_and_respond(
                        user_id, utterance, intent, &slots, snapshot, &window, execution, Some(draft),
                        today, cancel, &mut trace,
                    )
                    .await?;
                self.finish(trace, reply, status, intent, tool_outcomes, Vec::new())?
            }

            RoutingDecision::Execute(plan) => {
                trace.advance(TurnState::ExecuteTools)?;
                debug!(user_id = %user_id, tools = ?plan_kinds(&plan), "Dispatching plan");
                let execution = self.coordinator.execute(user_id, &plan, cancel).await;

                if execution.all_failed() {
                    trace.advance(TurnState::DegradedRespond)?;
                    let (reply, follow_ups, status) = if cancel.is_cancelled() {
                        (
                            Reply {
                                text: "That request was cancelled before anything came back.".to_string(),
                                quick_actions: vec![QuickAction::Retry],
                            },
                            Vec::new(),
                            TurnStatus::Cancelled,
                        )
                    } else if execution.rejected_input() {
                        info!(
                            user_id = %user_id,
                            intent = %intent,
                            reasons = ?execution.rejections().collect::<Vec<_>>(),
                            "Input rejected by tools"
                        );
                        (
                            self.synthesizer.rejected_input(&execution),
                            Vec::new(),
                            TurnStatus::InputRejected,
                        )
                    } else {
                        warn!(
                            user_id = %user_id,
                            intent = %intent,
                            error = %OrchestrationError::AllToolsFailed(failure_summary(&execution)),
                            "Degraded turn"
                        );
                        let (reply, follow_up) = self.synthesizer.degraded(user_id, &execution);
                        (reply, vec![follow_up], TurnStatus::Degraded)
                    };
                    self.history
                        .record(user_id, Turn::new(utterance, reply.text.clone(), intent))
                        .await;
                    self.finish(trace, reply, status, intent, execution.outcomes, follow_ups)?
                } else {
                    trace.advance(TurnState::Merge)?;
                    let (reply, status, tool_outcomes) = self
                        .merge_and_respond(
                            user_id, utterance, intent, &slots, snapshot, &window, execution, None,
                            today, cancel, &mut trace,
                        )
                        .await?;
                    self.finish(trace, reply, status, intent, tool_outcomes, Vec::new())?
                }
            }
        };

        info!(
            user_id = %user_id,
            intent = %intent,
            status = ?outcome.status,
            tools = outcome.tool_outcomes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Turn complete"
        );

        Ok(outcome)
    }

    async fn load_snapshot(&self, user_id: UserId) -> Result<MemorySnapshot> {
        let store = self.merge.store();
        store.ensure_profile(user_id).await?;
        store.snapshot(user_id).await
    }

    /// MERGE → RESPOND. Returns the reply, the turn status and the tool
    /// outcomes to report.
    #[allow(clippy::too_many_arguments)]
    async fn merge_and_respond(
        &self,
        user_id: UserId,
        utterance: &str,
        intent: Intent,
        slots: &Slots,
        snapshot: MemorySnapshot,
        window: &[Turn],
        execution: ExecutionReport,
        general_draft: Option<Reply>,
        today: NaiveDate,
        cancel: &CancellationToken,
        trace: &mut TurnTrace,
    ) -> Result<(Reply, TurnStatus, Vec<InvocationOutcome>)> {
        let mut changes: Vec<_> = execution
            .outputs()
            .filter_map(|o| match o {
                ToolOutput::RecordMutation(changes) => Some(changes.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        changes.extend(slot_changes(intent, slots, &snapshot));

        // Summary is computed before taking the user's lock.
        let mut summary_turns = window.to_vec();
        summary_turns.push(Turn::new(utterance, planned_note(&execution), intent));
        let previous = snapshot.latest_summary.as_ref().map(|s| s.content.as_str());
        let summary = self.summarizer.summarize(previous, &summary_turns).await;

        let batch = MergeBatch {
            user_id,
            changes,
            summary: Some(summary),
        };

        let merged = match self.merge.apply(batch).await {
            Ok(report) => report,
            Err(e) => {
                warn!(user_id = %user_id, intent = %intent, error = %e, "Merge failed, turn not persisted");
                trace.advance(TurnState::Respond)?;
                return Ok((
                    self.synthesizer.persistence_failed(),
                    TurnStatus::PersistenceFailed,
                    execution.outcomes,
                ));
            }
        };

        trace.advance(TurnState::Respond)?;

        for conflict in merged.conflicts() {
            info!(
                user_id = %user_id,
                error = %OrchestrationError::LockedBudgetConflict {
                    category: conflict.category.clone(),
                },
                "Write held for confirmation"
            );
        }

        let status = if !merged.conflicts().is_empty() {
            TurnStatus::ConfirmationRequired
        } else if cancel.is_cancelled() {
            TurnStatus::Cancelled
        } else {
            TurnStatus::Completed
        };

        let draft = match general_draft {
            Some(draft) => draft,
            None => self.synthesizer.completed(&TurnFacts {
                intent,
                slots,
                execution: &execution,
                merge: &merged,
                today,
            }),
        };

        let reply = if status == TurnStatus::Completed {
            let request = GenerationRequest {
                utterance,
                intent,
                draft: &draft.text,
                snapshot: &merged.snapshot,
                context_window: window,
            };
            self.synthesizer.polish(draft.clone(), &request).await
        } else {
            draft
        };

        self.history
            .record(user_id, Turn::new(utterance, reply.text.clone(), intent))
            .await;

        Ok((reply, status, execution.outcomes))
    }

    fn finish(
        &self,
        mut trace: TurnTrace,
        reply: Reply,
        status: TurnStatus,
        intent: Intent,
        tool_outcomes: Vec<InvocationOutcome>,
        follow_ups: Vec<FollowUp>,
    ) -> Result<TurnOutcome> {
        trace.advance(TurnState::End)?;
        Ok(TurnOutcome {
            reply: reply.text,
            quick_actions: reply.quick_actions,
            status,
            intent,
            trace: trace.into_states(),
            tool_outcomes,
            follow_ups,
        })
    }
}

/// What the turn did, for the rolling summary; the final reply is not known
/// until after the merge.
fn planned_note(execution: &ExecutionReport) -> String {
    let done: Vec<&str> = execution
        .outcomes
        .iter()
        .filter(|o| o.succeeded())
        .map(|o| o.kind.as_str())
        .collect();
    if done.is_empty() {
        "(general reply)".to_string()
    } else {
        format!("(used {})", done.join(", "))
    }
}

fn failure_summary(execution: &ExecutionReport) -> String {
    execution
        .failures()
        .map(|o| format!("{}={:?}", o.kind, o.status))
        .collect::<Vec<_>>()
        .join(", ")
}

fn plan_kinds(plan: &[PlannedInvocation]) -> Vec<&'static str> {
    plan.iter().map(|p| p.request.kind().as_str()).collect()
}
