//! Response Synthesizer
//!
//! Turns tool outcomes and merge results into the user-facing reply plus a
//! closed set of quick actions. Every reply has a deterministic template;
//! a language-generation capability may rephrase completed replies when it
//! answers within the timeout.

use crate::error::OrchestrationError;
use crate::execution::{ExecutionReport, InvocationStatus};
use crate::gemini::{GeminiClient, PLANNER_PERSONA};
use crate::memory::{format_turns, Turn};
use crate::merge::{AppliedChange, MergeReport};
use crate::models::{format_won, Event, EventStatus, Intent, MemorySnapshot, SlotName, Slots, UserId};
use crate::scheduler::FollowUp;
use crate::tools::{CalcResult, ScheduleView, SearchHit, ToolKind, ToolOutput};
use crate::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// =============================
// Quick actions
// =============================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuickAction {
    SeeDetails,
    MoreOptions,
    AdjustBudget,
    ShowBudget,
    AddEvent,
    ShowSchedule,
    FindVendors,
    ConfirmChange,
    KeepCurrent,
    Retry,
    EnterManually,
    UpdateProfile,
}

impl QuickAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuickAction::SeeDetails => "see_details",
            QuickAction::MoreOptions => "more_options",
            QuickAction::AdjustBudget => "adjust_budget",
            QuickAction::ShowBudget => "show_budget",
            QuickAction::AddEvent => "add_event",
            QuickAction::ShowSchedule => "show_schedule",
            QuickAction::FindVendors => "find_vendors",
            QuickAction::ConfirmChange => "confirm_change",
            QuickAction::KeepCurrent => "keep_current",
            QuickAction::Retry => "retry",
            QuickAction::EnterManually => "enter_manually",
            QuickAction::UpdateProfile => "update_profile",
        }
    }

    /// Button text for console hosts.
    pub fn label(&self) -> &'static str {
        match self {
            QuickAction::SeeDetails => "See details",
            QuickAction::MoreOptions => "More options",
            QuickAction::AdjustBudget => "Adjust budget",
            QuickAction::ShowBudget => "Show budget",
            QuickAction::AddEvent => "Add event",
            QuickAction::ShowSchedule => "Show schedule",
            QuickAction::FindVendors => "Find vendors",
            QuickAction::ConfirmChange => "Yes, change it",
            QuickAction::KeepCurrent => "Keep current",
            QuickAction::Retry => "Try again",
            QuickAction::EnterManually => "Enter manually",
            QuickAction::UpdateProfile => "Update profile",
        }
    }
}

impl fmt::Display for QuickAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    pub text: String,
    pub quick_actions: Vec<QuickAction>,
}

impl Reply {
    fn new(text: impl Into<String>, quick_actions: Vec<QuickAction>) -> Self {
        Self {
            text: text.into(),
            quick_actions,
        }
    }
}

// =============================
// Language generation
// =============================

pub struct GenerationRequest<'a> {
    pub utterance: &'a str,
    pub intent: Intent,
    /// Template reply carrying every fact the answer may use
    pub draft: &'a str,
    pub snapshot: &'a MemorySnapshot,
    pub context_window: &'a [Turn],
}

#[async_trait::async_trait]
pub trait LanguageGeneration: Send + Sync {
    fn name(&self) -> &'static str;
    async fn compose(&self, request: &GenerationRequest<'_>) -> Result<String>;
}

const GENERATION_INSTRUCTIONS: &str = r#"Rewrite the DRAFT reply for the user in a warm, concise tone.
Use only facts that appear in the DRAFT. Keep every amount, date, id and name exactly as written.
Do not invent vendors, prices or dates. Answer in the user's language. Plain text, no markdown tables."#;

pub struct GeminiGeneration {
    client: Arc<GeminiClient>,
}

impl GeminiGeneration {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl LanguageGeneration for GeminiGeneration {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn compose(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let prompt = format!(
            "{}\n\nKNOWN CONTEXT: {}\n\nRECENT TURNS:\n{}\nUSER ({}): {}\n\nDRAFT:\n{}\n\nREPLY:",
            GENERATION_INSTRUCTIONS,
            known_context(request.snapshot).unwrap_or_else(|| "none".to_string()),
            format_turns(request.context_window),
            request.intent,
            request.utterance,
            request.draft
        );

        let (text, confidence) = self.client.generate(&prompt, PLANNER_PERSONA, 0.7).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(OrchestrationError::MalformedOutput("empty generation".to_string()));
        }
        debug!(confidence, "Generated reply");
        Ok(text.to_string())
    }
}

// =============================
// Synthesizer
// =============================

/// What the synthesizer needs from a turn that reached the merge.
pub struct TurnFacts<'a> {
    pub intent: Intent,
    pub slots: &'a Slots,
    pub execution: &'a ExecutionReport,
    pub merge: &'a MergeReport,
    pub today: NaiveDate,
}

pub struct Synthesizer {
    generator: Option<Arc<dyn LanguageGeneration>>,
    timeout: Duration,
    follow_up_delay: Duration,
}

impl Synthesizer {
    pub fn new(
        generator: Option<Arc<dyn LanguageGeneration>>,
        timeout: Duration,
        follow_up_delay: Duration,
    ) -> Self {
        Self {
            generator,
            timeout,
            follow_up_delay,
        }
    }

    /// Templates only.
    pub fn deterministic(follow_up_delay: Duration) -> Self {
        Self::new(None, Duration::from_secs(0), follow_up_delay)
    }

    /// Let the generator rephrase a draft; keep the draft on any failure.
    pub async fn polish(&self, draft: Reply, request: &GenerationRequest<'_>) -> Reply {
        let Some(generator) = &self.generator else {
            return draft;
        };

        match tokio::time::timeout(self.timeout, generator.compose(request)).await {
            Ok(Ok(text)) => Reply {
                text,
                quick_actions: draft.quick_actions,
            },
            Ok(Err(e)) => {
                warn!(generator = generator.name(), error = %e, "Generation failed, using template");
                draft
            }
            Err(_) => {
                warn!(generator = generator.name(), "Generation timed out, using template");
                draft
            }
        }
    }

    pub fn clarify(&self, intent: Intent, slot: SlotName, snapshot: &MemorySnapshot) -> Reply {
        match slot {
            SlotName::Category => Reply::new(
                "Which category should I look at? For example hall, studio, dress, makeup, \
                 honeymoon, jewelry or invitation.",
                vec![QuickAction::FindVendors, QuickAction::EnterManually],
            ),
            SlotName::Amount
                if intent == Intent::BudgetQuery
                    || (intent == Intent::BudgetUpdate && snapshot.profile.total_budget.is_none()) =>
            {
                Reply::new(
                    "What is your total wedding budget? An amount like \"50,000,000 won\" or \"5천만원\" works.",
                    vec![QuickAction::EnterManually],
                )
            }
            SlotName::Amount => Reply::new(
                "What amount should I use for that?",
                vec![QuickAction::EnterManually, QuickAction::ShowBudget],
            ),
            SlotName::Title => Reply::new(
                "What should I call this event, or what would you like to change about it?",
                vec![QuickAction::EnterManually, QuickAction::ShowSchedule],
            ),
            SlotName::EventId => {
                let mut text = String::from("Which event do you mean?");
                let active: Vec<&Event> = snapshot
                    .events
                    .iter()
                    .filter(|e| e.status != EventStatus::Cancelled)
                    .collect();
                if active.is_empty() {
                    text.push_str(" You don't have any events yet.");
                    return Reply::new(text, vec![QuickAction::AddEvent]);
                }
                for event in active {
                    text.push_str(&format!("\n- #{} {}", event.event_id, describe_event(event)));
                }
                Reply::new(text, vec![QuickAction::ShowSchedule])
            }
            SlotName::MilestoneId => {
                let mut text = String::from("Which checklist item do you mean?");
                let open: Vec<_> = snapshot.milestones.iter().filter(|m| !m.completed).take(5).collect();
                if open.is_empty() {
                    text.push_str(" There are no open checklist items.");
                }
                for milestone in open {
                    text.push_str(&format!(
                        "\n- #{} {} (due {})",
                        milestone.milestone_id, milestone.title, milestone.due_date
                    ));
                }
                Reply::new(text, vec![QuickAction::ShowSchedule])
            }
            SlotName::ProfileField => Reply::new(
                "What should I update? I can keep your name, region, contact, guest count and wedding date.",
                vec![QuickAction::UpdateProfile],
            ),
        }
    }

    /// Reply for turns that reached the merge.
    pub fn completed(&self, facts: &TurnFacts<'_>) -> Reply {
        let mut reply = match facts.intent {
            Intent::RecommendVendor => recommendations(facts),
            Intent::BudgetUpdate => budget_update(facts),
            Intent::BudgetQuery => budget_query(facts),
            Intent::ScheduleCreate | Intent::ScheduleUpdate => schedule_change(facts),
            Intent::ScheduleQuery => schedule_overview(facts),
            Intent::ProfileUpdate => profile_update(facts),
            Intent::GeneralChat => Reply::new("Noted.", vec![]),
        };

        let notes = partial_failure_notes(facts.execution);
        if !notes.is_empty() {
            reply.text.push_str("\n\n");
            reply.text.push_str(&notes.join(" "));
            if !reply.quick_actions.contains(&QuickAction::Retry) {
                reply.quick_actions.push(QuickAction::Retry);
            }
        }
        reply
    }

    /// Off-topic or unparseable input.
    pub fn general(&self, utterance: &str, intent: Intent, snapshot: &MemorySnapshot) -> Reply {
        let mut text = if detect_stress(utterance) {
            String::from(
                "Wedding planning can feel like a lot. Let's take it one step at a time; \
                 I can start with whichever part worries you most.",
            )
        } else {
            fallback_template(intent, utterance).to_string()
        };

        if contains_personal_info(utterance) {
            text.push_str(" Please avoid sharing sensitive numbers like card or resident registration numbers here.");
        }
        if let Some(context) = known_context(snapshot) {
            text.push_str(&format!("\nSo far: {}.", context));
        }

        Reply::new(
            text,
            vec![QuickAction::FindVendors, QuickAction::ShowBudget, QuickAction::ShowSchedule],
        )
    }

    /// All dispatched tools failed.
    pub fn degraded(&self, user_id: UserId, execution: &ExecutionReport) -> (Reply, FollowUp) {
        let timed_out = execution
            .outcomes
            .iter()
            .any(|o| o.status == InvocationStatus::TimedOut);
        let text = if timed_out {
            "My planning tools are taking too long to answer right now. I'll check back shortly, \
             or you can try again."
        } else {
            "I couldn't reach my planning tools just now. You can try again, or tell me the details \
             directly and I'll note them."
        };

        let follow_up = FollowUp {
            user_id,
            delay: self.follow_up_delay,
            message: "Want me to try that again now?".to_string(),
            quick_actions: vec![QuickAction::Retry],
        };
        (
            Reply::new(text, vec![QuickAction::Retry, QuickAction::EnterManually]),
            follow_up,
        )
    }

    /// Every tool refused the user's input; say why instead of offering a
    /// retry that would fail the same way.
    pub fn rejected_input(&self, execution: &ExecutionReport) -> Reply {
        let reasons: Vec<&str> = execution.rejections().collect();
        let text = if reasons.is_empty() {
            "I couldn't use those details. Could you rephrase them?".to_string()
        } else {
            format!(
                "I can't work with that as given: {}. Could you adjust it and tell me again?",
                reasons.join("; ")
            )
        };
        let budget_related = execution
            .outcomes
            .iter()
            .any(|o| o.status == InvocationStatus::Rejected && o.kind == ToolKind::Calculator);
        let actions = if budget_related {
            vec![QuickAction::AdjustBudget, QuickAction::ShowBudget]
        } else {
            vec![QuickAction::EnterManually]
        };
        Reply::new(text, actions)
    }

    pub fn persistence_failed(&self) -> Reply {
        Reply::new(
            "I couldn't save that, so nothing was changed. Please try again in a moment.",
            vec![QuickAction::Retry],
        )
    }
}

// =============================
// Templates
// =============================

const GENERAL_TEMPLATES: &[&str] = &[
    "I'm here to help with your wedding plans. Ask me for venue or studio ideas, or tell me your budget.",
    "Happy to chat! When you're ready, I can recommend vendors, split your budget, or track your schedule.",
    "Got it. If it helps, tell me your region and budget and I'll suggest a few options.",
    "Thanks for sharing. Shall we look at halls, studios, dresses or makeup next?",
];

/// Same intent and utterance always pick the same template.
pub fn fallback_template(intent: Intent, utterance: &str) -> &'static str {
    let normalized = utterance
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let mut hasher = Sha256::new();
    hasher.update(intent.as_str().as_bytes());
    hasher.update(b"\x00");
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let index = (u64::from_be_bytes(bytes) % GENERAL_TEMPLATES.len() as u64) as usize;
    GENERAL_TEMPLATES[index]
}

fn detect_stress(text: &str) -> bool {
    const SIGNALS: &[&str] = &[
        "stressed", "overwhelmed", "exhausted", "tired", "worried", "anxious", "confused",
        "give up", "힘들어", "스트레스", "지쳐", "막막", "답답", "걱정", "불안", "포기",
    ];
    let lower = text.to_lowercase();
    SIGNALS.iter().any(|s| lower.contains(s))
}

/// Phone-, card- or id-number-shaped digit runs.
fn contains_personal_info(text: &str) -> bool {
    text.split(|c: char| c.is_whitespace())
        .map(|token| token.trim_matches(|c: char| !c.is_ascii_digit()))
        .any(|token| {
            let groups: Vec<&str> = token.split('-').collect();
            let all_digits = groups.iter().all(|g| !g.is_empty() && g.chars().all(|c| c.is_ascii_digit()));
            let lengths: Vec<usize> = groups.iter().map(|g| g.len()).collect();
            all_digits
                && matches!(
                    lengths.as_slice(),
                    [3, 4, 4] | [6, 7] | [4, 4, 4, 4]
                )
        })
}

fn known_context(snapshot: &MemorySnapshot) -> Option<String> {
    let profile = &snapshot.profile;
    let mut parts = Vec::new();
    if let Some(total) = profile.total_budget {
        parts.push(format!("budget {}", format_won(total)));
    }
    if let Some(date) = profile.wedding_date {
        parts.push(format!("wedding date {}", date));
    }
    if let Some(region) = &profile.region {
        parts.push(format!("region {}", region));
    }
    if let Some(guests) = profile.guest_count {
        parts.push(format!("{} guests", guests));
    }
    (!parts.is_empty()).then(|| parts.join(" · "))
}

fn describe_event(event: &Event) -> String {
    let mut text = event.label().to_string();
    match (event.date, event.time) {
        (Some(date), Some(time)) => text.push_str(&format!(" on {} at {}", date, time.format("%H:%M"))),
        (Some(date), None) => text.push_str(&format!(" on {}", date)),
        _ => text.push_str(" (date to be decided)"),
    }
    if let Some(location) = &event.location {
        text.push_str(&format!(" at {}", location));
    }
    text
}

fn partial_failure_notes(execution: &ExecutionReport) -> Vec<String> {
    execution
        .failures()
        .map(|o| {
            let what = match o.kind {
                ToolKind::CatalogLookup => "The vendor catalog",
                ToolKind::ExternalSearch => "Web search",
                ToolKind::Calculator => "The budget calculation",
                ToolKind::RecordMutation => "Saving that change",
                ToolKind::ScheduleLookup => "The schedule",
            };
            match o.status {
                InvocationStatus::TimedOut => format!("{} timed out, so this answer may be incomplete.", what),
                InvocationStatus::Cancelled => format!("{} was cancelled.", what),
                InvocationStatus::Skipped => format!("{} was skipped.", what),
                InvocationStatus::Rejected => match o.error.as_deref() {
                    Some(reason) => format!("{} couldn't use that: {}.", what, reason),
                    None => format!("{} couldn't use that input.", what),
                },
                _ => format!("{} was unavailable.", what),
            }
        })
        .collect()
}

fn calc_result(execution: &ExecutionReport) -> Option<&CalcResult> {
    execution.outputs().find_map(|o| match o {
        ToolOutput::Calculator(result) => Some(result),
        _ => None,
    })
}

fn recommendations(facts: &TurnFacts<'_>) -> Reply {
    let category = facts.slots.category.as_deref().unwrap_or("vendor");
    let mut lines = Vec::new();

    let matches = facts.execution.outputs().find_map(|o| match o {
        ToolOutput::CatalogLookup(matches) => Some(matches),
        _ => None,
    });
    let hits: Option<&Vec<SearchHit>> = facts.execution.outputs().find_map(|o| match o {
        ToolOutput::ExternalSearch(hits) => Some(hits),
        _ => None,
    });

    match matches {
        Some(matches) if !matches.is_empty() => {
            lines.push(format!("Here are {} options I found:", category));
            for (i, m) in matches.iter().enumerate() {
                let price = m
                    .offering
                    .price
                    .map(format_won)
                    .unwrap_or_else(|| "price on request".to_string());
                let region = m.vendor_region.as_deref().unwrap_or("region unknown");
                lines.push(format!(
                    "{}. {} - {} ({}, {})",
                    i + 1,
                    m.vendor_name,
                    m.offering.package_name,
                    price,
                    region
                ));
            }
        }
        Some(_) => lines.push(format!(
            "I couldn't find any {} options in the catalog that match your region and budget.",
            category
        )),
        None => {}
    }

    if let Some(hits) = hits.filter(|h| !h.is_empty()) {
        lines.push("From the web:".to_string());
        for hit in hits {
            if hit.source.is_empty() {
                lines.push(format!("- {}", hit.title));
            } else {
                lines.push(format!("- {} ({})", hit.title, hit.source));
            }
        }
    }

    if lines.is_empty() {
        lines.push(format!("I don't have {} suggestions to show right now.", category));
    }

    Reply::new(
        lines.join("\n"),
        vec![QuickAction::SeeDetails, QuickAction::MoreOptions, QuickAction::AdjustBudget],
    )
}

fn budget_update(facts: &TurnFacts<'_>) -> Reply {
    let mut lines = Vec::new();
    let mut conflict = false;

    for applied in &facts.merge.applied {
        match applied {
            AppliedChange::BudgetSaved { preference, .. } => {
                let mut line = format!("Saved {} budget", preference.category);
                match (preference.min_amount, preference.max_amount) {
                    (Some(min), Some(max)) => line.push_str(&format!(": {} to {}", format_won(min), format_won(max))),
                    (None, Some(max)) => line.push_str(&format!(": up to {}", format_won(max))),
                    (Some(min), None) => line.push_str(&format!(": at least {}", format_won(min))),
                    (None, None) => {}
                }
                if preference.locked {
                    line.push_str(" (locked)");
                }
                lines.push(format!("{}.", line));
            }
            AppliedChange::BudgetUnchanged { category } => {
                lines.push(format!("Your {} budget already has those values.", category));
            }
            AppliedChange::BudgetConflict(c) => {
                conflict = true;
                let current = c.current_max.map(format_won).unwrap_or_else(|| "its current value".to_string());
                let requested = c.requested_max.map(format_won).unwrap_or_else(|| "the new value".to_string());
                lines.push(format!(
                    "Your {} budget is locked at {}. Do you want to change it to {}?",
                    c.category, current, requested
                ));
            }
            AppliedChange::ProfileUpdated(profile) => {
                if let (Some(total), true) = (profile.total_budget, !facts.slots.splits.is_empty()) {
                    lines.push(format!("Total budget set to {}.", format_won(total)));
                }
            }
            _ => {}
        }
    }

    if let Some(result) = calc_result(facts.execution) {
        if result.remainder > 0 {
            lines.push(format!("Unallocated: {}.", format_won(result.remainder)));
        } else if result.remainder < 0 {
            lines.push(format!("Over budget by {}.", format_won(-result.remainder)));
        }
    }

    if lines.is_empty() {
        lines.push("Nothing changed in your budget.".to_string());
    }

    let actions = if conflict {
        vec![QuickAction::ConfirmChange, QuickAction::KeepCurrent]
    } else {
        vec![QuickAction::ShowBudget, QuickAction::FindVendors]
    };
    Reply::new(lines.join("\n"), actions)
}

fn budget_query(facts: &TurnFacts<'_>) -> Reply {
    let Some(result) = calc_result(facts.execution) else {
        return Reply::new("I couldn't work out your budget right now.", vec![QuickAction::Retry]);
    };

    if let (Some(value), Some(percentage)) = (result.value, facts.slots.percentage) {
        return Reply::new(
            format!("{}% of {} is {}.", percentage, format_won(result.total), format_won(value)),
            vec![QuickAction::ShowBudget, QuickAction::AdjustBudget],
        );
    }

    let mut lines = vec![format!("Total budget: {}", format_won(result.total))];
    for allocation in &result.allocations {
        let locked = facts
            .merge
            .snapshot
            .budget_for(&allocation.category)
            .map_or(false, |b| b.locked);
        lines.push(format!(
            "- {}: {}{}",
            allocation.category,
            format_won(allocation.amount),
            if locked { " (locked)" } else { "" }
        ));
    }
    if result.remainder >= 0 {
        lines.push(format!("Remaining: {}", format_won(result.remainder)));
    } else {
        lines.push(format!("Over budget by {}", format_won(-result.remainder)));
    }

    Reply::new(lines.join("\n"), vec![QuickAction::AdjustBudget, QuickAction::FindVendors])
}

fn schedule_change(facts: &TurnFacts<'_>) -> Reply {
    let mut lines = Vec::new();

    for applied in &facts.merge.applied {
        match applied {
            AppliedChange::EventCreated(event) => {
                lines.push(format!("Added {}.", describe_event(event)));
            }
            AppliedChange::EventUpdated(event) => {
                lines.push(format!("Updated #{}: {}.", event.event_id, describe_event(event)));
            }
            AppliedChange::EventCancelled(event) => {
                lines.push(format!("Cancelled {}.", event.label()));
            }
            AppliedChange::EventNotFound { event_id } => {
                lines.push(format!("I couldn't find event #{}.", event_id));
            }
            AppliedChange::MilestoneSet { milestone, changed } => {
                let state = if milestone.completed { "done" } else { "not done" };
                if *changed {
                    lines.push(format!("Marked \"{}\" as {}.", milestone.title, state));
                } else {
                    lines.push(format!("\"{}\" was already marked {}.", milestone.title, state));
                }
            }
            AppliedChange::MilestoneNotFound { milestone_id } => {
                lines.push(format!("I couldn't find checklist item #{}.", milestone_id));
            }
            AppliedChange::MilestonesGenerated { created, skipped } => {
                if !created.is_empty() {
                    lines.push(format!("Created {} checklist items counting back from the wedding.", created.len()));
                } else if *skipped > 0 {
                    lines.push("Your wedding checklist is already in place.".to_string());
                }
            }
            _ => {}
        }
    }

    let snapshot = &facts.merge.snapshot;
    if !snapshot.milestones.is_empty() {
        lines.push(format!("Readiness: {}%.", snapshot.readiness_percent()));
    }
    if lines.is_empty() {
        lines.push("Your schedule is unchanged.".to_string());
    }

    Reply::new(lines.join("\n"), vec![QuickAction::ShowSchedule, QuickAction::AddEvent])
}

fn schedule_overview(facts: &TurnFacts<'_>) -> Reply {
    let view: Option<&ScheduleView> = facts.execution.outputs().find_map(|o| match o {
        ToolOutput::ScheduleLookup(view) => Some(view),
        _ => None,
    });
    let Some(view) = view else {
        return Reply::new("I couldn't load your schedule right now.", vec![QuickAction::Retry]);
    };

    let mut lines = Vec::new();
    match (view.wedding_date, view.days_until_wedding) {
        (Some(date), Some(days)) if days > 0 => lines.push(format!("D-{} until the wedding ({}).", days, date)),
        (Some(date), Some(0)) => lines.push(format!("The wedding is today ({})!", date)),
        (Some(date), _) => lines.push(format!("Wedding date: {}.", date)),
        (None, _) => lines.push("No wedding date yet.".to_string()),
    }

    if view.events.is_empty() {
        lines.push("No events scheduled.".to_string());
    } else {
        lines.push("Events:".to_string());
        for event in &view.events {
            lines.push(format!("- #{} {}", event.event_id, describe_event(event)));
        }
    }

    let upcoming: Vec<_> = view.milestones.iter().filter(|m| !m.completed).take(5).collect();
    if !upcoming.is_empty() {
        lines.push("Next on the checklist:".to_string());
        for milestone in upcoming {
            let overdue = if milestone.due_date < facts.today { " (overdue)" } else { "" };
            lines.push(format!(
                "- #{} {} by {}{}",
                milestone.milestone_id, milestone.title, milestone.due_date, overdue
            ));
        }
    }
    if !view.milestones.is_empty() {
        lines.push(format!("Readiness: {}%.", view.readiness_percent));
    }

    Reply::new(lines.join("\n"), vec![QuickAction::AddEvent, QuickAction::SeeDetails])
}

fn profile_update(facts: &TurnFacts<'_>) -> Reply {
    let slots = facts.slots;
    let mut fields = Vec::new();
    if let Some(name) = &slots.name {
        fields.push(format!("name {}", name));
    }
    if let Some(region) = &slots.region {
        fields.push(format!("region {}", region));
    }
    if let Some(contact) = &slots.contact {
        fields.push(format!("contact {}", contact));
    }
    if let Some(guests) = slots.guest_count {
        fields.push(format!("guest count {}", guests));
    }
    if let Some(date) = slots.date {
        fields.push(format!("wedding date {}", date));
    }
    if slots.notes.is_some() {
        fields.push("notes".to_string());
    }

    let saved = facts
        .merge
        .applied
        .iter()
        .any(|a| matches!(a, AppliedChange::ProfileUpdated(_)));
    let text = if saved && !fields.is_empty() {
        format!("Updated your profile: {}.", fields.join(", "))
    } else {
        "Your profile is unchanged.".to_string()
    };
    Reply::new(text, vec![QuickAction::FindVendors, QuickAction::ShowSchedule])
}
