//! Router
//!
//! Maps an intent and its slots to a tool plan, a clarification, or a plain
//! reply. Pure: the same intent, slots, snapshot and context always produce
//! the same decision.

use crate::models::{is_wedding_event, EventStatus, Intent, MemorySnapshot, SlotName, Slots};
use crate::tools::{
    budget_range, Allocation, BudgetWrite, CalcRequest, CatalogQuery, EventDraft, EventPatch,
    ProfilePatch, RecordRequest, ScheduleQuery, SearchQuery, ToolRequest,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One tool call in a turn's plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedInvocation {
    pub id: usize,
    pub request: ToolRequest,
    /// Ids whose outputs this invocation consumes
    #[serde(default)]
    pub depends_on: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoutingDecision {
    Execute(Vec<PlannedInvocation>),
    Clarify(SlotName),
    GeneralReply,
}

/// Per-turn inputs the router needs besides the parse.
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub today: NaiveDate,
    pub catalog_limit: u32,
    pub search_limit: u32,
}

impl RouteContext {
    pub fn new(today: NaiveDate, catalog_limit: u32) -> Self {
        Self {
            today,
            catalog_limit,
            search_limit: 3,
        }
    }
}

struct Plan {
    invocations: Vec<PlannedInvocation>,
}

impl Plan {
    fn new() -> Self {
        Self { invocations: Vec::new() }
    }

    fn add(&mut self, request: ToolRequest, depends_on: Vec<usize>) -> usize {
        let id = self.invocations.len();
        self.invocations.push(PlannedInvocation { id, request, depends_on });
        id
    }

    fn record(&mut self, request: RecordRequest) -> usize {
        self.add(ToolRequest::RecordMutation(request), Vec::new())
    }

    fn done(self) -> RoutingDecision {
        RoutingDecision::Execute(self.invocations)
    }
}

pub fn route(intent: Intent, slots: &Slots, snapshot: &MemorySnapshot, ctx: &RouteContext) -> RoutingDecision {
    match intent {
        Intent::RecommendVendor => recommend_vendor(slots, snapshot, ctx),
        Intent::BudgetUpdate => budget_update(slots, snapshot),
        Intent::BudgetQuery => budget_query(slots, snapshot),
        Intent::ScheduleCreate => schedule_create(slots),
        Intent::ScheduleUpdate => schedule_update(slots, snapshot),
        Intent::ScheduleQuery => {
            let mut plan = Plan::new();
            plan.add(
                ToolRequest::ScheduleLookup(ScheduleQuery {
                    today: ctx.today,
                    include_cancelled: false,
                }),
                Vec::new(),
            );
            plan.done()
        }
        Intent::ProfileUpdate => profile_update(slots),
        Intent::GeneralChat => RoutingDecision::GeneralReply,
    }
}

fn recommend_vendor(slots: &Slots, snapshot: &MemorySnapshot, ctx: &RouteContext) -> RoutingDecision {
    let Some(category) = slots.category.clone() else {
        return RoutingDecision::Clarify(SlotName::Category);
    };
    let region = slots.region.clone().or_else(|| snapshot.profile.region.clone());

    let (stored_min, stored_max) = budget_range(snapshot, &category);
    let max_price = slots.amount.or(stored_max);
    let min_price = slots.min_amount.or(stored_min).filter(|min| max_price.map_or(true, |max| *min <= max));

    let query = [region.as_deref(), Some(category.as_str()), Some("wedding")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    let mut plan = Plan::new();
    plan.add(
        ToolRequest::CatalogLookup(CatalogQuery {
            category,
            region,
            min_price,
            max_price,
            limit: ctx.catalog_limit,
        }),
        Vec::new(),
    );
    plan.add(
        ToolRequest::ExternalSearch(SearchQuery {
            query,
            limit: ctx.search_limit,
        }),
        Vec::new(),
    );
    plan.done()
}

fn budget_update(slots: &Slots, snapshot: &MemorySnapshot) -> RoutingDecision {
    if !slots.splits.is_empty() {
        let Some(total) = slots.amount.or(snapshot.profile.total_budget) else {
            return RoutingDecision::Clarify(SlotName::Amount);
        };
        let mut plan = Plan::new();
        let split = plan.add(
            ToolRequest::Calculator(CalcRequest::Split {
                total,
                splits: slots.splits.clone(),
            }),
            Vec::new(),
        );
        plan.add(
            ToolRequest::RecordMutation(RecordRequest::AllocateSplit { confirm: slots.confirm }),
            vec![split],
        );
        return plan.done();
    }

    let Some(category) = slots.category.as_deref() else {
        return RoutingDecision::Clarify(SlotName::Category);
    };
    if slots.amount.is_none() && slots.min_amount.is_none() && slots.lock.is_none() {
        return RoutingDecision::Clarify(SlotName::Amount);
    }

    let mut plan = Plan::new();
    plan.record(RecordRequest::UpsertBudget(BudgetWrite {
        lock: slots.lock,
        confirm: slots.confirm,
        notes: slots.notes.clone(),
        ..BudgetWrite::amounts(category, slots.min_amount, slots.amount)
    }));
    plan.done()
}

fn budget_query(slots: &Slots, snapshot: &MemorySnapshot) -> RoutingDecision {
    let mut plan = Plan::new();

    if let (Some(percentage), Some(amount)) = (slots.percentage, slots.amount) {
        plan.add(
            ToolRequest::Calculator(CalcRequest::Percentage { amount, percentage }),
            Vec::new(),
        );
        return plan.done();
    }

    let Some(total) = slots.amount.or(snapshot.profile.total_budget) else {
        return RoutingDecision::Clarify(SlotName::Amount);
    };
    let allocations = snapshot
        .budgets
        .iter()
        .filter_map(|b| {
            b.max_amount.map(|amount| Allocation {
                category: b.category.clone(),
                amount,
            })
        })
        .collect();

    plan.add(
        ToolRequest::Calculator(CalcRequest::Remainder { total, allocations }),
        Vec::new(),
    );
    plan.done()
}

fn schedule_create(slots: &Slots) -> RoutingDecision {
    let event_type = slots
        .event_type
        .clone()
        .or_else(|| slots.title.as_ref().map(|_| "custom".to_string()));
    let Some(event_type) = event_type else {
        return RoutingDecision::Clarify(SlotName::Title);
    };

    let mut plan = Plan::new();
    if let (true, Some(wedding_date)) = (is_wedding_event(&event_type), slots.date) {
        plan.record(RecordRequest::GenerateMilestones { wedding_date });
    }
    plan.record(RecordRequest::CreateEvent(EventDraft {
        event_type,
        title: slots.title.clone(),
        date: slots.date,
        time: slots.time,
        location: slots.location.clone(),
        budget: slots.amount,
        memo: slots.notes.clone(),
    }));
    plan.done()
}

fn schedule_update(slots: &Slots, snapshot: &MemorySnapshot) -> RoutingDecision {
    let mut plan = Plan::new();

    if let Some(milestone_id) = slots.milestone_id {
        plan.record(RecordRequest::ToggleMilestone {
            milestone_id,
            completed: slots.completed.unwrap_or(true),
        });
        return plan.done();
    }

    let event_id = slots.event_id.or_else(|| {
        // Without an id, accept exactly one active event of the named type.
        let event_type = slots.event_type.as_deref()?;
        let mut matches = snapshot
            .events
            .iter()
            .filter(|e| e.status != EventStatus::Cancelled && e.event_type == event_type);
        let only = matches.next()?;
        matches.next().is_none().then_some(only.event_id)
    });

    let Some(event_id) = event_id else {
        return if slots.completed.is_some() {
            RoutingDecision::Clarify(SlotName::MilestoneId)
        } else {
            RoutingDecision::Clarify(SlotName::EventId)
        };
    };

    if slots.cancel {
        plan.record(RecordRequest::CancelEvent { event_id });
        return plan.done();
    }

    let patch = EventPatch {
        event_id,
        title: slots.title.clone(),
        date: slots.date,
        time: slots.time,
        location: slots.location.clone(),
        memo: slots.notes.clone(),
    };
    if patch == (EventPatch { event_id, ..EventPatch::default() }) {
        return RoutingDecision::Clarify(SlotName::Title);
    }
    plan.record(RecordRequest::UpdateEvent(patch));
    plan.done()
}

fn profile_update(slots: &Slots) -> RoutingDecision {
    if !slots.has_profile_fields() {
        return RoutingDecision::Clarify(SlotName::ProfileField);
    }

    let mut plan = Plan::new();
    plan.record(RecordRequest::UpdateProfile(ProfilePatch {
        name: slots.name.clone(),
        region: slots.region.clone(),
        contact: slots.contact.clone(),
        notes: slots.notes.clone(),
        guest_count: slots.guest_count,
        wedding_date: slots.date,
        total_budget: slots.amount,
    }));
    if let Some(wedding_date) = slots.date {
        plan.record(RecordRequest::GenerateMilestones { wedding_date });
    }
    plan.done()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BudgetPreference, BudgetSplit, Event};
    use chrono::Utc;
    use uuid::Uuid;

    fn ctx() -> RouteContext {
        RouteContext::new(NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(), 5)
    }

    fn snapshot() -> MemorySnapshot {
        MemorySnapshot::empty(Uuid::new_v4())
    }

    fn invocations(decision: RoutingDecision) -> Vec<PlannedInvocation> {
        match decision {
            RoutingDecision::Execute(plan) => plan,
            other => panic!("expected a plan, got {:?}", other),
        }
    }

    #[test]
    fn test_split_plans_calculator_then_allocation() {
        let slots = Slots {
            amount: Some(50_000_000),
            splits: vec![
                BudgetSplit { category: "hall".into(), percentage: 60.0 },
                BudgetSplit { category: "studio".into(), percentage: 15.0 },
            ],
            ..Slots::default()
        };
        let plan = invocations(route(Intent::BudgetUpdate, &slots, &snapshot(), &ctx()));

        assert_eq!(plan.len(), 2);
        assert!(matches!(plan[0].request, ToolRequest::Calculator(CalcRequest::Split { total: 50_000_000, .. })));
        assert_eq!(
            plan[1].request,
            ToolRequest::RecordMutation(RecordRequest::AllocateSplit { confirm: false })
        );
        assert_eq!(plan[1].depends_on, vec![0]);
    }

    #[test]
    fn test_recommend_needs_category_and_uses_profile_region_and_budget() {
        let decision = route(Intent::RecommendVendor, &Slots::default(), &snapshot(), &ctx());
        assert_eq!(decision, RoutingDecision::Clarify(SlotName::Category));

        let mut snap = snapshot();
        snap.profile.region = Some("Gangnam".into());
        snap.budgets.push(BudgetPreference {
            budget_id: 1,
            user_id: snap.user_id(),
            category: "studio".into(),
            min_amount: None,
            max_amount: Some(7_500_000),
            locked: false,
            notes: None,
            updated_at: Utc::now(),
        });
        let slots = Slots { category: Some("studio".into()), ..Slots::default() };
        let plan = invocations(route(Intent::RecommendVendor, &slots, &snap, &ctx()));

        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|p| p.depends_on.is_empty()));
        assert_eq!(
            plan[0].request,
            ToolRequest::CatalogLookup(CatalogQuery {
                category: "studio".into(),
                region: Some("Gangnam".into()),
                min_price: None,
                max_price: Some(7_500_000),
                limit: 5,
            })
        );
        assert_eq!(
            plan[1].request,
            ToolRequest::ExternalSearch(SearchQuery { query: "Gangnam studio wedding".into(), limit: 3 })
        );
    }

    #[test]
    fn test_budget_update_clarifications() {
        let snap = snapshot();
        assert_eq!(
            route(Intent::BudgetUpdate, &Slots { amount: Some(1), ..Slots::default() }, &snap, &ctx()),
            RoutingDecision::Clarify(SlotName::Category)
        );
        assert_eq!(
            route(Intent::BudgetUpdate, &Slots { category: Some("hall".into()), ..Slots::default() }, &snap, &ctx()),
            RoutingDecision::Clarify(SlotName::Amount)
        );

        let lock_only = Slots { category: Some("hall".into()), lock: Some(true), ..Slots::default() };
        let plan = invocations(route(Intent::BudgetUpdate, &lock_only, &snap, &ctx()));
        assert!(matches!(
            &plan[0].request,
            ToolRequest::RecordMutation(RecordRequest::UpsertBudget(w)) if w.lock == Some(true) && w.max_amount.is_none()
        ));
    }

    #[test]
    fn test_budget_query_remainder_uses_stored_total() {
        let mut snap = snapshot();
        assert_eq!(
            route(Intent::BudgetQuery, &Slots::default(), &snap, &ctx()),
            RoutingDecision::Clarify(SlotName::Amount)
        );

        snap.profile.total_budget = Some(50_000_000);
        snap.budgets.push(BudgetPreference {
            budget_id: 1,
            user_id: snap.user_id(),
            category: "hall".into(),
            min_amount: None,
            max_amount: Some(30_000_000),
            locked: true,
            notes: None,
            updated_at: Utc::now(),
        });
        let plan = invocations(route(Intent::BudgetQuery, &Slots::default(), &snap, &ctx()));
        assert_eq!(
            plan[0].request,
            ToolRequest::Calculator(CalcRequest::Remainder {
                total: 50_000_000,
                allocations: vec![Allocation { category: "hall".into(), amount: 30_000_000 }],
            })
        );
    }

    #[test]
    fn test_wedding_event_generates_milestones() {
        let slots = Slots {
            event_type: Some("wedding".into()),
            date: NaiveDate::from_ymd_opt(2026, 5, 23),
            ..Slots::default()
        };
        let plan = invocations(route(Intent::ScheduleCreate, &slots, &snapshot(), &ctx()));
        assert_eq!(plan.len(), 2);
        assert!(plan.iter().any(|p| matches!(
            p.request,
            ToolRequest::RecordMutation(RecordRequest::GenerateMilestones { .. })
        )));

        assert_eq!(
            route(Intent::ScheduleCreate, &Slots::default(), &snapshot(), &ctx()),
            RoutingDecision::Clarify(SlotName::Title)
        );
    }

    #[test]
    fn test_schedule_update_resolves_unique_event_by_type() {
        let mut snap = snapshot();
        let user_id = snap.user_id();
        let event = |event_id, event_type: &str, status| Event {
            event_id,
            user_id,
            event_type: event_type.into(),
            title: None,
            date: None,
            time: None,
            location: None,
            budget: None,
            memo: None,
            status,
        };
        snap.events = vec![
            event(4, "fitting", EventStatus::Pending),
            event(5, "fitting", EventStatus::Cancelled),
            event(6, "meeting", EventStatus::Pending),
            event(7, "meeting", EventStatus::Pending),
        ];

        let cancel = Slots { event_type: Some("fitting".into()), cancel: true, ..Slots::default() };
        let plan = invocations(route(Intent::ScheduleUpdate, &cancel, &snap, &ctx()));
        assert_eq!(
            plan[0].request,
            ToolRequest::RecordMutation(RecordRequest::CancelEvent { event_id: 4 })
        );

        let ambiguous = Slots { event_type: Some("meeting".into()), cancel: true, ..Slots::default() };
        assert_eq!(
            route(Intent::ScheduleUpdate, &ambiguous, &snap, &ctx()),
            RoutingDecision::Clarify(SlotName::EventId)
        );

        let toggle = Slots { completed: Some(true), ..Slots::default() };
        assert_eq!(
            route(Intent::ScheduleUpdate, &toggle, &snap, &ctx()),
            RoutingDecision::Clarify(SlotName::MilestoneId)
        );
    }

    #[test]
    fn test_profile_and_general_chat() {
        let snap = snapshot();
        assert_eq!(
            route(Intent::ProfileUpdate, &Slots::default(), &snap, &ctx()),
            RoutingDecision::Clarify(SlotName::ProfileField)
        );

        let guests = Slots { guest_count: Some(200), ..Slots::default() };
        let plan = invocations(route(Intent::ProfileUpdate, &guests, &snap, &ctx()));
        assert_eq!(plan.len(), 1);
        assert!(matches!(
            &plan[0].request,
            ToolRequest::RecordMutation(RecordRequest::UpdateProfile(p)) if p.guest_count == Some(200) && p.total_budget.is_none()
        ));

        assert_eq!(
            route(Intent::GeneralChat, &Slots::default(), &snap, &ctx()),
            RoutingDecision::GeneralReply
        );
    }

    #[test]
    fn test_routing_is_deterministic() {
        let slots = Slots { category: Some("hall".into()), region: Some("Busan".into()), ..Slots::default() };
        let snap = snapshot();
        assert_eq!(
            route(Intent::RecommendVendor, &slots, &snap, &ctx()),
            route(Intent::RecommendVendor, &slots, &snap, &ctx())
        );
    }
}
