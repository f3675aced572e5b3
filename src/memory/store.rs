//! In-memory record store
//!
//! Used for the trial user, tests, and whenever `DATABASE_URL` is absent.

use super::timeline::plan_generation;
use super::MemoryStore;
use crate::error::OrchestrationError;
use crate::merge::{
    apply_budget_write, apply_event_patch, apply_profile_patch, decide_budget_write,
    decide_milestone_toggle, AppliedChange, BudgetDecision, MergeBatch, MergeReport,
    MilestoneDecision,
};
use crate::models::{
    BudgetPreference, ConversationSummary, Event, EventStatus, MemorySnapshot, Milestone,
    MilestoneSource, UserId, UserProfile,
};
use crate::tools::RecordChange;
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Everything stored for one user.
#[derive(Debug, Clone)]
pub struct UserRecords {
    pub profile: UserProfile,
    pub budgets: Vec<BudgetPreference>,
    pub events: Vec<Event>,
    pub milestones: Vec<Milestone>,
    /// Oldest first
    pub summaries: Vec<ConversationSummary>,
}

impl UserRecords {
    fn new(user_id: UserId) -> Self {
        Self {
            profile: UserProfile::new(user_id),
            budgets: Vec::new(),
            events: Vec::new(),
            milestones: Vec::new(),
            summaries: Vec::new(),
        }
    }

    fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            profile: self.profile.clone(),
            budgets: self.budgets.clone(),
            events: self.events.clone(),
            milestones: self.milestones.clone(),
            latest_summary: self.summaries.iter().rev().find(|s| s.latest).cloned(),
        }
    }

    fn apply(&mut self, change: RecordChange, next_id: &mut dyn FnMut() -> i64) -> AppliedChange {
        let user_id = self.profile.user_id;
        let now = Utc::now();

        match change {
            RecordChange::PatchProfile(patch) => {
                self.profile = apply_profile_patch(&self.profile, &patch, now);
                AppliedChange::ProfileUpdated(self.profile.clone())
            }
            RecordChange::UpsertBudget(write) => {
                let index = self.budgets.iter().position(|b| b.category == write.category);
                let existing = index.map(|i| &self.budgets[i]);
                match decide_budget_write(existing, &write) {
                    BudgetDecision::Conflict(conflict) => AppliedChange::BudgetConflict(conflict),
                    BudgetDecision::Unchanged => AppliedChange::BudgetUnchanged {
                        category: write.category,
                    },
                    BudgetDecision::Insert => {
                        let row = apply_budget_write(None, &write, user_id, next_id(), now);
                        self.budgets.push(row.clone());
                        AppliedChange::BudgetSaved { preference: row, created: true }
                    }
                    BudgetDecision::Update => {
                        let row = apply_budget_write(existing, &write, user_id, 0, now);
                        if let Some(i) = index {
                            self.budgets[i] = row.clone();
                        }
                        AppliedChange::BudgetSaved { preference: row, created: false }
                    }
                }
            }
            RecordChange::CreateEvent(draft) => {
                let event = Event {
                    event_id: next_id(),
                    user_id,
                    status: EventStatus::for_date(draft.date),
                    event_type: draft.event_type,
                    title: draft.title,
                    date: draft.date,
                    time: draft.time,
                    location: draft.location,
                    budget: draft.budget,
                    memo: draft.memo,
                };
                self.events.push(event.clone());
                AppliedChange::EventCreated(event)
            }
            RecordChange::UpdateEvent(patch) => {
                match self.events.iter_mut().find(|e| e.event_id == patch.event_id) {
                    Some(event) => {
                        *event = apply_event_patch(event, &patch);
                        AppliedChange::EventUpdated(event.clone())
                    }
                    None => AppliedChange::EventNotFound { event_id: patch.event_id },
                }
            }
            RecordChange::CancelEvent { event_id } => {
                match self.events.iter_mut().find(|e| e.event_id == event_id) {
                    Some(event) => {
                        event.status = EventStatus::Cancelled;
                        AppliedChange::EventCancelled(event.clone())
                    }
                    None => AppliedChange::EventNotFound { event_id },
                }
            }
            RecordChange::SetMilestone { milestone_id, completed } => {
                match self.milestones.iter_mut().find(|m| m.milestone_id == milestone_id) {
                    Some(milestone) => {
                        let changed = match decide_milestone_toggle(milestone, completed) {
                            MilestoneDecision::NoOp => false,
                            MilestoneDecision::Set(value) => {
                                milestone.completed = value;
                                true
                            }
                        };
                        AppliedChange::MilestoneSet { milestone: milestone.clone(), changed }
                    }
                    None => AppliedChange::MilestoneNotFound { milestone_id },
                }
            }
            RecordChange::GenerateMilestones { wedding_date } => {
                let (planned, skipped) = plan_generation(&self.milestones, wedding_date);
                let created: Vec<Milestone> = planned
                    .into_iter()
                    .map(|(title, due_date)| Milestone {
                        milestone_id: next_id(),
                        user_id,
                        title,
                        due_date,
                        completed: false,
                        source: MilestoneSource::System,
                        notes: None,
                    })
                    .collect();
                self.milestones.extend(created.iter().cloned());
                AppliedChange::MilestonesGenerated { created, skipped }
            }
        }
    }

    fn push_summary(&mut self, content: String, summary_id: i64) -> ConversationSummary {
        for previous in self.summaries.iter_mut() {
            previous.latest = false;
        }
        let summary = ConversationSummary {
            summary_id,
            user_id: self.profile.user_id,
            content,
            latest: true,
            created_at: Utc::now(),
        };
        self.summaries.push(summary.clone());
        summary
    }
}

pub struct InMemoryStore {
    users: RwLock<HashMap<UserId, Arc<Mutex<UserRecords>>>>,
    next_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    async fn records(&self, user_id: UserId) -> Arc<Mutex<UserRecords>> {
        if let Some(records) = self.users.read().await.get(&user_id) {
            return records.clone();
        }
        let mut users = self.users.write().await;
        users
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(UserRecords::new(user_id))))
            .clone()
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MemoryStore for InMemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ensure_profile(&self, user_id: UserId) -> Result<UserProfile> {
        let records = self.records(user_id).await;
        let guard = records.lock().await;
        Ok(guard.profile.clone())
    }

    async fn snapshot(&self, user_id: UserId) -> Result<MemorySnapshot> {
        let records = self.records(user_id).await;
        let guard = records.lock().await;
        Ok(guard.snapshot())
    }

    async fn commit(&self, batch: MergeBatch) -> Result<MergeReport> {
        let records = self.records(batch.user_id).await;
        let mut guard = records.lock().await;

        // Work on a copy so a batch is all-or-nothing.
        let mut working = guard.clone();
        let mut next_id = || self.allocate_id();
        let applied: Vec<AppliedChange> = batch
            .changes
            .into_iter()
            .map(|change| working.apply(change, &mut next_id))
            .collect();
        let summary = batch
            .summary
            .map(|content| working.push_summary(content, self.allocate_id()));

        *guard = working;
        debug!(user_id = %batch.user_id, applied = applied.len(), "In-memory commit");

        Ok(MergeReport {
            applied,
            summary,
            snapshot: guard.snapshot(),
        })
    }

    async fn summaries(&self, user_id: UserId, limit: usize) -> Result<Vec<ConversationSummary>> {
        let records = self.records(user_id).await;
        let guard = records.lock().await;
        Ok(guard.summaries.iter().rev().take(limit).cloned().collect())
    }

    async fn promote_summary(&self, user_id: UserId, summary_id: i64) -> Result<ConversationSummary> {
        let records = self.records(user_id).await;
        let mut guard = records.lock().await;

        if !guard.summaries.iter().any(|s| s.summary_id == summary_id) {
            return Err(OrchestrationError::PersistenceError(format!(
                "summary {} not found for user {}",
                summary_id, user_id
            )));
        }

        let mut promoted = None;
        for summary in guard.summaries.iter_mut() {
            summary.latest = summary.summary_id == summary_id;
            if summary.latest {
                promoted = Some(summary.clone());
            }
        }
        promoted.ok_or_else(|| OrchestrationError::PersistenceError("summary vanished".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{BudgetWrite, ProfilePatch};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn batch(user_id: UserId, changes: Vec<RecordChange>) -> MergeBatch {
        MergeBatch { user_id, changes, summary: None }
    }

    #[tokio::test]
    async fn test_first_contact_creates_empty_profile() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        let profile = store.ensure_profile(user_id).await.unwrap();
        assert_eq!(profile.user_id, user_id);
        assert!(profile.region.is_none());

        let snapshot = store.snapshot(user_id).await.unwrap();
        assert!(snapshot.budgets.is_empty());
        assert!(snapshot.latest_summary.is_none());
    }

    #[tokio::test]
    async fn test_locked_budget_survives_unconfirmed_write() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        let locked = BudgetWrite {
            lock: Some(true),
            ..BudgetWrite::amounts("hall", None, Some(30_000_000))
        };
        store.commit(batch(user_id, vec![RecordChange::UpsertBudget(locked)])).await.unwrap();

        let report = store
            .commit(batch(
                user_id,
                vec![RecordChange::UpsertBudget(BudgetWrite::amounts("hall", None, Some(35_000_000)))],
            ))
            .await
            .unwrap();

        assert_eq!(report.conflicts().len(), 1);
        let hall = report.snapshot.budget_for("hall").unwrap();
        assert_eq!(hall.max_amount, Some(30_000_000));
        assert!(hall.locked);
    }

    #[tokio::test]
    async fn test_budget_upsert_keeps_one_row_per_category() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        for max in [10, 20, 30] {
            store
                .commit(batch(
                    user_id,
                    vec![RecordChange::UpsertBudget(BudgetWrite::amounts("studio", None, Some(max)))],
                ))
                .await
                .unwrap();
        }
        let snapshot = store.snapshot(user_id).await.unwrap();
        assert_eq!(snapshot.budgets.len(), 1);
        assert_eq!(snapshot.budgets[0].max_amount, Some(30));
    }

    #[tokio::test]
    async fn test_milestone_generation_is_idempotent() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        let wedding_date = NaiveDate::from_ymd_opt(2026, 5, 23).unwrap();

        store
            .commit(batch(user_id, vec![RecordChange::GenerateMilestones { wedding_date }]))
            .await
            .unwrap();
        let report = store
            .commit(batch(user_id, vec![RecordChange::GenerateMilestones { wedding_date }]))
            .await
            .unwrap();

        assert_eq!(
            report.applied,
            vec![AppliedChange::MilestonesGenerated { created: vec![], skipped: 10 }]
        );
        assert_eq!(report.snapshot.milestones.len(), 10);
    }

    #[tokio::test]
    async fn test_toggle_twice_reports_no_change() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        let report = store
            .commit(batch(
                user_id,
                vec![RecordChange::GenerateMilestones {
                    wedding_date: NaiveDate::from_ymd_opt(2026, 5, 23).unwrap(),
                }],
            ))
            .await
            .unwrap();
        let id = report.snapshot.milestones[0].milestone_id;

        let set = || batch(user_id, vec![RecordChange::SetMilestone { milestone_id: id, completed: true }]);
        store.commit(set()).await.unwrap();
        let again = store.commit(set()).await.unwrap();

        assert!(matches!(
            &again.applied[0],
            AppliedChange::MilestoneSet { changed: false, milestone } if milestone.completed
        ));
        assert_eq!(again.snapshot.readiness_percent(), 10);
    }

    #[tokio::test]
    async fn test_missing_targets_are_reported() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        let report = store
            .commit(batch(
                user_id,
                vec![
                    RecordChange::CancelEvent { event_id: 77 },
                    RecordChange::SetMilestone { milestone_id: 78, completed: true },
                ],
            ))
            .await
            .unwrap();
        assert_eq!(
            report.applied,
            vec![
                AppliedChange::EventNotFound { event_id: 77 },
                AppliedChange::MilestoneNotFound { milestone_id: 78 },
            ]
        );
    }

    #[tokio::test]
    async fn test_single_latest_summary_and_promotion() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        for content in ["first", "second", "third"] {
            store
                .commit(MergeBatch {
                    user_id,
                    changes: vec![],
                    summary: Some(content.to_string()),
                })
                .await
                .unwrap();
        }

        let summaries = store.summaries(user_id, 10).await.unwrap();
        assert_eq!(summaries[0].content, "third");
        assert_eq!(summaries.iter().filter(|s| s.latest).count(), 1);

        let first_id = summaries[2].summary_id;
        let promoted = store.promote_summary(user_id, first_id).await.unwrap();
        assert_eq!(promoted.content, "first");
        let snapshot = store.snapshot(user_id).await.unwrap();
        assert_eq!(snapshot.latest_summary.unwrap().summary_id, first_id);
        assert_eq!(
            store.summaries(user_id, 10).await.unwrap().iter().filter(|s| s.latest).count(),
            1
        );

        assert!(store.promote_summary(user_id, 9_999).await.is_err());
    }

    #[tokio::test]
    async fn test_guest_count_does_not_touch_budgets() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        store
            .commit(batch(
                user_id,
                vec![RecordChange::UpsertBudget(BudgetWrite::amounts("hall", None, Some(30_000_000)))],
            ))
            .await
            .unwrap();
        let report = store
            .commit(batch(
                user_id,
                vec![RecordChange::PatchProfile(ProfilePatch {
                    guest_count: Some(200),
                    ..ProfilePatch::default()
                })],
            ))
            .await
            .unwrap();

        assert_eq!(report.snapshot.profile.guest_count, Some(200));
        assert_eq!(report.snapshot.budget_for("hall").unwrap().max_amount, Some(30_000_000));
    }
}
