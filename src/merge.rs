//! Memory Merge
//!
//! Applies the record changes produced by a turn (plus writes derived from
//! the extracted slots) to the memory store. All writes for one user go
//! through a per-user lock that is taken only here, after every tool result
//! is already in hand.
//!
//! The decision functions are pure and shared by both store backends, so
//! "locked budgets are never silently overwritten" and "milestone toggles
//! are idempotent" hold the same way in memory and in Postgres.

use crate::memory::MemoryStore;
use crate::models::{
    is_wedding_event, BudgetPreference, ConversationSummary, Event, EventStatus, Intent,
    MemorySnapshot, Milestone, Slots, UserId, UserProfile,
};
use crate::tools::{BudgetWrite, EventPatch, ProfilePatch, RecordChange};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

// =============================
// Decisions
// =============================

/// A write that would overwrite a locked budget without confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockedBudgetConflict {
    pub category: String,
    pub current_max: Option<i64>,
    pub requested_max: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BudgetDecision {
    Insert,
    Update,
    Unchanged,
    Conflict(LockedBudgetConflict),
}

pub fn decide_budget_write(existing: Option<&BudgetPreference>, write: &BudgetWrite) -> BudgetDecision {
    let Some(current) = existing else {
        return BudgetDecision::Insert;
    };

    let amounts_differ = (write.min_amount.is_some() && write.min_amount != current.min_amount)
        || (write.max_amount.is_some() && write.max_amount != current.max_amount);
    let lock_differs = write.lock.map_or(false, |lock| lock != current.locked);
    let notes_differ = write.notes.is_some() && write.notes != current.notes;

    let unlocking = write.lock == Some(false);
    if current.locked && amounts_differ && !write.confirm && !unlocking {
        return BudgetDecision::Conflict(LockedBudgetConflict {
            category: current.category.clone(),
            current_max: current.max_amount,
            requested_max: write.max_amount,
        });
    }

    if amounts_differ || lock_differs || notes_differ {
        BudgetDecision::Update
    } else {
        BudgetDecision::Unchanged
    }
}

/// The row a permitted write produces.
pub fn apply_budget_write(
    existing: Option<&BudgetPreference>,
    write: &BudgetWrite,
    user_id: UserId,
    budget_id: i64,
    now: DateTime<Utc>,
) -> BudgetPreference {
    let mut row = existing.cloned().unwrap_or_else(|| BudgetPreference {
        budget_id,
        user_id,
        category: write.category.clone(),
        min_amount: None,
        max_amount: None,
        locked: false,
        notes: None,
        updated_at: now,
    });

    if write.min_amount.is_some() {
        row.min_amount = write.min_amount;
    }
    if write.max_amount.is_some() {
        row.max_amount = write.max_amount;
    }
    if let (Some(min), Some(max)) = (row.min_amount, row.max_amount) {
        if min > max {
            row.min_amount = None;
        }
    }
    if let Some(lock) = write.lock {
        row.locked = lock;
    }
    if write.notes.is_some() {
        row.notes = write.notes.clone();
    }
    row.updated_at = now;
    row
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MilestoneDecision {
    NoOp,
    Set(bool),
}

/// Setting a milestone to the state it already has is a no-op.
pub fn decide_milestone_toggle(existing: &Milestone, completed: bool) -> MilestoneDecision {
    if existing.completed == completed {
        MilestoneDecision::NoOp
    } else {
        MilestoneDecision::Set(completed)
    }
}

pub fn apply_profile_patch(profile: &UserProfile, patch: &ProfilePatch, now: DateTime<Utc>) -> UserProfile {
    let mut next = profile.clone();
    if patch.name.is_some() {
        next.name = patch.name.clone();
    }
    if patch.region.is_some() {
        next.region = patch.region.clone();
    }
    if patch.contact.is_some() {
        next.contact = patch.contact.clone();
    }
    if patch.notes.is_some() {
        next.notes = patch.notes.clone();
    }
    if patch.guest_count.is_some() {
        next.guest_count = patch.guest_count;
    }
    if patch.wedding_date.is_some() {
        next.wedding_date = patch.wedding_date;
    }
    if patch.total_budget.is_some() {
        next.total_budget = patch.total_budget;
    }
    next.updated_at = now;
    next
}

pub fn apply_event_patch(event: &Event, patch: &EventPatch) -> Event {
    let mut next = event.clone();
    if patch.title.is_some() {
        next.title = patch.title.clone();
    }
    if patch.date.is_some() {
        next.date = patch.date;
    }
    if patch.time.is_some() {
        next.time = patch.time;
    }
    if patch.location.is_some() {
        next.location = patch.location.clone();
    }
    if patch.memo.is_some() {
        next.memo = patch.memo.clone();
    }
    if next.status != EventStatus::Cancelled {
        next.status = EventStatus::for_date(next.date);
    }
    next
}

// =============================
// Batches & reports
// =============================

/// Everything one turn wants to persist, committed atomically.
#[derive(Debug, Clone)]
pub struct MergeBatch {
    pub user_id: UserId,
    pub changes: Vec<RecordChange>,
    /// New rolling summary; becomes the single latest record.
    pub summary: Option<String>,
}

/// Result of applying one change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AppliedChange {
    ProfileUpdated(UserProfile),
    BudgetSaved { preference: BudgetPreference, created: bool },
    BudgetUnchanged { category: String },
    BudgetConflict(LockedBudgetConflict),
    EventCreated(Event),
    EventUpdated(Event),
    EventCancelled(Event),
    EventNotFound { event_id: i64 },
    MilestoneSet { milestone: Milestone, changed: bool },
    MilestoneNotFound { milestone_id: i64 },
    MilestonesGenerated { created: Vec<Milestone>, skipped: usize },
}

#[derive(Debug, Clone)]
pub struct MergeReport {
    pub applied: Vec<AppliedChange>,
    pub summary: Option<ConversationSummary>,
    /// State after the commit
    pub snapshot: MemorySnapshot,
}

impl MergeReport {
    pub fn conflicts(&self) -> Vec<&LockedBudgetConflict> {
        self.applied
            .iter()
            .filter_map(|a| match a {
                AppliedChange::BudgetConflict(c) => Some(c),
                _ => None,
            })
            .collect()
    }
}

/// Writes implied by the slots themselves rather than by a tool.
///
/// A region mentioned while the profile has none fills it, and a dated
/// wedding event sets the wedding date.
pub fn slot_changes(intent: Intent, slots: &Slots, snapshot: &MemorySnapshot) -> Vec<RecordChange> {
    let mut patch = ProfilePatch::default();

    if intent != Intent::ProfileUpdate && snapshot.profile.region.is_none() {
        patch.region = slots.region.clone();
    }

    let is_wedding = slots.event_type.as_deref().map_or(false, is_wedding_event);
    if intent == Intent::ScheduleCreate && is_wedding && slots.date.is_some() {
        patch.wedding_date = slots.date;
    }

    if patch.is_empty() {
        Vec::new()
    } else {
        vec![RecordChange::PatchProfile(patch)]
    }
}

// =============================
// Per-user serialization
// =============================

/// Lock table keyed by user id.
#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock_for(&self, user_id: UserId) -> Arc<Mutex<()>> {
        let mut table = self.locks.lock().await;
        table.entry(user_id).or_default().clone()
    }

    /// Drop the user's entry once no caller holds a handle to it. Callers
    /// must release their own handle first.
    pub async fn release(&self, user_id: UserId) {
        let mut table = self.locks.lock().await;
        if table
            .get(&user_id)
            .map_or(false, |lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&user_id);
        }
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

pub struct MemoryMerge {
    store: Arc<dyn MemoryStore>,
    locks: UserLocks,
}

impl MemoryMerge {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            locks: UserLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Commit a batch while holding the user's lock.
    pub async fn apply(&self, batch: MergeBatch) -> Result<MergeReport> {
        let user_id = batch.user_id;
        let change_count = batch.changes.len();
        let start = Instant::now();
        let lock = self.locks.lock_for(user_id).await;
        let committed = {
            let _guard = lock.lock().await;
            self.store.commit(batch).await
        };
        drop(lock);
        self.locks.release(user_id).await;
        let report = committed?;

        info!(
            user_id = %user_id,
            changes = change_count,
            conflicts = report.conflicts().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Merge committed"
        );
        debug!(applied = ?report.applied, "Merge outcomes");

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestrationError;
    use crate::memory::InMemoryStore;
    use crate::models::MilestoneSource;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn budget(locked: bool, max: Option<i64>) -> BudgetPreference {
        BudgetPreference {
            budget_id: 1,
            user_id: Uuid::new_v4(),
            category: "hall".into(),
            min_amount: None,
            max_amount: max,
            locked,
            notes: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_write_inserts() {
        let write = BudgetWrite::amounts("hall", None, Some(30_000_000));
        assert_eq!(decide_budget_write(None, &write), BudgetDecision::Insert);
    }

    #[test]
    fn test_locked_row_conflicts_without_confirmation() {
        let existing = budget(true, Some(30_000_000));
        let write = BudgetWrite::amounts("hall", None, Some(35_000_000));

        assert_eq!(
            decide_budget_write(Some(&existing), &write),
            BudgetDecision::Conflict(LockedBudgetConflict {
                category: "hall".into(),
                current_max: Some(30_000_000),
                requested_max: Some(35_000_000),
            })
        );

        let confirmed = BudgetWrite { confirm: true, ..write.clone() };
        assert_eq!(decide_budget_write(Some(&existing), &confirmed), BudgetDecision::Update);

        let unlock = BudgetWrite { lock: Some(false), ..write };
        assert_eq!(decide_budget_write(Some(&existing), &unlock), BudgetDecision::Update);
    }

    #[test]
    fn test_same_values_on_locked_row_are_unchanged() {
        let existing = budget(true, Some(30_000_000));
        let write = BudgetWrite::amounts("hall", None, Some(30_000_000));
        assert_eq!(decide_budget_write(Some(&existing), &write), BudgetDecision::Unchanged);

        let relock = BudgetWrite { lock: Some(true), ..BudgetWrite::amounts("hall", None, None) };
        assert_eq!(decide_budget_write(Some(&existing), &relock), BudgetDecision::Unchanged);
    }

    #[test]
    fn test_apply_keeps_existing_fields() {
        let existing = budget(false, Some(30_000_000));
        let write = BudgetWrite { lock: Some(true), ..BudgetWrite::amounts("hall", None, None) };
        let row = apply_budget_write(Some(&existing), &write, existing.user_id, 99, Utc::now());

        assert_eq!(row.budget_id, existing.budget_id);
        assert_eq!(row.max_amount, Some(30_000_000));
        assert!(row.locked);
    }

    #[test]
    fn test_apply_drops_min_above_new_max() {
        let mut existing = budget(false, Some(30_000_000));
        existing.min_amount = Some(20_000_000);
        let write = BudgetWrite::amounts("hall", None, Some(10_000_000));
        let row = apply_budget_write(Some(&existing), &write, existing.user_id, 1, Utc::now());
        assert_eq!(row.min_amount, None);
        assert_eq!(row.max_amount, Some(10_000_000));
    }

    #[test]
    fn test_milestone_toggle_is_idempotent() {
        let milestone = Milestone {
            milestone_id: 1,
            user_id: Uuid::new_v4(),
            title: "Wedding day".into(),
            due_date: NaiveDate::from_ymd_opt(2026, 5, 23).unwrap(),
            completed: true,
            source: MilestoneSource::System,
            notes: None,
        };
        assert_eq!(decide_milestone_toggle(&milestone, true), MilestoneDecision::NoOp);
        assert_eq!(decide_milestone_toggle(&milestone, false), MilestoneDecision::Set(false));
    }

    #[test]
    fn test_slot_changes() {
        let snapshot = MemorySnapshot::empty(Uuid::new_v4());
        let slots = Slots {
            region: Some("Gangnam".into()),
            event_type: Some("wedding".into()),
            date: NaiveDate::from_ymd_opt(2026, 5, 23),
            ..Slots::default()
        };

        let changes = slot_changes(Intent::ScheduleCreate, &slots, &snapshot);
        assert_eq!(
            changes,
            vec![RecordChange::PatchProfile(ProfilePatch {
                region: Some("Gangnam".into()),
                wedding_date: NaiveDate::from_ymd_opt(2026, 5, 23),
                ..ProfilePatch::default()
            })]
        );

        // a profile update sets the region through its own tool call
        assert!(slot_changes(Intent::ProfileUpdate, &Slots { region: Some("Busan".into()), ..Slots::default() }, &snapshot).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_merges_for_one_user_do_not_lose_updates() {
        let store = Arc::new(InMemoryStore::new());
        let merge = Arc::new(MemoryMerge::new(store.clone()));
        let user_id = Uuid::new_v4();
        store.ensure_profile(user_id).await.unwrap();

        let mut handles = Vec::new();
        for (i, category) in ["hall", "studio", "dress", "makeup"].iter().enumerate() {
            let merge = merge.clone();
            let category = category.to_string();
            handles.push(tokio::spawn(async move {
                merge
                    .apply(MergeBatch {
                        user_id,
                        changes: vec![RecordChange::UpsertBudget(BudgetWrite::amounts(
                            &category,
                            None,
                            Some(1_000_000 * (i as i64 + 1)),
                        ))],
                        summary: Some(format!("summary {}", i)),
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snapshot = store.snapshot(user_id).await.unwrap();
        assert_eq!(snapshot.budgets.len(), 4);
        let summaries = store.summaries(user_id, 10).await.unwrap();
        assert_eq!(summaries.len(), 4);
        assert_eq!(summaries.iter().filter(|s| s.latest).count(), 1);
        assert_eq!(merge.locks.len().await, 0);
    }

    #[tokio::test]
    async fn test_idle_user_locks_are_pruned() {
        let locks = UserLocks::new();
        let busy = Uuid::new_v4();
        let idle = Uuid::new_v4();

        let held = locks.lock_for(busy).await;
        drop(locks.lock_for(idle).await);
        assert_eq!(locks.len().await, 2);

        locks.release(idle).await;
        locks.release(busy).await;
        assert_eq!(locks.len().await, 1);

        drop(held);
        locks.release(busy).await;
        assert_eq!(locks.len().await, 0);
    }

    #[tokio::test]
    async fn test_failed_commit_still_releases_lock() {
        struct Refusing;

        #[async_trait::async_trait]
        impl MemoryStore for Refusing {
            fn backend(&self) -> &'static str {
                "refusing"
            }
            async fn ensure_profile(&self, user_id: UserId) -> Result<UserProfile> {
                InMemoryStore::new().ensure_profile(user_id).await
            }
            async fn snapshot(&self, user_id: UserId) -> Result<MemorySnapshot> {
                Ok(MemorySnapshot::empty(user_id))
            }
            async fn commit(&self, _batch: MergeBatch) -> Result<MergeReport> {
                Err(OrchestrationError::PersistenceError("read only".into()))
            }
            async fn summaries(
                &self,
                _user_id: UserId,
                _limit: usize,
            ) -> Result<Vec<ConversationSummary>> {
                Ok(Vec::new())
            }
            async fn promote_summary(
                &self,
                _user_id: UserId,
                summary_id: i64,
            ) -> Result<ConversationSummary> {
                Err(OrchestrationError::PersistenceError(format!("no summary {}", summary_id)))
            }
        }

        let merge = MemoryMerge::new(Arc::new(Refusing));
        let result = merge
            .apply(MergeBatch {
                user_id: Uuid::new_v4(),
                changes: Vec::new(),
                summary: None,
            })
            .await;

        assert!(matches!(result, Err(OrchestrationError::PersistenceError(_))));
        assert_eq!(merge.locks.len().await, 0);
    }
}
