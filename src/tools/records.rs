//! Record mutation tool
//!
//! Validates a mutation request and turns it into [`RecordChange`]s. It
//! performs no writes itself; the memory merge applies the changes while
//! holding the per-user lock.

use super::{wrong_request, Tool, ToolInput, ToolKind, ToolOutput, ToolRequest};
use crate::error::OrchestrationError;
use crate::Result;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub region: Option<String>,
    pub contact: Option<String>,
    pub notes: Option<String>,
    pub guest_count: Option<u32>,
    pub wedding_date: Option<NaiveDate>,
    pub total_budget: Option<i64>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        *self == ProfilePatch::default()
    }
}

/// Upsert of one category's budget preference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetWrite {
    pub category: String,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    /// `Some(true)` locks, `Some(false)` unlocks
    pub lock: Option<bool>,
    /// Explicit user confirmation to change a locked row
    pub confirm: bool,
    pub notes: Option<String>,
}

impl BudgetWrite {
    pub fn amounts(category: &str, min_amount: Option<i64>, max_amount: Option<i64>) -> Self {
        Self {
            category: category.to_string(),
            min_amount,
            max_amount,
            lock: None,
            confirm: false,
            notes: None,
        }
    }

    pub fn changes_amounts(&self) -> bool {
        self.min_amount.is_some() || self.max_amount.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDraft {
    pub event_type: String,
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub location: Option<String>,
    pub budget: Option<i64>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventPatch {
    pub event_id: i64,
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub location: Option<String>,
    pub memo: Option<String>,
}

impl EventPatch {
    fn is_noop(&self) -> bool {
        self.title.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.location.is_none()
            && self.memo.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecordRequest {
    UpdateProfile(ProfilePatch),
    UpsertBudget(BudgetWrite),
    /// Turn the upstream calculator split into per-category budgets.
    AllocateSplit { confirm: bool },
    CreateEvent(EventDraft),
    UpdateEvent(EventPatch),
    CancelEvent { event_id: i64 },
    ToggleMilestone { milestone_id: i64, completed: bool },
    GenerateMilestones { wedding_date: NaiveDate },
}

/// A write the memory merge will apply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum RecordChange {
    PatchProfile(ProfilePatch),
    UpsertBudget(BudgetWrite),
    CreateEvent(EventDraft),
    UpdateEvent(EventPatch),
    CancelEvent { event_id: i64 },
    SetMilestone { milestone_id: i64, completed: bool },
    GenerateMilestones { wedding_date: NaiveDate },
}

impl RecordChange {
    pub fn label(&self) -> &'static str {
        match self {
            RecordChange::PatchProfile(_) => "patch_profile",
            RecordChange::UpsertBudget(_) => "upsert_budget",
            RecordChange::CreateEvent(_) => "create_event",
            RecordChange::UpdateEvent(_) => "update_event",
            RecordChange::CancelEvent { .. } => "cancel_event",
            RecordChange::SetMilestone { .. } => "set_milestone",
            RecordChange::GenerateMilestones { .. } => "generate_milestones",
        }
    }
}

fn invalid(message: impl Into<String>) -> OrchestrationError {
    OrchestrationError::InvalidToolInput(message.into())
}

fn non_negative(field: &str, value: Option<i64>) -> Result<()> {
    match value {
        Some(v) if v < 0 => Err(invalid(format!("{} cannot be negative", field))),
        _ => Ok(()),
    }
}

fn positive_id(field: &str, id: i64) -> Result<()> {
    if id <= 0 {
        return Err(invalid(format!("{} must be positive", field)));
    }
    Ok(())
}

impl RecordRequest {
    pub fn validate(&self) -> Result<()> {
        match self {
            RecordRequest::UpdateProfile(patch) => {
                if patch.is_empty() {
                    return Err(invalid("profile update has no fields"));
                }
                non_negative("total budget", patch.total_budget)
            }
            RecordRequest::UpsertBudget(write) => {
                if write.category.trim().is_empty() {
                    return Err(invalid("budget write needs a category"));
                }
                non_negative("min amount", write.min_amount)?;
                non_negative("max amount", write.max_amount)?;
                if let (Some(min), Some(max)) = (write.min_amount, write.max_amount) {
                    if min > max {
                        return Err(invalid(format!("min {} exceeds max {}", min, max)));
                    }
                }
                if !write.changes_amounts() && write.lock.is_none() && write.notes.is_none() {
                    return Err(invalid("budget write changes nothing"));
                }
                Ok(())
            }
            RecordRequest::AllocateSplit { .. } => Ok(()),
            RecordRequest::CreateEvent(draft) => {
                if draft.event_type.trim().is_empty() {
                    return Err(invalid("event needs a type"));
                }
                if draft.title.as_deref().map_or(false, |t| t.trim().is_empty()) {
                    return Err(invalid("event title is blank"));
                }
                non_negative("event budget", draft.budget)
            }
            RecordRequest::UpdateEvent(patch) => {
                positive_id("event_id", patch.event_id)?;
                if patch.is_noop() {
                    return Err(invalid("event update has no fields"));
                }
                Ok(())
            }
            RecordRequest::CancelEvent { event_id } => positive_id("event_id", *event_id),
            RecordRequest::ToggleMilestone { milestone_id, .. } => {
                positive_id("milestone_id", *milestone_id)
            }
            RecordRequest::GenerateMilestones { .. } => Ok(()),
        }
    }

    /// Changes this request stands for, given upstream outputs.
    pub fn into_changes(self, upstream: &[ToolOutput]) -> Result<Vec<RecordChange>> {
        self.validate()?;

        let changes = match self {
            RecordRequest::UpdateProfile(patch) => vec![RecordChange::PatchProfile(patch)],
            RecordRequest::UpsertBudget(write) => vec![RecordChange::UpsertBudget(write)],
            RecordRequest::AllocateSplit { confirm } => {
                let result = upstream
                    .iter()
                    .find_map(|o| match o {
                        ToolOutput::Calculator(result) => Some(result),
                        _ => None,
                    })
                    .ok_or_else(|| invalid("allocate_split needs a calculator result upstream"))?;

                let mut changes: Vec<RecordChange> = result
                    .allocations
                    .iter()
                    .map(|a| {
                        RecordChange::UpsertBudget(BudgetWrite {
                            confirm,
                            ..BudgetWrite::amounts(&a.category, None, Some(a.amount))
                        })
                    })
                    .collect();
                changes.push(RecordChange::PatchProfile(ProfilePatch {
                    total_budget: Some(result.total),
                    ..ProfilePatch::default()
                }));
                changes
            }
            RecordRequest::CreateEvent(draft) => vec![RecordChange::CreateEvent(draft)],
            RecordRequest::UpdateEvent(patch) => vec![RecordChange::UpdateEvent(patch)],
            RecordRequest::CancelEvent { event_id } => vec![RecordChange::CancelEvent { event_id }],
            RecordRequest::ToggleMilestone {
                milestone_id,
                completed,
            } => vec![RecordChange::SetMilestone {
                milestone_id,
                completed,
            }],
            RecordRequest::GenerateMilestones { wedding_date } => {
                vec![RecordChange::GenerateMilestones { wedding_date }]
            }
        };

        Ok(changes)
    }
}

pub struct RecordMutationTool;

#[async_trait::async_trait]
impl Tool for RecordMutationTool {
    fn name(&self) -> &'static str {
        "record_mutation"
    }

    fn description(&self) -> &'static str {
        "Describe profile, budget, event and milestone writes for the memory merge"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::RecordMutation
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let ToolRequest::RecordMutation(request) = &input.request else {
            return Err(wrong_request(self.name(), &input.request));
        };
        request
            .clone()
            .into_changes(&input.upstream)
            .map(ToolOutput::RecordMutation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Allocation, CalcResult};

    #[test]
    fn test_allocate_split_uses_upstream_result() {
        let upstream = vec![ToolOutput::Calculator(CalcResult {
            total: 50_000_000,
            allocations: vec![
                Allocation { category: "hall".into(), amount: 30_000_000 },
                Allocation { category: "studio".into(), amount: 7_500_000 },
            ],
            remainder: 12_500_000,
            value: None,
        })];

        let changes = RecordRequest::AllocateSplit { confirm: false }
            .into_changes(&upstream)
            .unwrap();

        assert_eq!(changes.len(), 3);
        assert_eq!(
            changes[0],
            RecordChange::UpsertBudget(BudgetWrite::amounts("hall", None, Some(30_000_000)))
        );
        assert_eq!(
            changes[2],
            RecordChange::PatchProfile(ProfilePatch {
                total_budget: Some(50_000_000),
                ..ProfilePatch::default()
            })
        );
    }

    #[test]
    fn test_allocate_split_without_upstream_is_invalid() {
        let result = RecordRequest::AllocateSplit { confirm: false }.into_changes(&[]);
        assert!(matches!(result, Err(OrchestrationError::InvalidToolInput(_))));
    }

    #[test]
    fn test_validation_rejects_bad_writes() {
        let bad = vec![
            RecordRequest::UpdateProfile(ProfilePatch::default()),
            RecordRequest::UpsertBudget(BudgetWrite::amounts("hall", Some(10), Some(5))),
            RecordRequest::UpsertBudget(BudgetWrite::amounts("hall", None, Some(-1))),
            RecordRequest::UpsertBudget(BudgetWrite::amounts("hall", None, None)),
            RecordRequest::UpsertBudget(BudgetWrite::amounts(" ", None, Some(1))),
            RecordRequest::CancelEvent { event_id: 0 },
            RecordRequest::UpdateEvent(EventPatch { event_id: 3, ..EventPatch::default() }),
            RecordRequest::ToggleMilestone { milestone_id: -2, completed: true },
        ];
        for request in bad {
            assert!(request.validate().is_err(), "accepted {:?}", request);
        }
    }

    #[test]
    fn test_lock_only_write_is_valid() {
        let write = BudgetWrite {
            lock: Some(true),
            ..BudgetWrite::amounts("hall", None, None)
        };
        assert!(RecordRequest::UpsertBudget(write).validate().is_ok());
    }

    #[tokio::test]
    async fn test_tool_emits_changes() {
        let input = crate::tools::ToolInput::new(
            uuid::Uuid::new_v4(),
            ToolRequest::RecordMutation(RecordRequest::ToggleMilestone {
                milestone_id: 4,
                completed: true,
            }),
        );
        let output = RecordMutationTool.execute(&input).await.unwrap();
        assert_eq!(
            output,
            ToolOutput::RecordMutation(vec![RecordChange::SetMilestone {
                milestone_id: 4,
                completed: true
            }])
        );
    }
}
