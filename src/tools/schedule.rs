//! Schedule lookup
//!
//! Read-only view over a user's events and milestones.

use super::{wrong_request, Tool, ToolInput, ToolKind, ToolOutput, ToolRequest};
use crate::memory::timeline::days_until;
use crate::memory::MemoryStore;
use crate::models::{readiness_percent, Event, EventStatus, Milestone};
use crate::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleQuery {
    pub today: NaiveDate,
    #[serde(default)]
    pub include_cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleView {
    /// Dated events first, by date and time; undated ones after
    pub events: Vec<Event>,
    /// By due date
    pub milestones: Vec<Milestone>,
    pub readiness_percent: u8,
    pub wedding_date: Option<NaiveDate>,
    pub days_until_wedding: Option<i64>,
}

impl ScheduleView {
    pub fn build(
        mut events: Vec<Event>,
        mut milestones: Vec<Milestone>,
        wedding_date: Option<NaiveDate>,
        query: &ScheduleQuery,
    ) -> Self {
        if !query.include_cancelled {
            events.retain(|e| e.status != EventStatus::Cancelled);
        }
        events.sort_by(|a, b| {
            (a.date.is_none(), a.date, a.time, a.event_id).cmp(&(b.date.is_none(), b.date, b.time, b.event_id))
        });
        milestones.sort_by(|a, b| (a.due_date, a.milestone_id).cmp(&(b.due_date, b.milestone_id)));

        Self {
            readiness_percent: readiness_percent(&milestones),
            days_until_wedding: wedding_date.map(|d| days_until(query.today, d)),
            events,
            milestones,
            wedding_date,
        }
    }

    /// Open milestones due within `days` of `today`, overdue ones included.
    pub fn due_soon(&self, today: NaiveDate, days: i64) -> Vec<&Milestone> {
        self.milestones
            .iter()
            .filter(|m| !m.completed && (m.due_date - today).num_days() <= days)
            .collect()
    }
}

pub struct ScheduleLookupTool {
    store: Arc<dyn MemoryStore>,
}

impl ScheduleLookupTool {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for ScheduleLookupTool {
    fn name(&self) -> &'static str {
        "schedule_lookup"
    }

    fn description(&self) -> &'static str {
        "List events, milestones and readiness for the user"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::ScheduleLookup
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let ToolRequest::ScheduleLookup(query) = &input.request else {
            return Err(wrong_request(self.name(), &input.request));
        };

        let snapshot = self.store.snapshot(input.user_id).await?;
        Ok(ToolOutput::ScheduleLookup(ScheduleView::build(
            snapshot.events,
            snapshot.milestones,
            snapshot.profile.wedding_date,
            query,
        )))
    }
}
