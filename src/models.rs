//! Core data models for the wedding planner

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;

//
// ================= Intent =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    RecommendVendor,
    BudgetQuery,
    BudgetUpdate,
    ScheduleCreate,
    ScheduleUpdate,
    ScheduleQuery,
    ProfileUpdate,
    GeneralChat,
}

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::RecommendVendor,
        Intent::BudgetQuery,
        Intent::BudgetUpdate,
        Intent::ScheduleCreate,
        Intent::ScheduleUpdate,
        Intent::ScheduleQuery,
        Intent::ProfileUpdate,
        Intent::GeneralChat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::RecommendVendor => "recommend_vendor",
            Intent::BudgetQuery => "budget_query",
            Intent::BudgetUpdate => "budget_update",
            Intent::ScheduleCreate => "schedule_create",
            Intent::ScheduleUpdate => "schedule_update",
            Intent::ScheduleQuery => "schedule_query",
            Intent::ProfileUpdate => "profile_update",
            Intent::GeneralChat => "general_chat",
        }
    }

    /// Strict label lookup; anything outside the closed set is `None`.
    pub fn from_label(label: &str) -> Option<Intent> {
        let label = label.trim().to_lowercase();
        Intent::ALL.iter().copied().find(|i| i.as_str() == label)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ================= Slots =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetSplit {
    pub category: String,
    pub percentage: f64,
}

/// Normalized values extracted from one utterance.
///
/// Amounts are integer won, dates are calendar dates, categories are
/// canonical tokens. Nothing downstream of the parser re-interprets text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Slots {
    pub category: Option<String>,
    pub region: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub amount: Option<i64>,
    pub min_amount: Option<i64>,
    pub percentage: Option<f64>,
    #[serde(default)]
    pub splits: Vec<BudgetSplit>,
    pub event_type: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub event_id: Option<i64>,
    pub milestone_id: Option<i64>,
    pub completed: Option<bool>,
    #[serde(default)]
    pub cancel: bool,
    pub lock: Option<bool>,
    #[serde(default)]
    pub confirm: bool,
    pub name: Option<String>,
    pub contact: Option<String>,
    pub guest_count: Option<u32>,
    pub notes: Option<String>,
    pub free_text: Option<String>,
}

impl Slots {
    pub fn is_empty(&self) -> bool {
        *self == Slots::default()
    }

    pub fn has_profile_fields(&self) -> bool {
        self.name.is_some()
            || self.region.is_some()
            || self.contact.is_some()
            || self.guest_count.is_some()
            || self.notes.is_some()
            || self.date.is_some()
    }
}

/// Slot the router could not resolve for an intent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    Category,
    Amount,
    Title,
    EventId,
    MilestoneId,
    ProfileField,
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotName::Category => "category",
            SlotName::Amount => "amount",
            SlotName::Title => "title",
            SlotName::EventId => "event_id",
            SlotName::MilestoneId => "milestone_id",
            SlotName::ProfileField => "profile_field",
        };
        f.write_str(s)
    }
}

//
// ================= Per-user records =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub user_id: UserId,
    pub name: Option<String>,
    pub region: Option<String>,
    pub contact: Option<String>,
    pub notes: Option<String>,
    pub total_budget: Option<i64>,
    pub wedding_date: Option<NaiveDate>,
    pub guest_count: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            name: None,
            region: None,
            contact: None,
            notes: None,
            total_budget: None,
            wedding_date: None,
            guest_count: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetPreference {
    pub budget_id: i64,
    pub user_id: UserId,
    pub category: String,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    pub locked: bool,
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Scheduled,
    Pending,
    Cancelled,
}

impl EventStatus {
    pub fn for_date(date: Option<NaiveDate>) -> Self {
        if date.is_some() {
            EventStatus::Scheduled
        } else {
            EventStatus::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Scheduled => "scheduled",
            EventStatus::Pending => "pending",
            EventStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_db(s: &str) -> Self {
        match s {
            "scheduled" => EventStatus::Scheduled,
            "cancelled" => EventStatus::Cancelled,
            _ => EventStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id: i64,
    pub user_id: UserId,
    pub event_type: String,
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub location: Option<String>,
    pub budget: Option<i64>,
    pub memo: Option<String>,
    pub status: EventStatus,
}

impl Event {
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.event_type)
    }
}

/// Event types that stand for the wedding itself.
pub fn is_wedding_event(event_type: &str) -> bool {
    matches!(event_type.trim().to_lowercase().as_str(), "wedding" | "ceremony")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneSource {
    System,
    User,
}

impl MilestoneSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneSource::System => "system",
            MilestoneSource::User => "user",
        }
    }

    pub fn from_db(s: &str) -> Self {
        if s == "system" {
            MilestoneSource::System
        } else {
            MilestoneSource::User
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub milestone_id: i64,
    pub user_id: UserId,
    pub title: String,
    pub due_date: NaiveDate,
    pub completed: bool,
    pub source: MilestoneSource,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSummary {
    pub summary_id: i64,
    pub user_id: UserId,
    pub content: String,
    pub latest: bool,
    pub created_at: DateTime<Utc>,
}

//
// ================= Catalog =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vendor {
    pub vendor_id: i64,
    pub vendor_type: String,
    pub name: String,
    pub region: Option<String>,
    pub min_price: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offering {
    pub offering_id: i64,
    pub vendor_id: i64,
    pub category: String,
    pub package_name: String,
    pub price: Option<i64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One catalog lookup row: an offering joined with its vendor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfferingMatch {
    pub offering: Offering,
    pub vendor_name: String,
    pub vendor_region: Option<String>,
    pub region_match: bool,
}

//
// ================= Snapshot =================
//

/// Read-only view of one user's memory, taken at the start of a turn and
/// again after the merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub profile: UserProfile,
    pub budgets: Vec<BudgetPreference>,
    pub events: Vec<Event>,
    pub milestones: Vec<Milestone>,
    pub latest_summary: Option<ConversationSummary>,
}

impl MemorySnapshot {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            profile: UserProfile::new(user_id),
            budgets: Vec::new(),
            events: Vec::new(),
            milestones: Vec::new(),
            latest_summary: None,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.profile.user_id
    }

    pub fn budget_for(&self, category: &str) -> Option<&BudgetPreference> {
        self.budgets.iter().find(|b| b.category == category)
    }

    pub fn event(&self, event_id: i64) -> Option<&Event> {
        self.events.iter().find(|e| e.event_id == event_id)
    }

    pub fn milestone(&self, milestone_id: i64) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.milestone_id == milestone_id)
    }

    /// Percentage of milestones completed, 0 when there are none.
    pub fn readiness_percent(&self) -> u8 {
        readiness_percent(&self.milestones)
    }
}

pub fn readiness_percent(milestones: &[Milestone]) -> u8 {
    if milestones.is_empty() {
        return 0;
    }
    let done = milestones.iter().filter(|m| m.completed).count();
    ((done as f64 / milestones.len() as f64) * 100.0).round() as u8
}

/// Largest amount of won accepted anywhere in a plan (one quadrillion).
pub const MAX_AMOUNT_WON: i64 = 1_000_000_000_000_000;

/// Format an amount of won with thousands separators.
pub fn format_won(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 5);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if amount < 0 {
        out.insert(0, '-');
    }
    out.push_str(" won");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_labels_round_trip_through_closed_set() {
        for intent in Intent::ALL {
            assert_eq!(Intent::from_label(intent.as_str()), Some(intent));
        }
        assert_eq!(Intent::from_label("book_flight"), None);
        assert_eq!(Intent::from_label(" Budget_Update "), Some(Intent::BudgetUpdate));
    }

    #[test]
    fn test_format_won() {
        assert_eq!(format_won(30_000_000), "30,000,000 won");
        assert_eq!(format_won(7_500_000), "7,500,000 won");
        assert_eq!(format_won(0), "0 won");
        assert_eq!(format_won(-1_200), "-1,200 won");
    }

    #[test]
    fn test_readiness_percent() {
        let user_id = Uuid::new_v4();
        let make = |id, completed| Milestone {
            milestone_id: id,
            user_id,
            title: format!("m{}", id),
            due_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            completed,
            source: MilestoneSource::System,
            notes: None,
        };

        assert_eq!(readiness_percent(&[]), 0);
        assert_eq!(readiness_percent(&[make(1, true), make(2, false), make(3, false)]), 33);
        assert_eq!(readiness_percent(&[make(1, true), make(2, true)]), 100);
    }

    #[test]
    fn test_event_status_follows_date() {
        assert_eq!(EventStatus::for_date(None), EventStatus::Pending);
        assert_eq!(
            EventStatus::for_date(NaiveDate::from_ymd_opt(2026, 5, 23)),
            EventStatus::Scheduled
        );
    }
}
