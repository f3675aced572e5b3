//! Intent Parser
//!
//! Turns one utterance plus the recent conversation window into an
//! [`Intent`] and normalized [`Slots`]. Extraction is delegated to a
//! [`LanguageUnderstanding`] capability which returns raw strings; every
//! number, date and category is normalized here before it leaves the parser.
//!
//! The parser never fails: an unknown label, a malformed frame or a
//! capability error all resolve to `general_chat` with empty slots.

pub mod gemini;
pub mod normalize;
pub mod rules;

use crate::error::OrchestrationError;
use crate::memory::history::Turn;
use crate::models::{BudgetSplit, Intent, MemorySnapshot, Slots};
use crate::Result;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub use gemini::GeminiUnderstanding;
pub use rules::RuleBasedUnderstanding;

/// JSON shape a capability must produce.
pub const FRAME_SCHEMA: &str = r#"{
  "intent": "recommend_vendor | budget_query | budget_update | schedule_create | schedule_update | schedule_query | profile_update | general_chat",
  "slots": {
    "category": "hall | studio | dress | makeup | honeymoon | jewelry | invitation | other",
    "region": "string", "date": "YYYY-MM-DD", "time": "HH:MM",
    "amount": "amount in won", "min_amount": "amount in won", "percentage": "0-100",
    "splits": [{"category": "string", "percentage": "0-100"}],
    "event_type": "string", "title": "string", "location": "string",
    "event_id": "number", "milestone_id": "number", "completed": "bool",
    "cancel": "bool", "lock": "bool", "confirm": "bool",
    "name": "string", "contact": "string", "guest_count": "number", "notes": "string",
    "free_text": "string"
  }
}"#;

// =============================
// Capability contract
// =============================

/// What the capability sees for one turn.
pub struct UnderstandingRequest<'a> {
    pub utterance: &'a str,
    pub context_window: &'a [Turn],
    pub snapshot: &'a MemorySnapshot,
    pub schema: &'static str,
}

/// Language-understanding capability.
///
/// Returns a frame conforming to [`FRAME_SCHEMA`], or
/// [`OrchestrationError::MalformedOutput`] when it cannot.
#[async_trait::async_trait]
pub trait LanguageUnderstanding: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, request: &UnderstandingRequest<'_>) -> Result<ExtractedFrame>;
}

/// Raw capability output; nothing in here is normalized yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedFrame {
    pub intent: String,
    #[serde(default)]
    pub slots: RawSlots,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawSplit {
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub percentage: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawSlots {
    #[serde(deserialize_with = "lenient_string")]
    pub category: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub region: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub time: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub amount: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub min_amount: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub percentage: Option<String>,
    pub splits: Vec<RawSplit>,
    #[serde(deserialize_with = "lenient_string")]
    pub event_type: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub event_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub milestone_id: Option<String>,
    pub completed: Option<bool>,
    pub cancel: Option<bool>,
    pub lock: Option<bool>,
    pub confirm: Option<bool>,
    #[serde(deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub contact: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub guest_count: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub notes: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub free_text: Option<String>,
}

/// Models answer `"amount": 50000000` as often as `"amount": "50000000"`.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

// =============================
// Parser
// =============================

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTurn {
    pub intent: Intent,
    pub slots: Slots,
    /// Set when the parser had to fall back to `general_chat`.
    pub fallback_reason: Option<String>,
}

impl ParsedTurn {
    fn general_chat(reason: String) -> Self {
        Self {
            intent: Intent::GeneralChat,
            slots: Slots::default(),
            fallback_reason: Some(reason),
        }
    }
}

pub struct IntentParser {
    understanding: Arc<dyn LanguageUnderstanding>,
}

impl IntentParser {
    pub fn new(understanding: Arc<dyn LanguageUnderstanding>) -> Self {
        Self { understanding }
    }

    pub fn capability(&self) -> &'static str {
        self.understanding.name()
    }

    pub async fn parse(
        &self,
        utterance: &str,
        context_window: &[Turn],
        snapshot: &MemorySnapshot,
    ) -> ParsedTurn {
        let request = UnderstandingRequest {
            utterance,
            context_window,
            snapshot,
            schema: FRAME_SCHEMA,
        };

        match self.understanding.extract(&request).await {
            Ok(frame) => normalize_frame(frame),
            Err(e) => {
                let reason = match &e {
                    OrchestrationError::MalformedOutput(_) => {
                        debug!(capability = self.understanding.name(), error = %e, "Malformed frame");
                        e.to_string()
                    }
                    _ => {
                        warn!(capability = self.understanding.name(), error = %e, "Understanding failed");
                        e.to_string()
                    }
                };
                ParsedTurn::general_chat(reason)
            }
        }
    }
}

/// Normalize a raw frame. Values that fail to normalize are dropped.
pub fn normalize_frame(frame: ExtractedFrame) -> ParsedTurn {
    let Some(intent) = Intent::from_label(&frame.intent) else {
        let e = OrchestrationError::ParseAmbiguous(format!("unknown intent '{}'", frame.intent));
        debug!(error = %e, "Falling back to general_chat");
        return ParsedTurn::general_chat(e.to_string());
    };

    let raw = frame.slots;
    let splits = raw
        .splits
        .iter()
        .filter_map(|s| {
            let category = normalize::normalize_category(s.category.as_deref()?)?;
            let percentage = normalize::parse_percentage(s.percentage.as_deref()?)?;
            Some(BudgetSplit {
                category: category.to_string(),
                percentage,
            })
        })
        .collect();

    let slots = Slots {
        category: text(&raw.category)
            .and_then(|c| normalize::normalize_category(&c))
            .map(str::to_string),
        region: text(&raw.region).and_then(|r| normalize::normalize_region(&r)),
        date: text(&raw.date).and_then(|d| normalize::parse_date(&d)),
        time: text(&raw.time).and_then(|t| normalize::parse_time(&t)),
        amount: text(&raw.amount).and_then(|a| normalize::parse_amount(&a)),
        min_amount: text(&raw.min_amount).and_then(|a| normalize::parse_amount(&a)),
        percentage: text(&raw.percentage).and_then(|p| normalize::parse_percentage(&p)),
        splits,
        event_type: text(&raw.event_type).map(|t| t.to_lowercase()),
        title: text(&raw.title),
        location: text(&raw.location),
        event_id: text(&raw.event_id).and_then(|id| normalize::parse_id(&id)),
        milestone_id: text(&raw.milestone_id).and_then(|id| normalize::parse_id(&id)),
        completed: raw.completed,
        cancel: raw.cancel.unwrap_or(false),
        lock: raw.lock,
        confirm: raw.confirm.unwrap_or(false),
        name: text(&raw.name),
        contact: text(&raw.contact),
        guest_count: text(&raw.guest_count).and_then(|g| normalize::parse_count(&g)),
        notes: text(&raw.notes),
        free_text: text(&raw.free_text),
    };

    ParsedTurn {
        intent,
        slots,
        fallback_reason: None,
    }
}

fn text(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    struct FixedFrame(Result<ExtractedFrame>);

    #[async_trait::async_trait]
    impl LanguageUnderstanding for FixedFrame {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn extract(&self, _request: &UnderstandingRequest<'_>) -> Result<ExtractedFrame> {
            match &self.0 {
                Ok(frame) => Ok(frame.clone()),
                Err(e) => Err(OrchestrationError::MalformedOutput(e.to_string())),
            }
        }
    }

    async fn parse_with(frame: Result<ExtractedFrame>) -> ParsedTurn {
        let parser = IntentParser::new(Arc::new(FixedFrame(frame)));
        let snapshot = MemorySnapshot::empty(Uuid::new_v4());
        parser.parse("anything", &[], &snapshot).await
    }

    #[tokio::test]
    async fn test_malformed_output_falls_back_to_general_chat() {
        let parsed = parse_with(Err(OrchestrationError::MalformedOutput("not json".into()))).await;
        assert_eq!(parsed.intent, Intent::GeneralChat);
        assert!(parsed.slots.is_empty());
        assert!(parsed.fallback_reason.is_some());
    }

    #[tokio::test]
    async fn test_unknown_label_falls_back_to_general_chat() {
        let frame = ExtractedFrame {
            intent: "book_flight".into(),
            slots: RawSlots {
                category: Some("hall".into()),
                ..Default::default()
            },
        };
        let parsed = parse_with(Ok(frame)).await;
        assert_eq!(parsed.intent, Intent::GeneralChat);
        assert!(parsed.slots.is_empty());
    }

    #[test]
    fn test_frame_values_are_normalized() {
        let json = r#"{
            "intent": "budget_update",
            "slots": {
                "category": "웨딩홀",
                "amount": "3000만원",
                "date": "2026년 5월 23일",
                "splits": [{"category": "Studio", "percentage": 15}],
                "event_id": 7,
                "title": "  ",
                "guest_count": "150명"
            }
        }"#;
        let frame: ExtractedFrame = serde_json::from_str(json).unwrap();
        let parsed = normalize_frame(frame);

        assert_eq!(parsed.intent, Intent::BudgetUpdate);
        assert_eq!(parsed.slots.category.as_deref(), Some("hall"));
        assert_eq!(parsed.slots.amount, Some(30_000_000));
        assert_eq!(parsed.slots.date, NaiveDate::from_ymd_opt(2026, 5, 23));
        assert_eq!(parsed.slots.splits.len(), 1);
        assert_eq!(parsed.slots.splits[0].category, "studio");
        assert_eq!(parsed.slots.event_id, Some(7));
        assert_eq!(parsed.slots.title, None);
        assert_eq!(parsed.slots.guest_count, Some(150));
    }

    #[test]
    fn test_unnormalizable_values_are_dropped() {
        let frame = ExtractedFrame {
            intent: "recommend_vendor".into(),
            slots: RawSlots {
                category: Some("spaceship".into()),
                date: Some("someday".into()),
                amount: Some("a lot".into()),
                ..Default::default()
            },
        };
        let parsed = normalize_frame(frame);
        assert_eq!(parsed.intent, Intent::RecommendVendor);
        assert!(parsed.slots.is_empty());
    }
}
