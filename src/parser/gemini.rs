//! Gemini-backed language understanding
//!
//! Asks the model for a JSON frame matching [`FRAME_SCHEMA`](super::FRAME_SCHEMA).
//! Anything that does not deserialize is reported as `MalformedOutput`.

use super::{ExtractedFrame, LanguageUnderstanding, UnderstandingRequest};
use crate::error::OrchestrationError;
use crate::gemini::{strip_code_fences, GeminiClient};
use crate::memory::history::format_turns;
use crate::models::format_won;
use crate::Result;
use std::sync::Arc;
use tracing::debug;

const EXTRACTION_INSTRUCTIONS: &str = r#"Classify the latest user message into exactly one intent and extract slots.

Rules:
- Return ONLY valid JSON matching the schema
- Omit slots that are not mentioned
- Keep amounts and dates exactly as the user wrote them
- Use general_chat when nothing else fits"#;

pub struct GeminiUnderstanding {
    client: Arc<GeminiClient>,
}

impl GeminiUnderstanding {
    pub fn new(client: Arc<GeminiClient>) -> Self {
        Self { client }
    }

    fn build_prompt(request: &UnderstandingRequest<'_>) -> String {
        let profile = &request.snapshot.profile;
        let budgets = request
            .snapshot
            .budgets
            .iter()
            .map(|b| {
                format!(
                    "{}{}",
                    b.category,
                    b.max_amount.map(|m| format!(" ({})", format_won(m))).unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            r#"SCHEMA:
{}

KNOWN PROFILE:
region={:?} wedding_date={:?} budget categories=[{}]

RECENT CONVERSATION:
{}
LATEST MESSAGE:
{}
"#,
            request.schema,
            profile.region,
            profile.wedding_date,
            budgets,
            format_turns(request.context_window),
            request.utterance,
        )
    }
}

#[async_trait::async_trait]
impl LanguageUnderstanding for GeminiUnderstanding {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn extract(&self, request: &UnderstandingRequest<'_>) -> Result<ExtractedFrame> {
        let prompt = Self::build_prompt(request);
        let (response, confidence) = self
            .client
            .generate(&prompt, EXTRACTION_INSTRUCTIONS, 0.0)
            .await?;

        debug!(confidence, "Understanding frame received");
        parse_frame(&response)
    }
}

/// Decode a model response into a frame.
pub fn parse_frame(response: &str) -> Result<ExtractedFrame> {
    let cleaned = strip_code_fences(response);
    serde_json::from_str::<ExtractedFrame>(cleaned).map_err(|e| {
        OrchestrationError::MalformedOutput(format!("{} | raw={}", e, response))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_frame() {
        let raw = "```json\n{\"intent\":\"recommend_vendor\",\"slots\":{\"category\":\"studio\",\"amount\":3000000}}\n```";
        let frame = parse_frame(raw).unwrap();
        assert_eq!(frame.intent, "recommend_vendor");
        assert_eq!(frame.slots.category.as_deref(), Some("studio"));
        assert_eq!(frame.slots.amount.as_deref(), Some("3000000"));
    }

    #[test]
    fn test_missing_slots_default() {
        let frame = parse_frame(r#"{"intent":"general_chat"}"#).unwrap();
        assert_eq!(frame.intent, "general_chat");
        assert!(frame.slots.splits.is_empty());
    }

    #[test]
    fn test_prose_is_malformed() {
        let result = parse_frame("Sure! The user wants a studio.");
        assert!(matches!(result, Err(OrchestrationError::MalformedOutput(_))));
    }
}
