//! Rolling conversation summary
//!
//! Uses Gemini to condense the previous summary and the recent turns when a
//! key is configured; otherwise, or when the call fails or runs past the LLM
//! timeout, falls back to a deterministic digest.

use crate::gemini::GeminiClient;
use crate::memory::history::{format_turns, Turn};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Turns carried into the deterministic digest.
pub const DIGEST_TURNS: usize = 6;
/// Per-field clip length inside the digest.
pub const DIGEST_CLIP: usize = 120;
const PREVIOUS_CLIP: usize = 480;

const SUMMARY_INSTRUCTIONS: &str = r#"You maintain a running summary of a wedding planning conversation.
Keep: budgets and whether they are locked, dates, venues and vendors discussed,
decisions made, and open questions. Drop greetings and small talk.
Answer with at most 8 short bullet points and nothing else."#;

pub struct Summarizer {
    client: Option<Arc<GeminiClient>>,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(client: Option<Arc<GeminiClient>>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Digest-only summarizer.
    pub fn offline() -> Self {
        Self::new(None, Duration::from_secs(0))
    }

    /// New summary from the previous one and the turns since, newest last.
    pub async fn summarize(&self, previous: Option<&str>, turns: &[Turn]) -> String {
        let Some(client) = &self.client else {
            return digest(previous, turns);
        };

        let prompt = format!(
            "PREVIOUS SUMMARY:\n{}\n\nRECENT TURNS:\n---\n{}---\n\nUPDATED SUMMARY:",
            previous.unwrap_or("(none)"),
            format_turns(turns)
        );

        match tokio::time::timeout(self.timeout, client.generate(&prompt, SUMMARY_INSTRUCTIONS, 0.2)).await {
            Ok(Ok((text, _confidence))) if !text.trim().is_empty() => {
                debug!(turns = turns.len(), "Summarized with Gemini");
                text.trim().to_string()
            }
            Ok(Ok(_)) => {
                warn!("Gemini returned an empty summary, using digest");
                digest(previous, turns)
            }
            Ok(Err(e)) => {
                warn!("Failed to summarize context: {}", e);
                digest(previous, turns)
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Summary timed out, using digest");
                digest(previous, turns)
            }
        }
    }
}

/// Deterministic summary: the previous summary plus the last few turns.
pub fn digest(previous: Option<&str>, turns: &[Turn]) -> String {
    let mut lines = Vec::new();

    if let Some(previous) = previous.map(str::trim).filter(|p| !p.is_empty()) {
        lines.push(format!("Earlier: {}", clip(previous, PREVIOUS_CLIP)));
    }

    let start = turns.len().saturating_sub(DIGEST_TURNS);
    for turn in &turns[start..] {
        lines.push(format!(
            "- [{}] user: {} / planner: {}",
            turn.intent,
            clip(&turn.user, DIGEST_CLIP),
            clip(&turn.reply, DIGEST_CLIP)
        ));
    }

    lines.join("\n")
}

/// Clips to `max` characters, marking the cut with an ellipsis.
pub fn clip(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Intent;

    #[test]
    fn test_clip_counts_characters() {
        assert_eq!(clip("short", 120), "short");
        let korean = "웨딩홀".repeat(50);
        let clipped = clip(&korean, 120);
        assert_eq!(clipped.chars().count(), 121);
        assert!(clipped.ends_with('…'));
    }

    #[test]
    fn test_digest_keeps_last_six_turns() {
        let turns: Vec<Turn> = (0..8)
            .map(|i| Turn::new(format!("question {}", i), format!("answer {}", i), Intent::GeneralChat))
            .collect();

        let text = digest(Some("Hall budget locked at 30,000,000 won"), &turns);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with("Earlier: Hall budget locked"));
        assert!(lines[1].contains("question 2"));
        assert!(lines[6].contains("answer 7"));
        assert!(!text.contains("question 1"));
    }

    #[tokio::test]
    async fn test_offline_summarizer_is_deterministic() {
        let turns = vec![Turn::new("Set hall to 30M", "Saved hall budget", Intent::BudgetUpdate)];
        let summarizer = Summarizer::offline();
        let a = summarizer.summarize(None, &turns).await;
        let b = summarizer.summarize(None, &turns).await;
        assert_eq!(a, b);
        assert_eq!(a, "- [budget_update] user: Set hall to 30M / planner: Saved hall budget");
    }
}
