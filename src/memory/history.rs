//! Conversation window
//!
//! In-process, per-user record of recent exchanges. The parser reads the
//! last few turns from here; the summarizer digests them. Each engine
//! instance owns its own [`HistoryBook`].

use crate::models::{Intent, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Exchanges kept per user beyond the parser window.
const RETAINED_TURNS: usize = 50;

/// One completed exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub user: String,
    pub reply: String,
    pub intent: Intent,
    pub timestamp: DateTime<Utc>,
    /// Approximate token count for prompt budgeting
    pub token_count: usize,
}

impl Turn {
    pub fn new(user: impl Into<String>, reply: impl Into<String>, intent: Intent) -> Self {
        let user = user.into();
        let reply = reply.into();
        let token_count = (user.len() + reply.len() + 3) / 4;
        Self {
            user,
            reply,
            intent,
            timestamp: Utc::now(),
            token_count,
        }
    }
}

/// Recent exchanges for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    turns: VecDeque<Turn>,
    total_tokens: usize,
}

impl ConversationHistory {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            turns: VecDeque::new(),
            total_tokens: 0,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.total_tokens += turn.token_count;
        self.turns.push_back(turn);
        self.updated_at = Utc::now();
    }

    /// The `count` most recent turns, oldest first.
    pub fn recent(&self, count: usize) -> Vec<Turn> {
        let skip = self.turns.len().saturating_sub(count);
        self.turns.iter().skip(skip).cloned().collect()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.back()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    /// Drop everything but the last `keep` turns.
    pub fn trim_to_recent(&mut self, keep: usize) {
        while self.turns.len() > keep {
            if let Some(old) = self.turns.pop_front() {
                self.total_tokens = self.total_tokens.saturating_sub(old.token_count);
            }
        }
    }

    /// Prompt-ready rendering of the last `count` turns.
    pub fn formatted(&self, count: usize) -> String {
        format_turns(&self.recent(count))
    }
}

pub fn format_turns(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        out.push_str(&format!("User: {}\nPlanner: {}\n", turn.user, turn.reply));
    }
    out
}

/// Per-user histories owned by one engine instance.
#[derive(Debug, Default)]
pub struct HistoryBook {
    histories: RwLock<HashMap<UserId, ConversationHistory>>,
}

impl HistoryBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn window(&self, user_id: UserId, count: usize) -> Vec<Turn> {
        let histories = self.histories.read().await;
        histories
            .get(&user_id)
            .map(|h| h.recent(count))
            .unwrap_or_default()
    }

    pub async fn record(&self, user_id: UserId, turn: Turn) {
        let mut histories = self.histories.write().await;
        let history = histories
            .entry(user_id)
            .or_insert_with(|| ConversationHistory::new(user_id));
        history.push(turn);
        history.trim_to_recent(RETAINED_TURNS);
    }

    pub async fn len(&self, user_id: UserId) -> usize {
        let histories = self.histories.read().await;
        histories.get(&user_id).map_or(0, ConversationHistory::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_recent_is_chronological() {
        let mut history = ConversationHistory::new(Uuid::new_v4());
        for i in 0..5 {
            history.push(Turn::new(format!("q{}", i), format!("a{}", i), Intent::GeneralChat));
        }

        let recent = history.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].user, "q3");
        assert_eq!(recent[1].user, "q4");
        assert_eq!(history.recent(10).len(), 5);
    }

    #[test]
    fn test_trim_keeps_token_count_consistent() {
        let mut history = ConversationHistory::new(Uuid::new_v4());
        for i in 0..10 {
            history.push(Turn::new(format!("question {}", i), "answer", Intent::GeneralChat));
        }
        history.trim_to_recent(3);

        assert_eq!(history.len(), 3);
        let expected: usize = history.recent(3).iter().map(|t| t.token_count).sum();
        assert_eq!(history.total_tokens(), expected);
    }

    #[tokio::test]
    async fn test_book_isolates_users() {
        let book = HistoryBook::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        book.record(alice, Turn::new("hi", "hello", Intent::GeneralChat)).await;
        book.record(alice, Turn::new("budget?", "none yet", Intent::BudgetQuery)).await;

        assert_eq!(book.len(alice).await, 2);
        assert_eq!(book.len(bob).await, 0);
        assert!(book.window(bob, 6).await.is_empty());
        assert_eq!(book.window(alice, 1).await[0].intent, Intent::BudgetQuery);
    }
}
