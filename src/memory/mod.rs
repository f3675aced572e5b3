//! Planner memory
//!
//! Durable per-user records (profile, budgets, events, milestones, rolling
//! summaries) behind the [`MemoryStore`] trait, plus the in-process
//! conversation history and the summarizer that condenses it.

pub mod history;
pub mod postgres;
pub mod store;
pub mod summarizer;
pub mod timeline;

use crate::merge::{MergeBatch, MergeReport};
use crate::models::{ConversationSummary, MemorySnapshot, UserId, UserProfile};
use crate::Result;

pub use history::{format_turns, ConversationHistory, HistoryBook, Turn};
pub use postgres::PostgresMemoryStore;
pub use store::InMemoryStore;
pub use summarizer::Summarizer;

/// Storage backend for per-user planner records.
///
/// `commit` must be atomic: either every change in the batch (and the
/// summary, if any) is visible afterwards, or none is. At most one summary
/// per user is marked latest at any time.
#[async_trait::async_trait]
pub trait MemoryStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Profile for `user_id`, created empty on first contact.
    async fn ensure_profile(&self, user_id: UserId) -> Result<UserProfile>;

    async fn snapshot(&self, user_id: UserId) -> Result<MemorySnapshot>;

    async fn commit(&self, batch: MergeBatch) -> Result<MergeReport>;

    /// Newest first.
    async fn summaries(&self, user_id: UserId, limit: usize) -> Result<Vec<ConversationSummary>>;

    /// Make an older summary the latest one again.
    async fn promote_summary(&self, user_id: UserId, summary_id: i64) -> Result<ConversationSummary>;
}
