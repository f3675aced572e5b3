//! Follow-up scheduling
//!
//! The core only describes follow-ups; hosts decide when and how they fire.

use crate::error::OrchestrationError;
use crate::models::UserId;
use crate::synthesizer::QuickAction;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// A message to deliver to a user after a delay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FollowUp {
    pub user_id: UserId,
    #[serde(with = "duration_secs")]
    pub delay: Duration,
    pub message: String,
    pub quick_actions: Vec<QuickAction>,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

pub trait FollowUpScheduler: Send + Sync {
    fn schedule(&self, follow_up: FollowUp) -> Result<()>;
}

/// Sleeps on a Tokio task per follow-up and hands it to a channel when due.
#[derive(Clone)]
pub struct TokioFollowUpScheduler {
    sender: mpsc::UnboundedSender<FollowUp>,
}

impl TokioFollowUpScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FollowUp>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl FollowUpScheduler for TokioFollowUpScheduler {
    fn schedule(&self, follow_up: FollowUp) -> Result<()> {
        if self.sender.is_closed() {
            return Err(OrchestrationError::ConfigError(
                "follow-up receiver has been dropped".to_string(),
            ));
        }

        let sender = self.sender.clone();
        debug!(user_id = %follow_up.user_id, delay_secs = follow_up.delay.as_secs(), "Follow-up scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(follow_up.delay).await;
            // Receiver gone means the host shut down; nothing left to notify.
            let _ = sender.send(follow_up);
        });
        Ok(())
    }
}
