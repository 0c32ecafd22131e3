use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::chat::{ChatRef, MessageRef};
use crate::domain::operation::OperationId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedbackId(pub String);

impl FeedbackId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Ephemeral chat reply that reports an operation outcome and is deleted on schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackMessage {
    pub id: FeedbackId,
    pub operation_id: OperationId,
    pub chat_ref: ChatRef,
    pub message_ref: MessageRef,
    pub scheduled_deletion: DateTime<Utc>,
    pub dismissed: bool,
    pub created_at: DateTime<Utc>,
}

impl FeedbackMessage {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.dismissed && self.scheduled_deletion <= now
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFeedbackMessage {
    pub operation_id: OperationId,
    pub chat_ref: ChatRef,
    pub message_ref: MessageRef,
    pub deletion_delay: Duration,
}

impl NewFeedbackMessage {
    pub fn into_message(self, id: FeedbackId, now: DateTime<Utc>) -> FeedbackMessage {
        FeedbackMessage {
            id,
            operation_id: self.operation_id,
            chat_ref: self.chat_ref,
            message_ref: self.message_ref,
            scheduled_deletion: now + self.deletion_delay,
            dismissed: false,
            created_at: now,
        }
    }
}
