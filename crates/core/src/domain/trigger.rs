use serde::{Deserialize, Serialize};

use crate::domain::chat::{ChatRef, MessageRef, UserRef};

/// Message that passed the trigger filter and should be classified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerMessage {
    pub chat_ref: ChatRef,
    pub message_ref: MessageRef,
    pub user_ref: UserRef,
    pub text: String,
    pub hashtags: Vec<String>,
    pub mentioned: bool,
}

/// Work-queue tier. Explicit mentions are admitted ahead of hashtag-only triggers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Mention,
    Hashtag,
}

impl TriggerMessage {
    pub fn priority(&self) -> Priority {
        if self.mentioned {
            Priority::Mention
        } else {
            Priority::Hashtag
        }
    }

    pub fn correlation_id(&self) -> String {
        format!("{}:{}", self.chat_ref, self.message_ref)
    }
}
