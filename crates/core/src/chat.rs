use async_trait::async_trait;
use thiserror::Error;

use crate::domain::chat::{ChatRef, MessageRef};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("chat transport request failed: {0}")]
    Transport(String),
    #[error("chat api rejected `{method}`: {error}")]
    Api { method: String, error: String },
    #[error("chat api rate limited `{method}`")]
    RateLimited { method: String },
}

/// Outbound chat operations used by the workflow, feedback lifecycle, and undo.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Replaces the bot's status reaction on `message_ref` with `emoji`.
    async fn set_reaction(
        &self,
        chat_ref: &ChatRef,
        message_ref: &MessageRef,
        emoji: &str,
    ) -> Result<(), ChatError>;

    async fn reply(
        &self,
        chat_ref: &ChatRef,
        reply_to: &MessageRef,
        text: &str,
    ) -> Result<MessageRef, ChatError>;

    /// `Ok(false)` means the message was already gone.
    async fn delete_message(
        &self,
        chat_ref: &ChatRef,
        message_ref: &MessageRef,
    ) -> Result<bool, ChatError>;
}
