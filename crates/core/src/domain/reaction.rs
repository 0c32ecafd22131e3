use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::chat::{ChatRef, MessageRef, UserRef};

/// One reaction change on one message, as reported by the chat adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub chat_ref: ChatRef,
    pub message_ref: MessageRef,
    pub user_ref: UserRef,
    pub added_emojis: Vec<String>,
    pub removed_emojis: Vec<String>,
}

impl ReactionEvent {
    pub fn added(
        chat_ref: ChatRef,
        message_ref: MessageRef,
        user_ref: UserRef,
        emoji: impl Into<String>,
    ) -> Self {
        Self {
            chat_ref,
            message_ref,
            user_ref,
            added_emojis: vec![emoji.into()],
            removed_emojis: Vec::new(),
        }
    }

    pub fn removed(
        chat_ref: ChatRef,
        message_ref: MessageRef,
        user_ref: UserRef,
        emoji: impl Into<String>,
    ) -> Self {
        Self {
            chat_ref,
            message_ref,
            user_ref,
            added_emojis: Vec::new(),
            removed_emojis: vec![emoji.into()],
        }
    }

    /// Builds the diff between a user's reaction set before and after an update.
    pub fn from_snapshots(
        chat_ref: ChatRef,
        message_ref: MessageRef,
        user_ref: UserRef,
        before: &[String],
        after: &[String],
    ) -> Self {
        let before_set =
            before.iter().map(|emoji| normalize_reaction_token(emoji)).collect::<BTreeSet<_>>();
        let after_set =
            after.iter().map(|emoji| normalize_reaction_token(emoji)).collect::<BTreeSet<_>>();

        Self {
            chat_ref,
            message_ref,
            user_ref,
            added_emojis: after_set.difference(&before_set).cloned().collect(),
            removed_emojis: before_set.difference(&after_set).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added_emojis.is_empty() && self.removed_emojis.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionCommand {
    Dismiss,
    Undo,
}

/// Emoji bindings for the feedback-message controls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionControls {
    pub dismiss: String,
    pub undo: String,
}

impl Default for ReactionControls {
    fn default() -> Self {
        Self { dismiss: "+1".to_string(), undo: "-1".to_string() }
    }
}

impl ReactionControls {
    pub fn new(dismiss: impl Into<String>, undo: impl Into<String>) -> Self {
        Self { dismiss: dismiss.into(), undo: undo.into() }
    }

    /// Commands carried by the added emojis, dismiss first. Removed emojis never trigger anything.
    pub fn interpret(&self, event: &ReactionEvent) -> Vec<ReactionCommand> {
        let mut commands = Vec::new();
        if event.added_emojis.iter().any(|emoji| same_reaction(emoji, &self.dismiss)) {
            commands.push(ReactionCommand::Dismiss);
        }
        if event.added_emojis.iter().any(|emoji| same_reaction(emoji, &self.undo)) {
            commands.push(ReactionCommand::Undo);
        }
        commands
    }
}

pub fn same_reaction(left: &str, right: &str) -> bool {
    canonical_reaction(left) == canonical_reaction(right)
}

pub fn normalize_reaction_token(reaction: &str) -> String {
    let trimmed = reaction.trim().trim_matches(':').to_ascii_lowercase();
    // Slack appends skin tones as `::skin-tone-N`.
    match trimmed.split_once("::") {
        Some((base, _)) => base.to_string(),
        None => trimmed,
    }
}

fn canonical_reaction(reaction: &str) -> String {
    let normalized = normalize_reaction_token(reaction);
    let canonical = match normalized.as_str() {
        "👍" | "thumbsup" | "+1" => "+1",
        "👎" | "thumbsdown" | "-1" => "-1",
        "✅" | "white_check_mark" => "white_check_mark",
        "❌" | "x" => "x",
        "🤔" | "thinking_face" => "thinking_face",
        "👀" | "eyes" => "eyes",
        "⏳" | "hourglass_flowing_sand" => "hourglass_flowing_sand",
        "🐛" | "bug" => "bug",
        "💡" | "bulb" => "bulb",
        "🔍" | "mag" => "mag",
        "✏️" | "✏" | "pencil2" => "pencil2",
        other => other,
    };
    canonical.to_string()
}
