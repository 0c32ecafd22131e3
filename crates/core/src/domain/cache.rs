//! Expiring side records kept next to the operation model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::chat::{ChatRef, UserRef};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub user_ref: UserRef,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Recent messages of one chat, handed to the classifier as context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub chat_ref: ChatRef,
    pub entries: Vec<ContextEntry>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationContext {
    pub const MAX_ENTRIES: usize = 10;

    pub fn empty(chat_ref: ChatRef, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self { chat_ref, entries: Vec::new(), expires_at, updated_at: now }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Appends and keeps only the newest `MAX_ENTRIES`.
    pub fn push(&mut self, entry: ContextEntry, expires_at: DateTime<Utc>) {
        self.updated_at = entry.at;
        self.entries.push(entry);
        if self.entries.len() > Self::MAX_ENTRIES {
            let overflow = self.entries.len() - Self::MAX_ENTRIES;
            self.entries.drain(..overflow);
        }
        self.expires_at = expires_at;
    }

    pub fn texts(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.text.clone()).collect()
    }
}

/// A half-finished tracker-credential setup started in a DM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSetupSession {
    pub user_ref: UserRef,
    pub chat_ref: ChatRef,
    pub step: String,
    /// Token ciphertext in the token-cipher wire format.
    pub encrypted_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub contexts: u64,
    pub auth_sessions: u64,
}

impl PurgeReport {
    pub fn total(&self) -> u64 {
        self.contexts + self.auth_sessions
    }
}
