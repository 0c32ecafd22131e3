use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use triage_core::domain::cache::{AuthSetupSession, ConversationContext, PurgeReport};
use triage_core::domain::chat::{ChatRef, MessageRef, UserRef};
use triage_core::domain::feedback::FeedbackMessage;
use triage_core::domain::operation::{NewOperation, Operation, OperationId, OperationStatus};

pub mod cache;
pub mod feedback;
pub mod memory;
pub mod operation;

pub use cache::SqlCacheRepository;
pub use feedback::SqlFeedbackRepository;
pub use memory::{InMemoryCacheRepository, InMemoryFeedbackRepository, InMemoryOperationRepository};
pub use operation::SqlOperationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    fn from_insert(error: sqlx::Error, what: &str) -> Self {
        match &error {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict(format!("{what} already exists"))
            }
            _ => Self::Database(error),
        }
    }
}

/// Durable Operation records. A plain persistence layer: status transitions are validated by callers.
#[async_trait]
pub trait OperationRepository: Send + Sync {
    async fn create(&self, operation: NewOperation) -> Result<Operation, RepositoryError>;

    /// Fails with `NotFound` when `id` is unknown.
    async fn update_status(
        &self,
        id: &OperationId,
        status: OperationStatus,
    ) -> Result<Operation, RepositoryError>;

    async fn find_by_id(&self, id: &OperationId) -> Result<Option<Operation>, RepositoryError>;

    /// Most recent operation started by `source_message_id`.
    async fn find_by_message(
        &self,
        source_message_id: &MessageRef,
    ) -> Result<Option<Operation>, RepositoryError>;

    /// Newest first.
    async fn list_by_group(
        &self,
        group_id: &ChatRef,
        limit: u32,
    ) -> Result<Vec<Operation>, RepositoryError>;

    /// Newest first.
    async fn list_by_status(
        &self,
        status: OperationStatus,
        limit: u32,
    ) -> Result<Vec<Operation>, RepositoryError>;
}

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    /// Fails with `Conflict` if the message ref or operation already has a row.
    async fn insert(&self, message: FeedbackMessage) -> Result<(), RepositoryError>;

    async fn find_by_message(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<FeedbackMessage>, RepositoryError>;

    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<FeedbackMessage>, RepositoryError>;

    /// Returns false when no row matched.
    async fn mark_dismissed(&self, message_ref: &MessageRef) -> Result<bool, RepositoryError>;

    /// Returns false when no row matched.
    async fn delete(&self, message_ref: &MessageRef) -> Result<bool, RepositoryError>;

    /// Undismissed rows whose deletion time is at or before `now`, oldest first.
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<FeedbackMessage>, RepositoryError>;

    /// Dismissed rows still present because their remote delete failed, oldest first.
    async fn list_dismissed(&self, limit: u32) -> Result<Vec<FeedbackMessage>, RepositoryError>;
}

#[async_trait]
pub trait CacheRepository: Send + Sync {
    async fn load_context(
        &self,
        chat_ref: &ChatRef,
        now: DateTime<Utc>,
    ) -> Result<Option<ConversationContext>, RepositoryError>;

    async fn save_context(&self, context: ConversationContext) -> Result<(), RepositoryError>;

    async fn find_auth_session(
        &self,
        user_ref: &UserRef,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthSetupSession>, RepositoryError>;

    async fn save_auth_session(&self, session: AuthSetupSession) -> Result<(), RepositoryError>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport, RepositoryError>;
}

/// Fixed-width UTC encoding so stored timestamps compare correctly as text.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decode_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

pub(crate) fn decode_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
