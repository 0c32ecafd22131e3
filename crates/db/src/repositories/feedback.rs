use chrono::{DateTime, Utc};
use sqlx::Row;

use triage_core::domain::chat::{ChatRef, MessageRef};
use triage_core::domain::feedback::{FeedbackId, FeedbackMessage};
use triage_core::domain::operation::OperationId;

use super::{decode_error, decode_timestamp, encode_timestamp, FeedbackRepository, RepositoryError};
use crate::DbPool;

const FEEDBACK_COLUMNS: &str =
    "id, operation_id, chat_ref, message_ref, scheduled_deletion, dismissed, created_at";

pub struct SqlFeedbackRepository {
    pool: DbPool,
}

impl SqlFeedbackRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_feedback(row: &sqlx::sqlite::SqliteRow) -> Result<FeedbackMessage, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let operation_id: String = row.try_get("operation_id").map_err(decode_error)?;
    let chat_ref: String = row.try_get("chat_ref").map_err(decode_error)?;
    let message_ref: String = row.try_get("message_ref").map_err(decode_error)?;
    let scheduled_deletion: String = row.try_get("scheduled_deletion").map_err(decode_error)?;
    let dismissed: bool = row.try_get("dismissed").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    Ok(FeedbackMessage {
        id: FeedbackId(id),
        operation_id: OperationId(operation_id),
        chat_ref: ChatRef(chat_ref),
        message_ref: MessageRef(message_ref),
        scheduled_deletion: decode_timestamp("scheduled_deletion", &scheduled_deletion)?,
        dismissed,
        created_at: decode_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl FeedbackRepository for SqlFeedbackRepository {
    async fn insert(&self, message: FeedbackMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO feedback_messages
                (id, operation_id, chat_ref, message_ref, scheduled_deletion, dismissed, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.operation_id.0)
        .bind(&message.chat_ref.0)
        .bind(&message.message_ref.0)
        .bind(encode_timestamp(message.scheduled_deletion))
        .bind(message.dismissed)
        .bind(encode_timestamp(message.created_at))
        .execute(&self.pool)
        .await
        .map_err(|error| RepositoryError::from_insert(error, "feedback message"))?;

        Ok(())
    }

    async fn find_by_message(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<FeedbackMessage>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {FEEDBACK_COLUMNS} FROM feedback_messages WHERE message_ref = ?"
        ))
        .bind(&message_ref.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_feedback).transpose()
    }

    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<FeedbackMessage>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {FEEDBACK_COLUMNS} FROM feedback_messages WHERE operation_id = ?"
        ))
        .bind(&operation_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_feedback).transpose()
    }

    async fn mark_dismissed(&self, message_ref: &MessageRef) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE feedback_messages SET dismissed = 1 WHERE message_ref = ?")
            .bind(&message_ref.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, message_ref: &MessageRef) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM feedback_messages WHERE message_ref = ?")
            .bind(&message_ref.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<FeedbackMessage>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {FEEDBACK_COLUMNS} FROM feedback_messages
             WHERE dismissed = 0 AND scheduled_deletion <= ?
             ORDER BY scheduled_deletion ASC
             LIMIT ?"
        ))
        .bind(encode_timestamp(now))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_feedback).collect()
    }

    async fn list_dismissed(&self, limit: u32) -> Result<Vec<FeedbackMessage>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {FEEDBACK_COLUMNS} FROM feedback_messages
             WHERE dismissed = 1
             ORDER BY created_at ASC
             LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_feedback).collect()
    }
}
