use chrono::Utc;
use sqlx::Row;

use triage_core::domain::action::{IssueSnapshot, ResultRef};
use triage_core::domain::chat::{ChatRef, MessageRef};
use triage_core::domain::operation::{
    ActionType, NewOperation, Operation, OperationId, OperationStatus,
};

use super::{decode_error, decode_timestamp, encode_timestamp, OperationRepository, RepositoryError};
use crate::DbPool;

const OPERATION_COLUMNS: &str = "id, group_id, source_message_id, action_type, status,
    result_ref, prior_state, created_at, updated_at";

pub struct SqlOperationRepository {
    pool: DbPool,
}

impl SqlOperationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_operation(row: &sqlx::sqlite::SqliteRow) -> Result<Operation, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let group_id: String = row.try_get("group_id").map_err(decode_error)?;
    let source_message_id: String = row.try_get("source_message_id").map_err(decode_error)?;
    let action_type: String = row.try_get("action_type").map_err(decode_error)?;
    let status: String = row.try_get("status").map_err(decode_error)?;
    let result_ref: Option<String> = row.try_get("result_ref").map_err(decode_error)?;
    let prior_state: Option<String> = row.try_get("prior_state").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    let action_type = ActionType::parse(&action_type)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown action_type `{action_type}`")))?;
    let status = OperationStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status}`")))?;
    let result_ref = result_ref
        .map(|raw| serde_json::from_str::<ResultRef>(&raw))
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("result_ref: {error}")))?;
    let prior_state = prior_state
        .map(|raw| serde_json::from_str::<IssueSnapshot>(&raw))
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("prior_state: {error}")))?;

    Ok(Operation {
        id: OperationId(id),
        group_id: ChatRef(group_id),
        source_message_id: MessageRef(source_message_id),
        action_type,
        status,
        result_ref,
        prior_state,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
    })
}

fn encode_json<T: serde::Serialize>(
    column: &str,
    value: Option<&T>,
) -> Result<Option<String>, RepositoryError> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}

#[async_trait::async_trait]
impl OperationRepository for SqlOperationRepository {
    async fn create(&self, operation: NewOperation) -> Result<Operation, RepositoryError> {
        let operation = operation.into_operation(OperationId::generate(), Utc::now());
        let result_ref = encode_json("result_ref", operation.result_ref.as_ref())?;
        let prior_state = encode_json("prior_state", operation.prior_state.as_ref())?;

        sqlx::query(
            "INSERT INTO operations
                (id, group_id, source_message_id, action_type, status,
                 result_ref, prior_state, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&operation.id.0)
        .bind(&operation.group_id.0)
        .bind(&operation.source_message_id.0)
        .bind(operation.action_type.as_str())
        .bind(operation.status.as_str())
        .bind(result_ref)
        .bind(prior_state)
        .bind(encode_timestamp(operation.created_at))
        .bind(encode_timestamp(operation.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|error| RepositoryError::from_insert(error, "operation"))?;

        Ok(operation)
    }

    async fn update_status(
        &self,
        id: &OperationId,
        status: OperationStatus,
    ) -> Result<Operation, RepositoryError> {
        let result = sqlx::query("UPDATE operations SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(encode_timestamp(Utc::now()))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::not_found("operation", id.0.clone()));
        }

        self.find_by_id(id).await?.ok_or_else(|| RepositoryError::not_found("operation", id.0.clone()))
    }

    async fn find_by_id(&self, id: &OperationId) -> Result<Option<Operation>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {OPERATION_COLUMNS} FROM operations WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_operation).transpose()
    }

    async fn find_by_message(
        &self,
        source_message_id: &MessageRef,
    ) -> Result<Option<Operation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {OPERATION_COLUMNS} FROM operations
             WHERE source_message_id = ?
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(&source_message_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_operation).transpose()
    }

    async fn list_by_group(
        &self,
        group_id: &ChatRef,
        limit: u32,
    ) -> Result<Vec<Operation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {OPERATION_COLUMNS} FROM operations
             WHERE group_id = ?
             ORDER BY created_at DESC
             LIMIT ?"
        ))
        .bind(&group_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_operation).collect()
    }

    async fn list_by_status(
        &self,
        status: OperationStatus,
        limit: u32,
    ) -> Result<Vec<Operation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {OPERATION_COLUMNS} FROM operations
             WHERE status = ?
             ORDER BY created_at DESC
             LIMIT ?"
        ))
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_operation).collect()
    }
}
