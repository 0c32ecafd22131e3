use serde_json::json;
use triage_core::domain::chat::ChatRef;
use triage_core::domain::operation::{Operation, OperationStatus};
use triage_db::{OperationRepository, SqlOperationRepository};

use crate::commands::{block_on, load_config, open_pool, CommandResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationFilter {
    Group(String),
    Status(String),
}

enum Query {
    Group(ChatRef),
    Status(OperationStatus),
}

pub fn run(filter: OperationFilter, limit: u32) -> CommandResult {
    let query = match filter {
        OperationFilter::Group(group) => Query::Group(ChatRef(group)),
        OperationFilter::Status(raw) => match OperationStatus::parse(raw.trim()) {
            Some(status) => Query::Status(status),
            None => {
                return CommandResult::failure(
                    "operations",
                    "invalid_argument",
                    format!(
                        "unknown status `{raw}` (expected pending|processing|completed|failed|undone)"
                    ),
                    2,
                );
            }
        },
    };

    let config = match load_config("operations") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let result = block_on("operations", async {
        let pool = open_pool(&config).await?;
        let repository = SqlOperationRepository::new(pool.clone());
        let listed = match &query {
            Query::Group(group) => repository.list_by_group(group, limit).await,
            Query::Status(status) => repository.list_by_status(*status, limit).await,
        };
        pool.close().await;
        listed.map_err(|error| ("repository", error.to_string(), 6u8))
    });

    match result {
        Ok(operations) => CommandResult::success_with(
            "operations",
            format!("{} operation(s)", operations.len()),
            Some(json!(operations.iter().map(render).collect::<Vec<_>>())),
        ),
        Err(failure) => failure,
    }
}

fn render(operation: &Operation) -> serde_json::Value {
    json!({
        "id": operation.id.to_string(),
        "group_id": operation.group_id.to_string(),
        "source_message_id": operation.source_message_id.to_string(),
        "action_type": operation.action_type.as_str(),
        "status": operation.status.as_str(),
        "result_ref": operation.result_ref.as_ref().map(ToString::to_string),
        "created_at": operation.created_at.to_rfc3339(),
    })
}
