use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use triage_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use triage_core::chat::ChatTransport;
use triage_core::domain::action::{ActionDescriptor, ActionPayload, IssueChanges, IssueState};
use triage_core::domain::operation::{ActionType, Operation, OperationId, OperationStatus};
use triage_db::{OperationRepository, RepositoryError};

use crate::feedback::FeedbackLifecycle;
use crate::messages;
use crate::tools::{invoke_with_deadline, ActionGateway, GatewayError};

pub const UNDO_NOTE: &str =
    "_Undone by triage bot: the chat request that created this issue was reverted._";

#[derive(Debug, Error)]
pub enum UndoError {
    #[error("operation `{0}` does not exist")]
    NotFound(OperationId),
    #[error("operation `{id}` cannot be undone: {reason}")]
    NotUndoable { id: OperationId, reason: String },
    #[error("operation `{0}` has no captured prior state")]
    MissingPriorState(OperationId),
    #[error("operation `{0}` has no issue reference")]
    MissingResultRef(OperationId),
    #[error("compensating action failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("operation store failed: {0}")]
    Storage(#[from] RepositoryError),
}

/// Reverses completed operations. Never retries; a failed undo stays eligible.
pub struct CompensationEngine {
    operations: Arc<dyn OperationRepository>,
    gateway: Arc<dyn ActionGateway>,
    feedback: Arc<FeedbackLifecycle>,
    chat: Arc<dyn ChatTransport>,
    audit: Arc<dyn AuditSink>,
    action_timeout: Duration,
}

impl CompensationEngine {
    pub fn new(
        operations: Arc<dyn OperationRepository>,
        gateway: Arc<dyn ActionGateway>,
        feedback: Arc<FeedbackLifecycle>,
        chat: Arc<dyn ChatTransport>,
        audit: Arc<dyn AuditSink>,
        action_timeout: Duration,
    ) -> Self {
        Self { operations, gateway, feedback, chat, audit, action_timeout }
    }

    pub async fn can_undo(&self, id: &OperationId) -> Result<bool, UndoError> {
        let operation = self.operations.find_by_id(id).await?;
        Ok(operation.is_some_and(|operation| undo_blocker(&operation).is_none()))
    }

    pub async fn undo(&self, id: &OperationId) -> Result<Operation, UndoError> {
        let operation = self.operations.find_by_id(id).await?.ok_or_else(|| UndoError::NotFound(id.clone()))?;
        let audit = AuditContext::new(
            Some(operation.id.clone()),
            Some(operation.group_id.0.clone()),
            format!("{}:{}", operation.group_id, operation.source_message_id),
            "compensation",
        );

        if let Some(reason) = undo_blocker(&operation) {
            self.audit.emit(
                audit
                    .event("undo.rejected", AuditCategory::Compensation, AuditOutcome::Rejected)
                    .with_metadata("reason", reason.clone()),
            );
            return Err(UndoError::NotUndoable { id: operation.id, reason });
        }

        let reversal = reversal(&operation)?;
        if let Err(gateway_error) =
            invoke_with_deadline(self.gateway.as_ref(), &reversal, self.action_timeout).await
        {
            warn!(
                event_name = "undo.failed",
                operation_id = %operation.id,
                action_type = operation.action_type.as_str(),
                error = %gateway_error,
                "compensating action failed; operation stays completed"
            );
            self.audit.emit(
                audit
                    .event("undo.failed", AuditCategory::Compensation, AuditOutcome::Failed)
                    .with_metadata("error", gateway_error.to_string()),
            );
            self.confirm(&operation, &messages::undo_failed(&operation)).await;
            return Err(gateway_error.into());
        }

        let undone = match self.operations.update_status(&operation.id, OperationStatus::Undone).await {
            Ok(undone) => undone,
            Err(store_error) => {
                error!(
                    event_name = "undo.status_not_recorded",
                    operation_id = %operation.id,
                    error = %store_error,
                    "issue was reverted but the operation is still marked completed"
                );
                return Err(store_error.into());
            }
        };

        if let Err(feedback_error) = self.feedback.dismiss_for_operation(&undone.id).await {
            warn!(
                event_name = "undo.feedback_not_dismissed",
                operation_id = %undone.id,
                error = %feedback_error,
                "feedback message will expire on schedule instead"
            );
        }
        self.confirm(&undone, &messages::undo_confirmation(&undone)).await;

        info!(
            event_name = "undo.completed",
            operation_id = %undone.id,
            action_type = undone.action_type.as_str(),
            "operation undone"
        );
        self.audit.emit(
            audit
                .event("undo.completed", AuditCategory::Compensation, AuditOutcome::Success)
                .with_metadata("action_type", undone.action_type.as_str()),
        );
        Ok(undone)
    }

    async fn confirm(&self, operation: &Operation, text: &str) {
        if let Err(chat_error) =
            self.chat.reply(&operation.group_id, &operation.source_message_id, text).await
        {
            warn!(
                event_name = "undo.reply_failed",
                operation_id = %operation.id,
                error = %chat_error,
                "could not post undo reply"
            );
        }
    }
}

fn undo_blocker(operation: &Operation) -> Option<String> {
    if !operation.action_type.is_undoable() {
        return Some(format!("`{}` actions cannot be undone", operation.action_type.as_str()));
    }
    if !operation.status.can_transition_to(OperationStatus::Undone) {
        return Some(format!("status is `{}`", operation.status.as_str()));
    }
    None
}

/// The compensating action for a completed operation.
pub fn reversal(operation: &Operation) -> Result<ActionDescriptor, UndoError> {
    let result_ref =
        operation.result_ref.as_ref().ok_or_else(|| UndoError::MissingResultRef(operation.id.clone()))?;
    let prior_state = || {
        operation.prior_state.as_ref().ok_or_else(|| UndoError::MissingPriorState(operation.id.clone()))
    };
    let issue_number = result_ref
        .number
        .or_else(|| operation.prior_state.as_ref().map(|snapshot| snapshot.number))
        .ok_or_else(|| UndoError::MissingResultRef(operation.id.clone()))?;

    let (action_type, changes) = match operation.action_type {
        ActionType::CreateIssue => (
            ActionType::CloseIssue,
            IssueChanges {
                state: Some(IssueState::Closed),
                append_note: Some(UNDO_NOTE.to_string()),
                ..IssueChanges::default()
            },
        ),
        ActionType::UpdateIssue => (ActionType::UpdateIssue, IssueChanges::restoring(prior_state()?)),
        ActionType::CloseIssue => (
            ActionType::ReopenIssue,
            IssueChanges { state: Some(IssueState::Open), ..IssueChanges::default() },
        ),
        ActionType::ReopenIssue => (
            ActionType::CloseIssue,
            IssueChanges { state: Some(IssueState::Closed), ..IssueChanges::default() },
        ),
        ActionType::AddLabels | ActionType::RemoveLabels => (
            ActionType::UpdateIssue,
            IssueChanges { labels: Some(prior_state()?.labels.clone()), ..IssueChanges::default() },
        ),
        ActionType::SearchIssues => {
            return Err(UndoError::NotUndoable {
                id: operation.id.clone(),
                reason: "`search_issues` actions cannot be undone".to_string(),
            });
        }
    };

    Ok(ActionDescriptor {
        target: result_ref.repository.clone(),
        action_type,
        payload: ActionPayload::Update { issue_number, changes },
    })
}
