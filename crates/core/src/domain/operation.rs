use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::action::{IssueSnapshot, ResultRef};
use crate::domain::chat::{ChatRef, MessageRef};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub String);

impl OperationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateIssue,
    UpdateIssue,
    CloseIssue,
    ReopenIssue,
    AddLabels,
    RemoveLabels,
    SearchIssues,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateIssue => "create_issue",
            Self::UpdateIssue => "update_issue",
            Self::CloseIssue => "close_issue",
            Self::ReopenIssue => "reopen_issue",
            Self::AddLabels => "add_labels",
            Self::RemoveLabels => "remove_labels",
            Self::SearchIssues => "search_issues",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create_issue" => Some(Self::CreateIssue),
            "update_issue" => Some(Self::UpdateIssue),
            "close_issue" => Some(Self::CloseIssue),
            "reopen_issue" => Some(Self::ReopenIssue),
            "add_labels" => Some(Self::AddLabels),
            "remove_labels" => Some(Self::RemoveLabels),
            "search_issues" => Some(Self::SearchIssues),
            _ => None,
        }
    }

    pub fn is_undoable(&self) -> bool {
        !matches!(self, Self::SearchIssues)
    }

    /// Types whose undo re-applies the captured prior state.
    pub fn requires_prior_state(&self) -> bool {
        matches!(self, Self::UpdateIssue | Self::AddLabels | Self::RemoveLabels)
    }

    pub fn mutates_existing_issue(&self) -> bool {
        matches!(
            self,
            Self::UpdateIssue
                | Self::CloseIssue
                | Self::ReopenIssue
                | Self::AddLabels
                | Self::RemoveLabels
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Undone,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Undone => "undone",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "undone" => Some(Self::Undone),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Undone)
    }

    /// Forward-only lifecycle; `completed -> undone` is the single edge out of `completed`.
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        use OperationStatus::{Completed, Failed, Pending, Processing, Undone};

        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Undone)
        )
    }
}

/// Durable record of one attempted tracker action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    pub group_id: ChatRef,
    pub source_message_id: MessageRef,
    pub action_type: ActionType,
    pub status: OperationStatus,
    pub result_ref: Option<ResultRef>,
    pub prior_state: Option<IssueSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOperation {
    pub group_id: ChatRef,
    pub source_message_id: MessageRef,
    pub action_type: ActionType,
    pub status: OperationStatus,
    pub result_ref: Option<ResultRef>,
    pub prior_state: Option<IssueSnapshot>,
}

impl NewOperation {
    pub fn into_operation(self, id: OperationId, now: DateTime<Utc>) -> Operation {
        Operation {
            id,
            group_id: self.group_id,
            source_message_id: self.source_message_id,
            action_type: self.action_type,
            status: self.status,
            result_ref: self.result_ref,
            prior_state: self.prior_state,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionType, OperationStatus};

    #[test]
    fn status_round_trips_from_storage_encoding() {
        let cases = [
            OperationStatus::Pending,
            OperationStatus::Processing,
            OperationStatus::Completed,
            OperationStatus::Failed,
            OperationStatus::Undone,
        ];

        for status in cases {
            assert_eq!(OperationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OperationStatus::parse("archived"), None);
    }

    #[test]
    fn undone_is_reachable_only_from_completed() {
        let all = [
            OperationStatus::Pending,
            OperationStatus::Processing,
            OperationStatus::Completed,
            OperationStatus::Failed,
            OperationStatus::Undone,
        ];

        for from in all {
            let allowed = from.can_transition_to(OperationStatus::Undone);
            assert_eq!(allowed, from == OperationStatus::Completed, "from {from:?}");
        }
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        let all = [
            OperationStatus::Pending,
            OperationStatus::Processing,
            OperationStatus::Completed,
            OperationStatus::Failed,
            OperationStatus::Undone,
        ];

        for terminal in [OperationStatus::Failed, OperationStatus::Undone] {
            assert!(terminal.is_terminal());
            for next in all {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!OperationStatus::Completed.can_transition_to(OperationStatus::Processing));
    }

    #[test]
    fn search_is_the_only_non_undoable_action() {
        assert!(!ActionType::SearchIssues.is_undoable());
        for action in [
            ActionType::CreateIssue,
            ActionType::UpdateIssue,
            ActionType::CloseIssue,
            ActionType::ReopenIssue,
            ActionType::AddLabels,
            ActionType::RemoveLabels,
        ] {
            assert!(action.is_undoable());
            assert_eq!(ActionType::parse(action.as_str()), Some(action));
        }
    }
}
