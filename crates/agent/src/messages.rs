//! Reply texts posted back into the chat.

use triage_core::domain::action::{
    ActionDescriptor, ActionPayload, GatewayResponse, IssueState, RepositoryRef, ResultRef,
};
use triage_core::domain::intent::IntentType;
use triage_core::domain::operation::{ActionType, Operation};
use triage_core::domain::reaction::ReactionControls;

pub fn action_summary(
    intent_type: IntentType,
    action: &ActionDescriptor,
    outcome: &GatewayResponse,
) -> String {
    let reference = describe_target(action, outcome.result_ref.as_ref());
    match (&action.payload, action.action_type) {
        (ActionPayload::Create { title, .. }, _) => {
            let noun = match intent_type {
                IntentType::CreateBug => "bug",
                IntentType::CreateIdea => "idea",
                _ => "task",
            };
            format!("Filed {noun} {reference}: {title}")
        }
        (ActionPayload::Search { query }, _) => search_summary(query, outcome),
        (ActionPayload::Update { changes, .. }, ActionType::AddLabels) => {
            format!("Added {} to {reference}", label_list(changes.labels.as_deref()))
        }
        (ActionPayload::Update { changes, .. }, ActionType::RemoveLabels) => {
            format!("Removed {} from {reference}", label_list(changes.labels.as_deref()))
        }
        (_, ActionType::CloseIssue) => format!("Closed {reference}"),
        (_, ActionType::ReopenIssue) => format!("Reopened {reference}"),
        _ => format!("Updated {reference}"),
    }
}

pub fn feedback_text(summary: &str, undoable: bool, controls: &ReactionControls) -> String {
    if undoable {
        format!(
            "{summary}\nReact with :{}: to undo or :{}: to dismiss this message.",
            controls.undo, controls.dismiss
        )
    } else {
        format!("{summary}\nReact with :{}: to dismiss this message.", controls.dismiss)
    }
}

pub fn undo_confirmation(operation: &Operation) -> String {
    let reference = operation
        .result_ref
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "the issue".to_string());
    match operation.action_type {
        ActionType::CreateIssue => format!("Undone: closed {reference} and marked it as undone."),
        ActionType::CloseIssue => format!("Undone: reopened {reference}."),
        ActionType::ReopenIssue => format!("Undone: closed {reference} again."),
        ActionType::AddLabels | ActionType::RemoveLabels => {
            format!("Undone: restored the previous labels on {reference}.")
        }
        ActionType::UpdateIssue | ActionType::SearchIssues => {
            format!("Undone: restored {reference} to its previous state.")
        }
    }
}

pub fn undo_failed(operation: &Operation) -> String {
    format!(
        "I couldn't undo the {} action. Nothing was changed; react again to retry.",
        operation.action_type.as_str().replace('_', " ")
    )
}

fn describe_target(action: &ActionDescriptor, result_ref: Option<&ResultRef>) -> String {
    match (result_ref, action.issue_number()) {
        (Some(result_ref), _) => result_ref.to_string(),
        (None, Some(number)) => issue_ref(&action.target, number),
        (None, None) => action.target.slug(),
    }
}

fn issue_ref(repository: &RepositoryRef, number: u64) -> String {
    format!("{}#{number}", repository.slug())
}

fn label_list(labels: Option<&[String]>) -> String {
    let labels = labels.unwrap_or_default();
    let rendered = labels.iter().map(|label| format!("`{label}`")).collect::<Vec<_>>().join(", ");
    if labels.len() == 1 {
        format!("label {rendered}")
    } else {
        format!("labels {rendered}")
    }
}

fn search_summary(query: &str, outcome: &GatewayResponse) -> String {
    if outcome.matches.is_empty() {
        return format!("No issues match `{query}`.");
    }
    let mut text = format!("Issues matching `{query}`:");
    for issue in &outcome.matches {
        let state = match issue.state {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
        };
        text.push_str(&format!("\n- #{} {} ({state}) {}", issue.number, issue.title, issue.url));
    }
    text
}

#[cfg(test)]
mod tests {
    use triage_core::domain::action::{
        ActionDescriptor, ActionPayload, GatewayResponse, IssueChanges, IssueState, IssueSummary,
        RepositoryRef, ResultRef,
    };
    use triage_core::domain::intent::IntentType;
    use triage_core::domain::operation::ActionType;
    use triage_core::domain::reaction::ReactionControls;

    use super::{action_summary, feedback_text};

    fn repo() -> RepositoryRef {
        RepositoryRef::new("acme", "widgets")
    }

    #[test]
    fn create_summary_names_the_result() {
        let action = ActionDescriptor {
            target: repo(),
            action_type: ActionType::CreateIssue,
            payload: ActionPayload::Create {
                title: "the login page crashes".to_string(),
                body: String::new(),
                labels: vec![],
                assignees: vec![],
            },
        };
        let outcome = GatewayResponse {
            result_ref: Some(ResultRef {
                repository: repo(),
                number: Some(42),
                url: Some("https://github.com/acme/widgets/issues/42".to_string()),
            }),
            matches: vec![],
        };

        assert_eq!(
            action_summary(IntentType::CreateBug, &action, &outcome),
            "Filed bug https://github.com/acme/widgets/issues/42: the login page crashes"
        );
    }

    #[test]
    fn label_summary_falls_back_to_issue_number() {
        let action = ActionDescriptor {
            target: repo(),
            action_type: ActionType::AddLabels,
            payload: ActionPayload::Update {
                issue_number: 9,
                changes: IssueChanges {
                    labels: Some(vec!["p1".to_string()]),
                    ..IssueChanges::default()
                },
            },
        };

        assert_eq!(
            action_summary(IntentType::UpdateIssue, &action, &GatewayResponse::default()),
            "Added label `p1` to acme/widgets#9"
        );
    }

    #[test]
    fn search_summary_lists_matches() {
        let action = ActionDescriptor {
            target: repo(),
            action_type: ActionType::SearchIssues,
            payload: ActionPayload::Search { query: "export".to_string() },
        };
        let outcome = GatewayResponse {
            result_ref: None,
            matches: vec![IssueSummary {
                number: 3,
                title: "Export greyed out".to_string(),
                state: IssueState::Closed,
                url: "https://github.com/acme/widgets/issues/3".to_string(),
            }],
        };

        let text = action_summary(IntentType::SearchIssues, &action, &outcome);

        assert!(text.starts_with("Issues matching `export`:"));
        assert!(text.contains("#3 Export greyed out (closed)"));
    }

    #[test]
    fn undo_hint_only_for_undoable_actions() {
        let controls = ReactionControls::default();
        assert!(feedback_text("Filed bug", true, &controls).contains(":-1: to undo"));
        assert!(!feedback_text("Found 2", false, &controls).contains("undo"));
    }
}
