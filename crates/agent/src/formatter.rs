use thiserror::Error;

use triage_core::domain::action::{
    ActionDescriptor, ActionPayload, IssueChanges, IssueState, RepositoryRef,
};
use triage_core::domain::intent::{Intent, IntentType, UpdateAction};
use triage_core::domain::operation::ActionType;
use triage_core::domain::trigger::TriggerMessage;

const MAX_TITLE_CHARS: usize = 80;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FormattingError {
    #[error("intent `{0}` has no tracker action")]
    Unsupported(&'static str),
    #[error("could not derive an issue title from the message")]
    MissingTitle,
    #[error("update requests need an issue number")]
    MissingIssueNumber,
    #[error("`{0}` needs at least one label")]
    MissingLabels(&'static str),
    #[error("update request for #{0} carries no changes")]
    EmptyUpdate(u64),
    #[error("search request has no query")]
    MissingQuery,
}

/// Deterministic mapping from a classified intent to one tracker action.
#[derive(Clone, Debug)]
pub struct ActionFormatter {
    repository: RepositoryRef,
}

impl ActionFormatter {
    pub fn new(repository: RepositoryRef) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &RepositoryRef {
        &self.repository
    }

    pub fn format(
        &self,
        intent: &Intent,
        trigger: &TriggerMessage,
    ) -> Result<ActionDescriptor, FormattingError> {
        let (action_type, payload) = match intent.intent_type {
            IntentType::CreateBug | IntentType::CreateTask | IntentType::CreateIdea => {
                (ActionType::CreateIssue, create_payload(intent, trigger)?)
            }
            IntentType::UpdateIssue => update_payload(intent)?,
            IntentType::SearchIssues => {
                let query = intent
                    .entities
                    .search_query
                    .as_deref()
                    .map(str::trim)
                    .filter(|query| !query.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| strip_markers(&trigger.text));
                if query.is_empty() {
                    return Err(FormattingError::MissingQuery);
                }
                (ActionType::SearchIssues, ActionPayload::Search { query })
            }
            IntentType::Unknown => {
                return Err(FormattingError::Unsupported(intent.intent_type.as_str()));
            }
        };

        Ok(ActionDescriptor { target: self.repository.clone(), action_type, payload })
    }
}

fn create_payload(intent: &Intent, trigger: &TriggerMessage) -> Result<ActionPayload, FormattingError> {
    let cleaned = strip_markers(&trigger.text);
    let title = intent
        .entities
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_string)
        .or_else(|| cleaned.lines().next().map(str::to_string))
        .map(|title| truncate_title(&title))
        .filter(|title| !title.is_empty())
        .ok_or(FormattingError::MissingTitle)?;

    let description = intent
        .entities
        .description
        .as_deref()
        .map(str::trim)
        .filter(|description| !description.is_empty())
        .unwrap_or(cleaned.as_str());
    let body = format!("{description}\n\n_Reported from chat by {}_", trigger.user_ref);

    let mut labels = Vec::new();
    if let Some(label) = type_label(intent.intent_type) {
        labels.push(label.to_string());
    }
    for label in &intent.entities.labels {
        let label = label.trim();
        if !label.is_empty() && !labels.iter().any(|existing| existing.eq_ignore_ascii_case(label)) {
            labels.push(label.to_string());
        }
    }

    Ok(ActionPayload::Create { title, body, labels, assignees: intent.entities.assignees.clone() })
}

fn update_payload(intent: &Intent) -> Result<(ActionType, ActionPayload), FormattingError> {
    let entities = &intent.entities;
    let issue_number = entities.issue_number.ok_or(FormattingError::MissingIssueNumber)?;

    let (action_type, changes) = match entities.update_action.unwrap_or_default() {
        UpdateAction::Edit => {
            let changes = IssueChanges {
                title: entities.title.clone().filter(|title| !title.trim().is_empty()),
                body: entities.description.clone().filter(|body| !body.trim().is_empty()),
                assignees: (!entities.assignees.is_empty()).then(|| entities.assignees.clone()),
                ..IssueChanges::default()
            };
            if changes.is_empty() {
                return Err(FormattingError::EmptyUpdate(issue_number));
            }
            (ActionType::UpdateIssue, changes)
        }
        UpdateAction::Close => (
            ActionType::CloseIssue,
            IssueChanges { state: Some(IssueState::Closed), ..IssueChanges::default() },
        ),
        UpdateAction::Reopen => (
            ActionType::ReopenIssue,
            IssueChanges { state: Some(IssueState::Open), ..IssueChanges::default() },
        ),
        UpdateAction::AddLabels => {
            (ActionType::AddLabels, label_changes(&entities.labels, ActionType::AddLabels)?)
        }
        UpdateAction::RemoveLabels => {
            (ActionType::RemoveLabels, label_changes(&entities.labels, ActionType::RemoveLabels)?)
        }
    };

    Ok((action_type, ActionPayload::Update { issue_number, changes }))
}

fn label_changes(labels: &[String], action_type: ActionType) -> Result<IssueChanges, FormattingError> {
    let labels: Vec<String> = labels
        .iter()
        .map(|label| label.trim())
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        return Err(FormattingError::MissingLabels(action_type.as_str()));
    }
    Ok(IssueChanges { labels: Some(labels), ..IssueChanges::default() })
}

fn type_label(intent_type: IntentType) -> Option<&'static str> {
    match intent_type {
        IntentType::CreateBug => Some("bug"),
        IntentType::CreateTask => Some("task"),
        IntentType::CreateIdea => Some("idea"),
        _ => None,
    }
}

/// Drops trigger hashtags and user mentions, keeping issue references like `#12`.
fn strip_markers(text: &str) -> String {
    text.lines()
        .map(|line| {
            line.split_whitespace()
                .filter(|token| !is_hashtag(token) && !is_mention(token))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_hashtag(token: &str) -> bool {
    token.strip_prefix('#').and_then(|rest| rest.chars().next()).is_some_and(char::is_alphabetic)
}

fn is_mention(token: &str) -> bool {
    token.starts_with("<@") && token.ends_with('>')
}

fn truncate_title(title: &str) -> String {
    let title = title.trim();
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let mut truncated: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use triage_core::domain::action::{ActionKind, ActionPayload, IssueState, RepositoryRef};
    use triage_core::domain::intent::{Intent, IntentEntities, IntentType, UpdateAction};
    use triage_core::domain::operation::ActionType;

    use super::{ActionFormatter, FormattingError};
    use crate::testing::trigger;

    fn formatter() -> ActionFormatter {
        ActionFormatter::new(RepositoryRef::new("acme", "widgets"))
    }

    #[test]
    fn bug_report_without_title_uses_cleaned_message() {
        let intent = Intent::new(IntentType::CreateBug, 0.92);

        let action =
            formatter().format(&intent, &trigger("#bug the login page crashes")).expect("format");

        assert_eq!(action.kind(), ActionKind::Create);
        assert_eq!(action.action_type, ActionType::CreateIssue);
        let ActionPayload::Create { title, labels, body, .. } = action.payload else {
            panic!("expected create payload");
        };
        assert_eq!(title, "the login page crashes");
        assert_eq!(labels, vec!["bug".to_string()]);
        assert!(body.starts_with("the login page crashes"));
    }

    #[test]
    fn extra_labels_are_deduplicated() {
        let intent = Intent::new(IntentType::CreateTask, 0.7).with_entities(IntentEntities {
            title: Some("Rotate signing keys".to_string()),
            labels: vec!["Task".to_string(), "security".to_string(), " ".to_string()],
            ..IntentEntities::default()
        });

        let action = formatter().format(&intent, &trigger("#task rotate keys")).expect("format");

        let ActionPayload::Create { labels, .. } = action.payload else {
            panic!("expected create payload");
        };
        assert_eq!(labels, vec!["task".to_string(), "security".to_string()]);
    }

    #[test]
    fn long_titles_are_truncated() {
        let text = format!("#idea {}", "word ".repeat(40));
        let action = formatter()
            .format(&Intent::new(IntentType::CreateIdea, 0.8), &trigger(&text))
            .expect("format");

        let ActionPayload::Create { title, .. } = action.payload else {
            panic!("expected create payload");
        };
        assert_eq!(title.chars().count(), 80);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn hashtag_only_message_has_no_title() {
        let error = formatter()
            .format(&Intent::new(IntentType::CreateBug, 0.9), &trigger("#bug <@U0BOT>"))
            .expect_err("nothing to title");
        assert_eq!(error, FormattingError::MissingTitle);
    }

    #[test]
    fn update_sub_actions_select_action_type() {
        let close = Intent::new(IntentType::UpdateIssue, 0.9).with_entities(IntentEntities {
            issue_number: Some(12),
            update_action: Some(UpdateAction::Close),
            ..IntentEntities::default()
        });
        let action = formatter().format(&close, &trigger("close #12")).expect("format");
        assert_eq!(action.action_type, ActionType::CloseIssue);
        assert_eq!(action.issue_number(), Some(12));
        let ActionPayload::Update { changes, .. } = action.payload else {
            panic!("expected update payload");
        };
        assert_eq!(changes.state, Some(IssueState::Closed));

        let labels = Intent::new(IntentType::UpdateIssue, 0.9).with_entities(IntentEntities {
            issue_number: Some(12),
            update_action: Some(UpdateAction::RemoveLabels),
            ..IntentEntities::default()
        });
        let error = formatter().format(&labels, &trigger("unlabel #12")).expect_err("no labels");
        assert_eq!(error, FormattingError::MissingLabels("remove_labels"));
    }

    #[test]
    fn update_without_number_or_changes_is_rejected() {
        let no_number = Intent::new(IntentType::UpdateIssue, 0.9);
        assert_eq!(
            formatter().format(&no_number, &trigger("rename it")).expect_err("no number"),
            FormattingError::MissingIssueNumber
        );

        let no_changes = Intent::new(IntentType::UpdateIssue, 0.9).with_entities(IntentEntities {
            issue_number: Some(4),
            ..IntentEntities::default()
        });
        assert_eq!(
            formatter().format(&no_changes, &trigger("edit #4")).expect_err("empty"),
            FormattingError::EmptyUpdate(4)
        );
    }

    #[test]
    fn search_falls_back_to_message_text() {
        let action = formatter()
            .format(&Intent::new(IntentType::SearchIssues, 0.6), &trigger("<@U0BOT> export crash"))
            .expect("format");

        assert_eq!(action.payload, ActionPayload::Search { query: "export crash".to_string() });
    }
}
