use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::operation::ActionType;

/// `owner/name` of the issue-tracker repository an action targets.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid repository reference `{0}` (expected owner/name)")]
pub struct RepositoryRefError(pub String);

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self { owner: owner.into(), name: name.into() }
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryRef {
    type Err = RepositoryRefError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let Some((owner, name)) = trimmed.split_once('/') else {
            return Err(RepositoryRefError(raw.to_string()));
        };
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(RepositoryRefError(raw.to_string()));
        }
        Ok(Self::new(owner, name))
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// Field values of an issue captured before a mutating action ran.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSnapshot {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: IssueState,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
}

/// A partial issue mutation. `None` leaves the field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Text appended to the current body on the tracker side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<IssueState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
}

impl IssueChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Changes that put every field of `snapshot` back verbatim.
    pub fn restoring(snapshot: &IssueSnapshot) -> Self {
        Self {
            title: Some(snapshot.title.clone()),
            body: Some(snapshot.body.clone().unwrap_or_default()),
            append_note: None,
            state: Some(snapshot.state),
            labels: Some(snapshot.labels.clone()),
            assignees: Some(snapshot.assignees.clone()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Search,
    None,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionPayload {
    Create { title: String, body: String, labels: Vec<String>, assignees: Vec<String> },
    Update { issue_number: u64, changes: IssueChanges },
    Search { query: String },
    None,
}

/// What the action gateway is asked to do for one workflow run or one undo.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub target: RepositoryRef,
    pub action_type: ActionType,
    pub payload: ActionPayload,
}

impl ActionDescriptor {
    pub fn kind(&self) -> ActionKind {
        match &self.payload {
            ActionPayload::Create { .. } => ActionKind::Create,
            ActionPayload::Update { .. } => ActionKind::Update,
            ActionPayload::Search { .. } => ActionKind::Search,
            ActionPayload::None => ActionKind::None,
        }
    }

    pub fn issue_number(&self) -> Option<u64> {
        match &self.payload {
            ActionPayload::Update { issue_number, .. } => Some(*issue_number),
            _ => None,
        }
    }
}

/// Where the tracker put the result of an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRef {
    pub repository: RepositoryRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl fmt::Display for ResultRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.url, self.number) {
            (Some(url), _) => f.write_str(url),
            (None, Some(number)) => write!(f, "{}#{number}", self.repository),
            (None, None) => write!(f, "{}", self.repository),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSummary {
    pub number: u64,
    pub title: String,
    pub state: IssueState,
    pub url: String,
}

/// Successful gateway invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GatewayResponse {
    pub result_ref: Option<ResultRef>,
    pub matches: Vec<IssueSummary>,
}

#[cfg(test)]
mod tests {
    use super::{IssueChanges, IssueSnapshot, IssueState, RepositoryRef, ResultRef};

    #[test]
    fn repository_ref_parses_owner_and_name() {
        let repo: RepositoryRef = " acme/widgets ".parse().expect("valid slug");
        assert_eq!(repo, RepositoryRef::new("acme", "widgets"));
        assert_eq!(repo.slug(), "acme/widgets");

        assert!("acme".parse::<RepositoryRef>().is_err());
        assert!("acme/widgets/extra".parse::<RepositoryRef>().is_err());
        assert!("/widgets".parse::<RepositoryRef>().is_err());
    }

    #[test]
    fn restoring_changes_cover_every_snapshot_field() {
        let snapshot = IssueSnapshot {
            number: 7,
            title: "Login page crashes".to_string(),
            body: None,
            state: IssueState::Open,
            labels: vec!["bug".to_string()],
            assignees: vec!["octo".to_string()],
        };

        let changes = IssueChanges::restoring(&snapshot);

        assert_eq!(changes.title.as_deref(), Some("Login page crashes"));
        assert_eq!(changes.body.as_deref(), Some(""));
        assert_eq!(changes.state, Some(IssueState::Open));
        assert_eq!(changes.labels, Some(vec!["bug".to_string()]));
        assert!(changes.append_note.is_none());
        assert!(IssueChanges::default().is_empty());
    }

    #[test]
    fn result_ref_prefers_url_for_display() {
        let repository = RepositoryRef::new("acme", "widgets");
        let with_url = ResultRef {
            repository: repository.clone(),
            number: Some(12),
            url: Some("https://github.com/acme/widgets/issues/12".to_string()),
        };
        let without_url = ResultRef { repository, number: Some(12), url: None };

        assert_eq!(with_url.to_string(), "https://github.com/acme/widgets/issues/12");
        assert_eq!(without_url.to_string(), "acme/widgets#12");
    }
}
