use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use triage_core::domain::action::{
    ActionDescriptor, ActionPayload, GatewayResponse, IssueChanges, IssueSnapshot, IssueState,
    IssueSummary, RepositoryRef, ResultRef,
};
use triage_core::domain::operation::ActionType;

use crate::tools::{ActionGateway, GatewayError};

const SEARCH_PAGE_SIZE: &str = "5";

/// GitHub REST issues API as an action gateway.
pub struct GithubGateway {
    http: Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct GithubLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GithubIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: String,
    html_url: String,
    #[serde(default)]
    labels: Vec<GithubLabel>,
    #[serde(default)]
    assignees: Vec<GithubUser>,
}

#[derive(Debug, Deserialize)]
struct GithubSearch {
    #[serde(default)]
    items: Vec<GithubIssue>,
}

impl GithubIssue {
    fn issue_state(&self) -> IssueState {
        if self.state.eq_ignore_ascii_case("closed") {
            IssueState::Closed
        } else {
            IssueState::Open
        }
    }

    fn result_ref(&self, repository: &RepositoryRef) -> ResultRef {
        ResultRef {
            repository: repository.clone(),
            number: Some(self.number),
            url: Some(self.html_url.clone()),
        }
    }

    fn summary(&self) -> IssueSummary {
        IssueSummary {
            number: self.number,
            title: self.title.clone(),
            state: self.issue_state(),
            url: self.html_url.clone(),
        }
    }

    fn into_snapshot(self) -> IssueSnapshot {
        let state = self.issue_state();
        IssueSnapshot {
            number: self.number,
            title: self.title,
            body: self.body,
            state,
            labels: self.labels.into_iter().map(|label| label.name).collect(),
            assignees: self.assignees.into_iter().map(|user| user.login).collect(),
        }
    }
}

impl GithubGateway {
    pub fn new(api_base: &str, token: &SecretString, timeout: Duration) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("triage-bot"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
        let auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret().trim()))
            .map_err(|_| GatewayError::InvalidAction("tracker token is not a valid header".into()))?;
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        Ok(Self { http, api_base: api_base.trim_end_matches('/').to_string() })
    }

    fn issues_url(&self, repository: &RepositoryRef) -> String {
        format!("{}/repos/{}/{}/issues", self.api_base, repository.owner, repository.name)
    }

    fn issue_url(&self, repository: &RepositoryRef, number: u64) -> String {
        format!("{}/{number}", self.issues_url(repository))
    }

    /// The label travels as a single encoded path segment, so `area/ui` stays one label.
    fn label_url(
        &self,
        repository: &RepositoryRef,
        number: u64,
        label: &str,
    ) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&format!("{}/labels", self.issue_url(repository, number)))
            .map_err(|error| GatewayError::InvalidAction(format!("tracker url: {error}")))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidAction("tracker api base cannot hold a path".into()))?
            .push(label);
        Ok(url)
    }

    async fn send(
        &self,
        operation: &str,
        request: RequestBuilder,
        issue: Option<(&RepositoryRef, u64)>,
    ) -> Result<reqwest::Response, GatewayError> {
        debug!(event_name = "tracker.request", operation, "calling issue tracker");
        let response = request
            .send()
            .await
            .map_err(|error| GatewayError::Transport(format!("{operation}: {error}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if let (StatusCode::NOT_FOUND, Some((repository, number))) = (status, issue) {
            return Err(GatewayError::NotFound { repository: repository.slug(), number });
        }
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Status { status: status.as_u16(), message: truncate(&body, 400) })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
        issue: Option<(&RepositoryRef, u64)>,
    ) -> Result<T, GatewayError> {
        self.send(operation, request, issue)
            .await?
            .json::<T>()
            .await
            .map_err(|error| GatewayError::Decode(format!("{operation}: {error}")))
    }

    async fn create(
        &self,
        repository: &RepositoryRef,
        title: &str,
        body: &str,
        labels: &[String],
        assignees: &[String],
    ) -> Result<GatewayResponse, GatewayError> {
        let payload = json!({
            "title": title,
            "body": body,
            "labels": labels,
            "assignees": assignees,
        });
        let issue: GithubIssue = self
            .send_json("create issue", self.http.post(self.issues_url(repository)).json(&payload), None)
            .await?;

        Ok(GatewayResponse { result_ref: Some(issue.result_ref(repository)), matches: Vec::new() })
    }

    async fn patch(
        &self,
        repository: &RepositoryRef,
        number: u64,
        changes: &IssueChanges,
    ) -> Result<GatewayResponse, GatewayError> {
        let body = match (&changes.append_note, &changes.body) {
            (Some(note), Some(body)) => Some(append_note(Some(body), note)),
            (Some(note), None) => {
                let current = self.fetch_issue(repository, number).await?;
                Some(append_note(current.body.as_deref(), note))
            }
            (None, body) => body.clone(),
        };

        let payload = patch_document(changes, body);
        if payload.is_empty() {
            return Err(GatewayError::InvalidAction(format!("no changes for issue #{number}")));
        }

        let issue: GithubIssue = self
            .send_json(
                "update issue",
                self.http.patch(self.issue_url(repository, number)).json(&Value::Object(payload)),
                Some((repository, number)),
            )
            .await?;

        Ok(GatewayResponse { result_ref: Some(issue.result_ref(repository)), matches: Vec::new() })
    }

    async fn add_labels(
        &self,
        repository: &RepositoryRef,
        number: u64,
        labels: &[String],
    ) -> Result<GatewayResponse, GatewayError> {
        self.send(
            "add labels",
            self.http
                .post(format!("{}/labels", self.issue_url(repository, number)))
                .json(&json!({ "labels": labels })),
            Some((repository, number)),
        )
        .await?;

        Ok(labelled_result(repository, number))
    }

    async fn remove_labels(
        &self,
        repository: &RepositoryRef,
        number: u64,
        labels: &[String],
    ) -> Result<GatewayResponse, GatewayError> {
        for label in labels {
            let url = self.label_url(repository, number, label)?;
            match self.send("remove label", self.http.delete(url), Some((repository, number))).await {
                Ok(_) => {}
                Err(GatewayError::NotFound { .. }) => {
                    let current = self.fetch_issue(repository, number).await?;
                    if current.labels.iter().any(|existing| existing == label) {
                        return Err(GatewayError::Status {
                            status: StatusCode::NOT_FOUND.as_u16(),
                            message: format!("label `{label}` is still on #{number} after removal"),
                        });
                    }
                    debug!(event_name = "tracker.label_absent", label = %label, number, "label already absent");
                }
                Err(error) => return Err(error),
            }
        }

        Ok(labelled_result(repository, number))
    }

    async fn search(
        &self,
        repository: &RepositoryRef,
        query: &str,
    ) -> Result<GatewayResponse, GatewayError> {
        let request = self
            .http
            .get(format!("{}/search/issues", self.api_base))
            .query(&[("q", search_query(repository, query).as_str()), ("per_page", SEARCH_PAGE_SIZE)]);
        let results: GithubSearch = self.send_json("search issues", request, None).await?;

        Ok(GatewayResponse {
            result_ref: None,
            matches: results.items.iter().map(GithubIssue::summary).collect(),
        })
    }
}

#[async_trait]
impl ActionGateway for GithubGateway {
    async fn invoke(&self, action: &ActionDescriptor) -> Result<GatewayResponse, GatewayError> {
        let repository = &action.target;
        match (action.action_type, &action.payload) {
            (ActionType::CreateIssue, ActionPayload::Create { title, body, labels, assignees }) => {
                self.create(repository, title, body, labels, assignees).await
            }
            (ActionType::SearchIssues, ActionPayload::Search { query }) => {
                self.search(repository, query).await
            }
            (ActionType::AddLabels, ActionPayload::Update { issue_number, changes }) => {
                let labels = changes.labels.as_deref().unwrap_or_default();
                self.add_labels(repository, *issue_number, labels).await
            }
            (ActionType::RemoveLabels, ActionPayload::Update { issue_number, changes }) => {
                let labels = changes.labels.as_deref().unwrap_or_default();
                self.remove_labels(repository, *issue_number, labels).await
            }
            (
                ActionType::UpdateIssue | ActionType::CloseIssue | ActionType::ReopenIssue,
                ActionPayload::Update { issue_number, changes },
            ) => self.patch(repository, *issue_number, changes).await,
            (action_type, _) => Err(GatewayError::InvalidAction(format!(
                "payload does not match action type `{}`",
                action_type.as_str()
            ))),
        }
    }

    async fn fetch_issue(
        &self,
        repository: &RepositoryRef,
        number: u64,
    ) -> Result<IssueSnapshot, GatewayError> {
        let issue: GithubIssue = self
            .send_json(
                "fetch issue",
                self.http.get(self.issue_url(repository, number)),
                Some((repository, number)),
            )
            .await?;
        Ok(issue.into_snapshot())
    }
}

fn labelled_result(repository: &RepositoryRef, number: u64) -> GatewayResponse {
    GatewayResponse {
        result_ref: Some(ResultRef { repository: repository.clone(), number: Some(number), url: None }),
        matches: Vec::new(),
    }
}

fn append_note(body: Option<&str>, note: &str) -> String {
    match body.map(str::trim_end).filter(|body| !body.is_empty()) {
        Some(body) => format!("{body}\n\n---\n{note}"),
        None => note.to_string(),
    }
}

fn patch_document(changes: &IssueChanges, body: Option<String>) -> Map<String, Value> {
    let mut document = Map::new();
    if let Some(title) = &changes.title {
        document.insert("title".to_string(), json!(title));
    }
    if let Some(body) = body {
        document.insert("body".to_string(), json!(body));
    }
    if let Some(state) = changes.state {
        document.insert("state".to_string(), json!(state.as_str()));
    }
    if let Some(labels) = &changes.labels {
        document.insert("labels".to_string(), json!(labels));
    }
    if let Some(assignees) = &changes.assignees {
        document.insert("assignees".to_string(), json!(assignees));
    }
    document
}

fn search_query(repository: &RepositoryRef, query: &str) -> String {
    format!("repo:{} is:issue {}", repository.slug(), query.trim())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}
