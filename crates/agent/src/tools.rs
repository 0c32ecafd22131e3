use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use triage_core::domain::action::{ActionDescriptor, GatewayResponse, IssueSnapshot, RepositoryRef};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("tracker request failed: {0}")]
    Transport(String),
    #[error("tracker responded {status}: {message}")]
    Status { status: u16, message: String },
    #[error("issue {repository}#{number} was not found")]
    NotFound { repository: String, number: u64 },
    #[error("tracker call exceeded the {seconds}s deadline")]
    Timeout { seconds: u64 },
    #[error("action cannot be sent to the tracker: {0}")]
    InvalidAction(String),
    #[error("tracker response could not be decoded: {0}")]
    Decode(String),
}

/// Issue-tracker tool layer. Each call is treated as at-most-once; nothing here retries.
#[async_trait]
pub trait ActionGateway: Send + Sync {
    async fn invoke(&self, action: &ActionDescriptor) -> Result<GatewayResponse, GatewayError>;

    async fn fetch_issue(
        &self,
        repository: &RepositoryRef,
        number: u64,
    ) -> Result<IssueSnapshot, GatewayError>;
}

pub async fn invoke_with_deadline(
    gateway: &dyn ActionGateway,
    action: &ActionDescriptor,
    deadline: Duration,
) -> Result<GatewayResponse, GatewayError> {
    tokio::time::timeout(deadline, gateway.invoke(action))
        .await
        .map_err(|_| GatewayError::Timeout { seconds: deadline.as_secs() })?
}

pub async fn fetch_with_deadline(
    gateway: &dyn ActionGateway,
    repository: &RepositoryRef,
    number: u64,
    deadline: Duration,
) -> Result<IssueSnapshot, GatewayError> {
    tokio::time::timeout(deadline, gateway.fetch_issue(repository, number))
        .await
        .map_err(|_| GatewayError::Timeout { seconds: deadline.as_secs() })?
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use triage_core::domain::action::{ActionDescriptor, ActionPayload, RepositoryRef};
    use triage_core::domain::operation::ActionType;

    use super::{invoke_with_deadline, GatewayError};
    use crate::testing::ScriptedGateway;

    #[tokio::test(start_paused = true)]
    async fn slow_gateway_call_hits_deadline() {
        let gateway = ScriptedGateway::default().with_delay(Duration::from_secs(120));
        let action = ActionDescriptor {
            target: RepositoryRef::new("acme", "widgets"),
            action_type: ActionType::SearchIssues,
            payload: ActionPayload::Search { query: "login".to_string() },
        };

        let error = invoke_with_deadline(&gateway, &action, Duration::from_secs(30))
            .await
            .expect_err("deadline");

        assert_eq!(error, GatewayError::Timeout { seconds: 30 });
    }
}
