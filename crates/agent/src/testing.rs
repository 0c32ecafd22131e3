//! Scripted collaborators shared by the unit tests of this crate.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use triage_core::chat::{ChatError, ChatTransport};
use triage_core::domain::action::{
    ActionDescriptor, ActionPayload, GatewayResponse, IssueSnapshot, IssueState, RepositoryRef,
    ResultRef,
};
use triage_core::domain::chat::{ChatRef, MessageRef, UserRef};
use triage_core::domain::intent::Intent;
use triage_core::domain::trigger::TriggerMessage;

use crate::classifier::{ClassifierError, IntentClassifier};
use crate::llm::LlmClient;
use crate::tools::{ActionGateway, GatewayError};

pub const CHAT: &str = "C1";
pub const SOURCE_MESSAGE: &str = "1730000000.000100";

pub fn trigger(text: &str) -> TriggerMessage {
    TriggerMessage {
        chat_ref: ChatRef(CHAT.to_string()),
        message_ref: MessageRef(SOURCE_MESSAGE.to_string()),
        user_ref: UserRef("U1".to_string()),
        text: text.to_string(),
        hashtags: text
            .split_whitespace()
            .filter_map(|token| token.strip_prefix('#'))
            .filter(|tag| tag.chars().next().is_some_and(char::is_alphabetic))
            .map(str::to_ascii_lowercase)
            .collect(),
        mentioned: text.contains("<@U0BOT>"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub struct ScriptedLlm {
    reply: Result<String, String>,
}

impl ScriptedLlm {
    pub fn replying(reply: &str) -> Self {
        Self { reply: Ok(reply.to_string()) }
    }

    pub fn failing(error: &str) -> Self {
        Self { reply: Err(error.to_string()) }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        self.reply.clone().map_err(|error| anyhow!(error))
    }
}

pub struct ScriptedClassifier {
    result: Result<Intent, String>,
    contexts: Mutex<Vec<Vec<String>>>,
}

impl ScriptedClassifier {
    pub fn returning(intent: Intent) -> Self {
        Self { result: Ok(intent), contexts: Mutex::new(Vec::new()) }
    }

    pub fn failing(error: &str) -> Self {
        Self { result: Err(error.to_string()), contexts: Mutex::new(Vec::new()) }
    }

    pub fn contexts(&self) -> Vec<Vec<String>> {
        lock(&self.contexts).clone()
    }
}

#[async_trait]
impl IntentClassifier for ScriptedClassifier {
    async fn classify(&self, _text: &str, context: &[String]) -> Result<Intent, ClassifierError> {
        lock(&self.contexts).push(context.to_vec());
        self.result.clone().map_err(ClassifierError::Request)
    }
}

#[derive(Default)]
pub struct ScriptedGateway {
    invoke_error: Option<GatewayError>,
    snapshot: Option<IssueSnapshot>,
    delay: Option<Duration>,
    invocations: Mutex<Vec<ActionDescriptor>>,
}

impl ScriptedGateway {
    pub fn failing(error: GatewayError) -> Self {
        Self { invoke_error: Some(error), ..Self::default() }
    }

    pub fn with_snapshot(mut self, snapshot: IssueSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn invocations(&self) -> Vec<ActionDescriptor> {
        lock(&self.invocations).clone()
    }
}

pub fn issue_ref(number: u64) -> ResultRef {
    ResultRef {
        repository: RepositoryRef::new("acme", "widgets"),
        number: Some(number),
        url: Some(format!("https://github.com/acme/widgets/issues/{number}")),
    }
}

#[async_trait]
impl ActionGateway for ScriptedGateway {
    async fn invoke(&self, action: &ActionDescriptor) -> Result<GatewayResponse, GatewayError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.invocations).push(action.clone());
        if let Some(error) = &self.invoke_error {
            return Err(error.clone());
        }

        let number = match &action.payload {
            ActionPayload::Create { .. } => Some(42),
            ActionPayload::Update { issue_number, .. } => Some(*issue_number),
            ActionPayload::Search { .. } | ActionPayload::None => None,
        };
        Ok(GatewayResponse { result_ref: number.map(issue_ref), matches: Vec::new() })
    }

    async fn fetch_issue(
        &self,
        repository: &RepositoryRef,
        number: u64,
    ) -> Result<IssueSnapshot, GatewayError> {
        self.snapshot
            .clone()
            .filter(|snapshot| snapshot.number == number)
            .ok_or(GatewayError::NotFound { repository: repository.slug(), number })
    }
}

pub fn open_issue(number: u64, labels: &[&str]) -> IssueSnapshot {
    IssueSnapshot {
        number,
        title: "Export button greyed out".to_string(),
        body: Some("Happens on Safari only.".to_string()),
        state: IssueState::Open,
        labels: labels.iter().map(|label| label.to_string()).collect(),
        assignees: Vec::new(),
    }
}

/// Chat transport that records every call.
#[derive(Default)]
pub struct RecordingChat {
    reactions: Mutex<Vec<(String, String)>>,
    replies: Mutex<Vec<(String, String)>>,
    deletions: Mutex<Vec<String>>,
    gone: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    fail_replies: bool,
}

impl RecordingChat {
    pub fn failing_replies() -> Self {
        Self { fail_replies: true, ..Self::default() }
    }

    /// The message was deleted out-of-band; deleting it reports "not found".
    pub fn forget(&self, message_ref: &MessageRef) {
        lock(&self.gone).insert(message_ref.0.clone());
    }

    pub fn fail_delete(&self, message_ref: &MessageRef) {
        lock(&self.failing_deletes).insert(message_ref.0.clone());
    }

    pub fn recover_delete(&self, message_ref: &MessageRef) {
        lock(&self.failing_deletes).remove(&message_ref.0);
    }

    /// Reaction emojis in the order they were set, per message.
    pub fn reactions_on(&self, message_ref: &str) -> Vec<String> {
        lock(&self.reactions)
            .iter()
            .filter(|(message, _)| message == message_ref)
            .map(|(_, emoji)| emoji.clone())
            .collect()
    }

    pub fn reply_texts(&self) -> Vec<String> {
        lock(&self.replies).iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn deletions(&self) -> Vec<String> {
        lock(&self.deletions).clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingChat {
    async fn set_reaction(
        &self,
        _chat_ref: &ChatRef,
        message_ref: &MessageRef,
        emoji: &str,
    ) -> Result<(), ChatError> {
        lock(&self.reactions).push((message_ref.0.clone(), emoji.to_string()));
        Ok(())
    }

    async fn reply(
        &self,
        _chat_ref: &ChatRef,
        reply_to: &MessageRef,
        text: &str,
    ) -> Result<MessageRef, ChatError> {
        if self.fail_replies {
            return Err(ChatError::Transport("connection reset".to_string()));
        }
        let mut replies = lock(&self.replies);
        replies.push((reply_to.0.clone(), text.to_string()));
        Ok(MessageRef(format!("reply-{}", replies.len())))
    }

    async fn delete_message(
        &self,
        _chat_ref: &ChatRef,
        message_ref: &MessageRef,
    ) -> Result<bool, ChatError> {
        lock(&self.deletions).push(message_ref.0.clone());
        if lock(&self.failing_deletes).contains(&message_ref.0) {
            return Err(ChatError::Transport("timed out".to_string()));
        }
        // A second delete of the same message finds nothing.
        Ok(lock(&self.gone).insert(message_ref.0.clone()))
    }
}
