use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use triage_core::chat::{ChatError, ChatTransport};
use triage_core::domain::chat::{ChatRef, MessageRef};

/// Slack error codes that mean the requested end state already holds.
const ALREADY_REACTED: &str = "already_reacted";
const NO_REACTION: &str = "no_reaction";
const MESSAGE_NOT_FOUND: &str = "message_not_found";

#[derive(Debug, Default, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Slack Web API client used as the bot's outbound chat transport.
///
/// The bot keeps one status reaction per message: setting a new one removes the
/// previous one first. Only in-progress reactions are tracked; a terminal one ends
/// tracking for that message.
pub struct SlackWebClient {
    http: Client,
    api_base: String,
    bot_token: SecretString,
    progress_reactions: HashSet<String>,
    status_reactions: Mutex<HashMap<(String, String), String>>,
}

impl SlackWebClient {
    pub fn new(api_base: &str, bot_token: SecretString, timeout: Duration) -> Result<Self, ChatError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ChatError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_owned(),
            bot_token,
            progress_reactions: HashSet::new(),
            status_reactions: Mutex::new(HashMap::new()),
        })
    }

    /// Reactions that mark a message as still being worked on, e.g. `eyes`.
    pub fn with_progress_reactions<I, S>(mut self, emojis: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.progress_reactions =
            emojis.into_iter().map(|emoji| emoji_name(emoji.as_ref()).to_owned()).collect();
        self
    }

    /// Requests a fresh Socket Mode websocket URL with the app-level token.
    pub async fn open_socket_url(&self, app_token: &SecretString) -> Result<String, ChatError> {
        let method = "apps.connections.open";
        let response = self.call(method, app_token, &json!({})).await?;
        response.url.ok_or_else(|| ChatError::Api {
            method: method.to_owned(),
            error: "response carried no url".to_owned(),
        })
    }

    async fn call(
        &self,
        method: &str,
        token: &SecretString,
        body: &Value,
    ) -> Result<SlackResponse, ChatError> {
        let auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret().trim()))
            .map_err(|_| ChatError::Transport("slack token is not a valid header".to_owned()))?;
        let response = self
            .http
            .post(format!("{}/{method}", self.api_base))
            .header(AUTHORIZATION, auth)
            .json(body)
            .send()
            .await
            .map_err(|error| ChatError::Transport(format!("{method}: {error}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| ChatError::Transport(format!("{method}: {error}")))?;
        interpret(method, status, &text)
    }

    async fn call_bot(&self, method: &str, body: &Value) -> Result<SlackResponse, ChatError> {
        self.call(method, &self.bot_token, body).await
    }

    fn previous_reaction(&self, key: &(String, String)) -> Option<String> {
        match self.status_reactions.lock() {
            Ok(reactions) => reactions.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    fn remember_reaction(&self, key: (String, String), emoji: String) {
        let mut reactions = match self.status_reactions.lock() {
            Ok(reactions) => reactions,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.progress_reactions.contains(&emoji) {
            reactions.insert(key, emoji);
        } else {
            reactions.remove(&key);
        }
    }

    #[cfg(test)]
    fn tracked_reactions(&self) -> usize {
        match self.status_reactions.lock() {
            Ok(reactions) => reactions.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

fn interpret(method: &str, status: StatusCode, body: &str) -> Result<SlackResponse, ChatError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ChatError::RateLimited { method: method.to_owned() });
    }
    let parsed: SlackResponse = serde_json::from_str(body).map_err(|error| ChatError::Api {
        method: method.to_owned(),
        error: format!("http {status}: undecodable body ({error})"),
    })?;
    if parsed.ok {
        return Ok(parsed);
    }

    let error = parsed.error.clone().unwrap_or_else(|| "unknown_error".to_owned());
    if error == "ratelimited" {
        return Err(ChatError::RateLimited { method: method.to_owned() });
    }
    if matches!(error.as_str(), ALREADY_REACTED | NO_REACTION | MESSAGE_NOT_FOUND) {
        return Ok(parsed);
    }
    Err(ChatError::Api { method: method.to_owned(), error })
}

fn emoji_name(emoji: &str) -> &str {
    emoji.trim().trim_matches(':')
}

#[async_trait]
impl ChatTransport for SlackWebClient {
    async fn set_reaction(
        &self,
        chat_ref: &ChatRef,
        message_ref: &MessageRef,
        emoji: &str,
    ) -> Result<(), ChatError> {
        let key = (chat_ref.0.clone(), message_ref.0.clone());
        let name = emoji_name(emoji);

        if let Some(previous) = self.previous_reaction(&key) {
            if previous == name {
                return Ok(());
            }
            let removal = self
                .call_bot(
                    "reactions.remove",
                    &json!({ "channel": chat_ref.0, "timestamp": message_ref.0, "name": previous }),
                )
                .await;
            if let Err(error) = removal {
                warn!(
                    event_name = "slack.reaction_remove_failed",
                    chat_ref = %chat_ref,
                    message_ref = %message_ref,
                    error = %error,
                    "previous status reaction left in place"
                );
            }
        }

        self.call_bot(
            "reactions.add",
            &json!({ "channel": chat_ref.0, "timestamp": message_ref.0, "name": name }),
        )
        .await?;
        self.remember_reaction(key, name.to_owned());
        Ok(())
    }

    async fn reply(
        &self,
        chat_ref: &ChatRef,
        reply_to: &MessageRef,
        text: &str,
    ) -> Result<MessageRef, ChatError> {
        let method = "chat.postMessage";
        let response = self
            .call_bot(
                method,
                &json!({ "channel": chat_ref.0, "thread_ts": reply_to.0, "text": text }),
            )
            .await?;
        response
            .ts
            .map(MessageRef)
            .ok_or_else(|| ChatError::Api { method: method.to_owned(), error: "missing ts".to_owned() })
    }

    async fn delete_message(
        &self,
        chat_ref: &ChatRef,
        message_ref: &MessageRef,
    ) -> Result<bool, ChatError> {
        let response = self
            .call_bot("chat.delete", &json!({ "channel": chat_ref.0, "ts": message_ref.0 }))
            .await?;
        let existed = response.error.as_deref() != Some(MESSAGE_NOT_FOUND);
        if !existed {
            debug!(chat_ref = %chat_ref, message_ref = %message_ref, "message already deleted");
        }
        Ok(existed)
    }
}
