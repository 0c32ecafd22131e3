use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use triage_core::domain::intent::Intent;

use crate::llm::LlmClient;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(String),
    #[error("classifier returned an unparseable response: {0}")]
    Parse(String),
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// `context` holds earlier messages of the same chat, oldest first.
    async fn classify(&self, text: &str, context: &[String]) -> Result<Intent, ClassifierError>;
}

const INSTRUCTIONS: &str = r#"You triage chat messages for an issue tracker.
Classify the MESSAGE into exactly one intent type:
create_bug, create_task, create_idea, update_issue, search_issues, unknown.

Reply with a single JSON object and nothing else:
{
  "type": "<intent type>",
  "confidence": <number between 0 and 1>,
  "entities": {
    "title": "<short issue title or null>",
    "description": "<longer description or null>",
    "labels": ["<label>"],
    "assignees": ["<login>"],
    "issueNumber": <number or null>,
    "searchQuery": "<query or null>",
    "updateAction": "<edit|close|reopen|add_labels|remove_labels or null>"
  },
  "reasoning": "<one sentence>"
}
Use "unknown" with low confidence when the message is chatter and not a request."#;

pub struct LlmIntentClassifier {
    client: Arc<dyn LlmClient>,
}

impl LlmIntentClassifier {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, text: &str, context: &[String]) -> Result<Intent, ClassifierError> {
        let prompt = build_prompt(text, context);
        let raw = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| ClassifierError::Request(format!("{error:#}")))?;
        parse_intent(&raw)
    }
}

pub fn build_prompt(text: &str, context: &[String]) -> String {
    let mut prompt = String::from(INSTRUCTIONS);
    if !context.is_empty() {
        prompt.push_str("\n\nRECENT CONVERSATION (oldest first):\n");
        for line in context {
            prompt.push_str("- ");
            prompt.push_str(line.trim());
            prompt.push('\n');
        }
    }
    prompt.push_str("\n\nMESSAGE:\n");
    prompt.push_str(text.trim());
    prompt
}

/// Extracts the first JSON object from a model reply, tolerating code fences and prose.
pub fn parse_intent(raw: &str) -> Result<Intent, ClassifierError> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => return Err(ClassifierError::Parse("no JSON object in response".to_string())),
    };

    let mut intent: Intent =
        serde_json::from_str(json).map_err(|error| ClassifierError::Parse(error.to_string()))?;
    intent.confidence =
        if intent.confidence.is_finite() { intent.confidence.clamp(0.0, 1.0) } else { 0.0 };
    Ok(intent)
}
