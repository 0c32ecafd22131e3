use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    CreateBug,
    CreateTask,
    CreateIdea,
    UpdateIssue,
    SearchIssues,
    #[serde(other)]
    Unknown,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateBug => "create_bug",
            Self::CreateTask => "create_task",
            Self::CreateIdea => "create_idea",
            Self::UpdateIssue => "update_issue",
            Self::SearchIssues => "search_issues",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, Self::CreateBug | Self::CreateTask | Self::CreateIdea)
    }
}

/// Which update-family action an `update_issue` intent asks for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    #[default]
    Edit,
    Close,
    Reopen,
    AddLabels,
    RemoveLabels,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IntentEntities {
    pub title: Option<String>,
    pub description: Option<String>,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub issue_number: Option<u64>,
    pub search_query: Option<String>,
    pub update_action: Option<UpdateAction>,
}

/// Classifier output for one triggering message. Never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub intent_type: IntentType,
    pub confidence: f64,
    #[serde(default)]
    pub entities: IntentEntities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Intent {
    pub fn new(intent_type: IntentType, confidence: f64) -> Self {
        Self {
            intent_type,
            confidence: confidence.clamp(0.0, 1.0),
            entities: IntentEntities::default(),
            reasoning: None,
        }
    }

    pub fn with_entities(mut self, entities: IntentEntities) -> Self {
        self.entities = entities;
        self
    }

    pub fn is_actionable(&self, confidence_threshold: f64) -> bool {
        self.intent_type != IntentType::Unknown && self.confidence >= confidence_threshold
    }
}
