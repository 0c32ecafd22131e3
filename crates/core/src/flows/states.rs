use serde::{Deserialize, Serialize};

use crate::domain::action::{ActionDescriptor, GatewayResponse, IssueSnapshot};
use crate::domain::chat::MessageRef;
use crate::domain::feedback::FeedbackMessage;
use crate::domain::intent::Intent;
use crate::domain::operation::Operation;
use crate::domain::trigger::TriggerMessage;
use crate::errors::StepError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowState {
    Analyzing,
    Formatting,
    Executing,
    Storing,
    Notifying,
    Error,
    Unknown,
    Completed,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Formatting => "formatting",
            Self::Executing => "executing",
            Self::Storing => "storing",
            Self::Notifying => "notifying",
            Self::Error => "error",
            Self::Unknown => "unknown",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Unknown | Self::Completed)
    }
}

/// Accumulated record of one workflow run. Each step consumes it and returns the next value.
#[derive(Clone, Debug, PartialEq)]
pub struct RunState {
    pub trigger: TriggerMessage,
    pub state: WorkflowState,
    pub context: Vec<String>,
    pub intent: Option<Intent>,
    pub descriptor: Option<ActionDescriptor>,
    pub prior_state: Option<IssueSnapshot>,
    pub outcome: Option<GatewayResponse>,
    pub operation: Option<Operation>,
    pub feedback: Option<FeedbackMessage>,
    pub reply_ref: Option<MessageRef>,
    /// Fatal failure that routed the run to `Error`.
    pub error: Option<StepError>,
    /// Non-fatal failures, logged and otherwise ignored.
    pub warnings: Vec<StepError>,
}

impl RunState {
    pub fn new(trigger: TriggerMessage) -> Self {
        Self {
            trigger,
            state: WorkflowState::Analyzing,
            context: Vec::new(),
            intent: None,
            descriptor: None,
            prior_state: None,
            outcome: None,
            operation: None,
            feedback: None,
            reply_ref: None,
            error: None,
            warnings: Vec::new(),
        }
    }

    /// Records a step failure, fatal or not, in the matching slot.
    pub fn with_failure(mut self, error: StepError) -> Self {
        if error.is_fatal() {
            self.error = Some(error);
        } else {
            self.warnings.push(error);
        }
        self
    }

    pub fn entered(mut self, state: WorkflowState) -> Self {
        self.state = state;
        self
    }

    pub fn has_fatal_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: WorkflowState,
    pub to: WorkflowState,
}
