use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a workflow step failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    Classification,
    Formatting,
    ActionExecution,
    Storage,
    Notification,
    Undo,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Classification => "CLASSIFICATION_ERROR",
            Self::Formatting => "FORMATTING_ERROR",
            Self::ActionExecution => "ACTION_EXECUTION_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::Notification => "NOTIFICATION_ERROR",
            Self::Undo => "UNDO_ERROR",
        }
    }

    /// Fatal codes route the run to the error terminal; the rest are logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Validation | Self::Classification | Self::Formatting | Self::ActionExecution
        )
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Validation => "There was nothing to act on in that message.",
            Self::Classification => {
                "I couldn't work out what to do with that message. Please try again shortly."
            }
            Self::Formatting => {
                "I understood the request but couldn't turn it into a tracker action. Try adding an issue number or a title."
            }
            Self::ActionExecution => {
                "The issue tracker rejected the request. Nothing was changed."
            }
            Self::Storage | Self::Notification | Self::Undo => {
                "An unexpected internal error occurred."
            }
        }
    }
}

/// Structured failure attached to the run state by the step that caught it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct StepError {
    pub message: String,
    pub code: ErrorCode,
    pub details: Option<serde_json::Value>,
}

impl StepError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { message: message.into(), code, details: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.code.is_fatal()
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ErrorCode, StepError};

    #[test]
    fn fatal_split_matches_pipeline_policy() {
        for code in [
            ErrorCode::Validation,
            ErrorCode::Classification,
            ErrorCode::Formatting,
            ErrorCode::ActionExecution,
        ] {
            assert!(code.is_fatal(), "{code:?} should be fatal");
        }
        for code in [ErrorCode::Storage, ErrorCode::Notification, ErrorCode::Undo] {
            assert!(!code.is_fatal(), "{code:?} should not be fatal");
        }
    }

    #[test]
    fn step_error_serializes_code_in_screaming_case() {
        let error = StepError::new(ErrorCode::ActionExecution, "gateway returned 502")
            .with_details(serde_json::json!({ "status": 502 }));
        let json = serde_json::to_value(&error).expect("serialize");

        assert_eq!(json["code"], "ACTION_EXECUTION");
        assert_eq!(json["details"]["status"], 502);
        assert_eq!(ErrorCode::ActionExecution.as_str(), "ACTION_EXECUTION_ERROR");
    }

    #[test]
    fn user_messages_are_generic() {
        assert_eq!(ErrorCode::Storage.user_message(), "An unexpected internal error occurred.");
        assert!(ErrorCode::ActionExecution.user_message().contains("Nothing was changed"));
    }
}
