use std::sync::Arc;

use tracing::{debug, info, warn};

use triage_core::domain::reaction::{ReactionCommand, ReactionControls, ReactionEvent};

use crate::compensation::CompensationEngine;
use crate::feedback::FeedbackLifecycle;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReactionOutcome {
    /// The reaction landed on a tracked feedback message.
    pub matched: bool,
    pub dismissed: bool,
    pub undone: bool,
}

/// Routes reaction changes on feedback messages to dismissal and undo.
pub struct ReactionController {
    controls: ReactionControls,
    feedback: Arc<FeedbackLifecycle>,
    compensation: Arc<CompensationEngine>,
}

impl ReactionController {
    pub fn new(
        controls: ReactionControls,
        feedback: Arc<FeedbackLifecycle>,
        compensation: Arc<CompensationEngine>,
    ) -> Self {
        Self { controls, feedback, compensation }
    }

    /// Failures are logged; the event is consumed either way.
    pub async fn handle(&self, event: &ReactionEvent) -> ReactionOutcome {
        let commands = self.controls.interpret(event);
        if commands.is_empty() {
            return ReactionOutcome::default();
        }

        let message = match self.feedback.find(&event.message_ref).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(
                    event_name = "reaction.ignored",
                    message_ref = %event.message_ref,
                    "reaction is not on a feedback message"
                );
                return ReactionOutcome::default();
            }
            Err(error) => {
                warn!(
                    event_name = "reaction.lookup_failed",
                    message_ref = %event.message_ref,
                    error = %error,
                    "could not resolve feedback message"
                );
                return ReactionOutcome::default();
            }
        };

        let mut outcome = ReactionOutcome { matched: true, ..ReactionOutcome::default() };
        for command in commands {
            match command {
                ReactionCommand::Dismiss => match self.feedback.dismiss(&message.message_ref).await {
                    Ok(dismissed) => outcome.dismissed = dismissed,
                    Err(error) => warn!(
                        event_name = "reaction.dismiss_failed",
                        operation_id = %message.operation_id,
                        message_ref = %message.message_ref,
                        error = %error,
                        "dismiss failed"
                    ),
                },
                ReactionCommand::Undo => match self.compensation.undo(&message.operation_id).await {
                    Ok(_) => outcome.undone = true,
                    Err(error) => warn!(
                        event_name = "reaction.undo_failed",
                        operation_id = %message.operation_id,
                        user_ref = %event.user_ref,
                        error = %error,
                        "undo failed"
                    ),
                },
            }
        }

        info!(
            event_name = "reaction.handled",
            operation_id = %message.operation_id,
            user_ref = %event.user_ref,
            dismissed = outcome.dismissed,
            undone = outcome.undone,
            "feedback reaction processed"
        );
        outcome
    }
}
