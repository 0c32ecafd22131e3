use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::flows::states::{RunState, TransitionOutcome, WorkflowState};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.3;

/// Pure routing between workflow steps. Owns no I/O.
#[derive(Clone, Debug)]
pub struct WorkflowRouter {
    confidence_threshold: f64,
}

impl Default for WorkflowRouter {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowTransitionError {
    #[error("workflow state {state:?} is terminal")]
    Terminal { state: WorkflowState },
}

impl WorkflowRouter {
    pub fn new(confidence_threshold: f64) -> Self {
        Self { confidence_threshold }
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn initial_state(&self) -> WorkflowState {
        WorkflowState::Analyzing
    }

    /// Decides where a run goes after the step for `run.state` has finished.
    pub fn route(&self, run: &RunState) -> Result<TransitionOutcome, WorkflowTransitionError> {
        use WorkflowState::{
            Analyzing, Completed, Error, Executing, Formatting, Notifying, Storing, Unknown,
        };

        let current = run.state;
        let to = match current {
            Analyzing => {
                if run.has_fatal_error() {
                    Error
                } else if run
                    .intent
                    .as_ref()
                    .is_some_and(|intent| intent.is_actionable(self.confidence_threshold))
                {
                    Formatting
                } else {
                    Unknown
                }
            }
            Formatting if run.has_fatal_error() => Error,
            Formatting => Executing,
            Executing if run.has_fatal_error() => Error,
            Executing => Storing,
            // Storage and notification failures never redirect.
            Storing => Notifying,
            Notifying | Error => Completed,
            Unknown | Completed => {
                return Err(WorkflowTransitionError::Terminal { state: current });
            }
        };

        Ok(TransitionOutcome { from: current, to })
    }

    pub fn route_with_audit<S>(
        &self,
        run: &RunState,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, WorkflowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.route(run);
        match &result {
            Ok(outcome) => sink.emit(
                audit
                    .event(
                        "workflow.transition_applied",
                        AuditCategory::Workflow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str()),
            ),
            Err(error) => sink.emit(
                audit
                    .event(
                        "workflow.transition_rejected",
                        AuditCategory::Workflow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
            ),
        }
        result
    }
}
