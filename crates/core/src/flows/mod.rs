pub mod engine;
pub mod states;

pub use engine::{WorkflowRouter, WorkflowTransitionError, DEFAULT_CONFIDENCE_THRESHOLD};
pub use states::{RunState, TransitionOutcome, WorkflowState};
