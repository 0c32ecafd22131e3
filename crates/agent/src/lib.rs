//! Agent runtime: turns triggered chat messages into tracker actions and
//! keeps the resulting feedback messages under control.
//!
//! The run is a constrained loop:
//! 1. **Classification** (`classifier`) - natural language to a structured `Intent`
//! 2. **Guardrails** (`guardrails`) - low-confidence and unknown intents stop here
//! 3. **Formatting** (`formatter`) - `Intent` to a deterministic `ActionDescriptor`
//! 4. **Execution** (`tools`, `github`) - the action gateway performs the call
//! 5. **Feedback** (`feedback`) - an expiring reply reports the outcome
//!
//! Reactions on feedback messages are routed by `reactions` to dismissal or to
//! the compensation engine in `compensation`.
//!
//! The LLM is strictly a translator. It never decides which repository is
//! touched or how an undo is carried out.

pub mod audit;
pub mod classifier;
pub mod compensation;
pub mod feedback;
pub mod formatter;
pub mod github;
pub mod guardrails;
pub mod llm;
pub mod messages;
pub mod reactions;
pub mod runtime;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{ClassifierError, IntentClassifier, LlmIntentClassifier};
pub use compensation::{CompensationEngine, UndoError};
pub use feedback::{FeedbackError, FeedbackLifecycle, SweepReport};
pub use formatter::{ActionFormatter, FormattingError};
pub use github::GithubGateway;
pub use llm::{HttpLlmClient, LlmClient};
pub use reactions::{ReactionController, ReactionOutcome};
pub use runtime::{WorkflowCollaborators, WorkflowRuntime, WorkflowSettings};
pub use tools::{ActionGateway, GatewayError};
