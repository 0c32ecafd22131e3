pub mod audit;
pub mod chat;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod errors;
pub mod flows;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use chat::{ChatError, ChatTransport};
pub use crypto::{CipherError, TokenCipher};
pub use domain::action::{
    ActionDescriptor, ActionKind, ActionPayload, GatewayResponse, IssueChanges, IssueSnapshot,
    IssueState, IssueSummary, RepositoryRef, ResultRef,
};
pub use domain::chat::{ChatRef, MessageRef, UserRef};
pub use domain::feedback::{FeedbackId, FeedbackMessage, NewFeedbackMessage};
pub use domain::intent::{Intent, IntentEntities, IntentType, UpdateAction};
pub use domain::operation::{ActionType, NewOperation, Operation, OperationId, OperationStatus};
pub use domain::reaction::{ReactionCommand, ReactionControls, ReactionEvent};
pub use domain::trigger::{Priority, TriggerMessage};
pub use errors::{ErrorCode, StepError};
pub use flows::{RunState, WorkflowRouter, WorkflowState};
