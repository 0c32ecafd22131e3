use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, error, info, info_span, warn, Instrument};

use triage_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use triage_core::chat::{ChatError, ChatTransport};
use triage_core::config::{ReactionConfig, SchedulerConfig, WorkflowConfig};
use triage_core::domain::action::ResultRef;
use triage_core::domain::cache::{ContextEntry, ConversationContext};
use triage_core::domain::intent::IntentType;
use triage_core::domain::operation::{NewOperation, OperationStatus};
use triage_core::domain::trigger::TriggerMessage;
use triage_core::errors::{ErrorCode, StepError};
use triage_core::flows::{RunState, WorkflowRouter, WorkflowState};
use triage_db::{CacheRepository, OperationRepository, RepositoryError};

use crate::classifier::IntentClassifier;
use crate::feedback::{FeedbackError, FeedbackLifecycle};
use crate::formatter::ActionFormatter;
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::messages;
use crate::tools::{fetch_with_deadline, invoke_with_deadline, ActionGateway, GatewayError};

#[derive(Clone, Debug)]
pub struct WorkflowSettings {
    pub confidence_threshold: f64,
    /// Deadline for every tracker call made by a run.
    pub action_timeout: Duration,
    pub feedback_deletion_delay: chrono::Duration,
    pub context_ttl: chrono::Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: triage_core::flows::DEFAULT_CONFIDENCE_THRESHOLD,
            action_timeout: Duration::from_secs(30),
            feedback_deletion_delay: chrono::Duration::milliseconds(600_000),
            context_ttl: chrono::Duration::hours(1),
        }
    }
}

impl WorkflowSettings {
    pub fn from_config(workflow: &WorkflowConfig, scheduler: &SchedulerConfig) -> Self {
        Self {
            confidence_threshold: workflow.confidence_threshold,
            action_timeout: Duration::from_secs(workflow.action_timeout_secs.max(1)),
            feedback_deletion_delay: chrono::Duration::milliseconds(
                i64::try_from(workflow.feedback_deletion_delay_ms).unwrap_or(i64::MAX),
            ),
            context_ttl: chrono::Duration::seconds(
                i64::try_from(scheduler.context_ttl_secs).unwrap_or(i64::MAX),
            ),
        }
    }
}

/// Handles shared by every run.
pub struct WorkflowCollaborators {
    pub classifier: Arc<dyn IntentClassifier>,
    pub gateway: Arc<dyn ActionGateway>,
    pub operations: Arc<dyn OperationRepository>,
    pub cache: Arc<dyn CacheRepository>,
    pub chat: Arc<dyn ChatTransport>,
    pub feedback: Arc<FeedbackLifecycle>,
    pub audit: Arc<dyn AuditSink>,
}

/// Drives one trigger through analyze, format, execute, store and notify.
///
/// Steps never fail outward: each converts its own failure into a `StepError`
/// on the run state, and the router decides where the run goes next. Runs
/// share nothing but the stores, so any number may execute concurrently.
pub struct WorkflowRuntime {
    router: WorkflowRouter,
    guardrails: GuardrailPolicy,
    formatter: ActionFormatter,
    reactions: ReactionConfig,
    settings: WorkflowSettings,
    deps: WorkflowCollaborators,
}

impl WorkflowRuntime {
    pub fn new(
        deps: WorkflowCollaborators,
        formatter: ActionFormatter,
        reactions: ReactionConfig,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            router: WorkflowRouter::new(settings.confidence_threshold),
            guardrails: GuardrailPolicy::new(settings.confidence_threshold),
            formatter,
            reactions,
            settings,
            deps,
        }
    }

    pub async fn run(&self, trigger: TriggerMessage) -> RunState {
        let correlation_id = trigger.correlation_id();
        let span = info_span!(
            "workflow.run",
            correlation_id = %correlation_id,
            priority = ?trigger.priority()
        );
        self.drive(trigger).instrument(span).await
    }

    async fn drive(&self, trigger: TriggerMessage) -> RunState {
        let audit = AuditContext::new(
            None,
            Some(trigger.chat_ref.0.clone()),
            trigger.correlation_id(),
            trigger.user_ref.0.clone(),
        );
        let mut run = RunState::new(trigger).entered(self.router.initial_state());

        loop {
            run = self.step(run).await;
            if run.state.is_terminal() {
                break;
            }
            match self.router.route_with_audit(&run, self.deps.audit.as_ref(), &audit) {
                Ok(transition) => {
                    debug!(from = transition.from.as_str(), to = transition.to.as_str(), "workflow transition");
                    run = run.entered(transition.to);
                }
                Err(transition_error) => {
                    error!(error = %transition_error, "workflow router refused to continue");
                    break;
                }
            }
        }

        self.finish(&run, &audit);
        run
    }

    async fn step(&self, run: RunState) -> RunState {
        match run.state {
            WorkflowState::Analyzing => self.analyze(run).await,
            WorkflowState::Formatting => self.format(run),
            WorkflowState::Executing => self.execute(run).await,
            WorkflowState::Storing => self.store(run).await,
            WorkflowState::Notifying => self.notify(run).await,
            WorkflowState::Error => self.fail(run).await,
            WorkflowState::Unknown => self.decline(run).await,
            WorkflowState::Completed => run,
        }
    }

    async fn analyze(&self, run: RunState) -> RunState {
        let mut run = self.react(run, &self.reactions.analyzing).await;
        if run.trigger.text.trim().is_empty() {
            return run.with_failure(StepError::new(ErrorCode::Validation, "message has no text to classify"));
        }

        let now = Utc::now();
        let context = match self.deps.cache.load_context(&run.trigger.chat_ref, now).await {
            Ok(context) => context,
            Err(cache_error) => {
                run = run.with_failure(storage_error("could not load conversation context", &cache_error));
                None
            }
        };
        run.context = context.as_ref().map(ConversationContext::texts).unwrap_or_default();

        let classified = self.deps.classifier.classify(&run.trigger.text, &run.context).await;
        run = match classified {
            Ok(intent) => {
                debug!(
                    intent = intent.intent_type.as_str(),
                    confidence = intent.confidence,
                    "message classified"
                );
                run.intent = Some(intent);
                run
            }
            Err(classifier_error) => run.with_failure(StepError::new(
                ErrorCode::Classification,
                classifier_error.to_string(),
            )),
        };

        if let Err(cache_error) = self.remember(context, &run.trigger, now).await {
            run = run.with_failure(storage_error("could not update conversation context", &cache_error));
        }
        run
    }

    fn format(&self, mut run: RunState) -> RunState {
        let formatted = match run.intent.as_ref() {
            Some(intent) => self.formatter.format(intent, &run.trigger).map_err(|format_error| {
                StepError::new(ErrorCode::Formatting, format_error.to_string())
                    .with_details(json!({ "intent": intent.intent_type.as_str() }))
            }),
            None => Err(StepError::new(ErrorCode::Formatting, "no intent to format")),
        };

        match formatted {
            Ok(descriptor) => {
                run.descriptor = Some(descriptor);
                run
            }
            Err(step_error) => run.with_failure(step_error),
        }
    }

    async fn execute(&self, run: RunState) -> RunState {
        let mut run = self.react(run, &self.reactions.processing).await;
        let Some(descriptor) = run.descriptor.clone() else {
            return run.with_failure(StepError::new(ErrorCode::ActionExecution, "no action to execute"));
        };
        let gateway = self.deps.gateway.as_ref();
        let deadline = self.settings.action_timeout;

        if descriptor.action_type.mutates_existing_issue() {
            if let Some(number) = descriptor.issue_number() {
                match fetch_with_deadline(gateway, &descriptor.target, number, deadline).await {
                    Ok(snapshot) => run.prior_state = Some(snapshot),
                    Err(gateway_error) => {
                        return run.with_failure(action_error(
                            "could not read the issue before changing it",
                            descriptor.action_type.as_str(),
                            &gateway_error,
                        ));
                    }
                }
            }
        }

        match invoke_with_deadline(gateway, &descriptor, deadline).await {
            Ok(outcome) => {
                info!(
                    event_name = "workflow.action_executed",
                    action_type = descriptor.action_type.as_str(),
                    repository = %descriptor.target,
                    "tracker action executed"
                );
                run.outcome = Some(outcome);
                run
            }
            Err(gateway_error) => run.with_failure(action_error(
                "tracker action failed",
                descriptor.action_type.as_str(),
                &gateway_error,
            )),
        }
    }

    async fn store(&self, mut run: RunState) -> RunState {
        let (Some(descriptor), Some(outcome)) = (&run.descriptor, &run.outcome) else {
            return run;
        };

        let result_ref = outcome.result_ref.clone().or_else(|| {
            descriptor.issue_number().map(|number| ResultRef {
                repository: descriptor.target.clone(),
                number: Some(number),
                url: None,
            })
        });
        let operation = NewOperation {
            group_id: run.trigger.chat_ref.clone(),
            source_message_id: run.trigger.message_ref.clone(),
            action_type: descriptor.action_type,
            status: OperationStatus::Completed,
            result_ref,
            prior_state: run.prior_state.clone(),
        };

        match self.deps.operations.create(operation).await {
            Ok(operation) => {
                run.operation = Some(operation);
                run
            }
            Err(store_error) => {
                error!(
                    event_name = "workflow.operation_not_recorded",
                    error = %store_error,
                    "tracker action succeeded but no operation was recorded"
                );
                run.with_failure(storage_error("could not record the operation", &store_error))
            }
        }
    }

    async fn notify(&self, run: RunState) -> RunState {
        let intent_type = run.intent.as_ref().map(|intent| intent.intent_type).unwrap_or(IntentType::Unknown);
        let mut run = self.react(run, self.reactions.success_for(intent_type)).await;
        let (Some(descriptor), Some(outcome)) = (&run.descriptor, &run.outcome) else {
            return run;
        };
        let summary = messages::action_summary(intent_type, descriptor, outcome);

        let Some(operation) = run.operation.clone() else {
            return self.reply(run, &summary).await;
        };

        let text =
            messages::feedback_text(&summary, operation.action_type.is_undoable(), &self.reactions.controls());
        let posted = self
            .deps
            .feedback
            .post_feedback(
                &run.trigger.chat_ref,
                &run.trigger.message_ref,
                &text,
                &operation.id,
                self.settings.feedback_deletion_delay,
            )
            .await;

        match posted {
            Ok(feedback) => {
                run.reply_ref = Some(feedback.message_ref.clone());
                run.feedback = Some(feedback);
                run
            }
            Err(FeedbackError::Chat(chat_error)) => {
                run.with_failure(notification_error("could not post feedback", &chat_error))
            }
            Err(FeedbackError::Storage(store_error)) => {
                run.with_failure(storage_error("could not record feedback message", &store_error))
            }
        }
    }

    async fn fail(&self, run: RunState) -> RunState {
        let run = self.react(run, &self.reactions.error).await;
        let code = run.error.as_ref().map(|failure| failure.code).unwrap_or(ErrorCode::ActionExecution);
        if let Some(failure) = &run.error {
            warn!(
                event_name = "workflow.failed",
                code = failure.code.as_str(),
                error = %failure.message,
                "workflow run failed"
            );
        }
        self.reply(run, code.user_message()).await
    }

    async fn decline(&self, run: RunState) -> RunState {
        let run = self.react(run, &self.reactions.unknown).await;
        let text = match self.guardrails.evaluate(run.intent.as_ref()) {
            GuardrailDecision::Degrade { reason_code, user_message } => {
                debug!(reason_code, "no action taken");
                user_message
            }
            GuardrailDecision::Allow => {
                "I couldn't tell what you wanted me to do with that message.".to_string()
            }
        };
        self.reply(run, &text).await
    }

    async fn react(&self, run: RunState, emoji: &str) -> RunState {
        match self.deps.chat.set_reaction(&run.trigger.chat_ref, &run.trigger.message_ref, emoji).await {
            Ok(()) => run,
            Err(chat_error) => run.with_failure(notification_error("could not set reaction", &chat_error)),
        }
    }

    async fn reply(&self, mut run: RunState, text: &str) -> RunState {
        match self.deps.chat.reply(&run.trigger.chat_ref, &run.trigger.message_ref, text).await {
            Ok(reply_ref) => {
                run.reply_ref = Some(reply_ref);
                run
            }
            Err(chat_error) => run.with_failure(notification_error("could not post reply", &chat_error)),
        }
    }

    async fn remember(
        &self,
        existing: Option<ConversationContext>,
        trigger: &TriggerMessage,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let expires_at = now + self.settings.context_ttl;
        let mut context = existing
            .unwrap_or_else(|| ConversationContext::empty(trigger.chat_ref.clone(), expires_at, now));
        context.push(
            ContextEntry { user_ref: trigger.user_ref.clone(), text: trigger.text.clone(), at: now },
            expires_at,
        );
        self.deps.cache.save_context(context).await
    }

    fn finish(&self, run: &RunState, audit: &AuditContext) {
        let mut context = audit.clone();
        if let Some(operation) = &run.operation {
            context = context.with_operation(operation.id.clone());
        }

        let (event_type, outcome) = if run.has_fatal_error() {
            ("workflow.failed", AuditOutcome::Failed)
        } else if run.state == WorkflowState::Unknown {
            ("workflow.declined", AuditOutcome::Rejected)
        } else {
            ("workflow.completed", AuditOutcome::Success)
        };

        for warning in &run.warnings {
            warn!(
                event_name = "workflow.step_warning",
                code = warning.code.as_str(),
                error = %warning.message,
                "non-fatal workflow failure"
            );
        }

        let mut event = context
            .event(event_type, AuditCategory::Workflow, outcome)
            .with_metadata("final_state", run.state.as_str())
            .with_metadata("warnings", run.warnings.len().to_string());
        if let Some(intent) = &run.intent {
            event = event
                .with_metadata("intent", intent.intent_type.as_str())
                .with_metadata("confidence", format!("{:.2}", intent.confidence));
        }
        if let Some(failure) = &run.error {
            event = event.with_metadata("error_code", failure.code.as_str());
        }
        self.deps.audit.emit(event);
    }
}

fn storage_error(message: &str, error: &RepositoryError) -> StepError {
    StepError::new(ErrorCode::Storage, message).with_details(json!({ "error": error.to_string() }))
}

fn notification_error(message: &str, error: &ChatError) -> StepError {
    StepError::new(ErrorCode::Notification, message).with_details(json!({ "error": error.to_string() }))
}

fn action_error(message: &str, action_type: &str, error: &GatewayError) -> StepError {
    StepError::new(ErrorCode::ActionExecution, message)
        .with_details(json!({ "action_type": action_type, "error": error.to_string() }))
}
