use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use triage_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use triage_core::chat::{ChatError, ChatTransport};
use triage_core::domain::chat::{ChatRef, MessageRef};
use triage_core::domain::feedback::{FeedbackId, FeedbackMessage, NewFeedbackMessage};
use triage_core::domain::operation::OperationId;
use triage_db::{FeedbackRepository, RepositoryError};

/// Rows handled per sweep; the remainder waits for the next tick.
pub const SWEEP_BATCH_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("chat transport failed: {0}")]
    Chat(#[from] ChatError),
    #[error("feedback store failed: {0}")]
    Storage(#[from] RepositoryError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub due: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Posts, expires and dismisses the ephemeral replies that report operation outcomes.
pub struct FeedbackLifecycle {
    chat: Arc<dyn ChatTransport>,
    store: Arc<dyn FeedbackRepository>,
    audit: Arc<dyn AuditSink>,
}

impl FeedbackLifecycle {
    pub fn new(
        chat: Arc<dyn ChatTransport>,
        store: Arc<dyn FeedbackRepository>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { chat, store, audit }
    }

    pub async fn post_feedback(
        &self,
        chat_ref: &ChatRef,
        reply_to: &MessageRef,
        text: &str,
        operation_id: &OperationId,
        deletion_delay: Duration,
    ) -> Result<FeedbackMessage, FeedbackError> {
        self.post_feedback_at(chat_ref, reply_to, text, operation_id, deletion_delay, Utc::now())
            .await
    }

    pub async fn post_feedback_at(
        &self,
        chat_ref: &ChatRef,
        reply_to: &MessageRef,
        text: &str,
        operation_id: &OperationId,
        deletion_delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<FeedbackMessage, FeedbackError> {
        let message_ref = self.chat.reply(chat_ref, reply_to, text).await?;
        let message = NewFeedbackMessage {
            operation_id: operation_id.clone(),
            chat_ref: chat_ref.clone(),
            message_ref,
            deletion_delay,
        }
        .into_message(FeedbackId::generate(), now);

        if let Err(error) = self.store.insert(message.clone()).await {
            warn!(
                event_name = "feedback.untracked",
                operation_id = %operation_id,
                chat_ref = %chat_ref,
                message_ref = %message.message_ref,
                error = %error,
                "feedback reply was posted but will not expire automatically"
            );
            return Err(error.into());
        }

        debug!(
            event_name = "feedback.posted",
            operation_id = %operation_id,
            message_ref = %message.message_ref,
            scheduled_deletion = %message.scheduled_deletion,
            "feedback message scheduled for deletion"
        );
        Ok(message)
    }

    /// Deletes the remote reply and its row. A reply that is already gone counts as deleted.
    pub async fn delete_now(&self, message_ref: &MessageRef) -> Result<bool, FeedbackError> {
        let Some(message) = self.store.find_by_message(message_ref).await? else {
            debug!(
                event_name = "feedback.delete_skipped",
                message_ref = %message_ref,
                "no feedback row; treating as already deleted"
            );
            return Ok(true);
        };

        let existed = self.chat.delete_message(&message.chat_ref, message_ref).await?;
        if !existed {
            debug!(
                event_name = "feedback.already_gone",
                message_ref = %message_ref,
                "remote message was already deleted"
            );
        }
        self.store.delete(message_ref).await?;

        self.audit.emit(
            AuditContext::new(
                Some(message.operation_id.clone()),
                Some(message.chat_ref.0.clone()),
                format!("{}:{}", message.chat_ref, message_ref),
                "feedback-lifecycle",
            )
            .event("feedback.deleted", AuditCategory::Feedback, AuditOutcome::Success)
            .with_metadata("dismissed", message.dismissed.to_string())
            .with_metadata("remote_existed", existed.to_string()),
        );
        Ok(true)
    }

    /// Returns `false` when `message_ref` is not a tracked feedback message.
    pub async fn dismiss(&self, message_ref: &MessageRef) -> Result<bool, FeedbackError> {
        if !self.store.mark_dismissed(message_ref).await? {
            return Ok(false);
        }
        self.delete_now(message_ref).await
    }

    pub async fn dismiss_for_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<bool, FeedbackError> {
        match self.store.find_by_operation(operation_id).await? {
            Some(message) => self.dismiss(&message.message_ref).await,
            None => Ok(false),
        }
    }

    pub async fn find(&self, message_ref: &MessageRef) -> Result<Option<FeedbackMessage>, FeedbackError> {
        Ok(self.store.find_by_message(message_ref).await?)
    }

    pub async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<FeedbackMessage>, FeedbackError> {
        Ok(self.store.list_due(now, SWEEP_BATCH_LIMIT).await?)
    }

    /// One expiry pass. Dismissed rows whose earlier delete failed are retried too.
    /// Per-message failures are logged and counted, never fatal.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, FeedbackError> {
        let mut due = self.store.list_dismissed(SWEEP_BATCH_LIMIT).await?;
        due.extend(self.list_due(now).await?);
        let mut report = SweepReport { due: due.len(), ..SweepReport::default() };

        for message in due {
            match self.delete_now(&message.message_ref).await {
                Ok(_) => report.deleted += 1,
                Err(error) => {
                    report.failed += 1;
                    warn!(
                        event_name = "feedback.sweep_item_failed",
                        operation_id = %message.operation_id,
                        message_ref = %message.message_ref,
                        error = %error,
                        "could not delete expired feedback message"
                    );
                }
            }
        }

        if report.due > 0 {
            info!(
                event_name = "feedback.sweep_completed",
                due = report.due,
                deleted = report.deleted,
                failed = report.failed,
                "feedback sweep finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};

    use triage_core::audit::InMemoryAuditSink;
    use triage_core::domain::chat::{ChatRef, MessageRef};
    use triage_core::domain::operation::OperationId;
    use triage_db::{FeedbackRepository, InMemoryFeedbackRepository};

    use super::{FeedbackError, FeedbackLifecycle, SweepReport};
    use crate::testing::{RecordingChat, SOURCE_MESSAGE};

    struct Harness {
        chat: Arc<RecordingChat>,
        store: Arc<InMemoryFeedbackRepository>,
        audit: InMemoryAuditSink,
        lifecycle: FeedbackLifecycle,
    }

    fn harness(chat: RecordingChat) -> Harness {
        let chat = Arc::new(chat);
        let store = Arc::new(InMemoryFeedbackRepository::default());
        let audit = InMemoryAuditSink::default();
        let lifecycle = FeedbackLifecycle::new(chat.clone(), store.clone(), Arc::new(audit.clone()));
        Harness { chat, store, audit, lifecycle }
    }

    fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("timestamp").with_timezone(&Utc)
    }

    async fn post(harness: &Harness, operation: &str, at: DateTime<Utc>) -> MessageRef {
        harness
            .lifecycle
            .post_feedback_at(
                &ChatRef("C1".to_string()),
                &MessageRef(SOURCE_MESSAGE.to_string()),
                "Filed bug acme/widgets#42",
                &OperationId(operation.to_string()),
                Duration::milliseconds(600_000),
                at,
            )
            .await
            .expect("post feedback")
            .message_ref
    }

    #[tokio::test]
    async fn posting_schedules_deletion_after_delay() {
        let harness = harness(RecordingChat::default());
        let at = ts("2026-03-01T10:00:00Z");

        let message_ref = post(&harness, "op-1", at).await;

        let stored = harness.store.find_by_message(&message_ref).await.expect("find").expect("row");
        assert_eq!(stored.scheduled_deletion, at + Duration::minutes(10));
        assert!(!stored.dismissed);
        assert_eq!(harness.chat.reply_texts(), vec!["Filed bug acme/widgets#42".to_string()]);
    }

    #[tokio::test]
    async fn failed_reply_stores_nothing() {
        let harness = harness(RecordingChat::failing_replies());

        let error = harness
            .lifecycle
            .post_feedback(
                &ChatRef("C1".to_string()),
                &MessageRef(SOURCE_MESSAGE.to_string()),
                "text",
                &OperationId("op-1".to_string()),
                Duration::minutes(10),
            )
            .await
            .expect_err("reply failed");

        assert!(matches!(error, FeedbackError::Chat(_)));
        assert!(harness.lifecycle.list_due(Utc::now() + Duration::hours(1)).await.expect("due").is_empty());
    }

    #[tokio::test]
    async fn delete_now_is_idempotent() {
        let harness = harness(RecordingChat::default());
        let message_ref = post(&harness, "op-1", Utc::now()).await;

        assert!(harness.lifecycle.delete_now(&message_ref).await.expect("first"));
        assert!(harness.lifecycle.delete_now(&message_ref).await.expect("second"));

        assert_eq!(harness.chat.deletions(), vec![message_ref.0.clone()]);
        assert_eq!(harness.audit.event_types(), vec!["feedback.deleted".to_string()]);
    }

    #[tokio::test]
    async fn sweep_deletes_expired_message_once_due() {
        let harness = harness(RecordingChat::default());
        let created = ts("2026-03-01T10:00:00Z");
        let message_ref = post(&harness, "op-1", created).await;

        let early = harness
            .lifecycle
            .sweep(created + Duration::milliseconds(540_000))
            .await
            .expect("early sweep");
        assert_eq!(early, SweepReport::default());

        let report = harness
            .lifecycle
            .sweep(created + Duration::milliseconds(660_000))
            .await
            .expect("sweep");

        assert_eq!(report, SweepReport { due: 1, deleted: 1, failed: 0 });
        assert_eq!(harness.chat.deletions(), vec![message_ref.0.clone(); 3]);
        assert!(harness.store.find_by_message(&message_ref).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn sweep_continues_past_failing_items() {
        let harness = harness(RecordingChat::default());
        let created = ts("2026-03-01T10:00:00Z");
        let stuck = post(&harness, "op-1", created).await;
        let fine = post(&harness, "op-2", created + Duration::seconds(1)).await;
        harness.chat.fail_delete(&stuck);

        let report =
            harness.lifecycle.sweep(created + Duration::minutes(11)).await.expect("sweep");

        assert_eq!(report, SweepReport { due: 2, deleted: 1, failed: 1 });
        assert!(harness.store.find_by_message(&stuck).await.expect("find").is_some());
        assert!(harness.store.find_by_message(&fine).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn dismissing_a_message_deleted_out_of_band_succeeds() {
        let harness = harness(RecordingChat::default());
        let message_ref = post(&harness, "op-1", Utc::now()).await;
        harness.chat.forget(&message_ref);

        assert!(harness.lifecycle.dismiss(&message_ref).await.expect("dismiss"));

        assert_eq!(harness.chat.deletions(), vec![message_ref.0.clone()]);
        assert!(harness.store.find_by_message(&message_ref).await.expect("find").is_none());
        let deleted = harness.audit.events().pop().expect("audit event");
        assert_eq!(deleted.metadata.get("dismissed").map(String::as_str), Some("true"));
        assert_eq!(deleted.metadata.get("remote_existed").map(String::as_str), Some("false"));
    }

    #[tokio::test]
    async fn dismissed_message_whose_delete_failed_is_retried_by_the_sweep() {
        let harness = harness(RecordingChat::default());
        let created = ts("2026-03-01T10:00:00Z");
        let message_ref = post(&harness, "op-1", created).await;
        harness.chat.fail_delete(&message_ref);

        let error = harness.lifecycle.dismiss(&message_ref).await.expect_err("delete failed");
        assert!(matches!(error, FeedbackError::Chat(_)));

        let stored = harness.store.find_by_message(&message_ref).await.expect("find").expect("row");
        assert!(stored.dismissed);
        assert!(harness.lifecycle.list_due(created + Duration::hours(1)).await.expect("due").is_empty());

        // Dismissed rows are eligible right away, long before their scheduled deletion.
        let still_failing = harness.lifecycle.sweep(created).await.expect("sweep");
        assert_eq!(still_failing, SweepReport { due: 1, deleted: 0, failed: 1 });

        harness.chat.recover_delete(&message_ref);
        let report = harness.lifecycle.sweep(created).await.expect("sweep");

        assert_eq!(report, SweepReport { due: 1, deleted: 1, failed: 0 });
        assert_eq!(harness.chat.deletions(), vec![message_ref.0.clone(); 3]);
        assert!(harness.store.find_by_message(&message_ref).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn dismissing_an_untracked_message_is_ignored() {
        let harness = harness(RecordingChat::default());

        let dismissed = harness
            .lifecycle
            .dismiss(&MessageRef("1730000000.999999".to_string()))
            .await
            .expect("dismiss");

        assert!(!dismissed);
        assert!(harness.chat.deletions().is_empty());
    }
}
