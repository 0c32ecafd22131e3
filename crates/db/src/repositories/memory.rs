use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use triage_core::domain::cache::{AuthSetupSession, ConversationContext, PurgeReport};
use triage_core::domain::chat::{ChatRef, MessageRef, UserRef};
use triage_core::domain::feedback::FeedbackMessage;
use triage_core::domain::operation::{NewOperation, Operation, OperationId, OperationStatus};

use super::{CacheRepository, FeedbackRepository, OperationRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryOperationRepository {
    operations: RwLock<HashMap<String, Operation>>,
}

impl InMemoryOperationRepository {
    /// Inserts a fully-formed row, bypassing id generation.
    pub async fn insert(&self, operation: Operation) {
        let mut operations = self.operations.write().await;
        operations.insert(operation.id.0.clone(), operation);
    }
}

fn newest_first(mut operations: Vec<Operation>, limit: u32) -> Vec<Operation> {
    operations.sort_by(|left, right| right.created_at.cmp(&left.created_at));
    operations.truncate(limit as usize);
    operations
}

#[async_trait::async_trait]
impl OperationRepository for InMemoryOperationRepository {
    async fn create(&self, operation: NewOperation) -> Result<Operation, RepositoryError> {
        let operation = operation.into_operation(OperationId::generate(), Utc::now());
        let mut operations = self.operations.write().await;
        operations.insert(operation.id.0.clone(), operation.clone());
        Ok(operation)
    }

    async fn update_status(
        &self,
        id: &OperationId,
        status: OperationStatus,
    ) -> Result<Operation, RepositoryError> {
        let mut operations = self.operations.write().await;
        let operation = operations
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::not_found("operation", id.0.clone()))?;
        operation.status = status;
        operation.updated_at = Utc::now();
        Ok(operation.clone())
    }

    async fn find_by_id(&self, id: &OperationId) -> Result<Option<Operation>, RepositoryError> {
        let operations = self.operations.read().await;
        Ok(operations.get(&id.0).cloned())
    }

    async fn find_by_message(
        &self,
        source_message_id: &MessageRef,
    ) -> Result<Option<Operation>, RepositoryError> {
        let operations = self.operations.read().await;
        let matching = operations
            .values()
            .filter(|operation| &operation.source_message_id == source_message_id)
            .cloned()
            .collect();
        Ok(newest_first(matching, 1).into_iter().next())
    }

    async fn list_by_group(
        &self,
        group_id: &ChatRef,
        limit: u32,
    ) -> Result<Vec<Operation>, RepositoryError> {
        let operations = self.operations.read().await;
        let matching =
            operations.values().filter(|operation| &operation.group_id == group_id).cloned().collect();
        Ok(newest_first(matching, limit))
    }

    async fn list_by_status(
        &self,
        status: OperationStatus,
        limit: u32,
    ) -> Result<Vec<Operation>, RepositoryError> {
        let operations = self.operations.read().await;
        let matching =
            operations.values().filter(|operation| operation.status == status).cloned().collect();
        Ok(newest_first(matching, limit))
    }
}

#[derive(Default)]
pub struct InMemoryFeedbackRepository {
    messages: RwLock<HashMap<String, FeedbackMessage>>,
}

#[async_trait::async_trait]
impl FeedbackRepository for InMemoryFeedbackRepository {
    async fn insert(&self, message: FeedbackMessage) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        let duplicate = messages.values().any(|existing| {
            existing.message_ref == message.message_ref
                || existing.operation_id == message.operation_id
        });
        if duplicate {
            return Err(RepositoryError::Conflict("feedback message already exists".to_string()));
        }
        messages.insert(message.message_ref.0.clone(), message);
        Ok(())
    }

    async fn find_by_message(
        &self,
        message_ref: &MessageRef,
    ) -> Result<Option<FeedbackMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.get(&message_ref.0).cloned())
    }

    async fn find_by_operation(
        &self,
        operation_id: &OperationId,
    ) -> Result<Option<FeedbackMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.values().find(|message| &message.operation_id == operation_id).cloned())
    }

    async fn mark_dismissed(&self, message_ref: &MessageRef) -> Result<bool, RepositoryError> {
        let mut messages = self.messages.write().await;
        Ok(match messages.get_mut(&message_ref.0) {
            Some(message) => {
                message.dismissed = true;
                true
            }
            None => false,
        })
    }

    async fn delete(&self, message_ref: &MessageRef) -> Result<bool, RepositoryError> {
        let mut messages = self.messages.write().await;
        Ok(messages.remove(&message_ref.0).is_some())
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<FeedbackMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut due: Vec<FeedbackMessage> =
            messages.values().filter(|message| message.is_due(now)).cloned().collect();
        due.sort_by(|left, right| left.scheduled_deletion.cmp(&right.scheduled_deletion));
        due.truncate(limit as usize);
        Ok(due)
    }

    async fn list_dismissed(&self, limit: u32) -> Result<Vec<FeedbackMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut dismissed: Vec<FeedbackMessage> =
            messages.values().filter(|message| message.dismissed).cloned().collect();
        dismissed.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        dismissed.truncate(limit as usize);
        Ok(dismissed)
    }
}

#[derive(Default)]
pub struct InMemoryCacheRepository {
    contexts: RwLock<HashMap<String, ConversationContext>>,
    auth_sessions: RwLock<HashMap<String, AuthSetupSession>>,
}

#[async_trait::async_trait]
impl CacheRepository for InMemoryCacheRepository {
    async fn load_context(
        &self,
        chat_ref: &ChatRef,
        now: DateTime<Utc>,
    ) -> Result<Option<ConversationContext>, RepositoryError> {
        let contexts = self.contexts.read().await;
        Ok(contexts.get(&chat_ref.0).filter(|context| !context.is_expired(now)).cloned())
    }

    async fn save_context(&self, context: ConversationContext) -> Result<(), RepositoryError> {
        let mut contexts = self.contexts.write().await;
        contexts.insert(context.chat_ref.0.clone(), context);
        Ok(())
    }

    async fn find_auth_session(
        &self,
        user_ref: &UserRef,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthSetupSession>, RepositoryError> {
        let sessions = self.auth_sessions.read().await;
        Ok(sessions.get(&user_ref.0).filter(|session| session.expires_at > now).cloned())
    }

    async fn save_auth_session(&self, session: AuthSetupSession) -> Result<(), RepositoryError> {
        let mut sessions = self.auth_sessions.write().await;
        sessions.insert(session.user_ref.0.clone(), session);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport, RepositoryError> {
        let mut contexts = self.contexts.write().await;
        let before = contexts.len();
        contexts.retain(|_, context| !context.is_expired(now));
        let purged_contexts = (before - contexts.len()) as u64;

        let mut sessions = self.auth_sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        let purged_sessions = (before - sessions.len()) as u64;

        Ok(PurgeReport { contexts: purged_contexts, auth_sessions: purged_sessions })
    }
}
