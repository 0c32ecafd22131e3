use chrono::{DateTime, Utc};
use sqlx::Row;

use triage_core::domain::cache::{AuthSetupSession, ContextEntry, ConversationContext, PurgeReport};
use triage_core::domain::chat::{ChatRef, UserRef};

use super::{decode_error, decode_timestamp, encode_timestamp, CacheRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCacheRepository {
    pool: DbPool,
}

impl SqlCacheRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CacheRepository for SqlCacheRepository {
    async fn load_context(
        &self,
        chat_ref: &ChatRef,
        now: DateTime<Utc>,
    ) -> Result<Option<ConversationContext>, RepositoryError> {
        let row = sqlx::query(
            "SELECT chat_ref, entries, expires_at, updated_at
             FROM conversation_context
             WHERE chat_ref = ? AND expires_at > ?",
        )
        .bind(&chat_ref.0)
        .bind(encode_timestamp(now))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let entries: String = row.try_get("entries").map_err(decode_error)?;
        let expires_at: String = row.try_get("expires_at").map_err(decode_error)?;
        let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;
        let entries = serde_json::from_str::<Vec<ContextEntry>>(&entries)
            .map_err(|error| RepositoryError::Decode(format!("entries: {error}")))?;

        Ok(Some(ConversationContext {
            chat_ref: chat_ref.clone(),
            entries,
            expires_at: decode_timestamp("expires_at", &expires_at)?,
            updated_at: decode_timestamp("updated_at", &updated_at)?,
        }))
    }

    async fn save_context(&self, context: ConversationContext) -> Result<(), RepositoryError> {
        let entries = serde_json::to_string(&context.entries)
            .map_err(|error| RepositoryError::Decode(format!("entries: {error}")))?;

        sqlx::query(
            "INSERT INTO conversation_context (chat_ref, entries, expires_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(chat_ref) DO UPDATE SET
                entries = excluded.entries,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
        )
        .bind(&context.chat_ref.0)
        .bind(entries)
        .bind(encode_timestamp(context.expires_at))
        .bind(encode_timestamp(context.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_auth_session(
        &self,
        user_ref: &UserRef,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthSetupSession>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_ref, chat_ref, step, encrypted_token, expires_at, created_at
             FROM auth_setup_sessions
             WHERE user_ref = ? AND expires_at > ?",
        )
        .bind(&user_ref.0)
        .bind(encode_timestamp(now))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let chat_ref: String = row.try_get("chat_ref").map_err(decode_error)?;
        let step: String = row.try_get("step").map_err(decode_error)?;
        let encrypted_token: Option<String> =
            row.try_get("encrypted_token").map_err(decode_error)?;
        let expires_at: String = row.try_get("expires_at").map_err(decode_error)?;
        let created_at: String = row.try_get("created_at").map_err(decode_error)?;

        Ok(Some(AuthSetupSession {
            user_ref: user_ref.clone(),
            chat_ref: ChatRef(chat_ref),
            step,
            encrypted_token,
            expires_at: decode_timestamp("expires_at", &expires_at)?,
            created_at: decode_timestamp("created_at", &created_at)?,
        }))
    }

    async fn save_auth_session(&self, session: AuthSetupSession) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO auth_setup_sessions
                (user_ref, chat_ref, step, encrypted_token, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_ref) DO UPDATE SET
                chat_ref = excluded.chat_ref,
                step = excluded.step,
                encrypted_token = excluded.encrypted_token,
                expires_at = excluded.expires_at",
        )
        .bind(&session.user_ref.0)
        .bind(&session.chat_ref.0)
        .bind(&session.step)
        .bind(&session.encrypted_token)
        .bind(encode_timestamp(session.expires_at))
        .bind(encode_timestamp(session.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport, RepositoryError> {
        let cutoff = encode_timestamp(now);
        let mut tx = self.pool.begin().await?;

        let contexts = sqlx::query("DELETE FROM conversation_context WHERE expires_at <= ?")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let auth_sessions = sqlx::query("DELETE FROM auth_setup_sessions WHERE expires_at <= ?")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(PurgeReport { contexts, auth_sessions })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use triage_core::domain::cache::{AuthSetupSession, ContextEntry, ConversationContext};
    use triage_core::domain::chat::{ChatRef, UserRef};

    use super::SqlCacheRepository;
    use crate::repositories::CacheRepository;
    use crate::{connect_with_settings, migrations};

    async fn repo() -> SqlCacheRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlCacheRepository::new(pool)
    }

    fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("timestamp").with_timezone(&Utc)
    }

    #[tokio::test]
    async fn context_upsert_replaces_entries_and_hides_expired_rows() {
        let repo = repo().await;
        let now = ts("2026-03-01T10:00:00Z");
        let chat = ChatRef("C1".to_string());
        let mut context = ConversationContext::empty(chat.clone(), now + Duration::hours(1), now);
        context.push(
            ContextEntry {
                user_ref: UserRef("U1".to_string()),
                text: "the export button is greyed out".to_string(),
                at: now,
            },
            now + Duration::hours(1),
        );

        repo.save_context(context.clone()).await.expect("save");
        context.push(
            ContextEntry {
                user_ref: UserRef("U2".to_string()),
                text: "same for me".to_string(),
                at: now + Duration::minutes(1),
            },
            now + Duration::hours(1),
        );
        repo.save_context(context.clone()).await.expect("upsert");

        let loaded = repo.load_context(&chat, now).await.expect("load").expect("present");
        assert_eq!(loaded.entries.len(), 2);
        assert_eq!(loaded, context);

        let after_expiry = repo.load_context(&chat, now + Duration::hours(2)).await.expect("load");
        assert!(after_expiry.is_none());
    }

    #[tokio::test]
    async fn purge_removes_only_expired_side_records() {
        let repo = repo().await;
        let now = ts("2026-03-01T10:00:00Z");

        repo.save_context(ConversationContext::empty(
            ChatRef("C-old".to_string()),
            now - Duration::minutes(1),
            now - Duration::hours(1),
        ))
        .await
        .expect("save old context");
        repo.save_context(ConversationContext::empty(
            ChatRef("C-fresh".to_string()),
            now + Duration::minutes(30),
            now,
        ))
        .await
        .expect("save fresh context");
        repo.save_auth_session(AuthSetupSession {
            user_ref: UserRef("U1".to_string()),
            chat_ref: ChatRef("D1".to_string()),
            step: "awaiting_token".to_string(),
            encrypted_token: None,
            expires_at: now,
            created_at: now - Duration::minutes(15),
        })
        .await
        .expect("save session");

        let report = repo.purge_expired(now).await.expect("purge");

        assert_eq!(report.contexts, 1);
        assert_eq!(report.auth_sessions, 1);
        assert_eq!(report.total(), 2);
        assert!(repo
            .load_context(&ChatRef("C-fresh".to_string()), now)
            .await
            .expect("load fresh")
            .is_some());
        assert!(repo
            .find_auth_session(&UserRef("U1".to_string()), now - Duration::minutes(1))
            .await
            .expect("find session")
            .is_none());
    }
}
