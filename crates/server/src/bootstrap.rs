use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::info;

use triage_agent::audit::TracingAuditSink;
use triage_agent::{
    ActionFormatter, CompensationEngine, FeedbackLifecycle, GatewayError, GithubGateway,
    HttpLlmClient, LlmIntentClassifier, ReactionController, WorkflowCollaborators,
    WorkflowRuntime, WorkflowSettings,
};
use triage_core::audit::AuditSink;
use triage_core::chat::{ChatError, ChatTransport};
use triage_core::config::{
    AppConfig, ConfigError, LoadOptions, SecurityConfig, TrackerConfig, ENCRYPTED_TOKEN_PREFIX,
};
use triage_core::crypto::{CipherError, TokenCipher};
use triage_db::{
    connect_from_config, migrations, CacheRepository, DbPool, SqlCacheRepository,
    SqlFeedbackRepository, SqlOperationRepository,
};
use triage_slack::web::SlackWebClient;

/// Everything the server loop needs, built once at startup.
pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<WorkflowRuntime>,
    pub feedback: Arc<FeedbackLifecycle>,
    pub reactions: Arc<ReactionController>,
    pub cache: Arc<dyn CacheRepository>,
    pub slack: Arc<SlackWebClient>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("tracker token could not be decrypted: {0}")]
    TokenDecrypt(#[source] CipherError),
    #[error("tracker token is encrypted but security.encryption_key is not set")]
    MissingEncryptionKey,
    #[error("slack client setup failed: {0}")]
    Slack(#[source] ChatError),
    #[error("tracker client setup failed: {0}")]
    Tracker(#[source] GatewayError),
    #[error("llm client setup failed: {0}")]
    Llm(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let action_timeout = Duration::from_secs(config.workflow.action_timeout_secs.max(1));
    let tracker_token = resolve_tracker_token(&config.tracker, &config.security)?;
    let repository = config.tracker.repository()?;

    let slack = Arc::new(
        SlackWebClient::new(&config.slack.api_base, config.slack.bot_token.clone(), action_timeout)
            .map_err(BootstrapError::Slack)?
            .with_progress_reactions([&config.reactions.analyzing, &config.reactions.processing]),
    );
    let chat: Arc<dyn ChatTransport> = slack.clone();
    let gateway = Arc::new(
        GithubGateway::new(&config.tracker.api_base, &tracker_token, action_timeout)
            .map_err(BootstrapError::Tracker)?,
    );
    let llm = HttpLlmClient::from_config(&config.llm)
        .map_err(|error| BootstrapError::Llm(format!("{error:#}")))?;

    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let operations = Arc::new(SqlOperationRepository::new(db_pool.clone()));
    let cache: Arc<dyn CacheRepository> = Arc::new(SqlCacheRepository::new(db_pool.clone()));
    let feedback = Arc::new(FeedbackLifecycle::new(
        chat.clone(),
        Arc::new(SqlFeedbackRepository::new(db_pool.clone())),
        audit.clone(),
    ));
    let compensation = Arc::new(CompensationEngine::new(
        operations.clone(),
        gateway.clone(),
        feedback.clone(),
        chat.clone(),
        audit.clone(),
        action_timeout,
    ));
    let reactions = Arc::new(ReactionController::new(
        config.reactions.controls(),
        feedback.clone(),
        compensation,
    ));

    let runtime = Arc::new(WorkflowRuntime::new(
        WorkflowCollaborators {
            classifier: Arc::new(LlmIntentClassifier::new(Arc::new(llm))),
            gateway,
            operations,
            cache: cache.clone(),
            chat,
            feedback: feedback.clone(),
            audit,
        },
        ActionFormatter::new(repository),
        config.reactions.clone(),
        WorkflowSettings::from_config(&config.workflow, &config.scheduler),
    ));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        "collaborators constructed"
    );

    Ok(Application { config, db_pool, runtime, feedback, reactions, cache, slack })
}

/// Plain tokens pass through; `enc:` tokens are decrypted with `security.encryption_key`.
pub fn resolve_tracker_token(
    tracker: &TrackerConfig,
    security: &SecurityConfig,
) -> Result<SecretString, BootstrapError> {
    let raw = tracker.token.expose_secret();
    let Some(ciphertext) = raw.strip_prefix(ENCRYPTED_TOKEN_PREFIX) else {
        return Ok(tracker.token.clone());
    };
    let key = security.encryption_key.as_ref().ok_or(BootstrapError::MissingEncryptionKey)?;
    let cipher = TokenCipher::new(key).map_err(BootstrapError::TokenDecrypt)?;
    let plaintext = cipher.decrypt(ciphertext.trim()).map_err(BootstrapError::TokenDecrypt)?;
    Ok(SecretString::from(plaintext))
}

#[cfg(test)]
mod tests {
    use secrecy::{ExposeSecret, SecretString};
    use triage_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use triage_core::crypto::TokenCipher;

    use super::{bootstrap, resolve_tracker_token, BootstrapError};

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                slack_app_token: Some("xapp-test".to_string()),
                slack_bot_token: Some("xoxb-test".to_string()),
                tracker_token: Some("ghp_test".to_string()),
                default_repository: Some("acme/widgets".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_required_slack_tokens() {
        let mut options = valid_overrides("sqlite::memory:");
        options.overrides.slack_app_token = Some("invalid-token".to_string());

        let result = bootstrap(options).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.app_token"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_collaborators() {
        let app = bootstrap(valid_overrides("sqlite::memory:")).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('operations', 'feedback_messages', 'conversation_context', 'auth_setup_sessions')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 4);

        app.db_pool.close().await;
    }

    #[test]
    fn encrypted_tracker_token_is_decrypted_with_the_configured_key() {
        let key = SecretString::from("correct horse battery staple".to_string());
        let ciphertext = TokenCipher::new(&key).expect("cipher").encrypt("ghp_secret").expect("encrypt");
        let mut config = AppConfig::default();
        config.tracker.token = SecretString::from(format!("enc:{ciphertext}"));
        config.security.encryption_key = Some(key);

        let token = resolve_tracker_token(&config.tracker, &config.security).expect("decrypt");

        assert_eq!(token.expose_secret(), "ghp_secret");
    }

    #[test]
    fn wrong_key_or_missing_key_is_rejected() {
        let ciphertext = TokenCipher::new(&SecretString::from("key-a".to_string()))
            .expect("cipher")
            .encrypt("ghp_secret")
            .expect("encrypt");
        let mut config = AppConfig::default();
        config.tracker.token = SecretString::from(format!("enc:{ciphertext}"));

        assert!(matches!(
            resolve_tracker_token(&config.tracker, &config.security),
            Err(BootstrapError::MissingEncryptionKey)
        ));

        config.security.encryption_key = Some(SecretString::from("key-b".to_string()));
        assert!(matches!(
            resolve_tracker_token(&config.tracker, &config.security),
            Err(BootstrapError::TokenDecrypt(_))
        ));
    }

    #[test]
    fn plain_tracker_token_passes_through() {
        let mut config = AppConfig::default();
        config.tracker.token = SecretString::from("ghp_plain".to_string());

        let token = resolve_tracker_token(&config.tracker, &config.security).expect("plain");

        assert_eq!(token.expose_secret(), "ghp_plain");
    }
}
