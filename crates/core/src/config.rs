use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::action::RepositoryRef;
use crate::domain::intent::IntentType;
use crate::domain::reaction::ReactionControls;

pub const ENCRYPTED_TOKEN_PREFIX: &str = "enc:";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub llm: LlmConfig,
    pub tracker: TrackerConfig,
    pub workflow: WorkflowConfig,
    pub scheduler: SchedulerConfig,
    pub reactions: ReactionConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    /// Bot user id used to recognise explicit mentions, e.g. `U0BOT`.
    pub bot_user_id: Option<String>,
    pub api_base: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TrackerConfig {
    pub api_base: String,
    /// Plain token, or `enc:` followed by token-cipher output.
    pub token: SecretString,
    pub default_repository: Option<String>,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub confidence_threshold: f64,
    pub feedback_deletion_delay_ms: u64,
    pub action_timeout_secs: u64,
    pub max_concurrent_runs: usize,
    pub drain_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub interval_ms: u64,
    pub context_ttl_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionConfig {
    pub dismiss: String,
    pub undo: String,
    pub analyzing: String,
    pub processing: String,
    pub error: String,
    pub unknown: String,
    /// Success emoji per intent type, keyed by `IntentType::as_str`.
    pub success: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default)]
pub struct SecurityConfig {
    pub encryption_key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub tracker_token: Option<String>,
    pub default_repository: Option<String>,
    pub confidence_threshold: Option<f64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://triage.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                bot_user_id: None,
                api_base: "https://slack.com/api".to_string(),
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434/v1".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
            },
            tracker: TrackerConfig {
                api_base: "https://api.github.com".to_string(),
                token: String::new().into(),
                default_repository: None,
            },
            workflow: WorkflowConfig {
                confidence_threshold: 0.3,
                feedback_deletion_delay_ms: 600_000,
                action_timeout_secs: 30,
                max_concurrent_runs: 4,
                drain_timeout_secs: 15,
            },
            scheduler: SchedulerConfig { interval_ms: 60_000, context_ttl_secs: 3_600 },
            reactions: ReactionConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for ReactionConfig {
    fn default() -> Self {
        let success = [
            (IntentType::CreateBug, "bug"),
            (IntentType::CreateTask, "white_check_mark"),
            (IntentType::CreateIdea, "bulb"),
            (IntentType::UpdateIssue, "pencil2"),
            (IntentType::SearchIssues, "mag"),
        ]
        .into_iter()
        .map(|(intent, emoji)| (intent.as_str().to_string(), emoji.to_string()))
        .collect();

        Self {
            dismiss: "+1".to_string(),
            undo: "-1".to_string(),
            analyzing: "eyes".to_string(),
            processing: "hourglass_flowing_sand".to_string(),
            error: "x".to_string(),
            unknown: "thinking_face".to_string(),
            success,
        }
    }
}

impl ReactionConfig {
    pub fn controls(&self) -> ReactionControls {
        ReactionControls::new(self.dismiss.clone(), self.undo.clone())
    }

    pub fn success_for(&self, intent: IntentType) -> &str {
        self.success.get(intent.as_str()).map(String::as_str).unwrap_or("white_check_mark")
    }
}

impl TrackerConfig {
    pub fn is_token_encrypted(&self) -> bool {
        self.token.expose_secret().starts_with(ENCRYPTED_TOKEN_PREFIX)
    }

    pub fn repository(&self) -> Result<RepositoryRef, ConfigError> {
        let raw = self.default_repository.as_deref().unwrap_or_default();
        raw.parse::<RepositoryRef>()
            .map_err(|error| ConfigError::Validation(format!("tracker.default_repository: {error}")))
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("triage.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(app_token) = slack.app_token {
                self.slack.app_token = secret_value(app_token);
            }
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(bot_user_id) = slack.bot_user_id {
                self.slack.bot_user_id = Some(bot_user_id);
            }
            if let Some(api_base) = slack.api_base {
                self.slack.api_base = api_base;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(tracker) = patch.tracker {
            if let Some(api_base) = tracker.api_base {
                self.tracker.api_base = api_base;
            }
            if let Some(token) = tracker.token {
                self.tracker.token = secret_value(token);
            }
            if let Some(default_repository) = tracker.default_repository {
                self.tracker.default_repository = Some(default_repository);
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(confidence_threshold) = workflow.confidence_threshold {
                self.workflow.confidence_threshold = confidence_threshold;
            }
            if let Some(delay) = workflow.feedback_deletion_delay_ms {
                self.workflow.feedback_deletion_delay_ms = delay;
            }
            if let Some(action_timeout_secs) = workflow.action_timeout_secs {
                self.workflow.action_timeout_secs = action_timeout_secs;
            }
            if let Some(max_concurrent_runs) = workflow.max_concurrent_runs {
                self.workflow.max_concurrent_runs = max_concurrent_runs;
            }
            if let Some(drain_timeout_secs) = workflow.drain_timeout_secs {
                self.workflow.drain_timeout_secs = drain_timeout_secs;
            }
        }

        if let Some(scheduler) = patch.scheduler {
            if let Some(interval_ms) = scheduler.interval_ms {
                self.scheduler.interval_ms = interval_ms;
            }
            if let Some(context_ttl_secs) = scheduler.context_ttl_secs {
                self.scheduler.context_ttl_secs = context_ttl_secs;
            }
        }

        if let Some(reactions) = patch.reactions {
            let slots = [
                (reactions.dismiss, &mut self.reactions.dismiss),
                (reactions.undo, &mut self.reactions.undo),
                (reactions.analyzing, &mut self.reactions.analyzing),
                (reactions.processing, &mut self.reactions.processing),
                (reactions.error, &mut self.reactions.error),
                (reactions.unknown, &mut self.reactions.unknown),
            ];
            for (value, slot) in slots {
                if let Some(value) = value {
                    *slot = value;
                }
            }
            if let Some(success) = reactions.success {
                self.reactions.success.extend(success);
            }
        }

        if let Some(security) = patch.security {
            if let Some(encryption_key) = security.encryption_key {
                self.security.encryption_key = Some(secret_value(encryption_key));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TRIAGE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TRIAGE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("TRIAGE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TRIAGE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TRIAGE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TRIAGE_SLACK_APP_TOKEN") {
            self.slack.app_token = secret_value(value);
        }
        if let Some(value) = read_env("TRIAGE_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("TRIAGE_SLACK_BOT_USER_ID") {
            self.slack.bot_user_id = Some(value);
        }

        if let Some(value) = read_env("TRIAGE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TRIAGE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TRIAGE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TRIAGE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TRIAGE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TRIAGE_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TRIAGE_TRACKER_API_BASE") {
            self.tracker.api_base = value;
        }
        if let Some(value) = read_env("TRIAGE_TRACKER_TOKEN") {
            self.tracker.token = secret_value(value);
        }
        if let Some(value) = read_env("TRIAGE_TRACKER_DEFAULT_REPOSITORY") {
            self.tracker.default_repository = Some(value);
        }

        if let Some(value) = read_env("TRIAGE_WORKFLOW_CONFIDENCE_THRESHOLD") {
            self.workflow.confidence_threshold =
                parse_f64("TRIAGE_WORKFLOW_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("TRIAGE_WORKFLOW_FEEDBACK_DELETION_DELAY_MS") {
            self.workflow.feedback_deletion_delay_ms =
                parse_u64("TRIAGE_WORKFLOW_FEEDBACK_DELETION_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("TRIAGE_WORKFLOW_ACTION_TIMEOUT_SECS") {
            self.workflow.action_timeout_secs =
                parse_u64("TRIAGE_WORKFLOW_ACTION_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TRIAGE_WORKFLOW_MAX_CONCURRENT_RUNS") {
            self.workflow.max_concurrent_runs =
                parse_u32("TRIAGE_WORKFLOW_MAX_CONCURRENT_RUNS", &value)? as usize;
        }
        if let Some(value) = read_env("TRIAGE_SCHEDULER_INTERVAL_MS") {
            self.scheduler.interval_ms = parse_u64("TRIAGE_SCHEDULER_INTERVAL_MS", &value)?;
        }

        if let Some(value) = read_env("TRIAGE_SECURITY_ENCRYPTION_KEY") {
            self.security.encryption_key = Some(secret_value(value));
        }

        let log_level = read_env("TRIAGE_LOGGING_LEVEL").or_else(|| read_env("TRIAGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TRIAGE_LOGGING_FORMAT").or_else(|| read_env("TRIAGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(slack_app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(slack_app_token);
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(tracker_token) = overrides.tracker_token {
            self.tracker.token = secret_value(tracker_token);
        }
        if let Some(default_repository) = overrides.default_repository {
            self.tracker.default_repository = Some(default_repository);
        }
        if let Some(confidence_threshold) = overrides.confidence_threshold {
            self.workflow.confidence_threshold = confidence_threshold;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_slack(&self.slack)?;
        validate_llm(&self.llm)?;
        validate_tracker(&self.tracker, &self.security)?;
        validate_workflow(&self.workflow)?;
        validate_scheduler(&self.scheduler)?;
        validate_reactions(&self.reactions)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("triage.toml"), PathBuf::from("config/triage.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret();
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens".to_string()
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    if !is_http_url(&slack.api_base) {
        return Err(ConfigError::Validation(
            "slack.api_base must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_tracker(tracker: &TrackerConfig, security: &SecurityConfig) -> Result<(), ConfigError> {
    if tracker.token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "tracker.token is required (a personal access token with `repo` scope)".to_string(),
        ));
    }

    if tracker.is_token_encrypted() && security.encryption_key.is_none() {
        return Err(ConfigError::Validation(
            "tracker.token is encrypted (`enc:`) but security.encryption_key is not set"
                .to_string(),
        ));
    }

    if tracker.default_repository.is_none() {
        return Err(ConfigError::Validation(
            "tracker.default_repository is required (`owner/name`)".to_string(),
        ));
    }
    tracker.repository()?;

    if !is_http_url(&tracker.api_base) {
        return Err(ConfigError::Validation(
            "tracker.api_base must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&workflow.confidence_threshold) {
        return Err(ConfigError::Validation(
            "workflow.confidence_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    if workflow.feedback_deletion_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "workflow.feedback_deletion_delay_ms must be greater than zero".to_string(),
        ));
    }

    if workflow.action_timeout_secs == 0 || workflow.action_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "workflow.action_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if workflow.max_concurrent_runs == 0 {
        return Err(ConfigError::Validation(
            "workflow.max_concurrent_runs must be greater than zero".to_string(),
        ));
    }

    if workflow.drain_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "workflow.drain_timeout_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_scheduler(scheduler: &SchedulerConfig) -> Result<(), ConfigError> {
    if scheduler.interval_ms < 1_000 {
        return Err(ConfigError::Validation(
            "scheduler.interval_ms must be at least 1000".to_string(),
        ));
    }

    if scheduler.context_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "scheduler.context_ttl_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_reactions(reactions: &ReactionConfig) -> Result<(), ConfigError> {
    if reactions.dismiss.trim().is_empty() || reactions.undo.trim().is_empty() {
        return Err(ConfigError::Validation(
            "reactions.dismiss and reactions.undo must not be empty".to_string(),
        ));
    }

    if crate::domain::reaction::same_reaction(&reactions.dismiss, &reactions.undo) {
        return Err(ConfigError::Validation(
            "reactions.dismiss and reactions.undo must be different emojis".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    slack: Option<SlackPatch>,
    llm: Option<LlmPatch>,
    tracker: Option<TrackerPatch>,
    workflow: Option<WorkflowPatch>,
    scheduler: Option<SchedulerPatch>,
    reactions: Option<ReactionPatch>,
    security: Option<SecurityPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    bot_user_id: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TrackerPatch {
    api_base: Option<String>,
    token: Option<String>,
    default_repository: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    confidence_threshold: Option<f64>,
    feedback_deletion_delay_ms: Option<u64>,
    action_timeout_secs: Option<u64>,
    max_concurrent_runs: Option<usize>,
    drain_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerPatch {
    interval_ms: Option<u64>,
    context_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ReactionPatch {
    dismiss: Option<String>,
    undo: Option<String>,
    analyzing: Option<String>,
    processing: Option<String>,
    error: Option<String>,
    unknown: Option<String>,
    success: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct SecurityPatch {
    encryption_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
