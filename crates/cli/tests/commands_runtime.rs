use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use triage_cli::commands::operations::OperationFilter;
use triage_cli::commands::{migrate, operations, sweep};
use triage_core::domain::action::{RepositoryRef, ResultRef};
use triage_core::domain::chat::{ChatRef, MessageRef};
use triage_core::domain::operation::{ActionType, NewOperation, OperationStatus};
use triage_db::{connect, migrations, OperationRepository, SqlOperationRepository};

const VALID_ENV: [(&str, &str); 4] = [
    ("TRIAGE_SLACK_APP_TOKEN", "xapp-test"),
    ("TRIAGE_SLACK_BOT_TOKEN", "xoxb-test"),
    ("TRIAGE_TRACKER_TOKEN", "ghp_test"),
    ("TRIAGE_TRACKER_DEFAULT_REPOSITORY", "acme/widgets"),
];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_valid_env("sqlite::memory:", || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_tokens() {
    with_env(&[("TRIAGE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn operations_lists_by_status_and_group() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = database_url(&dir.path().join("triage.db"));
    seed_operations(&url);

    with_valid_env(&url, || {
        let completed = operations::run(OperationFilter::Status("completed".to_string()), 10);
        assert_eq!(completed.exit_code, 0, "{}", completed.output);
        let payload = parse_payload(&completed.output);
        let listed = payload["data"].as_array().expect("operation list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["action_type"], "create_issue");
        assert_eq!(listed[0]["result_ref"], "acme/widgets#42");

        let by_group = operations::run(OperationFilter::Group("C-triage".to_string()), 10);
        let payload = parse_payload(&by_group.output);
        assert_eq!(payload["data"].as_array().expect("operation list").len(), 2);
    });
}

#[test]
fn operations_rejects_unknown_status() {
    with_valid_env("sqlite::memory:", || {
        let result = operations::run(OperationFilter::Status("archived".to_string()), 10);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "invalid_argument");
    });
}

#[test]
fn sweep_with_nothing_due_reports_zero() {
    with_valid_env("sqlite::memory:", || {
        let result = sweep::run();
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sweep");
        assert_eq!(payload["data"]["due"], 0);
        assert_eq!(payload["data"]["deleted"], 0);
    });
}

fn seed_operations(url: &str) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    runtime.block_on(async {
        let pool = connect(url).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let repository = SqlOperationRepository::new(pool.clone());

        repository
            .create(NewOperation {
                group_id: ChatRef("C-triage".to_string()),
                source_message_id: MessageRef("1730000000.000100".to_string()),
                action_type: ActionType::CreateIssue,
                status: OperationStatus::Completed,
                result_ref: Some(ResultRef {
                    repository: RepositoryRef::new("acme", "widgets"),
                    number: Some(42),
                    url: None,
                }),
                prior_state: None,
            })
            .await
            .expect("create");
        let closed = repository
            .create(NewOperation {
                group_id: ChatRef("C-triage".to_string()),
                source_message_id: MessageRef("1730000000.000200".to_string()),
                action_type: ActionType::CloseIssue,
                status: OperationStatus::Completed,
                result_ref: None,
                prior_state: None,
            })
            .await
            .expect("create");
        repository.update_status(&closed.id, OperationStatus::Undone).await.expect("undo");
        pool.close().await;
    });
}

fn database_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_valid_env(database_url: &str, test_fn: impl FnOnce()) {
    let mut vars: Vec<(&str, &str)> = VALID_ENV.to_vec();
    vars.push(("TRIAGE_DATABASE_URL", database_url));
    with_env(&vars, test_fn);
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "TRIAGE_DATABASE_URL",
        "TRIAGE_DATABASE_MAX_CONNECTIONS",
        "TRIAGE_DATABASE_TIMEOUT_SECS",
        "TRIAGE_SLACK_APP_TOKEN",
        "TRIAGE_SLACK_BOT_TOKEN",
        "TRIAGE_SLACK_BOT_USER_ID",
        "TRIAGE_LLM_PROVIDER",
        "TRIAGE_LLM_API_KEY",
        "TRIAGE_LLM_BASE_URL",
        "TRIAGE_LLM_MODEL",
        "TRIAGE_TRACKER_TOKEN",
        "TRIAGE_TRACKER_DEFAULT_REPOSITORY",
        "TRIAGE_SECURITY_ENCRYPTION_KEY",
        "TRIAGE_LOGGING_LEVEL",
        "TRIAGE_LOGGING_FORMAT",
        "TRIAGE_LOG_LEVEL",
        "TRIAGE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
