use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use triage_agent::audit::TracingAuditSink;
use triage_agent::FeedbackLifecycle;
use triage_db::SqlFeedbackRepository;
use triage_slack::web::SlackWebClient;

use crate::commands::{block_on, load_config, open_pool, CommandResult};

/// Runs a single feedback expiry pass outside the server, e.g. after downtime.
pub fn run() -> CommandResult {
    let config = match load_config("sweep") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let result = block_on("sweep", async {
        let chat = SlackWebClient::new(
            &config.slack.api_base,
            config.slack.bot_token.clone(),
            Duration::from_secs(config.workflow.action_timeout_secs.max(1)),
        )
        .map_err(|error| ("chat_client", error.to_string(), 6u8))?;
        let pool = open_pool(&config).await?;
        let lifecycle = FeedbackLifecycle::new(
            Arc::new(chat),
            Arc::new(SqlFeedbackRepository::new(pool.clone())),
            Arc::new(TracingAuditSink),
        );
        let swept = lifecycle.sweep(Utc::now()).await;
        pool.close().await;
        swept.map_err(|error| ("repository", error.to_string(), 6u8))
    });

    match result {
        Ok(report) => CommandResult::success_with(
            "sweep",
            format!("deleted {} of {} due feedback message(s)", report.deleted, report.due),
            Some(json!({ "due": report.due, "deleted": report.deleted, "failed": report.failed })),
        ),
        Err(failure) => failure,
    }
}
