mod bootstrap;
mod ingress;
mod queue;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use triage_core::config::{AppConfig, LoadOptions};
use triage_slack::events::workflow_dispatcher;
use triage_slack::socket::{ReconnectPolicy, SlackSocketTransport, SocketModeRunner};
use triage_slack::trigger::TriggerDetector;

use crate::ingress::{QueueTriggerSink, SpawningReactionSink};
use crate::queue::WorkQueue;
use crate::scheduler::Scheduler;

fn init_logging(config: &AppConfig) {
    use triage_core::config::LogFormat::*;

    // RUST_LOG wins over the configured level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let queue = Arc::new(WorkQueue::start(
        app.runtime.clone(),
        app.config.workflow.max_concurrent_runs,
    ));
    let scheduler = Scheduler::start(
        app.feedback.clone(),
        app.cache.clone(),
        Duration::from_millis(app.config.scheduler.interval_ms),
    );

    let reaction_sink = Arc::new(SpawningReactionSink::new(app.reactions.clone()));
    let dispatcher = workflow_dispatcher(
        TriggerDetector::new(app.config.slack.bot_user_id.clone()),
        Arc::new(QueueTriggerSink::new(queue.clone())),
        reaction_sink.clone(),
    );
    let transport = Arc::new(SlackSocketTransport::new(
        app.slack.clone(),
        app.config.slack.app_token.clone(),
    ));
    let runner = SocketModeRunner::new(transport, dispatcher, ReconnectPolicy::default());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut socket = tokio::spawn(async move { runner.run(shutdown_rx).await });

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        max_concurrent_runs = app.config.workflow.max_concurrent_runs,
        "triage-server started"
    );

    let socket_finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(signal_error) = signal {
                warn!(error = %signal_error, "could not listen for ctrl-c; shutting down");
            }
            false
        }
        joined = &mut socket => {
            match joined {
                Ok(Ok(())) => warn!(event_name = "system.server.socket_stopped", "socket mode runner stopped"),
                Ok(Err(runner_error)) => error!(
                    event_name = "system.server.socket_failed",
                    error = %runner_error,
                    "socket mode runner gave up"
                ),
                Err(join_error) => error!(error = %join_error, "socket mode task panicked"),
            }
            true
        }
    };

    info!(event_name = "system.server.stopping", correlation_id = "shutdown", "triage-server stopping");

    let _ = shutdown_tx.send(true);
    if !socket_finished {
        if let Err(join_error) = socket.await {
            warn!(error = %join_error, "socket mode task ended abnormally");
        }
    }

    scheduler.stop().await;
    let drain = Duration::from_secs(app.config.workflow.drain_timeout_secs);
    let report = queue.shutdown(drain).await;
    if report.aborted > 0 {
        warn!(aborted = report.aborted, "workflow runs aborted at shutdown");
    }
    let aborted_reactions = reaction_sink.shutdown(drain).await;
    if aborted_reactions > 0 {
        warn!(aborted = aborted_reactions, "reaction handling aborted at shutdown");
    }
    app.db_pool.close().await;

    info!(event_name = "system.server.stopped", correlation_id = "shutdown", "triage-server stopped");
    Ok(())
}
