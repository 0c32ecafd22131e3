use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use triage_agent::FeedbackLifecycle;
use triage_db::CacheRepository;

/// Interval tasks that expire feedback replies and purge stale cache rows.
///
/// Both tasks tick on the same interval but run independently. `stop` must complete
/// before the database pool is closed.
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(
        feedback: Arc<FeedbackLifecycle>,
        cache: Arc<dyn CacheRepository>,
        interval: Duration,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(feedback_sweep(feedback, interval, shutdown.subscribe())),
            tokio::spawn(cache_purge(cache, interval, shutdown.subscribe())),
        ];
        info!(
            event_name = "system.scheduler.started",
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "background scheduler started"
        );
        Self { shutdown, tasks }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(error) = task.await {
                warn!(error = %error, "scheduler task ended abnormally");
            }
        }
        info!(event_name = "system.scheduler.stopped", "background scheduler stopped");
    }
}

fn ticker(interval: Duration) -> tokio::time::Interval {
    let period = interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn feedback_sweep(
    feedback: Arc<FeedbackLifecycle>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = ticker(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => return,
        }
        match feedback.sweep(Utc::now()).await {
            Ok(report) => debug!(due = report.due, deleted = report.deleted, "feedback sweep tick"),
            Err(error) => warn!(
                event_name = "scheduler.feedback_sweep_failed",
                error = %error,
                "feedback sweep could not list due messages"
            ),
        }
    }
}

async fn cache_purge(
    cache: Arc<dyn CacheRepository>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = ticker(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => return,
        }
        match cache.purge_expired(Utc::now()).await {
            Ok(report) if report.total() > 0 => info!(
                event_name = "scheduler.cache_purged",
                contexts = report.contexts,
                auth_sessions = report.auth_sessions,
                "expired cache rows purged"
            ),
            Ok(_) => {}
            Err(error) => warn!(
                event_name = "scheduler.cache_purge_failed",
                error = %error,
                "cache purge failed"
            ),
        }
    }
}
