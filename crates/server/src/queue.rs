use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use triage_agent::WorkflowRuntime;
use triage_core::domain::trigger::{Priority, TriggerMessage};

/// Executes one admitted trigger to completion.
#[async_trait]
pub trait RunHandler: Send + Sync {
    async fn handle(&self, trigger: TriggerMessage);
}

#[async_trait]
impl RunHandler for WorkflowRuntime {
    async fn handle(&self, trigger: TriggerMessage) {
        self.run(trigger).await;
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("work queue is shutting down")]
pub struct QueueClosed;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Queued triggers that never started.
    pub dropped: usize,
    pub in_flight: usize,
    /// Runs still going when the drain window closed.
    pub aborted: usize,
}

#[derive(Default)]
struct Pending {
    mentions: VecDeque<TriggerMessage>,
    hashtags: VecDeque<TriggerMessage>,
    closed: bool,
}

impl Pending {
    fn pop(&mut self) -> Option<TriggerMessage> {
        self.mentions.pop_front().or_else(|| self.hashtags.pop_front())
    }

    fn len(&self) -> usize {
        self.mentions.len() + self.hashtags.len()
    }
}

struct Shared {
    pending: Mutex<Pending>,
    wake: Notify,
    slots: Arc<Semaphore>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Two-tier FIFO in front of a concurrency limit. Mentions are admitted before
/// hashtag-only triggers whenever a slot frees up; nothing is ever rejected while open.
pub struct WorkQueue {
    shared: Arc<Shared>,
    dispatcher: tokio::sync::Mutex<Option<JoinHandle<JoinSet<()>>>>,
}

impl WorkQueue {
    pub fn start(handler: Arc<dyn RunHandler>, max_concurrent: usize) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(Pending::default()),
            wake: Notify::new(),
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
        });
        let dispatcher = tokio::spawn(dispatch(shared.clone(), handler));
        Self { shared, dispatcher: tokio::sync::Mutex::new(Some(dispatcher)) }
    }

    pub fn submit(&self, trigger: TriggerMessage) -> Result<(), QueueClosed> {
        {
            let mut pending = self.shared.pending();
            if pending.closed {
                return Err(QueueClosed);
            }
            debug!(
                correlation_id = %trigger.correlation_id(),
                priority = ?trigger.priority(),
                queued = pending.len(),
                "trigger queued"
            );
            match trigger.priority() {
                Priority::Mention => pending.mentions.push_back(trigger),
                Priority::Hashtag => pending.hashtags.push_back(trigger),
            }
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.shared.pending().len()
    }

    /// Stops admission, drops queued triggers, then waits up to `drain` for running
    /// triggers before aborting them.
    pub async fn shutdown(&self, drain: Duration) -> DrainReport {
        let dropped = {
            let mut pending = self.shared.pending();
            pending.closed = true;
            let dropped = pending.len();
            pending.mentions.clear();
            pending.hashtags.clear();
            dropped
        };
        self.shared.slots.close();
        self.shared.wake.notify_one();

        let Some(dispatcher) = self.dispatcher.lock().await.take() else {
            return DrainReport { dropped, ..DrainReport::default() };
        };
        let mut running = match dispatcher.await {
            Ok(running) => running,
            Err(error) => {
                warn!(error = %error, "work queue dispatcher ended abnormally");
                return DrainReport { dropped, ..DrainReport::default() };
            }
        };

        let in_flight = running.len();
        let drained = tokio::time::timeout(drain, async {
            while running.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        let aborted = if drained {
            0
        } else {
            let remaining = running.len();
            running.abort_all();
            while running.join_next().await.is_some() {}
            remaining
        };

        let report = DrainReport { dropped, in_flight, aborted };
        info!(
            event_name = "system.queue.drained",
            dropped = report.dropped,
            in_flight = report.in_flight,
            aborted = report.aborted,
            "work queue stopped"
        );
        report
    }
}

async fn dispatch(shared: Arc<Shared>, handler: Arc<dyn RunHandler>) -> JoinSet<()> {
    let mut running = JoinSet::new();

    loop {
        let Ok(slot) = shared.slots.clone().acquire_owned().await else {
            break;
        };
        let Some(trigger) = next_trigger(&shared).await else {
            break;
        };

        let handler = handler.clone();
        running.spawn(async move {
            let _slot = slot;
            handler.handle(trigger).await;
        });
        while running.try_join_next().is_some() {}
    }
    running
}

async fn next_trigger(shared: &Shared) -> Option<TriggerMessage> {
    loop {
        {
            let mut pending = shared.pending();
            if pending.closed {
                return None;
            }
            if let Some(trigger) = pending.pop() {
                return Some(trigger);
            }
        }
        shared.wake.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use triage_core::domain::chat::{ChatRef, MessageRef, UserRef};
    use triage_core::domain::trigger::TriggerMessage;

    use super::{DrainReport, QueueClosed, RunHandler, WorkQueue};

    /// Records start order and holds each run until a gate permit is released.
    struct GatedHandler {
        started: Mutex<Vec<String>>,
        gate: Semaphore,
    }

    impl GatedHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self { started: Mutex::new(Vec::new()), gate: Semaphore::new(0) })
        }

        fn started(&self) -> Vec<String> {
            self.started.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl RunHandler for GatedHandler {
        async fn handle(&self, trigger: TriggerMessage) {
            self.started.lock().expect("lock").push(trigger.text.clone());
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn trigger(text: &str, mentioned: bool) -> TriggerMessage {
        TriggerMessage {
            chat_ref: ChatRef("C1".to_owned()),
            message_ref: MessageRef(format!("ts-{text}")),
            user_ref: UserRef("U1".to_owned()),
            text: text.to_owned(),
            hashtags: if mentioned { Vec::new() } else { vec!["bug".to_owned()] },
            mentioned,
        }
    }

    async fn wait_for_starts(handler: &GatedHandler, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while handler.started().len() < count {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("runs should start");
    }

    #[tokio::test]
    async fn mentions_jump_ahead_of_queued_hashtags() {
        let handler = GatedHandler::new();
        let queue = WorkQueue::start(handler.clone(), 1);

        queue.submit(trigger("first-hashtag", false)).expect("open");
        wait_for_starts(&handler, 1).await;
        queue.submit(trigger("second-hashtag", false)).expect("open");
        queue.submit(trigger("mention", true)).expect("open");
        assert_eq!(queue.pending(), 2);

        handler.gate.add_permits(3);
        wait_for_starts(&handler, 3).await;

        assert_eq!(handler.started(), vec!["first-hashtag", "mention", "second-hashtag"]);
    }

    #[tokio::test]
    async fn never_runs_more_than_the_limit() {
        let handler = GatedHandler::new();
        let queue = WorkQueue::start(handler.clone(), 2);

        for index in 0..5 {
            queue.submit(trigger(&format!("run-{index}"), false)).expect("open");
        }
        wait_for_starts(&handler, 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handler.started().len(), 2);
        assert_eq!(queue.pending(), 3);

        handler.gate.add_permits(5);
        wait_for_starts(&handler, 5).await;
    }

    #[tokio::test]
    async fn shutdown_drops_queue_and_aborts_runs_past_the_drain_window() {
        let handler = GatedHandler::new();
        let queue = WorkQueue::start(handler.clone(), 2);

        for index in 0..3 {
            queue.submit(trigger(&format!("stuck-{index}"), false)).expect("open");
        }
        wait_for_starts(&handler, 2).await;

        let report = queue.shutdown(Duration::from_millis(50)).await;

        assert_eq!(report, DrainReport { dropped: 1, in_flight: 2, aborted: 2 });
        assert_eq!(queue.submit(trigger("late", true)), Err(QueueClosed));
    }

    #[tokio::test]
    async fn shutdown_waits_for_runs_that_finish_in_time() {
        let handler = GatedHandler::new();
        let queue = WorkQueue::start(handler.clone(), 2);

        queue.submit(trigger("quick", false)).expect("open");
        wait_for_starts(&handler, 1).await;
        handler.gate.add_permits(1);

        let report = queue.shutdown(Duration::from_secs(5)).await;

        assert_eq!(report.aborted, 0);
        assert_eq!(report.dropped, 0);
    }
}
