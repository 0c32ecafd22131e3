use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, info};

use triage_agent::ReactionController;
use triage_core::domain::reaction::ReactionEvent;
use triage_core::domain::trigger::TriggerMessage;
use triage_slack::events::{EventHandlerError, ReactionSink, TriggerSink};

use crate::queue::WorkQueue;

/// Admits detected triggers into the priority work queue.
pub struct QueueTriggerSink {
    queue: Arc<WorkQueue>,
}

impl QueueTriggerSink {
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl TriggerSink for QueueTriggerSink {
    async fn submit(&self, trigger: TriggerMessage) -> Result<(), EventHandlerError> {
        self.queue
            .submit(trigger)
            .map_err(|closed| EventHandlerError::TriggerRejected(closed.to_string()))
    }
}

/// Applies one reaction change (undo, dismiss) to completion.
#[async_trait]
pub trait ReactionProcessor: Send + Sync {
    async fn process(&self, event: ReactionEvent);
}

#[async_trait]
impl ReactionProcessor for ReactionController {
    async fn process(&self, event: ReactionEvent) {
        let outcome = self.handle(&event).await;
        debug!(
            message_ref = %event.message_ref,
            matched = outcome.matched,
            "reaction handled"
        );
    }
}

#[derive(Default)]
struct ReactionTasks {
    running: JoinSet<()>,
    closed: bool,
}

/// Handles each reaction change on its own task so undo never stalls the socket loop.
/// Tasks stay tracked until [`SpawningReactionSink::shutdown`] drains them.
pub struct SpawningReactionSink {
    processor: Arc<dyn ReactionProcessor>,
    tasks: Mutex<ReactionTasks>,
}

impl SpawningReactionSink {
    pub fn new(processor: Arc<dyn ReactionProcessor>) -> Self {
        Self { processor, tasks: Mutex::new(ReactionTasks::default()) }
    }

    fn tasks(&self) -> MutexGuard<'_, ReactionTasks> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.tasks().running.len()
    }

    /// Refuses new reactions, waits up to `drain` for running ones, then aborts the
    /// rest. Returns how many were aborted.
    pub async fn shutdown(&self, drain: Duration) -> usize {
        let mut running = {
            let mut tasks = self.tasks();
            tasks.closed = true;
            mem::take(&mut tasks.running)
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

        info!(
            event_name = "system.reactions.drained",
            in_flight,
            aborted,
            "reaction handling stopped"
        );
        aborted
    }
}

#[async_trait]
impl ReactionSink for SpawningReactionSink {
    async fn submit(&self, event: ReactionEvent) -> Result<(), EventHandlerError> {
        let mut tasks = self.tasks();
        if tasks.closed {
            return Err(EventHandlerError::ReactionRejected("shutting down".to_owned()));
        }
        while tasks.running.try_join_next().is_some() {}

        let processor = self.processor.clone();
        tasks.running.spawn(async move { processor.process(event).await });
        Ok(())
    }
}
