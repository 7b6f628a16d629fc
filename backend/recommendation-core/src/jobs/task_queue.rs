/// Background task queue for work triggered off the request path
///
/// Interest updates, recommendation refreshes and cache invalidations are
/// submitted here and executed by a worker task, so the request that caused
/// them never waits on them and never fails because of them.
///
/// Architecture:
/// - Bounded MPSC channel; `submit` never blocks
/// - A full queue rejects the task with a warning (explicit backpressure)
/// - Tasks for the same queue are executed in submission order
/// - Task failures are logged and counted, never propagated
/// - The worker exits once every `TaskQueue` handle has been dropped
use crate::error::Result;
use crate::models::{InteractionEvent, UserId};
use crate::services::recommendation::RecommendationEngine;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundTask {
    RecordInteraction(InteractionEvent),
    RefreshRecommendations { user_id: UserId, limit: usize },
    Invalidate(UserId),
}

impl BackgroundTask {
    pub fn kind(&self) -> &'static str {
        match self {
            BackgroundTask::RecordInteraction(_) => "record_interaction",
            BackgroundTask::RefreshRecommendations { .. } => "refresh_recommendations",
            BackgroundTask::Invalidate(_) => "invalidate",
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            BackgroundTask::RecordInteraction(event) => event.user_id,
            BackgroundTask::RefreshRecommendations { user_id, .. } => *user_id,
            BackgroundTask::Invalidate(user_id) => *user_id,
        }
    }
}

/// Task receiver, owned by the single worker
pub type TaskReceiver = mpsc::Receiver<BackgroundTask>;

/// Cloneable submission handle
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<BackgroundTask>,
}

/// Create a queue holding at most `capacity` pending tasks
pub fn create_task_queue(capacity: usize) -> (TaskQueue, TaskReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (TaskQueue { sender }, receiver)
}

impl TaskQueue {
    /// Enqueue without waiting. Returns `false` when the task was dropped.
    pub fn submit(&self, task: BackgroundTask) -> bool {
        match self.sender.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(task)) => {
                warn!(
                    task = task.kind(),
                    user_id = %task.user_id(),
                    "Background queue full, dropping task"
                );
                false
            }
            Err(TrySendError::Closed(task)) => {
                warn!(
                    task = task.kind(),
                    user_id = %task.user_id(),
                    "Background worker stopped, dropping task"
                );
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
}

/// Spawn the worker that drains the queue
///
/// # Returns
/// JoinHandle resolving to the worker's counters once the channel closes
pub fn spawn_task_worker(
    engine: Arc<RecommendationEngine>,
    mut receiver: TaskReceiver,
) -> JoinHandle<WorkerStats> {
    tokio::spawn(async move {
        info!("Background task worker started");
        let mut stats = WorkerStats::default();

        while let Some(task) = receiver.recv().await {
            stats.processed += 1;
            if let Err(e) = process_task(&engine, &task).await {
                stats.failed += 1;
                error!(
                    task = task.kind(),
                    user_id = %task.user_id(),
                    error = %e,
                    "Background task failed"
                );
            }
        }

        info!(
            processed = stats.processed,
            failed = stats.failed,
            "Background task worker stopped (channel closed)"
        );
        stats
    })
}

async fn process_task(engine: &RecommendationEngine, task: &BackgroundTask) -> Result<()> {
    match task {
        BackgroundTask::RecordInteraction(event) => {
            let updated = engine.record_interaction(event).await?;
            debug!(user_id = %event.user_id, updated, "Interaction applied");
        }
        BackgroundTask::RefreshRecommendations { user_id, limit } => {
            engine.refresh(*user_id, *limit).await;
        }
        BackgroundTask::Invalidate(user_id) => {
            engine.cache().invalidate(*user_id).await;
        }
    }
    Ok(())
}
