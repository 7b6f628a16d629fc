use super::RecommendationEngine;
use crate::jobs::task_queue::{
    create_task_queue, spawn_task_worker, BackgroundTask, TaskQueue, WorkerStats,
};
use crate::models::{InteractionEvent, RankedResult, UserId};
use crate::services::ranking::ScoringStrategy;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Upper bound on results per request
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct RecommendRequest {
    pub user_id: Option<UserId>,
    pub limit: usize,
    /// Overrides the default strategy; overridden requests bypass the per-user cache
    pub strategy: Option<ScoringStrategy>,
}

impl RecommendRequest {
    pub fn anonymous(limit: usize) -> Self {
        Self {
            user_id: None,
            limit,
            strategy: None,
        }
    }

    pub fn for_user(user_id: UserId, limit: usize) -> Self {
        Self {
            user_id: Some(user_id),
            limit,
            strategy: None,
        }
    }

    pub fn with_strategy(mut self, strategy: ScoringStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}

/// Request-path facade: cache first, bounded inline compute, background work via the task queue
#[derive(Clone)]
pub struct RecommendationService {
    engine: Arc<RecommendationEngine>,
    queue: TaskQueue,
    request_timeout: Duration,
}

impl RecommendationService {
    pub fn new(engine: Arc<RecommendationEngine>, queue: TaskQueue) -> Self {
        let request_timeout = engine.settings().retrieval.request_timeout();
        Self {
            engine,
            queue,
            request_timeout,
        }
    }

    /// Build the service together with its in-process task worker.
    /// The worker drains until every clone of the service is dropped.
    pub fn spawn(
        engine: Arc<RecommendationEngine>,
        queue_capacity: usize,
    ) -> (Self, JoinHandle<WorkerStats>) {
        let (queue, receiver) = create_task_queue(queue_capacity);
        let worker = spawn_task_worker(engine.clone(), receiver);
        (Self::new(engine, queue), worker)
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn engine(&self) -> &Arc<RecommendationEngine> {
        &self.engine
    }

    /// Ranked posts for the request. Never fails; the worst case is an empty list.
    pub async fn recommend(&self, request: RecommendRequest) -> Vec<RankedResult> {
        let limit = request.limit.clamp(1, MAX_LIMIT);

        let Some(user_id) = request.user_id else {
            return self.engine.cold_recommendations(limit).await;
        };

        let cache = self.engine.cache();
        if request.strategy.is_none() {
            if let Some(mut cached) = cache.get(user_id).await {
                cached.truncate(limit);
                return cached;
            }
        }

        let version = cache.interest_version(user_id).await;
        let computed = timeout(
            self.request_timeout,
            self.engine.compute(Some(user_id), limit, request.strategy),
        )
        .await;

        match computed {
            Ok(computed) => {
                if request.strategy.is_none() {
                    let ttl = self.engine.ttl_for(computed.path);
                    cache
                        .put_if_current(user_id, &computed.results, ttl, version)
                        .await;
                }
                computed.results
            }
            Err(_) => {
                warn!(
                    user_id = %user_id,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Recommendation compute timed out, serving cold start"
                );
                self.queue
                    .submit(BackgroundTask::RefreshRecommendations { user_id, limit });
                self.engine.cold_recommendations(limit).await
            }
        }
    }

    /// Queue an interest update. Returns immediately; `false` when the queue rejected it.
    pub fn record_interaction(&self, event: InteractionEvent) -> bool {
        debug!(
            user_id = %event.user_id,
            post_id = %event.post_id,
            interaction = %event.interaction_type,
            "Queueing interaction"
        );
        self.queue.submit(BackgroundTask::RecordInteraction(event))
    }

    /// Queue a cache invalidation for the user
    pub fn invalidate(&self, user_id: UserId) -> bool {
        self.queue.submit(BackgroundTask::Invalidate(user_id))
    }
}
