// ============================================
// Background Jobs Module (後台任務模組)
// ============================================
//
// Contains background runners for:
// 1. The task queue worker (interest updates, refreshes, invalidations)
// 2. Global interest decay
// 3. Trending pool refresh
//
// The periodic jobs can be triggered via:
// - CronJob (Kubernetes): `recommendation-worker decay` / `refresh-trending`
// - The long-running `recommendation-worker worker` process

pub mod interest_decay;
pub mod task_queue;
pub mod trending_refresh;

pub use interest_decay::{DecayOutcome, InterestDecayJob};
pub use task_queue::{
    create_task_queue, spawn_task_worker, BackgroundTask, TaskQueue, TaskReceiver, WorkerStats,
};
pub use trending_refresh::{TrendingRefreshJob, TrendingRefreshStats};
