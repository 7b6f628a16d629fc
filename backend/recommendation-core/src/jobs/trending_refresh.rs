//! Trending Refresh Background Job
//!
//! Rebuilds the cached trending pool for every window and drops the
//! cold-start segment derived from it, so new users see fresh content
//! without the request path ever querying the post store for trending.
//!
//! Overwrites are idempotent; running twice in a row only costs queries.

use crate::models::TrendingWindow;
use crate::services::recommendation::RecommendationEngine;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrendingRefreshStats {
    pub windows_refreshed: usize,
    pub windows_failed: usize,
    pub posts: usize,
}

pub struct TrendingRefreshJob {
    engine: Arc<RecommendationEngine>,
    interval: Duration,
}

impl TrendingRefreshJob {
    pub fn new(engine: Arc<RecommendationEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    /// Refresh every window once. A failing window does not stop the others.
    pub async fn run_once(&self) -> TrendingRefreshStats {
        let mut stats = TrendingRefreshStats::default();

        for window in TrendingWindow::ALL {
            match self.engine.refresh_trending(window).await {
                Ok(count) => {
                    stats.windows_refreshed += 1;
                    stats.posts += count;
                }
                Err(e) => {
                    stats.windows_failed += 1;
                    warn!(window = %window, error = %e, "Trending refresh failed");
                }
            }
        }

        stats
    }

    /// Run forever, one pass per interval
    pub async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting trending refresh job"
        );

        loop {
            let started = Instant::now();
            let stats = self.run_once().await;
            info!(
                refreshed = stats.windows_refreshed,
                failed = stats.windows_failed,
                posts = stats.posts,
                duration_ms = started.elapsed().as_millis() as u64,
                "Trending refresh cycle completed"
            );

            sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Post;
    use crate::services::cache::keys;
    use crate::services::recommendation::{Collaborators, EngineSettings};
    use crate::store::{
        Cache, InMemoryCache, InMemoryInteractionLog, InMemoryInterestRepository,
        InMemoryPostStore,
    };
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    fn setup() -> (TrendingRefreshJob, Arc<InMemoryPostStore>, Arc<InMemoryCache>) {
        let posts = Arc::new(InMemoryPostStore::new());
        let cache = Arc::new(InMemoryCache::new());
        let log = Arc::new(InMemoryInteractionLog::new());
        let engine = Arc::new(RecommendationEngine::new(
            Collaborators {
                posts: posts.clone(),
                interactions: log.clone(),
                activity: log,
                interests: Arc::new(InMemoryInterestRepository::new()),
                cache: cache.clone(),
                embedding: None,
            },
            EngineSettings::default(),
        ));
        (
            TrendingRefreshJob::new(engine, Duration::from_secs(3600)),
            posts,
            cache,
        )
    }

    fn post(age_hours: i64) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            board_id: Uuid::new_v4(),
            created_at: Utc::now() - ChronoDuration::hours(age_hours),
            view_count: 10,
            like_count: 1,
            comment_count: 0,
            tag_ids: vec![],
            topic_id: None,
            content: None,
        }
    }

    #[tokio::test]
    async fn test_refreshes_every_window() {
        let (job, posts, cache) = setup();
        posts.insert(post(1));
        posts.insert(post(48));
        cache
            .set(
                &keys::cold_recommendations(TrendingWindow::Daily),
                "[]",
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        let stats = job.run_once().await;

        assert_eq!(stats.windows_refreshed, 4);
        assert_eq!(stats.windows_failed, 0);
        // New: 1, Daily: 1, Weekly: 2, AllTime: 2
        assert_eq!(stats.posts, 6);
        for window in TrendingWindow::ALL {
            assert!(cache.contains_key(&keys::trending(window)));
        }
        assert!(!cache.contains_key(&keys::cold_recommendations(TrendingWindow::Daily)));
    }

    #[tokio::test]
    async fn test_outage_counts_failures() {
        let (job, posts, _cache) = setup();
        posts.set_unavailable(true);

        let stats = job.run_once().await;
        assert_eq!(stats.windows_refreshed, 0);
        assert_eq!(stats.windows_failed, 4);
    }
}
