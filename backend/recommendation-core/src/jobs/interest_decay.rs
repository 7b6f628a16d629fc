// ============================================
// Interest Decay Job (興趣衰減任務)
// ============================================
//
// Scales every stored interest weight by `global_decay` and prunes rows that
// fall below `prune_threshold`, once per run bucket.
//
// A bucket is `unix_seconds / interval_secs`; with the default daily interval
// that is one bucket per day. The first run in a bucket claims the guard key
// `jobs:interest_decay:<bucket>`; re-runs in the same bucket are no-ops, so an
// external scheduler may deliver the trigger more than once. A failed decay
// releases the guard so the next attempt can retry.
//
// Usage:
//   recommendation-worker decay

use crate::error::Result;
use crate::services::cache::keys;
use crate::services::interest_store::DecayReport;
use crate::services::recommendation::RecommendationEngine;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayOutcome {
    Applied(DecayReport),
    AlreadyApplied,
}

pub struct InterestDecayJob {
    engine: Arc<RecommendationEngine>,
    interval: Duration,
}

impl InterestDecayJob {
    pub fn new(engine: Arc<RecommendationEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    /// Bucket containing `now`
    pub fn bucket_for(&self, now: DateTime<Utc>) -> String {
        (now.timestamp().max(0) as u64 / self.interval.as_secs()).to_string()
    }

    /// Decay once for the bucket containing now
    pub async fn run_once(&self) -> Result<DecayOutcome> {
        let bucket = self.bucket_for(Utc::now());
        self.run_for_bucket(&bucket).await
    }

    pub async fn run_for_bucket(&self, bucket: &str) -> Result<DecayOutcome> {
        let guard = keys::decay_guard(bucket);
        let cache = self.engine.cache();

        // Guard outlives its bucket so a late duplicate still sees it
        if !cache.try_acquire_guard(&guard, self.interval * 2).await? {
            info!(bucket, "Interest decay already applied for bucket");
            return Ok(DecayOutcome::AlreadyApplied);
        }

        let interests = self.engine.interests();
        match interests.decay_all(interests.global_decay()).await {
            Ok(report) => Ok(DecayOutcome::Applied(report)),
            Err(e) => {
                cache.release_guard(&guard).await;
                Err(e)
            }
        }
    }

    /// Run forever, one pass per interval
    pub async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting interest decay job"
        );

        loop {
            let started = Instant::now();
            match self.run_once().await {
                Ok(DecayOutcome::Applied(report)) => {
                    info!(
                        scaled = report.scaled,
                        pruned = report.pruned,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Interest decay pass completed"
                    );
                }
                Ok(DecayOutcome::AlreadyApplied) => {}
                Err(e) => {
                    warn!(
                        error = %e,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Interest decay pass failed"
                    );
                }
            }

            sleep(self.interval).await;
        }
    }
}
