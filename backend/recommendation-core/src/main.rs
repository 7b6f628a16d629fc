//! Recommendation Worker
//!
//! Runs the background side of the recommendation core:
//!
//! - `worker` (default): the decay and trending loops, until ctrl-c
//! - `decay`: one interest decay pass for the current bucket, then exit
//! - `refresh-trending`: one trending refresh pass, then exit
//!
//! Environment variables:
//! - DATABASE_URL: PostgreSQL URL (required)
//! - REDIS_URL: Redis URL (default: redis://localhost:6379)
//! - LOG_FORMAT: `json` for JSON log lines
//! - RUST_LOG: tracing filter (default: info)
//! - SCORING_*, RETRIEVAL_*, CACHE_*, JOBS_*: tunables
//!
//! The background task queue is in-process: it belongs to whichever process
//! serves requests, via `RecommendationService::spawn`.

use anyhow::{bail, Context};
use recommendation_core::jobs::{DecayOutcome, InterestDecayJob, TrendingRefreshJob};
use recommendation_core::store::{PgInterestRepository, PgPostStore, RedisCache};
use recommendation_core::{Collaborators, Config, EngineSettings, RecommendationEngine};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Worker,
    Decay,
    RefreshTrending,
}

impl Mode {
    fn from_args() -> anyhow::Result<Self> {
        let mut args = std::env::args();
        let _bin = args.next();

        match args.next().as_deref() {
            None | Some("worker") => Ok(Mode::Worker),
            Some("decay") => Ok(Mode::Decay),
            Some("refresh-trending") => Ok(Mode::RefreshTrending),
            Some(other) => bail!(
                "unknown mode '{}', expected one of: worker, decay, refresh-trending",
                other
            ),
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mode = Mode::from_args()?;
    let config = Config::from_env().context("Failed to load config")?;

    info!(
        service = %config.service.service_name,
        env = %config.service.env,
        mode = ?mode,
        "Starting recommendation worker"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let cache = RedisCache::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    if let Err(e) = cache.ping().await {
        warn!(error = %e, "Redis health probe failed, continuing with degraded cache");
    }

    let posts = Arc::new(PgPostStore::new(pool.clone()));
    let collaborators = Collaborators {
        posts: posts.clone(),
        interactions: posts.clone(),
        activity: posts,
        interests: Arc::new(PgInterestRepository::new(pool)),
        cache: Arc::new(cache),
        embedding: None,
    };
    if config.retrieval.embedding_enabled {
        warn!("RETRIEVAL_EMBEDDING_ENABLED is set but no embedding service is wired into this binary");
    }

    let engine = Arc::new(RecommendationEngine::new(
        collaborators,
        EngineSettings::from(&config),
    ));
    let decay_job = InterestDecayJob::new(engine.clone(), config.jobs.decay_interval());
    let trending_job = TrendingRefreshJob::new(engine, config.jobs.trending_refresh_interval());

    match mode {
        Mode::Decay => match decay_job.run_once().await? {
            DecayOutcome::Applied(report) => info!(
                scaled = report.scaled,
                pruned = report.pruned,
                "Interest decay finished"
            ),
            DecayOutcome::AlreadyApplied => info!("Interest decay already applied, nothing to do"),
        },
        Mode::RefreshTrending => {
            let stats = trending_job.run_once().await;
            info!(
                refreshed = stats.windows_refreshed,
                failed = stats.windows_failed,
                posts = stats.posts,
                "Trending refresh finished"
            );
            if stats.windows_failed > 0 {
                bail!("{} trending window(s) failed to refresh", stats.windows_failed);
            }
        }
        Mode::Worker => {
            let decay = tokio::spawn(decay_job.run());
            let trending = tokio::spawn(trending_job.run());

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");

            decay.abort();
            trending.abort();
        }
    }

    Ok(())
}
