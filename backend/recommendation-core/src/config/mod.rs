use crate::error::{RecommendationError, Result};
use crate::models::TrendingWindow;
use crate::services::scoring::{
    DEFAULT_GLOBAL_DECAY, DEFAULT_HALF_LIFE_DAYS, DEFAULT_UPDATE_DECAY,
};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub scoring: ScoringConfig,
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
    pub jobs: JobsConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    pub env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Which scoring variant warm users get by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Blended,
    Personalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiversityKind {
    BoardDecay,
    Penalty,
}

/// `SCORING_*`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub half_life_days: f64,
    /// Decay applied to an existing weight on each interaction
    pub update_decay: f64,
    /// Decay applied by the periodic job
    pub global_decay: f64,
    pub prune_threshold: f64,
    pub max_interests: usize,
    pub warm_strategy: StrategyKind,
    pub diversity: DiversityKind,
    pub penalty_scale: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            half_life_days: DEFAULT_HALF_LIFE_DAYS,
            update_decay: DEFAULT_UPDATE_DECAY,
            global_decay: DEFAULT_GLOBAL_DECAY,
            prune_threshold: 0.01,
            max_interests: 50,
            warm_strategy: StrategyKind::Personalized,
            diversity: DiversityKind::BoardDecay,
            penalty_scale: 0.05,
        }
    }
}

/// `RETRIEVAL_*`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Budget for each collaborator call
    pub timeout_ms: u64,
    /// Budget for computing a personalized list inline on a cache miss
    pub request_timeout_ms: u64,
    pub default_window: TrendingWindow,
    pub interaction_history_limit: usize,
    /// Posts fetched per trending bucket
    pub trending_limit: usize,
    pub embedding_enabled: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 500,
            request_timeout_ms: 800,
            default_window: TrendingWindow::Daily,
            interaction_history_limit: 200,
            trending_limit: 200,
            embedding_enabled: false,
        }
    }
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// `CACHE_*` TTL tiers, in seconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub personalized_ttl_secs: u64,
    pub new_ttl_secs: u64,
    pub daily_ttl_secs: u64,
    pub weekly_ttl_secs: u64,
    pub all_time_ttl_secs: u64,
    pub embedding_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            personalized_ttl_secs: 300, // 5 minutes
            new_ttl_secs: 3600,         // 1 hour
            daily_ttl_secs: 3 * 3600,
            weekly_ttl_secs: 12 * 3600,
            all_time_ttl_secs: 24 * 3600,
            embedding_ttl_secs: 3600,
        }
    }
}

impl CacheConfig {
    pub fn personalized_ttl(&self) -> Duration {
        Duration::from_secs(self.personalized_ttl_secs)
    }

    pub fn trending_ttl(&self, window: TrendingWindow) -> Duration {
        Duration::from_secs(match window {
            TrendingWindow::New => self.new_ttl_secs,
            TrendingWindow::Daily => self.daily_ttl_secs,
            TrendingWindow::Weekly => self.weekly_ttl_secs,
            TrendingWindow::AllTime => self.all_time_ttl_secs,
        })
    }

    pub fn embedding_ttl(&self) -> Duration {
        Duration::from_secs(self.embedding_ttl_secs)
    }
}

/// `JOBS_*`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub decay_interval_secs: u64,
    pub trending_refresh_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            decay_interval_secs: 24 * 3600,
            trending_refresh_interval_secs: 3600,
        }
    }
}

/// `QUEUE_*`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

impl JobsConfig {
    pub fn decay_interval(&self) -> Duration {
        Duration::from_secs(self.decay_interval_secs.max(1))
    }

    pub fn trending_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.trending_refresh_interval_secs.max(1))
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            service: ServiceConfig {
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "recommendation-worker".to_string()),
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .map_err(|_| RecommendationError::Config("DATABASE_URL must be set".into()))?,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            scoring: envy::prefixed("SCORING_").from_env()?,
            retrieval: envy::prefixed("RETRIEVAL_").from_env()?,
            cache: envy::prefixed("CACHE_").from_env()?,
            jobs: envy::prefixed("JOBS_").from_env()?,
            queue: envy::prefixed("QUEUE_").from_env()?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| RecommendationError::Config(format!("{} has an invalid value", name))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let scoring = ScoringConfig::default();
        assert_eq!(scoring.update_decay, 0.9);
        assert_eq!(scoring.global_decay, 0.98);
        assert_eq!(scoring.warm_strategy, StrategyKind::Personalized);

        let cache = CacheConfig::default();
        assert_eq!(cache.personalized_ttl(), Duration::from_secs(300));
        assert!(cache.trending_ttl(TrendingWindow::New) >= Duration::from_secs(3600));
        assert!(
            cache.trending_ttl(TrendingWindow::AllTime) > cache.trending_ttl(TrendingWindow::Daily)
        );
    }

    #[test]
    fn test_prefixed_overrides() {
        let vars = vec![
            ("SCORING_HALF_LIFE_DAYS".to_string(), "7".to_string()),
            ("SCORING_WARM_STRATEGY".to_string(), "blended".to_string()),
        ];
        let scoring: ScoringConfig = envy::prefixed("SCORING_").from_iter(vars).unwrap();
        assert_eq!(scoring.half_life_days, 7.0);
        assert_eq!(scoring.warm_strategy, StrategyKind::Blended);
        // untouched fields keep their defaults
        assert_eq!(scoring.max_interests, 50);
    }
}
