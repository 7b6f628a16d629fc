use super::Cache;
use crate::error::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::warn;

/// INCRBY and, when the increment created the key, EXPIRE in one atomic step
const INCR_WITH_EXPIRY: &str = r#"
    local value = redis.call('INCRBY', KEYS[1], ARGV[1])
    if value == tonumber(ARGV[1]) then
        redis.call('EXPIRE', KEYS[1], ARGV[2])
    end
    return value
"#;

/// [`Cache`] over a shared Redis connection manager
#[derive(Clone)]
pub struct RedisCache {
    client: ConnectionManager,
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { client: manager })
    }

    pub fn from_manager(client: ConnectionManager) -> Self {
        Self { client }
    }

    /// Health probe, used by the worker on startup
    pub async fn ping(&self) -> Result<()> {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.client.clone())
            .await
            .map_err(|e| {
                warn!("Redis PING failed: {}", e);
                e
            })?;
        Ok(())
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.client.clone())
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut self.client.clone())
            .await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        redis::cmd("DEL")
            .arg(keys)
            .query_async::<_, ()>(&mut self.client.clone())
            .await?;
        Ok(())
    }

    async fn incr(&self, key: &str, by: i64, ttl: Option<Duration>) -> Result<i64> {
        let mut conn = self.client.clone();
        let value: i64 = match ttl {
            Some(ttl) => {
                redis::Script::new(INCR_WITH_EXPIRY)
                    .key(key)
                    .arg(by)
                    .arg(ttl.as_secs().max(1))
                    .invoke_async(&mut conn)
                    .await?
            }
            None => {
                redis::cmd("INCRBY")
                    .arg(key)
                    .arg(by)
                    .query_async(&mut conn)
                    .await?
            }
        };
        Ok(value)
    }
}
