use crate::config::{CacheConfig, RetrievalConfig};
use crate::error::Result;
use crate::models::{Post, TrendingWindow};
use crate::services::cache::keys;
use crate::store::{Cache, PostStore};
use crate::utils::with_timeout;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Trending Pool - 熱門帖子池
/// Per-window trending lists, served from the cache and rebuilt from the post store on miss.
pub struct TrendingPool {
    posts: Arc<dyn PostStore>,
    cache: Arc<dyn Cache>,
    retrieval: RetrievalConfig,
    cache_config: CacheConfig,
}

impl TrendingPool {
    pub fn new(
        posts: Arc<dyn PostStore>,
        cache: Arc<dyn Cache>,
        retrieval: RetrievalConfig,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            posts,
            cache,
            retrieval,
            cache_config,
        }
    }

    /// Up to `max` trending posts for the window. Empty when both the cache and
    /// the post store are unavailable.
    pub async fn get(&self, window: TrendingWindow, max: usize) -> Vec<Post> {
        if let Some(mut cached) = self.read_cached(window).await {
            cached.truncate(max);
            return cached;
        }

        match self.refresh(window).await {
            Ok(mut posts) => {
                posts.truncate(max);
                posts
            }
            Err(e) => {
                warn!(window = %window, error = %e, "Trending posts unavailable");
                Vec::new()
            }
        }
    }

    /// Rebuild the window's list from the post store and overwrite the cached copy
    pub async fn refresh(&self, window: TrendingWindow) -> Result<Vec<Post>> {
        let fetched = with_timeout(
            self.retrieval.timeout(),
            self.posts
                .query_trending(window, self.retrieval.trending_limit),
        )
        .await?;
        let posts = sort_trending(fetched);

        if !posts.is_empty() {
            let ttl = self.cache_config.trending_ttl(window);
            let stored = match serde_json::to_string(&posts) {
                Ok(json) => self.cache.set(&keys::trending(window), &json, ttl).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = stored {
                warn!(window = %window, error = %e, "Failed to cache trending posts");
            }
        }

        info!(window = %window, count = posts.len(), "Trending posts refreshed");
        Ok(posts)
    }

    async fn read_cached(&self, window: TrendingWindow) -> Option<Vec<Post>> {
        let raw = match self.cache.get(&keys::trending(window)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(window = %window, error = %e, "Trending cache read failed");
                return None;
            }
        };
        match serde_json::from_str::<Vec<Post>>(&raw) {
            Ok(posts) if !posts.is_empty() => {
                debug!(window = %window, count = posts.len(), "Trending cache hit");
                Some(posts)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(window = %window, error = %e, "Discarding malformed trending cache entry");
                None
            }
        }
    }
}

/// Views, then likes, then recency, all descending; first occurrence of an id wins
pub fn sort_trending(mut posts: Vec<Post>) -> Vec<Post> {
    posts.sort_by(|a, b| {
        b.view_count
            .cmp(&a.view_count)
            .then_with(|| b.like_count.cmp(&a.like_count))
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    dedupe_posts(posts)
}

/// Drop repeated post ids, keeping the first occurrence
pub fn dedupe_posts(posts: Vec<Post>) -> Vec<Post> {
    let mut seen = HashSet::new();
    posts.into_iter().filter(|p| seen.insert(p.id)).collect()
}
