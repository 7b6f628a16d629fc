//! In-process collaborators backed by `DashMap`.
//! Used by the test suites and for running the pipeline without Postgres/Redis.

use super::{ActivityHistory, Cache, InteractionLog, InterestRepository, PostStore};
use crate::error::{RecommendationError, Result};
use crate::models::{
    InteractionEvent, InteractionType, InterestKey, Post, PostId, TrendingWindow, UserId,
    UserInterest,
};
use crate::services::scoring::{initial_interest_weight, update_interest_weight};
use crate::utils::sanitize_unit;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

fn unavailable(what: &str) -> RecommendationError {
    RecommendationError::Upstream(format!("{} unavailable", what))
}

/// Post store with a switch to simulate an outage
#[derive(Default)]
pub struct InMemoryPostStore {
    posts: DashMap<PostId, Post>,
    unavailable: AtomicBool,
}

impl InMemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_posts(posts: impl IntoIterator<Item = Post>) -> Self {
        let store = Self::new();
        for post in posts {
            store.insert(post);
        }
        store
    }

    pub fn insert(&self, post: Post) {
        self.posts.insert(post.id, post);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable("post store"));
        }
        Ok(())
    }
}

#[async_trait]
impl PostStore for InMemoryPostStore {
    async fn get_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>> {
        self.check()?;
        Ok(ids
            .iter()
            .filter_map(|id| self.posts.get(id).map(|p| p.clone()))
            .collect())
    }

    async fn query_trending(&self, window: TrendingWindow, limit: usize) -> Result<Vec<Post>> {
        self.check()?;
        let cutoff = window
            .hours()
            .map(|hours| Utc::now() - ChronoDuration::hours(hours));
        let mut posts: Vec<Post> = self
            .posts
            .iter()
            .filter(|p| cutoff.map_or(true, |c| p.created_at >= c))
            .map(|p| p.clone())
            .collect();
        posts.sort_by(|a, b| {
            b.view_count
                .cmp(&a.view_count)
                .then(b.like_count.cmp(&a.like_count))
                .then(b.created_at.cmp(&a.created_at))
        });
        posts.truncate(limit);
        Ok(posts)
    }

    async fn query_by_interests(
        &self,
        tag_ids: &[String],
        topic_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Post>> {
        self.check()?;
        let mut posts: Vec<Post> = self
            .posts
            .iter()
            .filter(|p| {
                p.tag_ids.iter().any(|t| tag_ids.contains(t))
                    || p.topic_id.as_ref().map_or(false, |t| topic_ids.contains(t))
            })
            .map(|p| p.clone())
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        posts.truncate(limit);
        Ok(posts)
    }
}

/// Interaction history; a user with no recorded events is a new user
#[derive(Default)]
pub struct InMemoryInteractionLog {
    events: DashMap<UserId, Vec<InteractionEvent>>,
}

impl InMemoryInteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, event: InteractionEvent) {
        self.events.entry(event.user_id).or_default().push(event);
    }
}

#[async_trait]
impl InteractionLog for InMemoryInteractionLog {
    async fn recent(
        &self,
        user_id: UserId,
        types: &[InteractionType],
        limit: usize,
    ) -> Result<Vec<InteractionEvent>> {
        let mut events: Vec<InteractionEvent> = self
            .events
            .get(&user_id)
            .map(|e| {
                e.iter()
                    .filter(|ev| types.contains(&ev.interaction_type))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(limit);
        Ok(events)
    }
}

#[async_trait]
impl ActivityHistory for InMemoryInteractionLog {
    async fn is_new_user(&self, user_id: UserId) -> Result<bool> {
        Ok(self.events.get(&user_id).map_or(true, |e| e.is_empty()))
    }
}

/// TTL-aware cache; expired entries are dropped lazily on read
#[derive(Default)]
pub struct InMemoryCache {
    entries: DashMap<String, (String, Option<Instant>)>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.live_value(key).is_some()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) => match entry.1 {
                Some(deadline) if deadline <= Instant::now() => true,
                _ => return Some(entry.0.clone()),
            },
            None => return None,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    async fn incr(&self, key: &str, by: i64, ttl: Option<Duration>) -> Result<i64> {
        // Drop an expired counter before taking the entry lock
        self.live_value(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| ("0".to_string(), ttl.map(|t| Instant::now() + t)));
        let current: i64 = entry.0.parse().map_err(|_| {
            RecommendationError::Upstream(format!("value at {} is not an integer", key))
        })?;
        let next = current + by;
        entry.0 = next.to_string();
        Ok(next)
    }
}

/// Interest weights keyed by user; each user's map is updated under its shard lock
#[derive(Default)]
pub struct InMemoryInterestRepository {
    interests: DashMap<UserId, HashMap<InterestKey, UserInterest>>,
}

impl InMemoryInterestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, interest: UserInterest) {
        self.interests
            .entry(interest.user_id)
            .or_default()
            .insert(interest.key.clone(), interest);
    }
}

#[async_trait]
impl InterestRepository for InMemoryInterestRepository {
    async fn load_all(&self, user_id: UserId) -> Result<Vec<UserInterest>> {
        Ok(self
            .interests
            .get(&user_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn apply_interaction(
        &self,
        user_id: UserId,
        keys: &[InterestKey],
        interaction: InteractionType,
        decay_factor: f64,
        at: DateTime<Utc>,
    ) -> Result<Vec<UserInterest>> {
        let mut user = self.interests.entry(user_id).or_default();
        let mut updated = Vec::with_capacity(keys.len());
        for key in keys {
            let row = user
                .entry(key.clone())
                .and_modify(|existing| {
                    existing.weight =
                        update_interest_weight(existing.weight, interaction, decay_factor);
                    existing.updated_at = at;
                })
                .or_insert_with(|| UserInterest {
                    user_id,
                    key: key.clone(),
                    weight: initial_interest_weight(interaction),
                    updated_at: at,
                });
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn scale_all(&self, factor: f64) -> Result<u64> {
        let factor = sanitize_unit(factor);
        let mut touched = 0u64;
        for mut user in self.interests.iter_mut() {
            for interest in user.values_mut() {
                interest.weight = sanitize_unit(interest.weight * factor);
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn prune_below(&self, threshold: f64) -> Result<u64> {
        let mut removed = 0u64;
        for mut user in self.interests.iter_mut() {
            let before = user.len();
            user.retain(|_, interest| interest.weight >= threshold);
            removed += (before - user.len()) as u64;
        }
        self.interests.retain(|_, m| !m.is_empty());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn post(views: i64, likes: i64, age_hours: i64, tags: &[&str]) -> Post {
        Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            board_id: Uuid::new_v4(),
            created_at: Utc::now() - ChronoDuration::hours(age_hours),
            view_count: views,
            like_count: likes,
            comment_count: 0,
            tag_ids: tags.iter().map(|t| t.to_string()).collect(),
            topic_id: None,
            content: None,
        }
    }

    #[tokio::test]
    async fn test_post_store_trending_order_and_window() {
        let store = InMemoryPostStore::with_posts(vec![
            post(10, 1, 1, &[]),
            post(50, 2, 2, &[]),
            post(50, 9, 3, &[]),
            post(999, 0, 72, &[]),
        ]);

        let daily = store.query_trending(TrendingWindow::Daily, 10).await.unwrap();
        assert_eq!(daily.len(), 3);
        assert_eq!((daily[0].view_count, daily[0].like_count), (50, 9));
        assert_eq!((daily[1].view_count, daily[1].like_count), (50, 2));

        let all = store.query_trending(TrendingWindow::AllTime, 10).await.unwrap();
        assert_eq!(all[0].view_count, 999);
    }

    #[tokio::test]
    async fn test_post_store_outage() {
        let store = InMemoryPostStore::with_posts(vec![post(1, 1, 1, &["a"])]);
        store.set_unavailable(true);
        assert!(store.query_trending(TrendingWindow::Daily, 5).await.is_err());
        store.set_unavailable(false);
        let found = store
            .query_by_interests(&["a".to_string()], &[], 5)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_ttl_and_incr() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", Duration::from_millis(20)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);

        assert_eq!(cache.incr("n", 1, None).await.unwrap(), 1);
        assert_eq!(cache.incr("n", 2, None).await.unwrap(), 3);
        cache.del(&["n".to_string()]).await.unwrap();
        assert_eq!(cache.incr("n", 1, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_interest_repository_upsert() {
        let repo = InMemoryInterestRepository::new();
        let user = Uuid::new_v4();
        let key = InterestKey::Tag("rust".to_string());

        let first = repo
            .apply_interaction(user, &[key.clone()], InteractionType::Like, 0.9, Utc::now())
            .await
            .unwrap();
        assert_eq!(first[0].weight, 0.5);

        let second = repo
            .apply_interaction(user, &[key], InteractionType::Favorite, 0.9, Utc::now())
            .await
            .unwrap();
        assert!((second[0].weight - 0.55).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_interest_repository_scale_and_prune() {
        let repo = InMemoryInterestRepository::new();
        let user = Uuid::new_v4();
        let keys = vec![
            InterestKey::Tag("a".to_string()),
            InterestKey::Topic("b".to_string()),
        ];
        repo.apply_interaction(user, &keys, InteractionType::View, 0.9, Utc::now())
            .await
            .unwrap();

        assert_eq!(repo.scale_all(0.5).await.unwrap(), 2);
        let rows = repo.load_all(user).await.unwrap();
        assert!(rows.iter().all(|r| (r.weight - 0.15).abs() < 1e-12));

        assert_eq!(repo.prune_below(0.2).await.unwrap(), 2);
        assert!(repo.load_all(user).await.unwrap().is_empty());
    }
}
