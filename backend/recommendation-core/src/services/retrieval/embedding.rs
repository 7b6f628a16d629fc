use crate::error::Result;
use crate::models::{Candidate, UserId, UserInterests};
use crate::services::cache::keys;
use crate::services::scoring::cosine_similarity;
use crate::store::{Cache, EmbeddingService};
use crate::utils::with_timeout;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Number of interest keys folded into the user's profile text
const PROFILE_KEYS: usize = 10;

/// Embedding Similarity - 向量相似度
/// Attaches cosine similarity between the user's interest profile and each candidate's text.
pub struct EmbeddingSimilarity {
    service: Arc<dyn EmbeddingService>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
    timeout: Duration,
}

impl EmbeddingSimilarity {
    pub fn new(
        service: Arc<dyn EmbeddingService>,
        cache: Arc<dyn Cache>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            cache,
            ttl,
            timeout,
        }
    }

    /// Fill `similarity` on candidates that have text. Any failure leaves it unset.
    pub async fn annotate(
        &self,
        user_id: UserId,
        interests: &UserInterests,
        candidates: &mut [Candidate],
    ) {
        if interests.is_empty() || candidates.is_empty() {
            return;
        }

        let user_vector = match self.user_vector(user_id, interests).await {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => return,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "User embedding unavailable");
                return;
            }
        };

        let lookups = candidates.iter().map(|c| async move {
            match c.post.content.as_deref() {
                Some(text) if !text.trim().is_empty() => {
                    with_timeout(self.timeout, self.service.embed(text)).await.ok()
                }
                _ => None,
            }
        });
        let vectors = join_all(lookups).await;

        let mut annotated = 0usize;
        for (candidate, vector) in candidates.iter_mut().zip(vectors) {
            if let Some(vector) = vector {
                candidate.similarity = Some(cosine_similarity(&user_vector, &vector));
                annotated += 1;
            }
        }
        debug!(user_id = %user_id, annotated, "Attached embedding similarity");
    }

    /// The user's profile vector, cached under `embedding:user:<id>`
    pub async fn user_vector(&self, user_id: UserId, interests: &UserInterests) -> Result<Vec<f32>> {
        let key = keys::user_embedding(user_id);
        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<f32>>(&raw) {
                Ok(vector) => return Ok(vector),
                Err(e) => warn!(user_id = %user_id, error = %e, "Discarding malformed cached embedding"),
            },
            Ok(None) => {}
            Err(e) => debug!(user_id = %user_id, error = %e, "Embedding cache read failed"),
        }

        let vector = with_timeout(self.timeout, self.service.embed(&profile_text(interests))).await?;

        let stored = match serde_json::to_string(&vector) {
            Ok(json) => self.cache.set(&key, &json, self.ttl).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = stored {
            warn!(user_id = %user_id, error = %e, "Failed to cache user embedding");
        }
        Ok(vector)
    }
}

/// Strongest interest ids joined by spaces
fn profile_text(interests: &UserInterests) -> String {
    interests
        .entries()
        .iter()
        .take(PROFILE_KEYS)
        .map(|e| e.key.id())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecommendationError;
    use crate::models::{InterestKey, Post, UserInterest};
    use crate::store::InMemoryCache;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// "rust" → x axis, anything else → y axis, "boom" fails
    #[derive(Default)]
    struct AxisEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingService for AxisEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("boom") {
                return Err(RecommendationError::Upstream("embedding model down".into()));
            }
            if text.contains("rust") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    fn candidate(content: Option<&str>) -> Candidate {
        Candidate::from(Post {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            board_id: Uuid::new_v4(),
            created_at: Utc::now(),
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            tag_ids: vec![],
            topic_id: None,
            content: content.map(str::to_string),
        })
    }

    fn rust_fan(user: UserId) -> UserInterests {
        UserInterests::new(vec![UserInterest {
            user_id: user,
            key: InterestKey::Tag("rust".into()),
            weight: 0.8,
            updated_at: Utc::now(),
        }])
    }

    #[tokio::test]
    async fn test_annotate_sets_cosine() {
        let embedder = Arc::new(AxisEmbedder::default());
        let cache = Arc::new(InMemoryCache::new());
        let similarity = EmbeddingSimilarity::new(
            embedder.clone(),
            cache.clone(),
            Duration::from_secs(3600),
            Duration::from_millis(200),
        );
        let user = Uuid::new_v4();
        let mut candidates = vec![
            candidate(Some("learning rust")),
            candidate(Some("baking bread")),
            candidate(None),
            candidate(Some("boom")),
        ];

        similarity.annotate(user, &rust_fan(user), &mut candidates).await;

        assert_eq!(candidates[0].similarity, Some(1.0));
        assert_eq!(candidates[1].similarity, Some(0.0));
        assert_eq!(candidates[2].similarity, None);
        assert_eq!(candidates[3].similarity, None);
        assert!(cache.contains_key(&keys::user_embedding(user)));
    }

    #[tokio::test]
    async fn test_user_vector_is_cached() {
        let embedder = Arc::new(AxisEmbedder::default());
        let similarity = EmbeddingSimilarity::new(
            embedder.clone(),
            Arc::new(InMemoryCache::new()),
            Duration::from_secs(3600),
            Duration::from_millis(200),
        );
        let user = Uuid::new_v4();
        let interests = rust_fan(user);

        similarity.user_vector(user, &interests).await.unwrap();
        similarity.user_vector(user, &interests).await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }
}
