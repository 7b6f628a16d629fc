use super::{ActivityHistory, InteractionLog, InterestRepository, PostStore};
use crate::error::Result;
use crate::models::{
    InteractionEvent, InteractionType, InterestKey, Post, PostId, TrendingWindow, UserId,
    UserInterest,
};
use crate::services::scoring::{initial_interest_weight, interaction_delta};
use crate::utils::sanitize_unit;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

const POST_COLUMNS: &str = r#"
    SELECT p.id, p.author_id, p.board_id, p.created_at,
           p.view_count, p.like_count, p.comment_count,
           p.topic_id, p.content,
           COALESCE(
               ARRAY_AGG(pt.tag_id) FILTER (WHERE pt.tag_id IS NOT NULL),
               '{}'
           ) AS tag_ids
    FROM posts p
    LEFT JOIN post_tags pt ON pt.post_id = p.id
"#;

#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    author_id: Uuid,
    board_id: Uuid,
    created_at: DateTime<Utc>,
    view_count: i64,
    like_count: i64,
    comment_count: i64,
    topic_id: Option<String>,
    content: Option<String>,
    tag_ids: Vec<String>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            author_id: row.author_id,
            board_id: row.board_id,
            created_at: row.created_at,
            view_count: row.view_count,
            like_count: row.like_count,
            comment_count: row.comment_count,
            tag_ids: row.tag_ids,
            topic_id: row.topic_id,
            content: row.content,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InteractionRow {
    user_id: Uuid,
    post_id: Uuid,
    interaction_type: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct InterestRow {
    user_id: Uuid,
    interest_kind: String,
    interest_id: String,
    weight: f64,
    updated_at: DateTime<Utc>,
}

impl InterestRow {
    fn into_interest(self) -> Option<UserInterest> {
        let key = match self.interest_kind.as_str() {
            "tag" => InterestKey::Tag(self.interest_id),
            "topic" => InterestKey::Topic(self.interest_id),
            other => {
                warn!(kind = other, "Skipping interest row with unknown kind");
                return None;
            }
        };
        Some(UserInterest {
            user_id: self.user_id,
            key,
            weight: sanitize_unit(self.weight),
            updated_at: self.updated_at,
        })
    }
}

/// Post metadata, interaction history and the new-user gate over Postgres
#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn get_by_ids(&self, ids: &[PostId]) -> Result<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE p.id = ANY($1) AND p.deleted_at IS NULL GROUP BY p.id",
            POST_COLUMNS
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn query_trending(&self, window: TrendingWindow, limit: usize) -> Result<Vec<Post>> {
        let since: Option<DateTime<Utc>> = window.hours().map(|h| Utc::now() - Duration::hours(h));
        let sql = format!(
            r#"{}
            WHERE p.deleted_at IS NULL
              AND ($1::timestamptz IS NULL OR p.created_at >= $1)
            GROUP BY p.id
            ORDER BY p.view_count DESC, p.like_count DESC, p.created_at DESC
            LIMIT $2"#,
            POST_COLUMNS
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(since)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        debug!(window = %window, count = rows.len(), "Fetched trending posts");
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn query_by_interests(
        &self,
        tag_ids: &[String],
        topic_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Post>> {
        if tag_ids.is_empty() && topic_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"{}
            WHERE p.deleted_at IS NULL
              AND (
                  p.topic_id = ANY($2)
                  OR EXISTS (
                      SELECT 1 FROM post_tags t
                      WHERE t.post_id = p.id AND t.tag_id = ANY($1)
                  )
              )
            GROUP BY p.id
            ORDER BY p.created_at DESC
            LIMIT $3"#,
            POST_COLUMNS
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(tag_ids)
            .bind(topic_ids)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Post::from).collect())
    }
}

#[async_trait]
impl InteractionLog for PgPostStore {
    async fn recent(
        &self,
        user_id: UserId,
        types: &[InteractionType],
        limit: usize,
    ) -> Result<Vec<InteractionEvent>> {
        let type_names: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
        let rows = sqlx::query_as::<_, InteractionRow>(
            r#"
            SELECT user_id, post_id, interaction_type, created_at
            FROM post_interactions
            WHERE user_id = $1 AND interaction_type = ANY($2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(&type_names)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InteractionEvent {
                user_id: row.user_id,
                post_id: row.post_id,
                interaction_type: row
                    .interaction_type
                    .parse()
                    .unwrap_or(InteractionType::Unknown),
                timestamp: row.created_at,
            })
            .collect())
    }
}

#[async_trait]
impl ActivityHistory for PgPostStore {
    async fn is_new_user(&self, user_id: UserId) -> Result<bool> {
        let has_history: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM post_interactions WHERE user_id = $1)",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(!has_history)
    }
}

/// `user_interests` table: one row per (user_id, interest_kind, interest_id)
#[derive(Clone)]
pub struct PgInterestRepository {
    pool: PgPool,
}

impl PgInterestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InterestRepository for PgInterestRepository {
    async fn load_all(&self, user_id: UserId) -> Result<Vec<UserInterest>> {
        let rows = sqlx::query_as::<_, InterestRow>(
            r#"
            SELECT user_id, interest_kind, interest_id, weight, updated_at
            FROM user_interests
            WHERE user_id = $1
            ORDER BY weight DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(InterestRow::into_interest).collect())
    }

    async fn apply_interaction(
        &self,
        user_id: UserId,
        keys: &[InterestKey],
        interaction: InteractionType,
        decay_factor: f64,
        at: DateTime<Utc>,
    ) -> Result<Vec<UserInterest>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let kinds: Vec<&str> = keys.iter().map(|k| k.kind()).collect();
        let ids: Vec<&str> = keys.iter().map(|k| k.id()).collect();

        // Same arithmetic as update_interest_weight, evaluated inside the upsert
        let rows = sqlx::query_as::<_, InterestRow>(
            r#"
            INSERT INTO user_interests (user_id, interest_kind, interest_id, weight, updated_at)
            SELECT $1, k.kind, k.id, $4, $7
            FROM UNNEST($2::text[], $3::text[]) AS k(kind, id)
            ON CONFLICT (user_id, interest_kind, interest_id) DO UPDATE
            SET weight = LEAST(1.0, GREATEST(0.0,
                    LEAST(1.0, GREATEST(0.0, user_interests.weight)) * $5 + $6)),
                updated_at = EXCLUDED.updated_at
            RETURNING user_id, interest_kind, interest_id, weight, updated_at
            "#,
        )
        .bind(user_id)
        .bind(&kinds)
        .bind(&ids)
        .bind(initial_interest_weight(interaction))
        .bind(sanitize_unit(decay_factor))
        .bind(interaction_delta(interaction))
        .bind(at)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(InterestRow::into_interest).collect())
    }

    async fn scale_all(&self, factor: f64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE user_interests SET weight = LEAST(1.0, GREATEST(0.0, weight * $1))",
        )
        .bind(sanitize_unit(factor))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn prune_below(&self, threshold: f64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_interests WHERE weight < $1")
            .bind(threshold)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
