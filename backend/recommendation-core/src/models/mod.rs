use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type UserId = Uuid;
pub type PostId = Uuid;

/// Post metadata read by the ranking pipeline.
/// Counters are maintained externally and only ever grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: Uuid,
    pub board_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    #[serde(default)]
    pub tag_ids: Vec<String>,
    #[serde(default)]
    pub topic_id: Option<String>,
    /// Text handed to the embedding service, when the post has any
    #[serde(default)]
    pub content: Option<String>,
}

impl Post {
    /// Interest keys this post contributes to: every tag plus its topic.
    pub fn interest_keys(&self) -> Vec<InterestKey> {
        let mut keys: Vec<InterestKey> = Vec::with_capacity(self.tag_ids.len() + 1);
        let tags = self.tag_ids.iter().map(|tag| InterestKey::Tag(tag.clone()));
        let topic = self.topic_id.iter().map(|t| InterestKey::Topic(t.clone()));
        for key in tags.chain(topic) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    View,
    Like,
    Dislike,
    Favorite,
    Follow,
    #[serde(other)]
    Unknown,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::View => "view",
            InteractionType::Like => "like",
            InteractionType::Dislike => "dislike",
            InteractionType::Favorite => "favorite",
            InteractionType::Follow => "follow",
            InteractionType::Unknown => "unknown",
        }
    }
}

impl FromStr for InteractionType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "view" => InteractionType::View,
            "like" => InteractionType::Like,
            "dislike" => InteractionType::Dislike,
            "favorite" | "bookmark" => InteractionType::Favorite,
            "follow" => InteractionType::Follow,
            _ => InteractionType::Unknown,
        })
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User interaction with a post. Consumed by the interest store and then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub user_id: UserId,
    pub post_id: PostId,
    pub interaction_type: InteractionType,
    pub timestamp: DateTime<Utc>,
}

impl InteractionEvent {
    pub fn new(user_id: UserId, post_id: PostId, interaction_type: InteractionType) -> Self {
        Self {
            user_id,
            post_id,
            interaction_type,
            timestamp: Utc::now(),
        }
    }
}

/// What a user can be interested in
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum InterestKey {
    Tag(String),
    Topic(String),
}

impl InterestKey {
    pub fn id(&self) -> &str {
        match self {
            InterestKey::Tag(id) | InterestKey::Topic(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InterestKey::Tag(_) => "tag",
            InterestKey::Topic(_) => "topic",
        }
    }

    /// Parse the `tag:<id>` / `topic:<id>` storage form
    pub fn parse(raw: &str) -> Option<Self> {
        let (kind, id) = raw.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        match kind {
            "tag" => Some(InterestKey::Tag(id.to_string())),
            "topic" => Some(InterestKey::Topic(id.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for InterestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// One (user, tag-or-topic) weight row. `weight` stays within [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInterest {
    pub user_id: UserId,
    pub key: InterestKey,
    pub weight: f64,
    pub updated_at: DateTime<Utc>,
}

/// A user's interests, strongest first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInterests {
    entries: Vec<UserInterest>,
}

impl UserInterests {
    pub fn new(mut entries: Vec<UserInterest>) -> Self {
        entries.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then_with(|| a.key.cmp(&b.key))
        });
        Self { entries }
    }

    pub fn entries(&self) -> &[UserInterest] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn truncate(&mut self, max: usize) {
        self.entries.truncate(max);
    }

    pub fn tags(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| match &e.key {
                InterestKey::Tag(id) => Some(id.clone()),
                InterestKey::Topic(_) => None,
            })
            .collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| match &e.key {
                InterestKey::Topic(id) => Some(id.clone()),
                InterestKey::Tag(_) => None,
            })
            .collect()
    }

    pub fn weight_of(&self, key: &InterestKey) -> Option<f64> {
        self.entries.iter().find(|e| &e.key == key).map(|e| e.weight)
    }

    pub fn contains(&self, key: &InterestKey) -> bool {
        self.entries.iter().any(|e| &e.key == key)
    }
}

/// Retrieved post plus the similarity the retriever attached to it, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub post: Post,
    pub similarity: Option<f64>,
}

impl From<Post> for Candidate {
    fn from(post: Post) -> Self {
        Self {
            post,
            similarity: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub similarity: f64,
    pub recency: f64,
    pub engagement: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub post_id: PostId,
    pub board_id: Uuid,
    pub author_id: Uuid,
    /// Final score after personalization and diversity
    pub ranking_score: f64,
    /// Relevance score before the diversity pass
    pub base_score: f64,
    pub factors: FactorBreakdown,
    pub produced_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Cold-start buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendingWindow {
    New,
    Daily,
    Weekly,
    AllTime,
}

impl TrendingWindow {
    pub const ALL: [TrendingWindow; 4] = [
        TrendingWindow::New,
        TrendingWindow::Daily,
        TrendingWindow::Weekly,
        TrendingWindow::AllTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrendingWindow::New => "new",
            TrendingWindow::Daily => "daily",
            TrendingWindow::Weekly => "weekly",
            TrendingWindow::AllTime => "all_time",
        }
    }

    /// Lookback in hours; `None` means unbounded
    pub fn hours(&self) -> Option<i64> {
        match self {
            TrendingWindow::New => Some(6),
            TrendingWindow::Daily => Some(24),
            TrendingWindow::Weekly => Some(168),
            TrendingWindow::AllTime => None,
        }
    }
}

impl fmt::Display for TrendingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrendingWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(TrendingWindow::New),
            "daily" | "24h" => Ok(TrendingWindow::Daily),
            "weekly" | "7d" => Ok(TrendingWindow::Weekly),
            "all_time" | "all" => Ok(TrendingWindow::AllTime),
            other => Err(format!("unknown trending window: {}", other)),
        }
    }
}
