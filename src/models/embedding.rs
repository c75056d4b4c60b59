use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Kinds of platform content that can be embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Course,
    Lesson,
    Post,
    Comment,
    Profile,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Course => "course",
            ContentType::Lesson => "lesson",
            ContentType::Post => "post",
            ContentType::Comment => "comment",
            ContentType::Profile => "profile",
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course" => Ok(ContentType::Course),
            "lesson" => Ok(ContentType::Lesson),
            "post" => Ok(ContentType::Post),
            "comment" => Ok(ContentType::Comment),
            "profile" => Ok(ContentType::Profile),
            _ => Err(format!("Invalid content type: {}", s)),
        }
    }
}

/// Status of an embedding queue item.
///
/// There is no `completed` status: successfully embedded items are deleted
/// from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    #[default]
    Queued,
    Processing,
    Failed,
}

impl QueueItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueItemStatus::Queued => "queued",
            QueueItemStatus::Processing => "processing",
            QueueItemStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for QueueItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(QueueItemStatus::Queued),
            "processing" => Ok(QueueItemStatus::Processing),
            "failed" => Ok(QueueItemStatus::Failed),
            _ => Err(format!("Invalid queue item status: {}", s)),
        }
    }
}

/// A pending unit of embedding work.
///
/// Logical identity is `(content_type, content_id)`; re-queuing the same
/// content replaces the pending item rather than duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingQueueItem {
    pub id: Uuid,
    pub content_type: ContentType,
    pub content_id: Uuid,
    pub content_hash: String,
    pub content_text: String,
    /// Lower values run first; 1 is most urgent.
    pub priority: i32,
    pub status: QueueItemStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub scheduled_at: DateTime<Utc>,
    /// Set while an item is claimed by a worker. The sweeper returns items
    /// with an expired lease to `queued`.
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for enqueueing content for embedding.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueEmbeddingInput {
    pub content_type: ContentType,
    pub content_id: Uuid,
    pub content_text: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_priority() -> i32 {
    5
}

fn default_max_retries() -> u32 {
    3
}

/// Hex SHA-256 of content text, used for dedupe on re-queue.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// A stored dual embedding keyed by `(content_type, content_id)`.
///
/// Either vector may be absent (partial backend success); the presence
/// flags say which spaces are searchable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub content_type: ContentType,
    pub content_id: Uuid,
    pub content_hash: String,
    pub recall_vector: Option<Vec<f32>>,
    pub rerank_vector: Option<Vec<f32>>,
    pub has_recall: bool,
    pub has_rerank: bool,
    pub token_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for upserting an embedding record.
///
/// `None` vectors leave any previously stored vector for that space intact,
/// so a partial re-embed never erases earlier work.
#[derive(Debug, Clone)]
pub struct UpsertEmbeddingRecord {
    pub content_type: ContentType,
    pub content_id: Uuid,
    pub content_hash: String,
    pub recall_vector: Option<Vec<f32>>,
    pub rerank_vector: Option<Vec<f32>>,
    pub token_count: Option<i64>,
}

/// Counts of embedding queue items by status.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmbeddingQueueCounts {
    pub queued: i64,
    pub processing: i64,
    pub failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable_hex() {
        let a = content_hash("hello world");
        let b = content_hash("hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_hash_differs_for_different_text() {
        assert_ne!(content_hash("a"), content_hash("b"));
    }
}
