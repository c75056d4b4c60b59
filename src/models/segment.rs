use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A transcript segment of a processed video, with dual embeddings.
///
/// Segments are immutable once written; a forced reprocessing pass replaces
/// all segments of an attachment atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSegment {
    pub id: Uuid,
    pub attachment_id: Uuid,
    pub segment_index: i32,
    pub start_time_secs: f64,
    pub end_time_secs: f64,
    pub content_text: String,
    pub word_count: i64,
    pub recall_vector: Option<Vec<f32>>,
    pub rerank_vector: Option<Vec<f32>>,
    pub has_recall: bool,
    pub has_rerank: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for inserting a video segment.
#[derive(Debug, Clone)]
pub struct NewVideoSegment {
    pub attachment_id: Uuid,
    pub segment_index: i32,
    pub start_time_secs: f64,
    pub end_time_secs: f64,
    pub content_text: String,
    pub word_count: i64,
    pub recall_vector: Option<Vec<f32>>,
    pub rerank_vector: Option<Vec<f32>>,
}

/// Filters applied when loading stage-1 search candidates.
#[derive(Debug, Clone, Default)]
pub struct SegmentFilter {
    /// Restrict to these attachments. `None` means all.
    pub attachment_ids: Option<Vec<Uuid>>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}
