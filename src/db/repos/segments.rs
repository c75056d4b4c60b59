use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{NewVideoSegment, SegmentFilter, VideoSegment},
};

/// Repository trait for video transcript segments.
#[async_trait]
pub trait SegmentsRepo: Send + Sync {
    /// Replace all segments of an attachment in one transaction.
    ///
    /// Reprocessing an attachment must not leave a mix of old and new
    /// segments visible to search.
    async fn replace_for_attachment(
        &self,
        attachment_id: Uuid,
        segments: Vec<NewVideoSegment>,
    ) -> DbResult<Vec<VideoSegment>>;

    /// Load candidate segments for stage-1 recall, applying any filters.
    async fn list_candidates(&self, filter: &SegmentFilter) -> DbResult<Vec<VideoSegment>>;

    /// Number of stored segments for an attachment.
    async fn count_for_attachment(&self, attachment_id: Uuid) -> DbResult<i64>;
}
