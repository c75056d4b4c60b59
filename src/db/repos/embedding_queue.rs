use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{ContentType, EmbeddingQueueCounts, EmbeddingQueueItem, QueueEmbeddingInput},
};

/// Repository trait for the embedding work queue.
#[async_trait]
pub trait EmbeddingQueueRepo: Send + Sync {
    /// Enqueue content for embedding, keyed by `(content_type, content_id)`.
    ///
    /// If a row already exists with the same content hash the call is a
    /// no-op and returns the existing row. A changed hash resets the row to
    /// `queued` with fresh text and a zeroed retry counter.
    async fn upsert_item(&self, input: QueueEmbeddingInput) -> DbResult<EmbeddingQueueItem>;

    /// Get an item by its logical key.
    async fn get_item(
        &self,
        content_type: ContentType,
        content_id: Uuid,
    ) -> DbResult<Option<EmbeddingQueueItem>>;

    /// Atomically claim up to `limit` ready items.
    ///
    /// Ready means `queued`, scheduled at or before `now`, with retry budget
    /// remaining. Claimed items move to `processing` with a lease expiring
    /// at `lease_until`, and are returned ordered by priority then age.
    async fn claim_batch(
        &self,
        limit: u32,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> DbResult<Vec<EmbeddingQueueItem>>;

    /// Delete a successfully processed item.
    async fn delete_item(&self, id: Uuid) -> DbResult<()>;

    /// Return a failed item to `queued` with an updated retry counter and
    /// next run time.
    async fn reschedule(
        &self,
        id: Uuid,
        retry_count: u32,
        scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> DbResult<()>;

    /// Terminal failure after the retry budget is spent.
    async fn mark_failed(&self, id: Uuid, retry_count: u32, error: &str) -> DbResult<()>;

    /// Return items whose lease expired to `queued` without consuming a
    /// retry. Returns the number of reclaimed items.
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> DbResult<u64>;

    /// Item counts by status, for the queue status endpoint.
    async fn counts(&self) -> DbResult<EmbeddingQueueCounts>;
}
