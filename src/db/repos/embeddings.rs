use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{ContentType, EmbeddingRecord, UpsertEmbeddingRecord},
};

/// Repository trait for stored dual embeddings.
#[async_trait]
pub trait EmbeddingsRepo: Send + Sync {
    /// Idempotently upsert a record keyed by `(content_type, content_id)`.
    ///
    /// Absent vectors in the input preserve whatever that space already
    /// holds; presence flags are updated accordingly.
    async fn upsert(&self, input: UpsertEmbeddingRecord) -> DbResult<EmbeddingRecord>;

    /// Get a record by its key.
    async fn get(
        &self,
        content_type: ContentType,
        content_id: Uuid,
    ) -> DbResult<Option<EmbeddingRecord>>;
}
