use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{parse_uuid, vector_from_json, vector_to_json};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::EmbeddingsRepo,
    },
    models::{ContentType, EmbeddingRecord, UpsertEmbeddingRecord},
};

pub struct SqliteEmbeddingsRepo {
    pool: SqlitePool,
}

impl SqliteEmbeddingsRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn record_from_row(row: &SqliteRow) -> DbResult<EmbeddingRecord> {
        let content_type_str: String = row.get("content_type");

        Ok(EmbeddingRecord {
            content_type: content_type_str.parse().map_err(DbError::Internal)?,
            content_id: parse_uuid(&row.get::<String, _>("content_id"))?,
            content_hash: row.get("content_hash"),
            recall_vector: vector_from_json(row.get("recall_vector"))?,
            rerank_vector: vector_from_json(row.get("rerank_vector"))?,
            has_recall: row.get::<i64, _>("has_recall") != 0,
            has_rerank: row.get::<i64, _>("has_rerank") != 0,
            token_count: row.get("token_count"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl EmbeddingsRepo for SqliteEmbeddingsRepo {
    async fn upsert(&self, input: UpsertEmbeddingRecord) -> DbResult<EmbeddingRecord> {
        let now = chrono::Utc::now();
        let recall_text = input
            .recall_vector
            .as_deref()
            .map(vector_to_json)
            .transpose()?;
        let rerank_text = input
            .rerank_vector
            .as_deref()
            .map(vector_to_json)
            .transpose()?;

        // COALESCE keeps any stored vector a partial re-embed did not
        // produce; MAX keeps the presence flag sticky.
        sqlx::query(
            r#"
            INSERT INTO embeddings
                (content_type, content_id, content_hash, recall_vector, rerank_vector,
                 has_recall, has_rerank, token_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (content_type, content_id) DO UPDATE SET
                content_hash = excluded.content_hash,
                recall_vector = COALESCE(excluded.recall_vector, embeddings.recall_vector),
                rerank_vector = COALESCE(excluded.rerank_vector, embeddings.rerank_vector),
                has_recall = MAX(embeddings.has_recall, excluded.has_recall),
                has_rerank = MAX(embeddings.has_rerank, excluded.has_rerank),
                token_count = COALESCE(excluded.token_count, embeddings.token_count),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(input.content_type.as_str())
        .bind(input.content_id.to_string())
        .bind(&input.content_hash)
        .bind(recall_text)
        .bind(rerank_text)
        .bind(input.recall_vector.is_some() as i64)
        .bind(input.rerank_vector.is_some() as i64)
        .bind(input.token_count)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(input.content_type, input.content_id)
            .await?
            .ok_or(DbError::NotFound)
    }

    async fn get(
        &self,
        content_type: ContentType,
        content_id: Uuid,
    ) -> DbResult<Option<EmbeddingRecord>> {
        let result = sqlx::query(
            r#"
            SELECT content_type, content_id, content_hash, recall_vector, rerank_vector,
                   has_recall, has_rerank, token_count, created_at, updated_at
            FROM embeddings
            WHERE content_type = ? AND content_id = ?
            "#,
        )
        .bind(content_type.as_str())
        .bind(content_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::record_from_row(&row)?)),
            None => Ok(None),
        }
    }
}
