use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::EmbeddingQueueRepo,
    },
    models::{
        ContentType, EmbeddingQueueCounts, EmbeddingQueueItem, QueueEmbeddingInput,
        QueueItemStatus, content_hash,
    },
};

pub struct SqliteEmbeddingQueueRepo {
    pool: SqlitePool,
}

impl SqliteEmbeddingQueueRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn item_from_row(row: &SqliteRow) -> DbResult<EmbeddingQueueItem> {
        let content_type_str: String = row.get("content_type");
        let status_str: String = row.get("status");

        Ok(EmbeddingQueueItem {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            content_type: content_type_str.parse().map_err(DbError::Internal)?,
            content_id: parse_uuid(&row.get::<String, _>("content_id"))?,
            content_hash: row.get("content_hash"),
            content_text: row.get("content_text"),
            priority: row.get::<i64, _>("priority") as i32,
            status: status_str.parse().map_err(DbError::Internal)?,
            retry_count: row.get::<i64, _>("retry_count") as u32,
            max_retries: row.get::<i64, _>("max_retries") as u32,
            scheduled_at: row.get("scheduled_at"),
            lease_expires_at: row.get("lease_expires_at"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
        })
    }
}

const ITEM_COLUMNS: &str = "id, content_type, content_id, content_hash, content_text, priority, \
     status, retry_count, max_retries, scheduled_at, lease_expires_at, error_message, created_at";

#[async_trait]
impl EmbeddingQueueRepo for SqliteEmbeddingQueueRepo {
    async fn upsert_item(&self, input: QueueEmbeddingInput) -> DbResult<EmbeddingQueueItem> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let hash = content_hash(&input.content_text);

        // A matching hash leaves the existing row untouched; new content
        // resets the row to queued with a fresh retry budget.
        sqlx::query(
            r#"
            INSERT INTO embedding_queue
                (id, content_type, content_id, content_hash, content_text, priority,
                 status, retry_count, max_retries, scheduled_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 'queued', 0, ?, ?, ?)
            ON CONFLICT (content_type, content_id) DO UPDATE SET
                content_hash = excluded.content_hash,
                content_text = excluded.content_text,
                priority = excluded.priority,
                status = 'queued',
                retry_count = 0,
                max_retries = excluded.max_retries,
                scheduled_at = excluded.scheduled_at,
                lease_expires_at = NULL,
                error_message = NULL
            WHERE embedding_queue.content_hash <> excluded.content_hash
            "#,
        )
        .bind(id.to_string())
        .bind(input.content_type.as_str())
        .bind(input.content_id.to_string())
        .bind(&hash)
        .bind(&input.content_text)
        .bind(input.priority as i64)
        .bind(input.max_retries as i64)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_item(input.content_type, input.content_id)
            .await?
            .ok_or(DbError::NotFound)
    }

    async fn get_item(
        &self,
        content_type: ContentType,
        content_id: Uuid,
    ) -> DbResult<Option<EmbeddingQueueItem>> {
        let result = sqlx::query(&format!(
            "SELECT {} FROM embedding_queue WHERE content_type = ? AND content_id = ?",
            ITEM_COLUMNS
        ))
        .bind(content_type.as_str())
        .bind(content_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::item_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn claim_batch(
        &self,
        limit: u32,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> DbResult<Vec<EmbeddingQueueItem>> {
        let rows = sqlx::query(&format!(
            r#"
            UPDATE embedding_queue
            SET status = 'processing', lease_expires_at = ?
            WHERE id IN (
                SELECT id FROM embedding_queue
                WHERE status = 'queued'
                  AND scheduled_at <= ?
                  AND retry_count < max_retries
                ORDER BY priority ASC, created_at ASC
                LIMIT ?
            )
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(lease_until)
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut items = rows
            .iter()
            .map(Self::item_from_row)
            .collect::<DbResult<Vec<_>>>()?;
        // RETURNING does not guarantee the subquery's order.
        items.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(items)
    }

    async fn delete_item(&self, id: Uuid) -> DbResult<()> {
        sqlx::query("DELETE FROM embedding_queue WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        retry_count: u32,
        scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE embedding_queue
            SET status = 'queued', retry_count = ?, scheduled_at = ?,
                lease_expires_at = NULL, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(retry_count as i64)
        .bind(scheduled_at)
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, retry_count: u32, error: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE embedding_queue
            SET status = 'failed', retry_count = ?, lease_expires_at = NULL, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(retry_count as i64)
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE embedding_queue
            SET status = 'queued', lease_expires_at = NULL
            WHERE status = 'processing' AND lease_expires_at IS NOT NULL AND lease_expires_at <= ?
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn counts(&self) -> DbResult<EmbeddingQueueCounts> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) as count FROM embedding_queue GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = EmbeddingQueueCounts::default();
        for row in rows {
            let status_str: String = row.get("status");
            let count: i64 = row.get("count");
            match status_str.parse::<QueueItemStatus>().map_err(DbError::Internal)? {
                QueueItemStatus::Queued => counts.queued = count,
                QueueItemStatus::Processing => counts.processing = count,
                QueueItemStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }
}
