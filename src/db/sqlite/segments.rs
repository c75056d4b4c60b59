use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::{parse_uuid, vector_from_json, vector_to_json};
use crate::{
    db::{error::DbResult, repos::SegmentsRepo},
    models::{NewVideoSegment, SegmentFilter, VideoSegment},
};

pub struct SqliteSegmentsRepo {
    pool: SqlitePool,
}

impl SqliteSegmentsRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn segment_from_row(row: &SqliteRow) -> DbResult<VideoSegment> {
        Ok(VideoSegment {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            attachment_id: parse_uuid(&row.get::<String, _>("attachment_id"))?,
            segment_index: row.get::<i64, _>("segment_index") as i32,
            start_time_secs: row.get("start_time_secs"),
            end_time_secs: row.get("end_time_secs"),
            content_text: row.get("content_text"),
            word_count: row.get("word_count"),
            recall_vector: vector_from_json(row.get("recall_vector"))?,
            rerank_vector: vector_from_json(row.get("rerank_vector"))?,
            has_recall: row.get::<i64, _>("has_recall") != 0,
            has_rerank: row.get::<i64, _>("has_rerank") != 0,
            created_at: row.get("created_at"),
        })
    }
}

const SEGMENT_COLUMNS: &str = "id, attachment_id, segment_index, start_time_secs, end_time_secs, \
     content_text, word_count, recall_vector, rerank_vector, has_recall, has_rerank, created_at";

#[async_trait]
impl SegmentsRepo for SqliteSegmentsRepo {
    async fn replace_for_attachment(
        &self,
        attachment_id: Uuid,
        segments: Vec<NewVideoSegment>,
    ) -> DbResult<Vec<VideoSegment>> {
        let now = chrono::Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM video_segments WHERE attachment_id = ?")
            .bind(attachment_id.to_string())
            .execute(&mut *tx)
            .await?;

        let mut stored = Vec::with_capacity(segments.len());
        for segment in segments {
            let id = Uuid::new_v4();
            let recall_text = segment
                .recall_vector
                .as_deref()
                .map(vector_to_json)
                .transpose()?;
            let rerank_text = segment
                .rerank_vector
                .as_deref()
                .map(vector_to_json)
                .transpose()?;

            sqlx::query(
                r#"
                INSERT INTO video_segments
                    (id, attachment_id, segment_index, start_time_secs, end_time_secs,
                     content_text, word_count, recall_vector, rerank_vector,
                     has_recall, has_rerank, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id.to_string())
            .bind(attachment_id.to_string())
            .bind(segment.segment_index as i64)
            .bind(segment.start_time_secs)
            .bind(segment.end_time_secs)
            .bind(&segment.content_text)
            .bind(segment.word_count)
            .bind(recall_text)
            .bind(rerank_text)
            .bind(segment.recall_vector.is_some() as i64)
            .bind(segment.rerank_vector.is_some() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            stored.push(VideoSegment {
                id,
                attachment_id,
                segment_index: segment.segment_index,
                start_time_secs: segment.start_time_secs,
                end_time_secs: segment.end_time_secs,
                content_text: segment.content_text,
                word_count: segment.word_count,
                has_recall: segment.recall_vector.is_some(),
                has_rerank: segment.rerank_vector.is_some(),
                recall_vector: segment.recall_vector,
                rerank_vector: segment.rerank_vector,
                created_at: now,
            });
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn list_candidates(&self, filter: &SegmentFilter) -> DbResult<Vec<VideoSegment>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM video_segments
            WHERE has_recall = 1
              AND (? IS NULL OR created_at >= ?)
              AND (? IS NULL OR created_at <= ?)
            "#,
            SEGMENT_COLUMNS
        ))
        .bind(filter.created_after)
        .bind(filter.created_after)
        .bind(filter.created_before)
        .bind(filter.created_before)
        .fetch_all(&self.pool)
        .await?;

        let mut segments = rows
            .iter()
            .map(Self::segment_from_row)
            .collect::<DbResult<Vec<_>>>()?;

        // The attachment filter can name an arbitrary number of ids, so it
        // is applied here rather than in SQL placeholders.
        if let Some(ids) = &filter.attachment_ids {
            segments.retain(|s| ids.contains(&s.attachment_id));
        }
        Ok(segments)
    }

    async fn count_for_attachment(&self, attachment_id: Uuid) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM video_segments WHERE attachment_id = ?")
            .bind(attachment_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }
}
