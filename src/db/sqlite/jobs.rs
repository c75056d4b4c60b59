use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::JobsRepo,
    },
    models::{
        CreateProcessingJob, JobStatus, PipelineStep, ProcessingJob, ProcessingJobStep, StepStatus,
    },
};

pub struct SqliteJobsRepo {
    pool: SqlitePool,
}

impl SqliteJobsRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn job_from_row(row: &SqliteRow) -> DbResult<ProcessingJob> {
        let status_str: String = row.get("status");
        let step_str: String = row.get("current_step");

        Ok(ProcessingJob {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            attachment_id: parse_uuid(&row.get::<String, _>("attachment_id"))?,
            user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
            source_url: row.get("source_url"),
            status: status_str.parse().map_err(DbError::Internal)?,
            current_step: step_str.parse().map_err(DbError::Internal)?,
            progress_percentage: row.get::<i64, _>("progress_percentage") as u32,
            retry_count: row.get::<i64, _>("retry_count") as u32,
            max_retries: row.get::<i64, _>("max_retries") as u32,
            error_message: row.get("error_message"),
            queue_message_id: row.get("queue_message_id"),
            compressed_url: row.get("compressed_url"),
            compressed_size_bytes: row.get("compressed_size_bytes"),
            audio_url: row.get("audio_url"),
            transcript_text: row.get("transcript_text"),
            transcript_duration_secs: row.get("transcript_duration_secs"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
            cancelled_at: row.get("cancelled_at"),
        })
    }

    fn step_from_row(row: &SqliteRow) -> DbResult<ProcessingJobStep> {
        let step_str: String = row.get("step");
        let status_str: String = row.get("status");
        let output_text: Option<String> = row.get("output");
        let output = match output_text {
            Some(text) => Some(serde_json::from_str(&text).map_err(DbError::Json)?),
            None => None,
        };

        Ok(ProcessingJobStep {
            job_id: parse_uuid(&row.get::<String, _>("job_id"))?,
            step: step_str.parse().map_err(DbError::Internal)?,
            status: status_str.parse().map_err(DbError::Internal)?,
            retry_count: row.get::<i64, _>("retry_count") as u32,
            error_message: row.get("error_message"),
            output,
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

const JOB_COLUMNS: &str = "id, attachment_id, user_id, source_url, status, current_step, \
     progress_percentage, retry_count, max_retries, error_message, queue_message_id, \
     compressed_url, compressed_size_bytes, audio_url, transcript_text, \
     transcript_duration_secs, created_at, started_at, completed_at, cancelled_at";

#[async_trait]
impl JobsRepo for SqliteJobsRepo {
    async fn create_job(&self, input: CreateProcessingJob) -> DbResult<ProcessingJob> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO processing_jobs
                (id, attachment_id, user_id, source_url, status, current_step,
                 progress_percentage, retry_count, max_retries, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.attachment_id.to_string())
        .bind(input.user_id.to_string())
        .bind(&input.source_url)
        .bind(JobStatus::Queued.as_str())
        .bind(PipelineStep::Compress.as_str())
        .bind(input.max_retries as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for step in PipelineStep::all() {
            sqlx::query(
                r#"
                INSERT INTO processing_job_steps (job_id, step, status, retry_count)
                VALUES (?, ?, ?, 0)
                "#,
            )
            .bind(id.to_string())
            .bind(step.as_str())
            .bind(StepStatus::Pending.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(ProcessingJob {
            id,
            attachment_id: input.attachment_id,
            user_id: input.user_id,
            source_url: input.source_url,
            status: JobStatus::Queued,
            current_step: PipelineStep::Compress,
            progress_percentage: 0,
            retry_count: 0,
            max_retries: input.max_retries,
            error_message: None,
            queue_message_id: None,
            compressed_url: None,
            compressed_size_bytes: None,
            audio_url: None,
            transcript_text: None,
            transcript_duration_secs: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        })
    }

    async fn get_job(&self, id: Uuid) -> DbResult<Option<ProcessingJob>> {
        let result = sqlx::query(&format!(
            "SELECT {} FROM processing_jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::job_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_job_steps(&self, job_id: Uuid) -> DbResult<Vec<ProcessingJobStep>> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, step, status, retry_count, error_message, output,
                   started_at, completed_at
            FROM processing_job_steps
            WHERE job_id = ?
            "#,
        )
        .bind(job_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut steps = rows
            .iter()
            .map(Self::step_from_row)
            .collect::<DbResult<Vec<_>>>()?;
        steps.sort_by_key(|s| s.step.index());
        Ok(steps)
    }

    async fn find_active_for_attachment(
        &self,
        attachment_id: Uuid,
    ) -> DbResult<Option<ProcessingJob>> {
        let result = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM processing_jobs
            WHERE attachment_id = ? AND status IN ('queued', 'processing')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            JOB_COLUMNS
        ))
        .bind(attachment_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match result {
            Some(row) => Ok(Some(Self::job_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn set_queue_message_id(&self, job_id: Uuid, message_id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE processing_jobs SET queue_message_id = ? WHERE id = ?")
            .bind(message_id)
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn begin_step(&self, job_id: Uuid, step: PipelineStep) -> DbResult<()> {
        let now = chrono::Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'processing',
                current_step = ?,
                started_at = COALESCE(started_at, ?)
            WHERE id = ? AND status IN ('queued', 'processing')
            "#,
        )
        .bind(step.as_str())
        .bind(now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!(
                "Job {} is not accepting step transitions",
                job_id
            )));
        }

        sqlx::query(
            r#"
            UPDATE processing_job_steps
            SET status = 'processing', started_at = COALESCE(started_at, ?)
            WHERE job_id = ? AND step = ?
            "#,
        )
        .bind(now)
        .bind(job_id.to_string())
        .bind(step.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete_step(
        &self,
        job_id: Uuid,
        step: PipelineStep,
        progress: u32,
        output: &serde_json::Value,
    ) -> DbResult<()> {
        let now = chrono::Utc::now();
        let output_text = serde_json::to_string(output).map_err(DbError::Json)?;

        sqlx::query(
            r#"
            UPDATE processing_job_steps
            SET status = 'completed', completed_at = ?, output = ?, error_message = NULL
            WHERE job_id = ? AND step = ?
            "#,
        )
        .bind(now)
        .bind(output_text)
        .bind(job_id.to_string())
        .bind(step.as_str())
        .execute(&self.pool)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET progress_percentage = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(progress as i64)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!(
                "Job {} is not in processing",
                job_id
            )));
        }
        Ok(())
    }

    async fn advance_to_step(&self, job_id: Uuid, step: PipelineStep) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET current_step = ?, retry_count = 0
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(step.as_str())
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!(
                "Job {} is not in processing",
                job_id
            )));
        }
        Ok(())
    }

    async fn record_retry(
        &self,
        job_id: Uuid,
        step: PipelineStep,
        retry_count: u32,
        error: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET retry_count = ?, error_message = ?
            WHERE id = ? AND status IN ('queued', 'processing')
            "#,
        )
        .bind(retry_count as i64)
        .bind(error)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!(
                "Job {} is not accepting retries",
                job_id
            )));
        }

        sqlx::query(
            r#"
            UPDATE processing_job_steps
            SET retry_count = ?, error_message = ?
            WHERE job_id = ? AND step = ?
            "#,
        )
        .bind(retry_count as i64)
        .bind(error)
        .bind(job_id.to_string())
        .bind(step.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, step: PipelineStep, error: &str) -> DbResult<()> {
        let now = chrono::Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'failed', error_message = ?, completed_at = ?
            WHERE id = ? AND status IN ('queued', 'processing')
            "#,
        )
        .bind(error)
        .bind(now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!(
                "Job {} is already terminal",
                job_id
            )));
        }

        sqlx::query(
            r#"
            UPDATE processing_job_steps
            SET status = 'failed', error_message = ?, completed_at = ?
            WHERE job_id = ? AND step = ?
            "#,
        )
        .bind(error)
        .bind(now)
        .bind(job_id.to_string())
        .bind(step.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_completed(&self, job_id: Uuid) -> DbResult<()> {
        let now = chrono::Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'completed', progress_percentage = 100,
                completed_at = ?, error_message = NULL
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::Conflict(format!(
                "Job {} is not in processing",
                job_id
            )));
        }
        Ok(())
    }

    async fn mark_cancelled(&self, job_id: Uuid) -> DbResult<()> {
        let now = chrono::Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'cancelled', cancelled_at = ?
            WHERE id = ? AND status IN ('queued', 'processing')
            "#,
        )
        .bind(now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing job from one already terminal.
            let exists = sqlx::query("SELECT 1 FROM processing_jobs WHERE id = ?")
                .bind(job_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            return match exists {
                Some(_) => Err(DbError::Conflict(format!(
                    "Job {} is already terminal",
                    job_id
                ))),
                None => Err(DbError::NotFound),
            };
        }

        sqlx::query(
            r#"
            UPDATE processing_job_steps
            SET status = 'skipped'
            WHERE job_id = ? AND status IN ('pending', 'processing')
            "#,
        )
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_compression_output(
        &self,
        job_id: Uuid,
        compressed_url: &str,
        size_bytes: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE processing_jobs SET compressed_url = ?, compressed_size_bytes = ? WHERE id = ?",
        )
        .bind(compressed_url)
        .bind(size_bytes)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn set_audio_output(&self, job_id: Uuid, audio_url: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE processing_jobs SET audio_url = ? WHERE id = ?")
            .bind(audio_url)
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn set_transcript(
        &self,
        job_id: Uuid,
        transcript: &str,
        duration_secs: Option<f64>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE processing_jobs SET transcript_text = ?, transcript_duration_secs = ? WHERE id = ?",
        )
        .bind(transcript)
        .bind(duration_secs)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
