use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{CreateProcessingJob, PipelineStep, ProcessingJob, ProcessingJobStep},
};

/// Repository trait for processing jobs and their step records.
///
/// Mutating methods enforce forward-only transitions at the SQL level:
/// updates are guarded by status predicates and report `Conflict` when the
/// row was already terminal. This is the backstop for duplicate queue
/// deliveries racing the happy path.
#[async_trait]
pub trait JobsRepo: Send + Sync {
    /// Create a job plus its four step rows.
    async fn create_job(&self, input: CreateProcessingJob) -> DbResult<ProcessingJob>;

    /// Get a job by ID.
    async fn get_job(&self, id: Uuid) -> DbResult<Option<ProcessingJob>>;

    /// Get the step records of a job, in pipeline order.
    async fn get_job_steps(&self, job_id: Uuid) -> DbResult<Vec<ProcessingJobStep>>;

    /// Find a non-terminal job for an attachment, if any.
    async fn find_active_for_attachment(
        &self,
        attachment_id: Uuid,
    ) -> DbResult<Option<ProcessingJob>>;

    /// Record the provider message id of the most recent enqueue.
    async fn set_queue_message_id(&self, job_id: Uuid, message_id: &str) -> DbResult<()>;

    /// Transition the job and the given step to `processing`.
    /// No-op on job rows that are already terminal.
    async fn begin_step(&self, job_id: Uuid, step: PipelineStep) -> DbResult<()>;

    /// Mark a step completed with its output summary and bump job progress.
    async fn complete_step(
        &self,
        job_id: Uuid,
        step: PipelineStep,
        progress: u32,
        output: &serde_json::Value,
    ) -> DbResult<()>;

    /// Advance `current_step` after a successful non-final step.
    async fn advance_to_step(&self, job_id: Uuid, step: PipelineStep) -> DbResult<()>;

    /// Record a retry of the current step: bumps counters and stores the
    /// error without leaving `processing`.
    async fn record_retry(
        &self,
        job_id: Uuid,
        step: PipelineStep,
        retry_count: u32,
        error: &str,
    ) -> DbResult<()>;

    /// Terminal failure: job and step move to `failed`.
    async fn mark_failed(&self, job_id: Uuid, step: PipelineStep, error: &str) -> DbResult<()>;

    /// Terminal success after the final step.
    async fn mark_completed(&self, job_id: Uuid) -> DbResult<()>;

    /// Cancel a job. Returns `Conflict` if the job is already terminal.
    async fn mark_cancelled(&self, job_id: Uuid) -> DbResult<()>;

    /// Store the compression step's artifacts on the job row.
    async fn set_compression_output(
        &self,
        job_id: Uuid,
        compressed_url: &str,
        size_bytes: i64,
    ) -> DbResult<()>;

    /// Store the audio extraction step's artifact on the job row.
    async fn set_audio_output(&self, job_id: Uuid, audio_url: &str) -> DbResult<()>;

    /// Store the transcription step's artifacts on the job row.
    async fn set_transcript(
        &self,
        job_id: Uuid,
        transcript: &str,
        duration_secs: Option<f64>,
    ) -> DbResult<()>;
}
