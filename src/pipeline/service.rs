use std::sync::Arc;

use thiserror::Error;

use crate::{
    config::QueueConfig,
    db::{DbError, DbPool},
    embeddings::{DualEmbedder, EmbeddingError, segment_transcript},
    media::{MediaBackend, MediaError},
    models::{
        CreateProcessingJob, JobStatus, NewVideoSegment, NotificationKind, PipelineStep,
        ProcessingJob, ProcessingJobStep,
    },
    notifications::NotificationService,
    pipeline::payload::{StepContext, StepPayload},
    queue::{EnqueueOptions, QueueError, QueueManager, job_lane},
};

/// Errors surfaced by pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Job not found")]
    NotFound,

    /// Cancelling a job that already reached a terminal state.
    #[error("Job is already in a terminal state")]
    CancellationConflict,

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// A failure while executing a step's work. These count against the job's
/// retry budget; bookkeeping errors do not and propagate as
/// [`PipelineError`] instead.
#[derive(Debug, Error)]
enum StepError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// A prior step's artifact is missing from the job row.
    #[error("Missing artifact from earlier step: {0}")]
    MissingArtifact(&'static str),
}

/// What a step callback did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step succeeded; the next one was enqueued.
    Advanced(PipelineStep),
    /// Final step succeeded; the job is complete.
    Completed,
    /// Step failed; a retry of the same step was enqueued.
    Retried { retry: u32 },
    /// Step failed with no retry budget left; the job is failed.
    Failed,
    /// Duplicate, stale, or post-cancellation delivery; nothing done.
    Noop,
}

/// Orchestrates the media processing state machine.
///
/// All step execution is driven by queue callbacks; this service never
/// blocks a request on media work. Handlers are idempotent, so the queue
/// provider may deliver any message more than once.
pub struct PipelineService {
    db: Arc<DbPool>,
    queue: QueueManager,
    media: Arc<dyn MediaBackend>,
    embedder: DualEmbedder,
    notifier: NotificationService,
    queue_config: QueueConfig,
    callback_base_url: String,
}

impl PipelineService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DbPool>,
        queue: QueueManager,
        media: Arc<dyn MediaBackend>,
        embedder: DualEmbedder,
        notifier: NotificationService,
        queue_config: QueueConfig,
        callback_base_url: String,
    ) -> Self {
        Self {
            db,
            queue,
            media,
            embedder,
            notifier,
            queue_config,
            callback_base_url: callback_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a job and enqueue its first step.
    ///
    /// Submitting an attachment that already has an active job returns
    /// that job instead of starting a second pipeline. Returns the job
    /// and whether it was newly created.
    pub async fn start_job(
        &self,
        input: CreateProcessingJob,
    ) -> Result<(ProcessingJob, bool), PipelineError> {
        if let Some(existing) = self
            .db
            .jobs()
            .find_active_for_attachment(input.attachment_id)
            .await?
        {
            // A queued job with no message id means the initial enqueue
            // failed after the row was written; retry it here so the
            // attachment is not stranded behind its own half-started job.
            if existing.status == JobStatus::Queued && existing.queue_message_id.is_none() {
                tracing::warn!(
                    job_id = %existing.id,
                    attachment_id = %input.attachment_id,
                    "Active job was never enqueued, retrying its first step"
                );
                self.enqueue_step(&existing, PipelineStep::Compress, 0, None)
                    .await?;
                let job = self
                    .db
                    .jobs()
                    .get_job(existing.id)
                    .await?
                    .ok_or(PipelineError::NotFound)?;
                return Ok((job, false));
            }
            tracing::info!(
                job_id = %existing.id,
                attachment_id = %input.attachment_id,
                "Attachment already has an active job"
            );
            return Ok((existing, false));
        }

        let job = self.db.jobs().create_job(input).await?;
        tracing::info!(
            job_id = %job.id,
            attachment_id = %job.attachment_id,
            user_id = %job.user_id,
            "Processing job created"
        );

        self.enqueue_step(&job, PipelineStep::Compress, 0, None)
            .await?;
        self.notifier
            .notify_job_event(&job, NotificationKind::JobStarted)
            .await;
        Ok((job, true))
    }

    /// Handle a step callback from the queue provider.
    pub async fn handle_step(&self, payload: StepPayload) -> Result<StepOutcome, PipelineError> {
        let step = payload.step();
        let ctx = payload.context();

        let Some(job) = self.db.jobs().get_job(ctx.queue_id).await? else {
            return Err(PipelineError::NotFound);
        };

        if job.status.is_terminal() {
            tracing::info!(
                job_id = %job.id,
                status = job.status.as_str(),
                step = step.as_str(),
                "Dropping callback for terminal job"
            );
            return Ok(StepOutcome::Noop);
        }
        if job.current_step.index() > step.index() {
            tracing::info!(
                job_id = %job.id,
                step = step.as_str(),
                current_step = job.current_step.as_str(),
                "Dropping stale redelivery"
            );
            return Ok(StepOutcome::Noop);
        }

        // A cancel can land between the checks above and this update; the
        // guarded write catches it.
        match self.db.jobs().begin_step(job.id, step).await {
            Ok(()) => {}
            Err(DbError::Conflict(_)) => return Ok(StepOutcome::Noop),
            Err(e) => return Err(e.into()),
        }

        match self.execute_step(&job, step).await {
            Ok(output) => {
                self.db
                    .jobs()
                    .complete_step(job.id, step, step.completed_progress(), &output)
                    .await?;
                match step.next() {
                    Some(next) => {
                        self.db.jobs().advance_to_step(job.id, next).await?;
                        self.enqueue_step(&job, next, 0, None).await?;
                        tracing::info!(
                            job_id = %job.id,
                            step = step.as_str(),
                            next = next.as_str(),
                            "Step completed"
                        );
                        Ok(StepOutcome::Advanced(next))
                    }
                    None => {
                        self.db.jobs().mark_completed(job.id).await?;
                        if let Some(job) = self.db.jobs().get_job(job.id).await? {
                            self.notifier
                                .notify_job_event(&job, NotificationKind::JobCompleted)
                                .await;
                        }
                        tracing::info!(job_id = %job.id, "Pipeline completed");
                        Ok(StepOutcome::Completed)
                    }
                }
            }
            Err(step_error) => self.handle_step_failure(&job, step, step_error).await,
        }
    }

    async fn handle_step_failure(
        &self,
        job: &ProcessingJob,
        step: PipelineStep,
        error: StepError,
    ) -> Result<StepOutcome, PipelineError> {
        let retry = job.retry_count + 1;
        if retry < job.max_retries {
            self.db
                .jobs()
                .record_retry(job.id, step, retry, &error.to_string())
                .await?;
            let delay = u64::from(retry) * self.queue_config.step_retry_delay_secs;
            self.enqueue_step(job, step, retry, Some(delay)).await?;
            tracing::warn!(
                job_id = %job.id,
                step = step.as_str(),
                retry,
                delay_secs = delay,
                error = %error,
                "Step failed; retry enqueued"
            );
            Ok(StepOutcome::Retried { retry })
        } else {
            self.db
                .jobs()
                .mark_failed(job.id, step, &error.to_string())
                .await?;
            if let Some(job) = self.db.jobs().get_job(job.id).await? {
                self.notifier
                    .notify_job_event(&job, NotificationKind::JobFailed)
                    .await;
            }
            tracing::error!(
                job_id = %job.id,
                step = step.as_str(),
                error = %error,
                "Step failed permanently"
            );
            Ok(StepOutcome::Failed)
        }
    }

    /// Cancel a job. Terminal jobs cannot be cancelled.
    pub async fn cancel(&self, job_id: uuid::Uuid) -> Result<ProcessingJob, PipelineError> {
        match self.db.jobs().mark_cancelled(job_id).await {
            Ok(()) => {}
            Err(DbError::NotFound) => return Err(PipelineError::NotFound),
            Err(DbError::Conflict(_)) => return Err(PipelineError::CancellationConflict),
            Err(e) => return Err(e.into()),
        }

        let job = self
            .db
            .jobs()
            .get_job(job_id)
            .await?
            .ok_or(PipelineError::NotFound)?;
        self.notifier
            .notify_job_event(&job, NotificationKind::JobCancelled)
            .await;
        tracing::info!(job_id = %job.id, "Job cancelled");
        Ok(job)
    }

    /// Job row plus its step records.
    pub async fn status(
        &self,
        job_id: uuid::Uuid,
    ) -> Result<(ProcessingJob, Vec<ProcessingJobStep>), PipelineError> {
        let job = self
            .db
            .jobs()
            .get_job(job_id)
            .await?
            .ok_or(PipelineError::NotFound)?;
        let steps = self.db.jobs().get_job_steps(job_id).await?;
        Ok((job, steps))
    }

    async fn execute_step(
        &self,
        job: &ProcessingJob,
        step: PipelineStep,
    ) -> Result<serde_json::Value, StepError> {
        match step {
            PipelineStep::Compress => {
                let compressed = self.media.compress(&job.source_url).await?;
                self.db
                    .jobs()
                    .set_compression_output(job.id, &compressed.url, compressed.size_bytes)
                    .await
                    .map_err(db_as_artifact_loss)?;
                Ok(serde_json::json!({
                    "url": compressed.url,
                    "size_bytes": compressed.size_bytes,
                }))
            }
            PipelineStep::AudioConvert => {
                let video_url = job
                    .compressed_url
                    .as_deref()
                    .ok_or(StepError::MissingArtifact("compressed_url"))?;
                let audio = self.media.extract_audio(video_url).await?;
                self.db
                    .jobs()
                    .set_audio_output(job.id, &audio.url)
                    .await
                    .map_err(db_as_artifact_loss)?;
                Ok(serde_json::json!({"url": audio.url}))
            }
            PipelineStep::Transcribe => {
                let audio_url = job
                    .audio_url
                    .as_deref()
                    .ok_or(StepError::MissingArtifact("audio_url"))?;
                let transcript = self.media.transcribe(audio_url).await?;
                self.db
                    .jobs()
                    .set_transcript(job.id, &transcript.text, transcript.duration_secs)
                    .await
                    .map_err(db_as_artifact_loss)?;
                Ok(serde_json::json!({
                    "transcript_chars": transcript.text.len(),
                    "duration_secs": transcript.duration_secs,
                }))
            }
            PipelineStep::Embed => {
                let transcript = job
                    .transcript_text
                    .as_deref()
                    .ok_or(StepError::MissingArtifact("transcript_text"))?;
                let segments = segment_transcript(transcript);
                let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
                let embeddings = self.embedder.embed_batch(&texts).await?;

                let new_segments: Vec<NewVideoSegment> = segments
                    .into_iter()
                    .zip(embeddings)
                    .map(|(segment, embedding)| NewVideoSegment {
                        attachment_id: job.attachment_id,
                        segment_index: segment.index,
                        start_time_secs: segment.start_time_secs,
                        end_time_secs: segment.end_time_secs,
                        content_text: segment.text,
                        word_count: segment.word_count,
                        recall_vector: embedding.recall,
                        rerank_vector: embedding.rerank,
                    })
                    .collect();

                let count = new_segments.len();
                self.db
                    .segments()
                    .replace_for_attachment(job.attachment_id, new_segments)
                    .await
                    .map_err(db_as_artifact_loss)?;
                Ok(serde_json::json!({"segments": count}))
            }
        }
    }

    async fn enqueue_step(
        &self,
        job: &ProcessingJob,
        step: PipelineStep,
        retry_attempt: u32,
        delay_secs: Option<u64>,
    ) -> Result<(), PipelineError> {
        let lane = job_lane(job.user_id);
        self.queue
            .ensure_queue(&lane, self.queue_config.lane_parallelism)
            .await?;

        let payload = StepPayload::new(
            step,
            StepContext {
                queue_id: job.id,
                attachment_id: job.attachment_id,
                user_id: job.user_id,
                timestamp: chrono::Utc::now(),
                retry_attempt,
            },
        );
        let destination = format!("{}/api/pipeline/steps/{}", self.callback_base_url, step.as_path());
        let options = EnqueueOptions {
            retries: Some(self.queue_config.provider_retries),
            delay_secs,
            ..EnqueueOptions::default()
        };

        let body = serde_json::to_value(&payload)
            .map_err(|e| PipelineError::Db(DbError::Json(e)))?;
        let message_id = self.queue.enqueue(&lane, &destination, &body, &options).await?;
        self.db.jobs().set_queue_message_id(job.id, &message_id).await?;
        Ok(())
    }
}

// Step execution writes its artifact into the job row; if that write
// fails the artifact is lost and the step must rerun, so the error joins
// the retry budget rather than propagating as a bookkeeping failure.
fn db_as_artifact_loss(e: DbError) -> StepError {
    StepError::MissingArtifact(match e {
        DbError::NotFound => "job row",
        _ => "artifact write",
    })
}
