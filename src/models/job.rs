use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a processing job.
///
/// ## State Transitions
///
/// ```text
/// queued ──▶ processing ──▶ completed
///    │            │
///    │            ├──▶ failed      (retry budget exhausted)
///    └────────────┴──▶ cancelled   (user request)
/// ```
///
/// Transitions are forward-only; terminal rows are never mutated again.
/// The only same-state loop is a retry of the current step, which keeps
/// the job in `processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses accept no further transitions of any kind.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// The four pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    #[default]
    Compress,
    AudioConvert,
    Transcribe,
    Embed,
}

/// Number of steps in the pipeline.
pub const PIPELINE_STEP_COUNT: u32 = 4;

impl PipelineStep {
    /// All steps in execution order.
    pub fn all() -> [PipelineStep; PIPELINE_STEP_COUNT as usize] {
        [
            PipelineStep::Compress,
            PipelineStep::AudioConvert,
            PipelineStep::Transcribe,
            PipelineStep::Embed,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Compress => "compress",
            PipelineStep::AudioConvert => "audio_convert",
            PipelineStep::Transcribe => "transcribe",
            PipelineStep::Embed => "embed",
        }
    }

    /// URL path segment used by the step callback endpoints.
    pub fn as_path(&self) -> &'static str {
        match self {
            PipelineStep::Compress => "compress",
            PipelineStep::AudioConvert => "audio-convert",
            PipelineStep::Transcribe => "transcribe",
            PipelineStep::Embed => "embed",
        }
    }

    /// Zero-based position in the pipeline.
    pub fn index(&self) -> u32 {
        match self {
            PipelineStep::Compress => 0,
            PipelineStep::AudioConvert => 1,
            PipelineStep::Transcribe => 2,
            PipelineStep::Embed => 3,
        }
    }

    /// The step that follows this one, or `None` for the final step.
    pub fn next(&self) -> Option<PipelineStep> {
        match self {
            PipelineStep::Compress => Some(PipelineStep::AudioConvert),
            PipelineStep::AudioConvert => Some(PipelineStep::Transcribe),
            PipelineStep::Transcribe => Some(PipelineStep::Embed),
            PipelineStep::Embed => None,
        }
    }

    /// Progress percentage after this step completes: 25, 50, 75, 100.
    pub fn completed_progress(&self) -> u32 {
        (self.index() + 1) * 100 / PIPELINE_STEP_COUNT
    }
}

impl std::str::FromStr for PipelineStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compress" => Ok(PipelineStep::Compress),
            "audio_convert" | "audio-convert" => Ok(PipelineStep::AudioConvert),
            "transcribe" => Ok(PipelineStep::Transcribe),
            "embed" => Ok(PipelineStep::Embed),
            _ => Err(format!("Invalid pipeline step: {}", s)),
        }
    }
}

/// A media processing job: one per attachment submission.
///
/// Artifact pointers (`compressed_url`, `audio_url`, `transcript_text`) are
/// written by the step that produced them so later steps need no external
/// lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: Uuid,
    pub attachment_id: Uuid,
    pub user_id: Uuid,
    pub source_url: String,
    pub status: JobStatus,
    pub current_step: PipelineStep,
    pub progress_percentage: u32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    /// Message id returned by the queue provider for the most recent enqueue.
    pub queue_message_id: Option<String>,
    pub compressed_url: Option<String>,
    pub compressed_size_bytes: Option<i64>,
    pub audio_url: Option<String>,
    pub transcript_text: Option<String>,
    pub transcript_duration_secs: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Input for creating a processing job.
#[derive(Debug, Clone)]
pub struct CreateProcessingJob {
    pub attachment_id: Uuid,
    pub user_id: Uuid,
    pub source_url: String,
    pub max_retries: u32,
}

/// Per-step status of a processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Processing => "processing",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "processing" => Ok(StepStatus::Processing),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "skipped" => Ok(StepStatus::Skipped),
            _ => Err(format!("Invalid step status: {}", s)),
        }
    }
}

/// Execution record of one step of one job.
///
/// All four rows are created with the job so the status endpoint can
/// always render the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJobStep {
    pub job_id: Uuid,
    pub step: PipelineStep,
    pub status: StepStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    /// JSON summary of the step's result, e.g. artifact sizes.
    pub output: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_ladder() {
        assert_eq!(PipelineStep::Compress.completed_progress(), 25);
        assert_eq!(PipelineStep::AudioConvert.completed_progress(), 50);
        assert_eq!(PipelineStep::Transcribe.completed_progress(), 75);
        assert_eq!(PipelineStep::Embed.completed_progress(), 100);
    }

    #[test]
    fn test_step_order() {
        let mut step = PipelineStep::Compress;
        let mut seen = vec![step];
        while let Some(next) = step.next() {
            seen.push(next);
            step = next;
        }
        assert_eq!(seen, PipelineStep::all());
    }

    #[test]
    fn test_step_path_round_trip() {
        for step in PipelineStep::all() {
            assert_eq!(step.as_path().parse::<PipelineStep>().unwrap(), step);
            assert_eq!(step.as_str().parse::<PipelineStep>().unwrap(), step);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }
}
