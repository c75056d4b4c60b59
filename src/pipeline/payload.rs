use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::PipelineStep;

/// Fields every step callback carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepContext {
    /// The processing job id.
    pub queue_id: Uuid,
    pub attachment_id: Uuid,
    pub user_id: Uuid,
    /// When the message was enqueued.
    pub timestamp: DateTime<Utc>,
    /// 0 for the first delivery of a step, incremented per handler retry.
    #[serde(default)]
    pub retry_attempt: u32,
}

/// Tagged step callback payload.
///
/// The tag makes payloads self-describing on the wire, so a message routed
/// to the wrong step endpoint is rejected instead of executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepPayload {
    Compress(StepContext),
    AudioConvert(StepContext),
    Transcribe(StepContext),
    Embed(StepContext),
}

impl StepPayload {
    pub fn new(step: PipelineStep, context: StepContext) -> Self {
        match step {
            PipelineStep::Compress => StepPayload::Compress(context),
            PipelineStep::AudioConvert => StepPayload::AudioConvert(context),
            PipelineStep::Transcribe => StepPayload::Transcribe(context),
            PipelineStep::Embed => StepPayload::Embed(context),
        }
    }

    pub fn step(&self) -> PipelineStep {
        match self {
            StepPayload::Compress(_) => PipelineStep::Compress,
            StepPayload::AudioConvert(_) => PipelineStep::AudioConvert,
            StepPayload::Transcribe(_) => PipelineStep::Transcribe,
            StepPayload::Embed(_) => PipelineStep::Embed,
        }
    }

    pub fn context(&self) -> &StepContext {
        match self {
            StepPayload::Compress(ctx)
            | StepPayload::AudioConvert(ctx)
            | StepPayload::Transcribe(ctx)
            | StepPayload::Embed(ctx) => ctx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> StepContext {
        StepContext {
            queue_id: Uuid::new_v4(),
            attachment_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            retry_attempt: 0,
        }
    }

    #[test]
    fn test_payload_serializes_with_step_tag() {
        let payload = StepPayload::new(PipelineStep::AudioConvert, context());
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["step"], "audio_convert");
        assert!(json["queue_id"].is_string());
    }

    #[test]
    fn test_payload_round_trip_preserves_step() {
        for step in PipelineStep::all() {
            let payload = StepPayload::new(step, context());
            let json = serde_json::to_string(&payload).unwrap();
            let back: StepPayload = serde_json::from_str(&json).unwrap();
            assert_eq!(back.step(), step);
        }
    }

    #[test]
    fn test_unknown_step_tag_is_rejected() {
        let json = r#"{"step":"upscale","queue_id":"0","attachment_id":"0","user_id":"0","timestamp":"2026-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<StepPayload>(json).is_err());
    }

    #[test]
    fn test_missing_retry_attempt_defaults_to_zero() {
        let payload = StepPayload::new(PipelineStep::Compress, context());
        let mut json = serde_json::to_value(&payload).unwrap();
        json.as_object_mut().unwrap().remove("retry_attempt");
        let back: StepPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.context().retry_attempt, 0);
    }
}
