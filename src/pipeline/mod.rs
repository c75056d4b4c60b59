mod payload;
mod service;

pub use payload::{StepContext, StepPayload};
pub use service::{PipelineError, PipelineService, StepOutcome};
