mod lanes;
mod manager;

pub use lanes::job_lane;
pub use manager::{EnqueueOptions, EnsureOutcome, QueueError, QueueInfo, QueueManager, QueueResult};
