mod embedding_queue;
mod embeddings;
mod jobs;
mod notifications;
mod segments;

pub use embedding_queue::*;
pub use embeddings::*;
pub use jobs::*;
pub use notifications::*;
pub use segments::*;
