mod common;
mod embedding_queue;
mod embeddings;
mod jobs;
mod notifications;
mod segments;

pub use embedding_queue::SqliteEmbeddingQueueRepo;
pub use embeddings::SqliteEmbeddingsRepo;
pub use jobs::SqliteJobsRepo;
pub use notifications::SqliteNotificationsRepo;
pub use segments::SqliteSegmentsRepo;
