pub mod client;
pub mod segmenter;
pub mod worker;

pub use client::{DualEmbedder, DualEmbedding, EmbeddingError, validate_vector};
pub use segmenter::{TranscriptSegment, segment_transcript};
pub use worker::{EmbedRunResult, run_embedding_batch, start_embedding_worker};
