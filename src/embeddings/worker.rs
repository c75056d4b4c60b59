//! Background embedding queue processor.
//!
//! Each run sweeps expired leases back to the queue, claims a batch of
//! ready items, embeds them in both spaces, and upserts the results.
//! Successfully embedded items are deleted from the queue; failures are
//! rescheduled with backoff until their retry budget runs out.

use std::sync::Arc;

use crate::{
    config::EmbeddingQueueConfig,
    db::DbPool,
    embeddings::client::DualEmbedder,
    models::{EmbeddingQueueItem, UpsertEmbeddingRecord},
};

/// Counters for a single processor run.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct EmbedRunResult {
    /// Items whose expired lease was returned to the queue.
    pub reclaimed: u64,
    /// Items claimed this run.
    pub claimed: usize,
    /// Items embedded and removed from the queue.
    pub embedded: usize,
    /// Subset of `embedded` where only one space succeeded.
    pub partial: usize,
    /// Items rescheduled for a later retry.
    pub rescheduled: usize,
    /// Items that exhausted their retry budget this run.
    pub failed: usize,
}

impl EmbedRunResult {
    pub fn has_activity(&self) -> bool {
        self.reclaimed > 0 || self.claimed > 0
    }
}

/// One processor pass over the embedding queue.
pub async fn run_embedding_batch(
    db: &DbPool,
    embedder: &DualEmbedder,
    config: &EmbeddingQueueConfig,
) -> Result<EmbedRunResult, Box<dyn std::error::Error + Send + Sync>> {
    let mut result = EmbedRunResult::default();
    let now = chrono::Utc::now();

    result.reclaimed = db.embedding_queue().reclaim_expired(now).await?;
    if result.reclaimed > 0 {
        tracing::warn!(
            count = result.reclaimed,
            "Reclaimed embedding queue items with expired leases"
        );
    }

    let batch = db
        .embedding_queue()
        .claim_batch(config.batch_size, now, now + config.lease())
        .await?;
    result.claimed = batch.len();

    for item in batch {
        process_item(db, embedder, config, &item, &mut result).await?;
    }

    Ok(result)
}

async fn process_item(
    db: &DbPool,
    embedder: &DualEmbedder,
    config: &EmbeddingQueueConfig,
    item: &EmbeddingQueueItem,
    result: &mut EmbedRunResult,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match embedder.embed(&item.content_text).await {
        Ok(embedding) => {
            let is_partial = embedding.recall.is_none() || embedding.rerank.is_none();
            db.embeddings()
                .upsert(UpsertEmbeddingRecord {
                    content_type: item.content_type,
                    content_id: item.content_id,
                    content_hash: item.content_hash.clone(),
                    recall_vector: embedding.recall,
                    rerank_vector: embedding.rerank,
                    token_count: embedding.token_count,
                })
                .await?;
            db.embedding_queue().delete_item(item.id).await?;
            result.embedded += 1;
            if is_partial {
                result.partial += 1;
                tracing::warn!(
                    content_type = item.content_type.as_str(),
                    content_id = %item.content_id,
                    "Stored partial embedding; one backend failed"
                );
            }
        }
        Err(e) => {
            let retry = item.retry_count + 1;
            if retry < item.max_retries {
                let delay = config.backoff.delay(retry);
                db.embedding_queue()
                    .reschedule(
                        item.id,
                        retry,
                        chrono::Utc::now() + delay,
                        &e.to_string(),
                    )
                    .await?;
                result.rescheduled += 1;
                tracing::warn!(
                    content_type = item.content_type.as_str(),
                    content_id = %item.content_id,
                    retry,
                    delay_secs = delay.num_seconds(),
                    error = %e,
                    "Embedding failed; rescheduled"
                );
            } else {
                db.embedding_queue()
                    .mark_failed(item.id, retry, &e.to_string())
                    .await?;
                result.failed += 1;
                tracing::error!(
                    content_type = item.content_type.as_str(),
                    content_id = %item.content_id,
                    error = %e,
                    "Embedding failed permanently"
                );
            }
        }
    }
    Ok(())
}

/// Run the embedding queue processor on an interval until the process
/// shuts down.
pub async fn start_embedding_worker(
    db: Arc<DbPool>,
    embedder: DualEmbedder,
    config: EmbeddingQueueConfig,
) {
    tracing::info!(
        interval_secs = config.interval_secs,
        batch_size = config.batch_size,
        "Embedding queue processor started"
    );

    loop {
        match run_embedding_batch(&db, &embedder, &config).await {
            Ok(result) if result.has_activity() => {
                tracing::info!(
                    claimed = result.claimed,
                    embedded = result.embedded,
                    partial = result.partial,
                    rescheduled = result.rescheduled,
                    failed = result.failed,
                    reclaimed = result.reclaimed,
                    "Embedding queue run complete"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Embedding queue run failed");
            }
        }
        tokio::time::sleep(config.interval()).await;
    }
}
