pub mod error;
pub mod repos;
pub mod sqlite;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::DatabaseConfig;

/// Cached repository trait objects, created once at startup.
struct CachedRepos {
    jobs: Arc<dyn JobsRepo>,
    embedding_queue: Arc<dyn EmbeddingQueueRepo>,
    embeddings: Arc<dyn EmbeddingsRepo>,
    segments: Arc<dyn SegmentsRepo>,
    notifications: Arc<dyn NotificationsRepo>,
}

/// SQLite-backed database pool.
///
/// Repositories are cached at construction time to avoid allocation on
/// each access.
pub struct DbPool {
    inner: sqlx::SqlitePool,
    repos: CachedRepos,
}

impl DbPool {
    /// Create a DbPool from an existing SQLite pool.
    /// Primarily useful for testing.
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        let repos = CachedRepos {
            jobs: Arc::new(sqlite::SqliteJobsRepo::new(pool.clone())),
            embedding_queue: Arc::new(sqlite::SqliteEmbeddingQueueRepo::new(pool.clone())),
            embeddings: Arc::new(sqlite::SqliteEmbeddingsRepo::new(pool.clone())),
            segments: Arc::new(sqlite::SqliteSegmentsRepo::new(pool.clone())),
            notifications: Arc::new(sqlite::SqliteNotificationsRepo::new(pool.clone())),
        };
        DbPool { inner: pool, repos }
    }

    /// Open the pool described by the configuration.
    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(
                sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(&config.path)
                    .create_if_missing(config.create_if_missing)
                    .journal_mode(if config.wal_mode {
                        sqlx::sqlite::SqliteJournalMode::Wal
                    } else {
                        sqlx::sqlite::SqliteJournalMode::Delete
                    })
                    .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms)),
            )
            .await?;

        Ok(Self::from_sqlite(pool))
    }

    /// Run pending schema migrations.
    pub async fn run_migrations(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations_sqlx/sqlite")
            .run(&self.inner)
            .await?;
        Ok(())
    }

    /// Verify the connection is alive.
    pub async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.inner).await?;
        Ok(())
    }

    pub fn jobs(&self) -> Arc<dyn JobsRepo> {
        Arc::clone(&self.repos.jobs)
    }

    pub fn embedding_queue(&self) -> Arc<dyn EmbeddingQueueRepo> {
        Arc::clone(&self.repos.embedding_queue)
    }

    pub fn embeddings(&self) -> Arc<dyn EmbeddingsRepo> {
        Arc::clone(&self.repos.embeddings)
    }

    pub fn segments(&self) -> Arc<dyn SegmentsRepo> {
        Arc::clone(&self.repos.segments)
    }

    pub fn notifications(&self) -> Arc<dyn NotificationsRepo> {
        Arc::clone(&self.repos.notifications)
    }
}

/// In-memory database with migrations applied, for tests.
#[cfg(test)]
pub async fn test_db() -> Arc<DbPool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let db = DbPool::from_sqlite(pool);
    db.run_migrations().await.expect("migrations");
    Arc::new(db)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::models::{
        ContentType, CreateProcessingJob, JobStatus, PipelineStep, QueueEmbeddingInput,
        QueueItemStatus, StepStatus, UpsertEmbeddingRecord,
    };

    fn job_input() -> CreateProcessingJob {
        CreateProcessingJob {
            attachment_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            source_url: "https://cdn.example.com/raw/lecture.mp4".to_string(),
            max_retries: 3,
        }
    }

    fn queue_input(text: &str) -> QueueEmbeddingInput {
        QueueEmbeddingInput {
            content_type: ContentType::Lesson,
            content_id: Uuid::new_v4(),
            content_text: text.to_string(),
            priority: 5,
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn test_create_job_seeds_step_rows() {
        let db = test_db().await;
        let job = db.jobs().create_job(job_input()).await.unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.current_step, PipelineStep::Compress);
        assert_eq!(job.progress_percentage, 0);

        let steps = db.jobs().get_job_steps(job.id).await.unwrap();
        assert_eq!(steps.len(), 4);
        assert!(steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(steps[0].step, PipelineStep::Compress);
        assert_eq!(steps[3].step, PipelineStep::Embed);
    }

    #[tokio::test]
    async fn test_step_progression_updates_job() {
        let db = test_db().await;
        let job = db.jobs().create_job(job_input()).await.unwrap();

        db.jobs()
            .begin_step(job.id, PipelineStep::Compress)
            .await
            .unwrap();
        db.jobs()
            .complete_step(
                job.id,
                PipelineStep::Compress,
                25,
                &serde_json::json!({"size_bytes": 1024}),
            )
            .await
            .unwrap();
        db.jobs()
            .advance_to_step(job.id, PipelineStep::AudioConvert)
            .await
            .unwrap();

        let job = db.jobs().get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.current_step, PipelineStep::AudioConvert);
        assert_eq!(job.progress_percentage, 25);
        assert!(job.started_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_conflicts() {
        let db = test_db().await;
        let job = db.jobs().create_job(job_input()).await.unwrap();

        db.jobs().mark_cancelled(job.id).await.unwrap();
        let job = db.jobs().get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.cancelled_at.is_some());

        let err = db.jobs().mark_cancelled(job.id).await.unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_begin_step_on_cancelled_job_conflicts() {
        let db = test_db().await;
        let job = db.jobs().create_job(job_input()).await.unwrap();
        db.jobs().mark_cancelled(job.id).await.unwrap();

        let err = db
            .jobs()
            .begin_step(job.id, PipelineStep::Compress)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_queue_upsert_same_hash_is_noop() {
        let db = test_db().await;
        let input = queue_input("intro to derivatives");
        let first = db.embedding_queue().upsert_item(input.clone()).await.unwrap();

        let mut again = input.clone();
        again.priority = 1;
        let second = db.embedding_queue().upsert_item(again).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.priority, 5);
    }

    #[tokio::test]
    async fn test_queue_upsert_new_hash_resets_row() {
        let db = test_db().await;
        let input = queue_input("original text");
        let first = db.embedding_queue().upsert_item(input.clone()).await.unwrap();
        db.embedding_queue()
            .mark_failed(first.id, 3, "backend down")
            .await
            .unwrap();

        let mut updated = input;
        updated.content_text = "revised text".to_string();
        let second = db.embedding_queue().upsert_item(updated).await.unwrap();

        assert_eq!(second.status, QueueItemStatus::Queued);
        assert_eq!(second.retry_count, 0);
        assert!(second.error_message.is_none());
    }

    #[tokio::test]
    async fn test_claim_batch_orders_by_priority_then_age() {
        let db = test_db().await;
        let mut low = queue_input("low priority");
        low.priority = 9;
        let mut high = queue_input("high priority");
        high.priority = 1;
        db.embedding_queue().upsert_item(low).await.unwrap();
        db.embedding_queue().upsert_item(high).await.unwrap();

        let now = Utc::now();
        let claimed = db
            .embedding_queue()
            .claim_batch(10, now, now + Duration::minutes(2))
            .await
            .unwrap();

        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].priority, 1);
        assert!(claimed.iter().all(|i| i.status == QueueItemStatus::Processing));
        assert!(claimed.iter().all(|i| i.lease_expires_at.is_some()));

        // Nothing left to claim while leases are held.
        let again = db
            .embedding_queue()
            .claim_batch(10, now, now + Duration::minutes(2))
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_claim_batch_skips_items_out_of_retries() {
        let db = test_db().await;
        let item = db
            .embedding_queue()
            .upsert_item(queue_input("out of budget"))
            .await
            .unwrap();
        // A queued row whose retry counter already reached the budget
        // must never be handed out again.
        db.embedding_queue()
            .reschedule(item.id, item.max_retries, Utc::now() - Duration::minutes(1), "boom")
            .await
            .unwrap();

        let now = Utc::now();
        let claimed = db
            .embedding_queue()
            .claim_batch(10, now, now + Duration::minutes(2))
            .await
            .unwrap();
        assert!(claimed.is_empty());
    }

    #[tokio::test]
    async fn test_reclaim_expired_returns_items_to_queued() {
        let db = test_db().await;
        db.embedding_queue()
            .upsert_item(queue_input("leased"))
            .await
            .unwrap();

        let now = Utc::now();
        let claimed = db
            .embedding_queue()
            .claim_batch(10, now, now - Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);

        let reclaimed = db.embedding_queue().reclaim_expired(now).await.unwrap();
        assert_eq!(reclaimed, 1);

        let item = db
            .embedding_queue()
            .get_item(claimed[0].content_type, claimed[0].content_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.status, QueueItemStatus::Queued);
        // A lease expiry does not consume a retry.
        assert_eq!(item.retry_count, 0);
    }

    #[tokio::test]
    async fn test_embeddings_partial_upsert_merges() {
        let db = test_db().await;
        let content_id = Uuid::new_v4();

        db.embeddings()
            .upsert(UpsertEmbeddingRecord {
                content_type: ContentType::Post,
                content_id,
                content_hash: "h1".to_string(),
                recall_vector: Some(vec![0.1, 0.2]),
                rerank_vector: None,
                token_count: Some(12),
            })
            .await
            .unwrap();

        let merged = db
            .embeddings()
            .upsert(UpsertEmbeddingRecord {
                content_type: ContentType::Post,
                content_id,
                content_hash: "h1".to_string(),
                recall_vector: None,
                rerank_vector: Some(vec![0.3, 0.4]),
                token_count: None,
            })
            .await
            .unwrap();

        assert!(merged.has_recall);
        assert!(merged.has_rerank);
        assert_eq!(merged.recall_vector, Some(vec![0.1, 0.2]));
        assert_eq!(merged.rerank_vector, Some(vec![0.3, 0.4]));
        assert_eq!(merged.token_count, Some(12));
    }
}
