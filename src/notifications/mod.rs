//! Best-effort notification side-channel.
//!
//! Pipeline transitions emit user notifications, but a notification
//! failure must never fail or retry the transition that produced it.
//! Every error here is logged and swallowed.

use std::sync::Arc;

use crate::{
    db::DbPool,
    models::{NewNotification, NotificationKind, ProcessingJob},
};

#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DbPool>,
}

impl NotificationService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Record a job lifecycle event for the job's owner.
    pub async fn notify_job_event(&self, job: &ProcessingJob, kind: NotificationKind) {
        let (title, body) = match kind {
            NotificationKind::JobStarted => (
                "Processing started".to_string(),
                format!("Your video upload {} is being processed.", job.attachment_id),
            ),
            NotificationKind::JobProgress => (
                "Processing update".to_string(),
                format!(
                    "Your video upload {} is {}% done.",
                    job.attachment_id, job.progress_percentage
                ),
            ),
            NotificationKind::JobCompleted => (
                "Processing complete".to_string(),
                format!("Your video upload {} is ready.", job.attachment_id),
            ),
            NotificationKind::JobFailed => (
                "Processing failed".to_string(),
                format!(
                    "Your video upload {} could not be processed.",
                    job.attachment_id
                ),
            ),
            NotificationKind::JobCancelled => (
                "Processing cancelled".to_string(),
                format!("Processing of upload {} was cancelled.", job.attachment_id),
            ),
        };

        let result = self
            .db
            .notifications()
            .insert(NewNotification {
                user_id: job.user_id,
                kind,
                title,
                body,
                job_id: Some(job.id),
            })
            .await;

        if let Err(e) = result {
            tracing::warn!(
                job_id = %job.id,
                kind = kind.as_str(),
                error = %e,
                "Failed to record notification"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{
        db::test_db,
        models::{CreateProcessingJob, NotificationKind},
    };

    #[tokio::test]
    async fn test_notify_inserts_row_for_job_owner() {
        let db = test_db().await;
        let job = db
            .jobs()
            .create_job(CreateProcessingJob {
                attachment_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                source_url: "https://cdn.example.com/raw/a.mp4".to_string(),
                max_retries: 3,
            })
            .await
            .unwrap();

        let service = NotificationService::new(Arc::clone(&db));
        service
            .notify_job_event(&job, NotificationKind::JobCompleted)
            .await;

        let rows = db.notifications().list_for_user(job.user_id, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, NotificationKind::JobCompleted);
        assert_eq!(rows[0].job_id, Some(job.id));
    }
}
