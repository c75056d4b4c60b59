use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of pipeline notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    JobStarted,
    JobProgress,
    JobCompleted,
    JobFailed,
    JobCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::JobStarted => "job_started",
            NotificationKind::JobProgress => "job_progress",
            NotificationKind::JobCompleted => "job_completed",
            NotificationKind::JobFailed => "job_failed",
            NotificationKind::JobCancelled => "job_cancelled",
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "job_started" => Ok(NotificationKind::JobStarted),
            "job_progress" => Ok(NotificationKind::JobProgress),
            "job_completed" => Ok(NotificationKind::JobCompleted),
            "job_failed" => Ok(NotificationKind::JobFailed),
            "job_cancelled" => Ok(NotificationKind::JobCancelled),
            _ => Err(format!("Invalid notification kind: {}", s)),
        }
    }
}

/// A user-facing notification record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub job_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Input for inserting a notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub job_id: Option<Uuid>,
}
