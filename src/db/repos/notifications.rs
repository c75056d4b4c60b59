use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{NewNotification, Notification},
};

/// Repository trait for pipeline notifications.
#[async_trait]
pub trait NotificationsRepo: Send + Sync {
    /// Insert a notification.
    async fn insert(&self, input: NewNotification) -> DbResult<Notification>;

    /// List a user's notifications, newest first.
    async fn list_for_user(&self, user_id: Uuid, limit: u32) -> DbResult<Vec<Notification>>;
}
