use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::NotificationsRepo,
    },
    models::{NewNotification, Notification},
};

pub struct SqliteNotificationsRepo {
    pool: SqlitePool,
}

impl SqliteNotificationsRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn notification_from_row(row: &SqliteRow) -> DbResult<Notification> {
        let kind_str: String = row.get("kind");
        let job_id: Option<String> = row.get("job_id");

        Ok(Notification {
            id: parse_uuid(&row.get::<String, _>("id"))?,
            user_id: parse_uuid(&row.get::<String, _>("user_id"))?,
            kind: kind_str.parse().map_err(DbError::Internal)?,
            title: row.get("title"),
            body: row.get("body"),
            job_id: job_id.as_deref().map(parse_uuid).transpose()?,
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl NotificationsRepo for SqliteNotificationsRepo {
    async fn insert(&self, input: NewNotification) -> DbResult<Notification> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, body, job_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(input.user_id.to_string())
        .bind(input.kind.as_str())
        .bind(&input.title)
        .bind(&input.body)
        .bind(input.job_id.map(|id| id.to_string()))
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Notification {
            id,
            user_id: input.user_id,
            kind: input.kind,
            title: input.title,
            body: input.body,
            job_id: input.job_id,
            created_at: now,
        })
    }

    async fn list_for_user(&self, user_id: Uuid, limit: u32) -> DbResult<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, kind, title, body, job_id, created_at
            FROM notifications
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::notification_from_row).collect()
    }
}
