//! PostgreSQL-backed notification store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use courier_common::types::{Notification, NotificationStatus, StatusUpdate};

use super::{NotificationStore, StoreError};

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: String,
    #[sqlx(rename = "type")]
    notification_type: String,
    title: String,
    content: String,
    metadata: Json<BTreeMap<String, String>>,
    status: String,
    retry_count: i32,
    version: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let corrupt = |e: courier_common::error::AppError| {
            StoreError::Corrupt(format!("notification {}: {}", row.id, e))
        };

        Ok(Notification {
            id: row.id,
            notification_type: row.notification_type.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            retry_count: u32::try_from(row.retry_count).map_err(|_| {
                StoreError::Corrupt(format!(
                    "notification {}: negative retry_count {}",
                    row.id, row.retry_count
                ))
            })?,
            user_id: row.user_id,
            title: row.title,
            content: row.content,
            metadata: row.metadata.0,
            version: row.version,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Notification store over the `notifications` table.
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn save(&self, notification: &Notification) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, user_id, type, title, content, metadata, status, retry_count, version, last_error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(notification.id)
        .bind(&notification.user_id)
        .bind(notification.notification_type.to_string())
        .bind(&notification.title)
        .bind(&notification.content)
        .bind(Json(&notification.metadata))
        .bind(notification.status.to_string())
        .bind(notification.retry_count as i32)
        .bind(notification.version)
        .bind(&notification.last_error)
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        let row: Option<NotificationRow> =
            sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Notification::try_from).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
        expected_version: i64,
    ) -> Result<Notification, StoreError> {
        let row: Option<NotificationRow> = sqlx::query_as(
            r#"
            UPDATE notifications
            SET status = $1, retry_count = $2, updated_at = $3, last_error = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING *
            "#,
        )
        .bind(update.status.to_string())
        .bind(update.retry_count as i32)
        .bind(update.updated_at)
        .bind(&update.last_error)
        .bind(id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Notification::try_from(row);
        }

        // Zero rows: either the id is unknown or someone else moved the version.
        let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Err(StoreError::Conflict {
                id,
                expected: expected_version,
            }),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn find_stale(
        &self,
        statuses: &[NotificationStatus],
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();

        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE status = ANY($1) AND updated_at < $2
            ORDER BY updated_at ASC
            LIMIT $3
            "#,
        )
        .bind(&statuses)
        .bind(older_than)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }
}
