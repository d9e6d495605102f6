//! In-app delivery: writes the notification into the user's inbox table.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use courier_common::types::Notification;

use super::{ChannelTransport, TransportError};

pub struct InboxTransport {
    pool: PgPool,
}

impl InboxTransport {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelTransport for InboxTransport {
    async fn send(&self, notification: &Notification) -> Result<bool, TransportError> {
        // Keyed on notification_id so a duplicate delivery does not double-post.
        let result = sqlx::query(
            r#"
            INSERT INTO in_app_messages (id, notification_id, user_id, title, content, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (notification_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.id)
        .bind(&notification.user_id)
        .bind(&notification.title)
        .bind(&notification.content)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| TransportError::retryable(format!("inbox write failed: {}", e)))?;

        if result.rows_affected() == 0 {
            tracing::warn!(
                notification_id = %notification.id,
                "In-app message already present, treating as delivered"
            );
        }

        Ok(true)
    }

    fn name(&self) -> &'static str {
        "in-app-inbox"
    }
}
