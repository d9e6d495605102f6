//! Notification persistence.
//!
//! The store is the single source of truth for a notification's status and the
//! arbiter of which worker currently owns it. Every status change goes through
//! [`NotificationStore::update_status`] with the version the caller last read;
//! a stale version fails with [`StoreError::Conflict`] instead of overwriting.

mod memory;
mod postgres;

pub use memory::InMemoryNotificationStore;
pub use postgres::PgNotificationStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{Notification, NotificationStatus, StatusUpdate};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Version conflict on notification {id} (expected version {expected})")]
    Conflict { id: Uuid, expected: i64 },

    #[error("Notification {0} not found")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt notification row: {0}")]
    Corrupt(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => AppError::Conflict(err.to_string()),
            StoreError::NotFound(_) => AppError::NotFound(err.to_string()),
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Corrupt(msg) => AppError::Internal(msg),
        }
    }
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a newly created notification.
    async fn save(&self, notification: &Notification) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, StoreError>;

    /// Apply a status transition if the stored version still equals
    /// `expected_version`. Returns the updated record (version bumped by one).
    async fn update_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
        expected_version: i64,
    ) -> Result<Notification, StoreError>;

    /// Notifications in one of `statuses` whose `updated_at` is before `older_than`,
    /// oldest first, at most `limit` rows.
    async fn find_stale(
        &self,
        statuses: &[NotificationStatus],
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError>;
}
