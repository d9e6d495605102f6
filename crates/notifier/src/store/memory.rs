//! In-memory notification store for development and tests.
//!
//! Keeps a per-notification transition history so lifecycle traces can be
//! inspected after the fact.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use courier_common::types::{Notification, NotificationStatus, StatusUpdate};

use super::{NotificationStore, StoreError};

#[derive(Default)]
struct StoreState {
    notifications: HashMap<Uuid, Notification>,
    history: HashMap<Uuid, Vec<(NotificationStatus, u32)>>,
}

#[derive(Default)]
pub struct InMemoryNotificationStore {
    state: RwLock<StoreState>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(status, retry_count)` the notification has been in, in order.
    pub async fn history(&self, id: Uuid) -> Vec<(NotificationStatus, u32)> {
        self.state
            .read()
            .await
            .history
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.notifications.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn save(&self, notification: &Notification) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.notifications.contains_key(&notification.id) {
            return Err(StoreError::Corrupt(format!(
                "notification {} already exists",
                notification.id
            )));
        }
        state.history.insert(
            notification.id,
            vec![(notification.status, notification.retry_count)],
        );
        state
            .notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        Ok(self.state.read().await.notifications.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
        expected_version: i64,
    ) -> Result<Notification, StoreError> {
        let mut state = self.state.write().await;
        let stored = state
            .notifications
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;

        if stored.version != expected_version {
            return Err(StoreError::Conflict {
                id,
                expected: expected_version,
            });
        }

        stored.status = update.status;
        stored.retry_count = update.retry_count;
        stored.updated_at = update.updated_at;
        stored.last_error = update.last_error;
        stored.version += 1;
        let updated = stored.clone();

        state
            .history
            .entry(id)
            .or_default()
            .push((updated.status, updated.retry_count));
        Ok(updated)
    }

    async fn find_stale(
        &self,
        statuses: &[NotificationStatus],
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError> {
        let state = self.state.read().await;
        let mut stale: Vec<Notification> = state
            .notifications
            .values()
            .filter(|n| statuses.contains(&n.status) && n.updated_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|n| n.updated_at);
        stale.truncate(limit);
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Duration;
    use courier_common::types::NotificationType;

    use super::*;

    fn make_notification(status: NotificationStatus, updated_at: DateTime<Utc>) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            notification_type: NotificationType::InApp,
            title: "Title".to_string(),
            content: "Body".to_string(),
            metadata: BTreeMap::new(),
            status,
            retry_count: 0,
            version: 0,
            last_error: None,
            created_at: updated_at,
            updated_at,
        }
    }

    fn update(status: NotificationStatus, retry_count: u32) -> StatusUpdate {
        StatusUpdate {
            status,
            retry_count,
            updated_at: Utc::now(),
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let store = InMemoryNotificationStore::new();
        let n = make_notification(NotificationStatus::Pending, Utc::now());
        store.save(&n).await.unwrap();

        let updated = store
            .update_status(n.id, update(NotificationStatus::Processing, 0), 0)
            .await
            .unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.status, NotificationStatus::Processing);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = InMemoryNotificationStore::new();
        let n = make_notification(NotificationStatus::Pending, Utc::now());
        store.save(&n).await.unwrap();

        store
            .update_status(n.id, update(NotificationStatus::Processing, 0), 0)
            .await
            .unwrap();
        let err = store
            .update_status(n.id, update(NotificationStatus::Sent, 0), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { expected: 0, .. }));

        let stored = store.find_by_id(n.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Processing);
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let store = InMemoryNotificationStore::new();
        let err = store
            .update_status(Uuid::new_v4(), update(NotificationStatus::Sent, 0), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_find_stale_filters_status_and_age() {
        let store = InMemoryNotificationStore::new();
        let old = Utc::now() - Duration::minutes(10);
        let stuck = make_notification(NotificationStatus::Processing, old);
        let fresh = make_notification(NotificationStatus::Processing, Utc::now());
        let done = make_notification(NotificationStatus::Sent, old);
        for n in [&stuck, &fresh, &done] {
            store.save(n).await.unwrap();
        }

        let stale = store
            .find_stale(
                &[NotificationStatus::Processing],
                Utc::now() - Duration::minutes(5),
                10,
            )
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, stuck.id);
    }

    #[tokio::test]
    async fn test_history_records_transitions() {
        let store = InMemoryNotificationStore::new();
        let n = make_notification(NotificationStatus::Pending, Utc::now());
        store.save(&n).await.unwrap();
        store
            .update_status(n.id, update(NotificationStatus::Processing, 0), 0)
            .await
            .unwrap();
        store
            .update_status(n.id, update(NotificationStatus::RetryScheduled, 1), 1)
            .await
            .unwrap();

        assert_eq!(
            store.history(n.id).await,
            vec![
                (NotificationStatus::Pending, 0),
                (NotificationStatus::Processing, 0),
                (NotificationStatus::RetryScheduled, 1),
            ]
        );
    }
}
