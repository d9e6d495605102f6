//! Recovery sweep: re-enqueues notifications stuck in a non-terminal state.
//!
//! A worker that crashes mid-attempt leaves its notification in PROCESSING;
//! a crash between persisting RETRY_SCHEDULED and re-publishing, or a
//! publish rejected under backpressure, leaves a record with no envelope.
//! Anything non-terminal whose `updated_at` is older than the staleness
//! threshold is touched (PROCESSING goes back to PENDING) and published again.
//! The version check makes the sweep safe against a worker that is merely slow.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use courier_common::config::AppConfig;
use courier_common::types::{Notification, NotificationStatus, StatusUpdate};

use crate::queue::{QueueError, QueueService};
use crate::store::{NotificationStore, StoreError};

const SWEPT_STATUSES: [NotificationStatus; 3] = [
    NotificationStatus::Pending,
    NotificationStatus::Processing,
    NotificationStatus::RetryScheduled,
];

/// Maximum notifications re-enqueued per sweep.
const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub requeued: usize,
    pub conflicts: usize,
    pub errors: usize,
}

pub struct RecoverySweeper {
    store: Arc<dyn NotificationStore>,
    queue: Arc<QueueService>,
    stale_after: Duration,
    interval: Duration,
    batch_size: usize,
}

impl RecoverySweeper {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        queue: Arc<QueueService>,
        stale_after: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            stale_after,
            interval,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn from_config(
        store: Arc<dyn NotificationStore>,
        queue: Arc<QueueService>,
        config: &AppConfig,
    ) -> Self {
        Self::new(
            store,
            queue,
            Duration::from_secs(config.recovery_stale_after_secs),
            Duration::from_secs(config.recovery_interval_secs),
        )
    }

    /// Run one sweep.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let stale_after = chrono::Duration::from_std(self.stale_after)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = Utc::now() - stale_after;

        let stale = self
            .store
            .find_stale(&SWEPT_STATUSES, cutoff, self.batch_size)
            .await?;

        let mut report = SweepReport::default();
        for notification in stale {
            match self.requeue(&notification).await {
                Ok(()) => report.requeued += 1,
                Err(SweepError::Store(StoreError::Conflict { .. })) => report.conflicts += 1,
                Err(e) => {
                    tracing::warn!(notification_id = %notification.id, error = %e, "Recovery requeue failed");
                    report.errors += 1;
                }
            }
        }

        if report.requeued > 0 || report.errors > 0 {
            tracing::info!(
                requeued = report.requeued,
                conflicts = report.conflicts,
                errors = report.errors,
                "Recovery sweep finished"
            );
        }

        Ok(report)
    }

    /// Sweep every `interval` until `shutdown_rx` flips to true.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            stale_after_secs = self.stale_after.as_secs(),
            "Recovery sweeper started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(e) = self.sweep().await {
                tracing::error!(error = %e, "Recovery sweep failed");
            }
        }

        tracing::info!("Recovery sweeper stopped");
    }

    async fn requeue(&self, notification: &Notification) -> Result<(), SweepError> {
        let status = match notification.status {
            NotificationStatus::Processing => NotificationStatus::Pending,
            other => other,
        };

        let touched = self
            .store
            .update_status(
                notification.id,
                StatusUpdate {
                    status,
                    retry_count: notification.retry_count,
                    updated_at: Utc::now(),
                    last_error: notification.last_error.clone(),
                },
                notification.version,
            )
            .await?;

        if notification.status == NotificationStatus::Processing {
            tracing::warn!(
                notification_id = %notification.id,
                stuck_since = %notification.updated_at,
                "Stale PROCESSING notification reset to PENDING"
            );
        }

        self.queue.publish(&touched).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
enum SweepError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
