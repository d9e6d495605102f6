//! Notification service owns the notification state machine end to end.
//!
//! 1. `create_notification` validates input, persists a PENDING record and
//!    publishes its envelope
//! 2. Consumers hand envelopes to `process_notification`, which claims the
//!    record (PROCESSING), dispatches it through the channel registry and
//!    records the outcome (SENT / RETRY_SCHEDULED / FAILED)
//! 3. Retryable failures are re-published only after RETRY_SCHEDULED is stored
//!
//! Every transition is a compare-and-set on the record's version, so a
//! duplicate delivery racing a live attempt loses the race and is dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use courier_common::error::AppError;
use courier_common::types::{
    CreateNotificationParams, Notification, NotificationStatus, NotificationType, StatusUpdate,
};

use crate::queue::{EnvelopeHandler, HandlerOutcome, QueueService};
use crate::registry::ChannelRegistry;
use crate::retry::{DispatchFailure, FailureClass, RetryPolicy};
use crate::store::{NotificationStore, StoreError};

/// Why an envelope was dropped without an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No stored record for the envelope's id.
    Missing,
    /// Already SENT or FAILED; a duplicate delivery.
    AlreadySettled(NotificationStatus),
    /// Another worker holds it in PROCESSING.
    InFlight,
    /// Lost an optimistic-lock race to another worker.
    Conflict,
}

/// Result of one `process_notification` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Sent,
    RetryScheduled { retry_count: u32, delay: Duration },
    Failed { reason: String },
    Skipped(SkipReason),
    /// The store could not record the attempt; the envelope should come back.
    Deferred,
}

impl ProcessOutcome {
    pub fn handler_outcome(&self) -> HandlerOutcome {
        match self {
            ProcessOutcome::Deferred => HandlerOutcome::Requeue,
            _ => HandlerOutcome::Ack,
        }
    }
}

pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    queue: Arc<QueueService>,
    channels: Arc<ChannelRegistry>,
    policy: RetryPolicy,
    dispatch_timeout: Duration,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        queue: Arc<QueueService>,
        channels: Arc<ChannelRegistry>,
        policy: RetryPolicy,
        dispatch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            channels,
            policy,
            dispatch_timeout,
        }
    }

    /// Validate, persist as PENDING, and publish a new notification.
    pub async fn create_notification(
        &self,
        params: CreateNotificationParams,
    ) -> Result<Notification, AppError> {
        let notification_type = Self::validate(&params)?;
        let now = Utc::now();

        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            notification_type,
            title: params.title,
            content: params.content,
            metadata: params.metadata,
            status: NotificationStatus::Pending,
            retry_count: 0,
            version: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        self.store.save(&notification).await?;

        if let Err(e) = self.queue.publish(&notification).await {
            // Persisted as PENDING, so the recovery sweep will enqueue it later.
            tracing::warn!(
                notification_id = %notification.id,
                error = %e,
                "Notification stored but not enqueued"
            );
            return Err(e.into());
        }

        tracing::info!(
            notification_id = %notification.id,
            user_id = %notification.user_id,
            notification_type = %notification.notification_type,
            "Notification created"
        );

        Ok(notification)
    }

    pub async fn get_notification(&self, id: Uuid) -> Result<Notification, AppError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))
    }

    /// Run one delivery attempt for an envelope and record the outcome.
    ///
    /// Never returns transport or queue errors: every attempt resolves to a
    /// status transition or a logged skip.
    pub async fn process_notification(&self, envelope: &Notification) -> ProcessOutcome {
        // The store, not the envelope, says where the notification stands.
        let current = match self.store.find_by_id(envelope.id).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                tracing::warn!(notification_id = %envelope.id, "Envelope for unknown notification dropped");
                return ProcessOutcome::Skipped(SkipReason::Missing);
            }
            Err(e) => {
                tracing::error!(notification_id = %envelope.id, error = %e, "Failed to load notification");
                return ProcessOutcome::Deferred;
            }
        };

        if current.status.is_terminal() {
            tracing::info!(
                notification_id = %current.id,
                status = %current.status,
                "Duplicate delivery of settled notification ignored"
            );
            return ProcessOutcome::Skipped(SkipReason::AlreadySettled(current.status));
        }

        if !current.status.is_dispatchable() {
            tracing::warn!(
                notification_id = %current.id,
                status = %current.status,
                "Notification already in flight on another worker, skipping"
            );
            return ProcessOutcome::Skipped(SkipReason::InFlight);
        }

        let processing = match self
            .transition(&current, NotificationStatus::Processing, current.retry_count, current.last_error.clone())
            .await
        {
            Ok(processing) => processing,
            Err(outcome) => return outcome,
        };

        match self.dispatch(&processing).await {
            Ok(()) => match self
                .transition(&processing, NotificationStatus::Sent, processing.retry_count, None)
                .await
            {
                Ok(sent) => {
                    tracing::info!(
                        notification_id = %sent.id,
                        notification_type = %sent.notification_type,
                        retry_count = sent.retry_count,
                        "Notification sent"
                    );
                    ProcessOutcome::Sent
                }
                Err(outcome) => outcome,
            },
            Err(failure) => self.handle_failure(processing, failure).await,
        }
    }

    fn validate(params: &CreateNotificationParams) -> Result<NotificationType, AppError> {
        let notification_type: NotificationType = params.notification_type.parse()?;

        if params.user_id.trim().is_empty() {
            return Err(AppError::Validation("userId is required".to_string()));
        }
        if params.title.trim().is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }

        let missing: Vec<&str> = notification_type
            .required_metadata()
            .iter()
            .copied()
            .filter(|key| {
                params
                    .metadata
                    .get(*key)
                    .is_none_or(|value| value.trim().is_empty())
            })
            .collect();

        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "{} notifications require metadata: {}",
                notification_type,
                missing.join(", ")
            )));
        }

        Ok(notification_type)
    }

    async fn dispatch(&self, notification: &Notification) -> Result<(), DispatchFailure> {
        let transport = self
            .channels
            .get(notification.notification_type)
            .ok_or(DispatchFailure::UnknownChannel(notification.notification_type))?;

        match tokio::time::timeout(self.dispatch_timeout, transport.send(notification)).await {
            Err(_) => Err(DispatchFailure::TimedOut(self.dispatch_timeout)),
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(DispatchFailure::Rejected),
            Ok(Err(e)) => Err(DispatchFailure::Transport(e)),
        }
    }

    async fn handle_failure(
        &self,
        processing: Notification,
        failure: DispatchFailure,
    ) -> ProcessOutcome {
        let reason = failure.to_string();
        let class = self.policy.classify(&failure);

        if class == FailureClass::Fatal || !self.policy.can_retry(processing.retry_count) {
            let reason = match class {
                FailureClass::Fatal => reason,
                FailureClass::Retryable => format!(
                    "retries exhausted after {} attempts: {}",
                    processing.retry_count + 1,
                    reason
                ),
            };

            return match self
                .transition(
                    &processing,
                    NotificationStatus::Failed,
                    processing.retry_count,
                    Some(reason.clone()),
                )
                .await
            {
                Ok(failed) => {
                    tracing::warn!(
                        notification_id = %failed.id,
                        retry_count = failed.retry_count,
                        reason = %reason,
                        "Notification failed"
                    );
                    ProcessOutcome::Failed { reason }
                }
                Err(outcome) => outcome,
            };
        }

        let retry_count = processing.retry_count + 1;
        let scheduled = match self
            .transition(
                &processing,
                NotificationStatus::RetryScheduled,
                retry_count,
                Some(reason.clone()),
            )
            .await
        {
            Ok(scheduled) => scheduled,
            Err(outcome) => return outcome,
        };

        let delay = self.policy.next_delay(retry_count);
        tracing::info!(
            notification_id = %scheduled.id,
            retry_count,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "Notification retry scheduled"
        );
        self.schedule_retry(scheduled, delay).await;

        ProcessOutcome::RetryScheduled { retry_count, delay }
    }

    /// Re-publish a RETRY_SCHEDULED notification, now or after `delay`.
    ///
    /// A publish that fails here is only logged: the record is already stored
    /// as RETRY_SCHEDULED and the recovery sweep re-enqueues it once stale.
    async fn schedule_retry(&self, notification: Notification, delay: Duration) {
        let queue = Arc::clone(&self.queue);

        if delay.is_zero() {
            if let Err(e) = queue.publish(&notification).await {
                tracing::warn!(notification_id = %notification.id, error = %e, "Retry publish failed");
            }
            return;
        }

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.publish(&notification).await {
                tracing::warn!(notification_id = %notification.id, error = %e, "Delayed retry publish failed");
            }
        });
    }

    /// Persist a transition against the version we last read. Failures map to
    /// the outcome the caller should report.
    async fn transition(
        &self,
        from: &Notification,
        status: NotificationStatus,
        retry_count: u32,
        last_error: Option<String>,
    ) -> Result<Notification, ProcessOutcome> {
        let update = StatusUpdate {
            status,
            retry_count,
            updated_at: Utc::now(),
            last_error,
        };

        match self.store.update_status(from.id, update, from.version).await {
            Ok(updated) => {
                tracing::debug!(
                    notification_id = %updated.id,
                    from = %from.status,
                    to = %updated.status,
                    version = updated.version,
                    "Status transition"
                );
                Ok(updated)
            }
            Err(StoreError::Conflict { .. }) => {
                tracing::info!(
                    notification_id = %from.id,
                    to = %status,
                    "Notification advanced by another worker, dropping attempt"
                );
                Err(ProcessOutcome::Skipped(SkipReason::Conflict))
            }
            Err(StoreError::NotFound(_)) => Err(ProcessOutcome::Skipped(SkipReason::Missing)),
            Err(e) => {
                tracing::error!(
                    notification_id = %from.id,
                    to = %status,
                    error = %e,
                    "Failed to persist status transition"
                );
                Err(ProcessOutcome::Deferred)
            }
        }
    }
}

#[async_trait]
impl EnvelopeHandler for NotificationService {
    async fn handle(&self, notification: Notification) -> HandlerOutcome {
        self.process_notification(&notification)
            .await
            .handler_outcome()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn params(kind: &str, metadata: &[(&str, &str)]) -> CreateNotificationParams {
        CreateNotificationParams {
            user_id: "user123".to_string(),
            notification_type: kind.to_string(),
            title: "Important Message".to_string(),
            content: "Hello!".to_string(),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_validate_accepts_complete_input() {
        assert_eq!(
            NotificationService::validate(&params("EMAIL", &[("email", "a@example.com")])).unwrap(),
            NotificationType::Email
        );
        assert_eq!(
            NotificationService::validate(&params("SMS", &[("phoneNumber", "+15551234567")]))
                .unwrap(),
            NotificationType::Sms
        );
        assert_eq!(
            NotificationService::validate(&params("IN_APP", &[])).unwrap(),
            NotificationType::InApp
        );
    }

    #[test]
    fn test_validate_missing_metadata() {
        let err = NotificationService::validate(&params("EMAIL", &[])).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("email"));

        let err = NotificationService::validate(&params("SMS", &[("phoneNumber", "  ")]))
            .unwrap_err();
        assert!(err.to_string().contains("phoneNumber"));
    }

    #[test]
    fn test_validate_unknown_type() {
        let err = NotificationService::validate(&params("FAX", &[])).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_validate_requires_user_and_title() {
        let mut p = params("IN_APP", &[]);
        p.user_id = " ".to_string();
        assert!(NotificationService::validate(&p).is_err());

        let mut p = params("IN_APP", &[]);
        p.title = String::new();
        assert!(NotificationService::validate(&p).is_err());
    }

    #[test]
    fn test_only_deferred_requeues() {
        assert_eq!(ProcessOutcome::Deferred.handler_outcome(), HandlerOutcome::Requeue);
        assert_eq!(ProcessOutcome::Sent.handler_outcome(), HandlerOutcome::Ack);
        assert_eq!(
            ProcessOutcome::Skipped(SkipReason::Conflict).handler_outcome(),
            HandlerOutcome::Ack
        );
    }
}
