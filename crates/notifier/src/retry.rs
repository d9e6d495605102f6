//! Retry policy: attempt budget, backoff delays, and failure classification.

use std::time::Duration;

use courier_common::config::AppConfig;
use courier_common::types::NotificationType;

use crate::transport::TransportError;

/// Why a single dispatch attempt did not deliver.
#[derive(Debug, thiserror::Error)]
pub enum DispatchFailure {
    /// The transport answered `false` without raising an error.
    #[error("transport rejected the notification")]
    Rejected,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("transport did not answer within {0:?}")]
    TimedOut(Duration),

    #[error("no transport registered for type {0}")]
    UnknownChannel(NotificationType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Fatal,
}

/// Retry policy consumed by `NotificationService::process_notification`.
///
/// `max_retries` counts re-attempts after the first one, so a notification that
/// keeps failing transiently is attempted `max_retries + 1` times in total.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,

    /// Delay before the first re-publish. Zero re-publishes immediately.
    pub base_delay: Duration,

    pub multiplier: f64,

    pub max_delay: Duration,

    /// Treat an `Ok(false)` from a transport as transient.
    pub retry_on_rejection: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::ZERO,
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            retry_on_rejection: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            multiplier: config.retry_multiplier,
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            retry_on_rejection: config.retry_on_rejection,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Classify a failed attempt.
    pub fn classify(&self, failure: &DispatchFailure) -> FailureClass {
        match failure {
            DispatchFailure::Rejected if self.retry_on_rejection => FailureClass::Retryable,
            DispatchFailure::Rejected => FailureClass::Fatal,
            DispatchFailure::Transport(err) if err.is_retryable() => FailureClass::Retryable,
            DispatchFailure::Transport(_) => FailureClass::Fatal,
            DispatchFailure::TimedOut(_) => FailureClass::Retryable,
            DispatchFailure::UnknownChannel(_) => FailureClass::Fatal,
        }
    }

    /// Whether a notification that has already used `retry_count` retries may
    /// be attempted again.
    pub fn can_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay before re-publishing retry number `retry_count` (1-indexed):
    /// `base_delay * multiplier^(retry_count - 1)`, capped at `max_delay`.
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_default_publishes_immediately() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.next_delay(1), Duration::ZERO);
        assert_eq!(policy.next_delay(3), Duration::ZERO);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = backoff_policy();
        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
        assert_eq!(policy.next_delay(3), Duration::from_secs(8));
        assert_eq!(policy.next_delay(4), Duration::from_secs(10));
        assert_eq!(policy.next_delay(200), Duration::from_secs(10));
    }

    #[test]
    fn test_retry_budget() {
        let policy = RetryPolicy::default().with_max_retries(2);
        assert!(policy.can_retry(0));
        assert!(policy.can_retry(1));
        assert!(!policy.can_retry(2));
    }

    #[test]
    fn test_classification() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.classify(&DispatchFailure::Transport(TransportError::retryable("503"))),
            FailureClass::Retryable
        );
        assert_eq!(
            policy.classify(&DispatchFailure::Transport(TransportError::permanent(
                "invalid address"
            ))),
            FailureClass::Fatal
        );
        assert_eq!(
            policy.classify(&DispatchFailure::TimedOut(Duration::from_secs(1))),
            FailureClass::Retryable
        );
        assert_eq!(
            policy.classify(&DispatchFailure::UnknownChannel(NotificationType::Sms)),
            FailureClass::Fatal
        );
        assert_eq!(
            policy.classify(&DispatchFailure::Rejected),
            FailureClass::Retryable
        );
    }

    #[test]
    fn test_rejection_can_be_fatal() {
        let policy = RetryPolicy {
            retry_on_rejection: false,
            ..RetryPolicy::default()
        };
        assert_eq!(
            policy.classify(&DispatchFailure::Rejected),
            FailureClass::Fatal
        );
    }
}
