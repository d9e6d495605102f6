use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Delivery channel of a notification. Selects the transport at dispatch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Email,
    Sms,
    InApp,
}

impl NotificationType {
    pub const ALL: [NotificationType; 3] = [
        NotificationType::Email,
        NotificationType::Sms,
        NotificationType::InApp,
    ];

    /// Metadata keys the channel's transport needs to address the recipient.
    pub fn required_metadata(self) -> &'static [&'static str] {
        match self {
            NotificationType::Email => &["email"],
            NotificationType::Sms => &["phoneNumber"],
            NotificationType::InApp => &[],
        }
    }

    /// Metadata key holding the recipient address, if the channel has one.
    pub fn address_key(self) -> Option<&'static str> {
        self.required_metadata().first().copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::Email => "EMAIL",
            NotificationType::Sms => "SMS",
            NotificationType::InApp => "IN_APP",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMAIL" => Ok(NotificationType::Email),
            "SMS" => Ok(NotificationType::Sms),
            "IN_APP" => Ok(NotificationType::InApp),
            other => Err(AppError::Validation(format!(
                "Invalid type '{}'. Valid types: EMAIL, SMS, IN_APP",
                other
            ))),
        }
    }
}

/// Notification lifecycle status.
///
/// PENDING -> PROCESSING -> SENT
/// PROCESSING -> RETRY_SCHEDULED -> PROCESSING (until retries run out)
/// PROCESSING -> FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Processing,
    Sent,
    Failed,
    RetryScheduled,
}

impl NotificationStatus {
    /// SENT and FAILED never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, NotificationStatus::Sent | NotificationStatus::Failed)
    }

    /// Whether a consumer may pick the notification up for an attempt.
    pub fn is_dispatchable(self) -> bool {
        matches!(
            self,
            NotificationStatus::Pending | NotificationStatus::RetryScheduled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Processing => "PROCESSING",
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Failed => "FAILED",
            NotificationStatus::RetryScheduled => "RETRY_SCHEDULED",
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(NotificationStatus::Pending),
            "PROCESSING" => Ok(NotificationStatus::Processing),
            "SENT" => Ok(NotificationStatus::Sent),
            "FAILED" => Ok(NotificationStatus::Failed),
            "RETRY_SCHEDULED" => Ok(NotificationStatus::RetryScheduled),
            other => Err(AppError::Internal(format!("Unknown status '{}'", other))),
        }
    }
}

/// A user-facing notification and its delivery state.
///
/// Serialized as-is (camelCase) to form the queue envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub status: NotificationStatus,
    pub retry_count: u32,
    /// Optimistic-concurrency token, bumped on every status update.
    pub version: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Recipient address for channels that have one (email, phone number).
    pub fn recipient(&self) -> Option<&str> {
        self.notification_type
            .address_key()
            .and_then(|key| self.metadata.get(key))
            .map(String::as_str)
    }
}

/// Caller input for creating a notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationParams {
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Fields changed by a single status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: NotificationStatus,
    pub retry_count: u32,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}
