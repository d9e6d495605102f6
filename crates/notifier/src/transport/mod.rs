//! Channel transports: the leaf capability that actually delivers a notification.

mod http;
mod inbox;
mod log;

pub use http::HttpTransport;
pub use inbox::InboxTransport;
pub use log::LogTransport;

use async_trait::async_trait;
use thiserror::Error;

use courier_common::types::Notification;

/// Failure raised by a transport. `retryable` marks transient conditions
/// (timeouts, rate limits, provider outages) as opposed to permanent rejections.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    retryable: bool,
    message: String,
}

impl TransportError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Delivery contract every channel implements.
///
/// `Ok(true)` means delivered, `Ok(false)` means the provider declined without
/// giving a reason.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<bool, TransportError>;

    /// Human-readable name for logs (e.g., "email-http").
    fn name(&self) -> &'static str;
}
