use async_trait::async_trait;

use courier_common::types::{Notification, NotificationType};

use super::{ChannelTransport, TransportError};

/// Log-only delivery, used for channels that have no provider configured.
pub struct LogTransport {
    channel: NotificationType,
}

impl LogTransport {
    pub fn new(channel: NotificationType) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ChannelTransport for LogTransport {
    async fn send(&self, notification: &Notification) -> Result<bool, TransportError> {
        tracing::info!(
            notification_id = %notification.id,
            channel = %self.channel,
            user_id = %notification.user_id,
            recipient = notification.recipient().unwrap_or("-"),
            title = %notification.title,
            "Delivered notification (log only)"
        );
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
