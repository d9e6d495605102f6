//! HTTP relay transport for provider-backed channels (email, SMS).
//!
//! Posts a small JSON document to a provider relay endpoint and maps the HTTP
//! status onto the retryable / permanent split:
//! - 2xx: delivered
//! - 408, 429, 5xx, connection errors: retryable
//! - any other 4xx: permanent (bad recipient, rejected payload)

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use courier_common::types::{Notification, NotificationType};

use super::{ChannelTransport, TransportError};

pub struct HttpTransport {
    client: reqwest::Client,
    channel: NotificationType,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, channel: NotificationType, endpoint: String) -> Self {
        Self {
            client,
            channel,
            endpoint,
            api_key: None,
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn classify_status(status: StatusCode) -> Result<bool, TransportError> {
        if status.is_success() {
            return Ok(true);
        }

        if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            Err(TransportError::retryable(format!(
                "provider returned {}",
                status
            )))
        } else {
            Err(TransportError::permanent(format!(
                "provider rejected notification with {}",
                status
            )))
        }
    }
}

#[async_trait]
impl ChannelTransport for HttpTransport {
    async fn send(&self, notification: &Notification) -> Result<bool, TransportError> {
        let to = notification.recipient().ok_or_else(|| {
            TransportError::permanent(format!(
                "{} notification {} has no recipient",
                self.channel, notification.id
            ))
        })?;

        let body = json!({
            "to": to,
            "title": notification.title,
            "content": notification.content,
            "user_id": notification.user_id,
            "notification_id": notification.id,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::retryable(format!("provider request failed: {}", e)))?;

        let status = response.status();
        let delivered = Self::classify_status(status)?;

        tracing::debug!(
            notification_id = %notification.id,
            channel = %self.channel,
            status = status.as_u16(),
            "Provider accepted notification"
        );
        Ok(delivered)
    }

    fn name(&self) -> &'static str {
        match self.channel {
            NotificationType::Email => "email-http",
            NotificationType::Sms => "sms-http",
            NotificationType::InApp => "in-app-http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_delivered() {
        assert!(HttpTransport::classify_status(StatusCode::OK).unwrap());
        assert!(HttpTransport::classify_status(StatusCode::ACCEPTED).unwrap());
    }

    #[test]
    fn test_transient_statuses_are_retryable() {
        for status in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let err = HttpTransport::classify_status(status).unwrap_err();
            assert!(err.is_retryable(), "{} should be retryable", status);
        }
    }

    #[test]
    fn test_client_errors_are_permanent() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::UNPROCESSABLE_ENTITY] {
            let err = HttpTransport::classify_status(status).unwrap_err();
            assert!(!err.is_retryable(), "{} should be permanent", status);
        }
    }

    #[tokio::test]
    async fn test_missing_recipient_is_permanent() {
        let transport = HttpTransport::new(
            reqwest::Client::new(),
            NotificationType::Sms,
            "http://127.0.0.1:9/unused".to_string(),
        );
        let now = chrono::Utc::now();
        let notification = Notification {
            id: uuid::Uuid::new_v4(),
            user_id: "user-1".to_string(),
            notification_type: NotificationType::Sms,
            title: "t".to_string(),
            content: "c".to_string(),
            metadata: Default::default(),
            status: courier_common::types::NotificationStatus::Processing,
            retry_count: 0,
            version: 1,
            last_error: None,
            created_at: now,
            updated_at: now,
        };

        let err = transport.send(&notification).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
