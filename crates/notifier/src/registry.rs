use std::collections::HashMap;
use std::sync::Arc;

use courier_common::error::AppError;
use courier_common::types::NotificationType;

use crate::transport::ChannelTransport;

/// Dispatch table from notification type to the transport that delivers it.
///
/// Built once at startup, then shared immutably across workers. A type with no
/// registered transport is rejected at dispatch as a non-retryable failure.
#[derive(Default)]
pub struct ChannelRegistry {
    transports: HashMap<NotificationType, Arc<dyn ChannelTransport>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            transports: HashMap::new(),
        }
    }

    /// Register the transport for a channel. Registering a channel twice is a
    /// configuration error.
    pub fn register(
        &mut self,
        notification_type: NotificationType,
        transport: Arc<dyn ChannelTransport>,
    ) -> Result<(), AppError> {
        if self.transports.contains_key(&notification_type) {
            return Err(AppError::Config(format!(
                "Duplicate transport for type {}",
                notification_type
            )));
        }

        tracing::info!(
            notification_type = %notification_type,
            transport = transport.name(),
            "Registered channel transport"
        );
        self.transports.insert(notification_type, transport);
        Ok(())
    }

    /// Builder-style `register` for wiring code and tests.
    pub fn with(
        mut self,
        notification_type: NotificationType,
        transport: Arc<dyn ChannelTransport>,
    ) -> Result<Self, AppError> {
        self.register(notification_type, transport)?;
        Ok(self)
    }

    pub fn get(&self, notification_type: NotificationType) -> Option<&Arc<dyn ChannelTransport>> {
        self.transports.get(&notification_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LogTransport;

    #[test]
    fn test_register_and_lookup() {
        let registry = ChannelRegistry::new()
            .with(
                NotificationType::Email,
                Arc::new(LogTransport::new(NotificationType::Email)),
            )
            .unwrap();

        assert!(registry.get(NotificationType::Email).is_some());
        assert!(registry.get(NotificationType::Sms).is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ChannelRegistry::new();
        registry
            .register(
                NotificationType::Sms,
                Arc::new(LogTransport::new(NotificationType::Sms)),
            )
            .unwrap();
        let err = registry
            .register(
                NotificationType::Sms,
                Arc::new(LogTransport::new(NotificationType::Sms)),
            )
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate transport"));
    }
}
