//! Log-only notifier used when no delivery channel is configured.

use crate::traits::{Notification, Notifier, NotifyError};

/// Writes notifications to the tracing log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            channel = "log",
            subject = %notification.subject,
            body = %notification.body,
            "owner notification"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
