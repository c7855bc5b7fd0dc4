//! Fans owner notifications out to every configured channel.
//!
//! Individual channel failures don't block other channels. The dispatcher
//! is itself a [`Notifier`]: delivery counts as successful when at least
//! one channel accepted the notification.

use std::sync::Arc;

use cadence_core::config::NotifyConfig;

use crate::email::EmailNotifier;
use crate::log::LogNotifier;
use crate::templating::TemplateRenderer;
use crate::traits::{DispatchResult, Notification, Notifier, NotifyError};
use crate::webhook::WebhookNotifier;

/// Delivers a notification to a list of channels.
pub struct Dispatcher {
    channels: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    /// Create a dispatcher over the given channels.
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Create an empty dispatcher.
    pub fn empty() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    /// Build channels from configuration.
    ///
    /// A webhook channel is added when `NOTIFY_WEBHOOK_URL` is set and an
    /// email channel when SMTP host, sender and owner addresses are all set.
    /// With neither configured, notifications go to the log only.
    pub fn from_config(
        config: &NotifyConfig,
        renderer: Arc<TemplateRenderer>,
    ) -> Result<Self, NotifyError> {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();

        if let Some(url) = &config.webhook_url {
            channels.push(Box::new(WebhookNotifier::from_config(
                url.clone(),
                config.webhook_method.clone(),
                None,
                config.webhook_body_template.clone(),
                renderer,
            )?));
        }

        if config.email_configured() {
            channels.push(Box::new(EmailNotifier::from_notify_config(config)?));
        } else if config.smtp_host.is_some() {
            tracing::warn!("SMTP_HOST set but sender or owner emails missing; email channel disabled");
        }

        if channels.is_empty() {
            tracing::info!("No notification channels configured, logging notifications only");
            channels.push(Box::new(LogNotifier::new()));
        }

        Ok(Self::new(channels))
    }

    /// Names of the configured channels, in dispatch order.
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.channel_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Dispatch a notification to all channels.
    ///
    /// Returns results for each channel delivery.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DispatchResult> {
        if self.channels.is_empty() {
            tracing::debug!("No notification channels configured");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::debug!(
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }

    /// Send a test notification to a channel by index.
    pub async fn test_channel(&self, channel_index: usize) -> Result<(), NotifyError> {
        let channel = self.channels.get(channel_index).ok_or_else(|| {
            NotifyError::Config(format!("Channel index {channel_index} out of range"))
        })?;
        channel.test().await
    }
}

#[async_trait::async_trait]
impl Notifier for Dispatcher {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.channels.is_empty() {
            return Err(NotifyError::Config(
                "no notification channels configured".to_string(),
            ));
        }
        let results = self.dispatch(notification).await;
        if results.iter().any(|r| r.success) {
            Ok(())
        } else {
            Err(NotifyError::AllChannelsFailed {
                attempted: results.len(),
            })
        }
    }

    fn channel_name(&self) -> &str {
        "dispatcher"
    }
}
