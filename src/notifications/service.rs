use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::format::{format_message, monitor_label};
use super::models::{ChannelConfig, NewNotificationEvent, NotificationChannel};
use super::senders::{
    telegram::{redact_token, TelegramSender},
    webhook::WebhookSender,
    NotificationSender, SenderError,
};
use crate::db::enums::{ChannelKind, NotificationEventStatus};
use crate::db::repository::{ChannelRepository, RepositoryError};
use crate::diff::DiffRecord;
use crate::monitoring::models::Monitor;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Channel {channel_id} delivery failed: {message}")]
    Delivery { channel_id: i32, message: String },
}

/// Fans a changed diff out to the channels a monitor subscribes to and records one
/// event per attempt.
pub struct NotificationDispatcher {
    channels: Arc<dyn ChannelRepository>,
    telegram: Arc<dyn NotificationSender>,
    webhook: Arc<dyn NotificationSender>,
}

impl NotificationDispatcher {
    pub fn new(channels: Arc<dyn ChannelRepository>) -> Self {
        Self::with_senders(
            channels,
            Arc::new(TelegramSender::new()),
            Arc::new(WebhookSender::new()),
        )
    }

    pub fn with_senders(
        channels: Arc<dyn ChannelRepository>,
        telegram: Arc<dyn NotificationSender>,
        webhook: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            channels,
            telegram,
            webhook,
        }
    }

    fn sender_for(&self, kind: ChannelKind) -> &dyn NotificationSender {
        match kind {
            ChannelKind::Telegram => self.telegram.as_ref(),
            ChannelKind::Webhook => self.webhook.as_ref(),
        }
    }

    /// Every matching channel is attempted; the last failure, if any, is returned.
    pub async fn notify(
        &self,
        monitor: &Monitor,
        diff: &DiffRecord,
        checked_at: DateTime<Utc>,
    ) -> Result<(), NotificationError> {
        if !diff.changed {
            return Ok(());
        }

        let channels = self.channels_for(monitor).await?;
        if channels.is_empty() {
            return Ok(());
        }

        let message = format_message(monitor, diff, checked_at);
        let context = template_context(monitor, diff, checked_at, &message);
        let mut last_error = None;

        for channel in channels {
            let outcome = self
                .sender_for(channel.kind)
                .send(&channel.config, &message, &context)
                .await;

            let (status, event_message) = match outcome {
                Ok(()) => {
                    info!(monitor_id = monitor.id, channel_id = channel.id, kind = %channel.kind, "Diff notification sent.");
                    (NotificationEventStatus::Sent, diff.summary.clone())
                }
                Err(e) => {
                    let text = sanitize_error(&e, &channel.config);
                    warn!(monitor_id = monitor.id, channel_id = channel.id, kind = %channel.kind, error = %text, "Diff notification failed.");
                    last_error = Some(NotificationError::Delivery {
                        channel_id: channel.id,
                        message: text.clone(),
                    });
                    (NotificationEventStatus::Error, text)
                }
            };

            let event = NewNotificationEvent {
                monitor_id: monitor.id,
                channel_id: channel.id,
                status,
                message: event_message,
                sent_at: checked_at,
            };
            if let Err(e) = self.channels.create_event(event).await {
                warn!(monitor_id = monitor.id, channel_id = channel.id, error = %e, "Failed to record notification event.");
                last_error = Some(e.into());
            }
        }

        last_error.map_or(Ok(()), Err)
    }

    /// Enabled channels whose kind the monitor lists. An empty list notifies nobody.
    async fn channels_for(
        &self,
        monitor: &Monitor,
    ) -> Result<Vec<NotificationChannel>, NotificationError> {
        let wanted: BTreeSet<String> = monitor
            .notification_channels
            .iter()
            .map(|kind| kind.trim().to_lowercase())
            .filter(|kind| !kind.is_empty())
            .collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let channels = self.channels.enabled_channels().await?;
        Ok(channels
            .into_iter()
            .filter(|channel| wanted.contains(channel.kind.as_str()))
            .collect())
    }
}

fn sanitize_error(error: &SenderError, config: &ChannelConfig) -> String {
    let text = error.to_string();
    match config {
        ChannelConfig::Telegram { bot_token, .. } => redact_token(&text, bot_token),
        ChannelConfig::Webhook { .. } => text,
    }
}

fn template_context(
    monitor: &Monitor,
    diff: &DiffRecord,
    checked_at: DateTime<Utc>,
    message: &str,
) -> HashMap<String, String> {
    HashMap::from([
        ("monitor_id".to_string(), monitor.id.to_string()),
        (
            "monitor_label".to_string(),
            monitor_label(monitor).unwrap_or_default().to_string(),
        ),
        ("url".to_string(), monitor.url.clone()),
        ("kind".to_string(), diff.kind.to_string()),
        ("summary".to_string(), diff.summary.clone()),
        (
            "checked_at".to_string(),
            checked_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        ("message".to_string(), message.to_string()),
    ])
}
