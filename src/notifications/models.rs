use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::enums::{ChannelKind, NotificationEventStatus};

/// Credentials of a notification channel.
/// Serialized to JSON and then encrypted before being stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChannelConfig {
    Telegram {
        bot_token: String,
        chat_id: String,
    },
    Webhook {
        url: String,
        method: String, // "GET" or "POST"
        headers: Option<HashMap<String, String>>,
        body_template: Option<String>, // Tera template for POST requests
    },
}

impl ChannelConfig {
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelConfig::Telegram { .. } => ChannelKind::Telegram,
            ChannelConfig::Webhook { .. } => ChannelKind::Webhook,
        }
    }
}

/// A channel with its decrypted configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub id: i32,
    pub name: String,
    pub kind: ChannelKind,
    pub config: ChannelConfig,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotificationEvent {
    pub monitor_id: i32,
    pub channel_id: i32,
    pub status: NotificationEventStatus,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}
