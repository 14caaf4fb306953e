use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use super::models::ChannelConfig;

pub mod telegram;
pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("{channel} returned non-success status {status}. Body: {body}")]
    Rejected {
        channel: &'static str,
        status: u16,
        body: String,
    },
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// Delivers a rendered diff message over one channel type.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// `context` carries the diff fields (`monitor_id`, `summary`, ...) for senders that
    /// render templates.
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError>;
}

async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string())
}
