use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{error_body, NotificationSender, SenderError};
use crate::notifications::models::ChannelConfig;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Pushes plain-text messages through the Telegram Bot API.
pub struct TelegramSender {
    client: Client,
    api_base: String,
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramSender {
    pub fn new() -> Self {
        Self::with_api_base(TELEGRAM_API_BASE)
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Replaces the bot token wherever it appears, request URLs in reqwest errors included.
pub fn redact_token(text: &str, bot_token: &str) -> String {
    let token = bot_token.trim();
    if token.is_empty() {
        return text.to_string();
    }
    text.replace(token, "<redacted>")
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        _context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        let (bot_token, chat_id) = match config {
            ChannelConfig::Telegram { bot_token, chat_id } => (bot_token.trim(), chat_id.trim()),
            _ => {
                return Err(SenderError::InvalidConfiguration(
                    "Expected Telegram config, but found a different type.".to_string(),
                ));
            }
        };
        if bot_token.is_empty() || chat_id.is_empty() {
            return Err(SenderError::InvalidConfiguration(
                "Telegram bot token and chat id are required.".to_string(),
            ));
        }

        let api_url = format!("{}/bot{bot_token}/sendMessage", self.api_base);
        let payload = TelegramMessage {
            chat_id,
            text: message,
        };

        let response = self
            .client
            .post(&api_url)
            .timeout(SEND_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SenderError::SendFailed(redact_token(&e.to_string(), bot_token)))?;
        let status = response.status();

        if !status.is_success() {
            return Err(SenderError::Rejected {
                channel: "Telegram API",
                status: status.as_u16(),
                body: redact_token(&error_body(response).await, bot_token),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::post, Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Captured = Arc<Mutex<Vec<(String, Value)>>>;

    async fn spawn_bot_api(status: StatusCode) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let sink = captured.clone();
        let app = Router::new().route(
            "/{bot}/sendMessage",
            post(move |Path(bot): Path<String>, Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push((bot, body));
                    (status, "{\"ok\":false,\"description\":\"chat not found\"}")
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), captured)
    }

    fn config(token: &str) -> ChannelConfig {
        ChannelConfig::Telegram {
            bot_token: token.into(),
            chat_id: "42".into(),
        }
    }

    #[tokio::test]
    async fn test_posts_plain_text_message() {
        let (base, captured) = spawn_bot_api(StatusCode::OK).await;
        let sender = TelegramSender::with_api_base(base);

        sender
            .send(&config("123:abc"), "hello\nworld", &HashMap::new())
            .await
            .unwrap();

        let calls = captured.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "bot123:abc");
        assert_eq!(calls[0].1["chat_id"], "42");
        assert_eq!(calls[0].1["text"], "hello\nworld");
        assert!(calls[0].1.get("parse_mode").is_none());
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let (base, _) = spawn_bot_api(StatusCode::BAD_REQUEST).await;
        let sender = TelegramSender::with_api_base(base);

        let err = sender
            .send(&config("123:abc"), "hi", &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SenderError::Rejected { status: 400, .. }));
        let text = err.to_string();
        assert!(text.contains("400"), "{text}");
        assert!(text.contains("chat not found"), "{text}");
    }

    #[tokio::test]
    async fn test_transport_error_redacts_token() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let sender = TelegramSender::with_api_base(format!("http://{addr}"));

        let err = sender
            .send(&config("999:secret"), "hi", &HashMap::new())
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(!text.contains("999:secret"), "{text}");
    }

    #[test]
    fn test_redact_token() {
        assert_eq!(
            redact_token("GET /bot1:x/sendMessage failed", "1:x"),
            "GET /bot<redacted>/sendMessage failed"
        );
        assert_eq!(redact_token("untouched", "  "), "untouched");
    }

    #[tokio::test]
    async fn test_rejects_other_config() {
        let sender = TelegramSender::new();
        let webhook = ChannelConfig::Webhook {
            url: "http://localhost".into(),
            method: "POST".into(),
            headers: None,
            body_template: None,
        };
        let err = sender.send(&webhook, "x", &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, SenderError::InvalidConfiguration(_)));
    }
}
