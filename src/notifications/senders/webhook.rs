use async_trait::async_trait;
use reqwest::{header, Client, Method};
use std::collections::HashMap;
use tera::{Context, Tera};

use super::{error_body, NotificationSender, SenderError};
use crate::notifications::models::ChannelConfig;

/// Calls a user-defined URL. POST bodies are rendered from a Tera template with the diff
/// context, falling back to a JSON envelope around the plain message.
pub struct WebhookSender {
    client: Client,
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookSender {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

const DEFAULT_BODY_TEMPLATE: &str = r#"{"text": {{ message | json_encode() }}}"#;

fn render_body(
    template: &str,
    message: &str,
    context: &HashMap<String, String>,
) -> Result<String, SenderError> {
    let mut tera_context = Context::new();
    for (key, value) in context {
        tera_context.insert(key, value);
    }
    tera_context.insert("message", message);

    Tera::one_off(template, &tera_context, false)
        .map_err(|e| SenderError::TemplatingError(e.to_string()))
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        let (url, method, headers, body_template) = match config {
            ChannelConfig::Webhook {
                url,
                method,
                headers,
                body_template,
            } => (url, method, headers, body_template),
            _ => {
                return Err(SenderError::InvalidConfiguration(
                    "Expected Webhook config, but found a different type.".to_string(),
                ));
            }
        };

        let http_method = match method.trim().to_uppercase().as_str() {
            "POST" => Method::POST,
            "GET" => Method::GET,
            _ => {
                return Err(SenderError::InvalidConfiguration(format!(
                    "Unsupported HTTP method: {method}"
                )));
            }
        };
        let is_post = http_method == Method::POST;

        let mut request_builder = self.client.request(http_method, url);

        if let Some(h) = headers {
            let mut header_map = header::HeaderMap::new();
            for (key, value) in h {
                let header_name = header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    SenderError::InvalidConfiguration(format!("Invalid header name: {e}"))
                })?;
                let header_value = header::HeaderValue::from_str(value).map_err(|e| {
                    SenderError::InvalidConfiguration(format!("Invalid header value: {e}"))
                })?;
                header_map.insert(header_name, header_value);
            }
            request_builder = request_builder.headers(header_map);
        }

        if is_post {
            let template = body_template
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(DEFAULT_BODY_TEMPLATE);
            let rendered_body = render_body(template, message, context)?;
            request_builder = request_builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(rendered_body);
        }

        let response = request_builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(SenderError::Rejected {
                channel: "Webhook",
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::any, Router};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    #[derive(Debug, Clone)]
    struct Captured {
        method: String,
        token: Option<String>,
        body: String,
    }

    async fn spawn_hook(status: StatusCode) -> (String, Arc<Mutex<Vec<Captured>>>) {
        let captured: Arc<Mutex<Vec<Captured>>> = Arc::default();
        let sink = captured.clone();
        let app = Router::new().route(
            "/hook",
            any(move |method: axum::http::Method, headers: HeaderMap, body: String| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(Captured {
                        method: method.to_string(),
                        token: headers
                            .get("x-token")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string),
                        body,
                    });
                    status
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}/hook"), captured)
    }

    fn webhook(url: &str, method: &str, template: Option<&str>) -> ChannelConfig {
        ChannelConfig::Webhook {
            url: url.into(),
            method: method.into(),
            headers: Some(HashMap::from([("X-Token".to_string(), "t0k".to_string())])),
            body_template: template.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_post_renders_template_with_context() {
        let (url, captured) = spawn_hook(StatusCode::OK).await;
        let context = HashMap::from([
            ("monitor_id".to_string(), "7".to_string()),
            ("summary".to_string(), "number changed by +2".to_string()),
        ]);

        WebhookSender::new()
            .send(
                &webhook(&url, "post", Some(r#"{"id": {{ monitor_id }}, "s": "{{ summary }}"}"#)),
                "ignored",
                &context,
            )
            .await
            .unwrap();

        let calls = captured.lock().unwrap();
        assert_eq!(calls[0].method, "POST");
        assert_eq!(calls[0].token.as_deref(), Some("t0k"));
        assert_eq!(calls[0].body, r#"{"id": 7, "s": "number changed by +2"}"#);
    }

    #[tokio::test]
    async fn test_post_without_template_wraps_message() {
        let (url, captured) = spawn_hook(StatusCode::OK).await;

        WebhookSender::new()
            .send(&webhook(&url, "POST", None), "line \"1\"\nline 2", &HashMap::new())
            .await
            .unwrap();

        let body = captured.lock().unwrap()[0].body.clone();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["text"], "line \"1\"\nline 2");
    }

    #[tokio::test]
    async fn test_get_sends_no_body() {
        let (url, captured) = spawn_hook(StatusCode::OK).await;

        WebhookSender::new()
            .send(&webhook(&url, "GET", None), "msg", &HashMap::new())
            .await
            .unwrap();

        let calls = captured.lock().unwrap();
        assert_eq!(calls[0].method, "GET");
        assert!(calls[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_fails() {
        let (url, _) = spawn_hook(StatusCode::INTERNAL_SERVER_ERROR).await;
        let err = WebhookSender::new()
            .send(&webhook(&url, "POST", None), "msg", &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SenderError::Rejected { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let err = WebhookSender::new()
            .send(&webhook("http://127.0.0.1:1", "PUT", None), "msg", &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SenderError::InvalidConfiguration(_)));
    }
}
