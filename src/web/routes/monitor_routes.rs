use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::entities::monitor_runtime;
use crate::monitoring::executor::{FetchError, RequestSpec};
use crate::monitoring::scheduler::trigger_monitor;
use crate::selector::{self, SelectorError};
use crate::web::{AppError, AppState};

const MAX_PREVIEW_BYTES: usize = 4 * 1024;
const TRUNCATION_SUFFIX: &str = "... [truncated]";

pub fn create_monitor_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{id}/trigger", post(trigger))
        .route("/test", post(test_url))
        .route("/selector-preview", post(preview_selector))
}

async fn trigger(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<monitor_runtime::Model>, AppError> {
    if id <= 0 {
        return Err(AppError::InvalidInput(
            "monitorId must be a positive integer".to_string(),
        ));
    }
    let runtime = trigger_monitor(app_state.repository.as_ref(), id, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("monitor not found".to_string()))?;
    Ok(Json(runtime))
}

#[derive(Debug, Deserialize)]
pub struct TestUrlRequest {
    #[serde(default)]
    pub method: String,
    pub url: String,
    pub body: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub auth: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestUrlResponse {
    pub ok: bool,
    pub status: u16,
    pub status_text: String,
    pub duration_ms: i64,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_payload_token: Option<String>,
}

async fn test_url(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<TestUrlRequest>,
) -> Result<Json<TestUrlResponse>, AppError> {
    let url = payload.url.trim();
    if url.is_empty() {
        return Err(AppError::InvalidInput("url is required".to_string()));
    }
    if reqwest::Url::parse(url).is_err() {
        return Err(AppError::InvalidInput("url must be a valid URI".to_string()));
    }

    let method = payload.method.trim().to_uppercase();
    let method = if method.is_empty() { "GET".to_string() } else { method };
    let body = payload
        .body
        .as_deref()
        .filter(|_| method != "GET" && method != "HEAD");

    let spec = RequestSpec {
        method: &method,
        url,
        body,
        headers: &payload.headers,
        auth: &payload.auth,
    };
    let fetched = app_state.executor.fetch(spec).await.map_err(|e| match e {
        FetchError::Build(msg) => AppError::InvalidInput(format!("failed to build request: {msg}")),
        FetchError::Send { message, .. } => {
            debug!(url, error = %message, "Test fetch failed.");
            AppError::BadGateway("failed to fetch target URL".to_string())
        }
    })?;

    let content_type = fetched.content_type().unwrap_or_default().to_string();
    let bytes = fetched.body.map_err(|e| {
        warn!(url, error = %e, "Reading test response failed.");
        AppError::BadGateway("failed reading target response".to_string())
    })?;

    let selector_payload_token = if is_json_content_type(&content_type) {
        app_state.payload_cache.put(&bytes)
    } else {
        None
    };

    let status = StatusCode::from_u16(fetched.status_code).ok();
    Ok(Json(TestUrlResponse {
        ok: (200..300).contains(&fetched.status_code),
        status: fetched.status_code,
        status_text: status
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string(),
        duration_ms: fetched.duration_ms,
        headers: fetched.headers,
        body: preview_body(&bytes, &content_type),
        selector_payload_token,
    }))
}

fn is_json_content_type(content_type: &str) -> bool {
    content_type.to_lowercase().contains("application/json")
}

/// Small JSON bodies are returned decoded, everything else as (truncated) text.
fn preview_body(payload: &[u8], content_type: &str) -> Value {
    if payload.is_empty() {
        return Value::Null;
    }
    if payload.len() <= MAX_PREVIEW_BYTES && is_json_content_type(content_type) {
        if let Ok(decoded) = serde_json::from_slice::<Value>(payload) {
            return decoded;
        }
    }
    Value::String(truncate_preview(&String::from_utf8_lossy(payload)))
}

fn truncate_preview(value: &str) -> String {
    if value.len() <= MAX_PREVIEW_BYTES {
        return value.to_string();
    }
    let mut cutoff = MAX_PREVIEW_BYTES - TRUNCATION_SUFFIX.len();
    while !value.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    format!("{}{TRUNCATION_SUFFIX}", &value[..cutoff])
}

#[derive(Debug, Deserialize)]
pub struct SelectorPreviewRequest {
    #[serde(default)]
    pub json: String,
    pub token: Option<String>,
    pub selector: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SelectorPreviewResponse {
    pub exists: bool,
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

async fn preview_selector(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SelectorPreviewRequest>,
) -> Result<Json<SelectorPreviewResponse>, AppError> {
    let selector_path = payload.selector.as_deref().map(str::trim).unwrap_or_default();

    let token = payload.token.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let document = match token {
        Some(token) => app_state.payload_cache.get(token).ok_or_else(|| {
            AppError::InvalidInput(
                "selector payload unavailable, run test again or increase MAX_RESPONSE_BODY_BYTES"
                    .to_string(),
            )
        })?,
        None => {
            let inline = payload.json.trim();
            if inline.is_empty() {
                return Err(AppError::InvalidInput("json is required".to_string()));
            }
            inline.as_bytes().to_vec()
        }
    };

    let selection = selector::evaluate(&document, selector_path).map_err(|e| match e {
        SelectorError::InvalidJson(_) => {
            AppError::InvalidInput("json must be valid JSON".to_string())
        }
        other => AppError::InternalServerError(other.to_string()),
    })?;

    let (raw, value) = if selection.exists {
        (
            Some(truncate_preview(&selection.raw)),
            Some(truncate_preview(&selection.value)),
        )
    } else {
        (None, None)
    };
    Ok(Json(SelectorPreviewResponse {
        exists: selection.exists,
        value_type: selection.value_type.to_string(),
        raw,
        value,
    }))
}
