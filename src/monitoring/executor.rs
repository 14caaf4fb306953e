//! One HTTP probe of a monitor and the evaluation of its response.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::models::{ExpectedType, Monitor};
use crate::db::enums::CheckStatus;
use crate::selector::{self, Selection, SelectorError};

pub const DEFAULT_MAX_RESPONSE_BODY_BYTES: usize = 24 * 1024 * 1024;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of a single attempt. Never an error: failures are described in the fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub status: CheckStatus,
    pub status_code: Option<i32>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub selection: Option<Selection>,
    pub checked_at: DateTime<Utc>,
}

impl ExecutionResult {
    fn failed(checked_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Error,
            status_code: None,
            duration_ms: None,
            error_message: Some(message.into()),
            selection: None,
            checked_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CheckStatus::Ok
    }
}

/// The request half of a monitor, also used for ad-hoc URL tests.
#[derive(Debug, Clone, Copy)]
pub struct RequestSpec<'a> {
    pub method: &'a str,
    pub url: &'a str,
    pub body: Option<&'a str>,
    pub headers: &'a BTreeMap<String, String>,
    pub auth: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a Monitor> for RequestSpec<'a> {
    fn from(monitor: &'a Monitor) -> Self {
        Self {
            method: &monitor.method,
            url: &monitor.url,
            body: monitor.body.as_deref(),
            headers: &monitor.headers,
            auth: &monitor.auth,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request could not be built; nothing was sent.
    #[error("{0}")]
    Build(String),
    #[error("{message}")]
    Send { message: String, duration_ms: i64 },
}

/// A response whose body was read up to one byte past the size limit.
#[derive(Debug)]
pub struct FetchedResponse {
    pub status_code: u16,
    pub duration_ms: i64,
    /// Header values joined with `, ` when repeated.
    pub headers: BTreeMap<String, String>,
    /// `Err` carries the read failure.
    pub body: Result<Vec<u8>, String>,
}

impl FetchedResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE.as_str()).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct CheckExecutor {
    client: Client,
    max_response_body_bytes: usize,
}

impl CheckExecutor {
    pub fn new(request_timeout: Duration, max_response_body_bytes: usize) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        let max_response_body_bytes = if max_response_body_bytes == 0 {
            DEFAULT_MAX_RESPONSE_BODY_BYTES
        } else {
            max_response_body_bytes
        };
        Ok(Self {
            client,
            max_response_body_bytes,
        })
    }

    pub fn max_response_body_bytes(&self) -> usize {
        self.max_response_body_bytes
    }

    pub async fn execute(&self, monitor: &Monitor) -> ExecutionResult {
        let checked_at = Utc::now();

        let fetched = match self.fetch(RequestSpec::from(monitor)).await {
            Ok(fetched) => fetched,
            Err(FetchError::Build(message)) => return ExecutionResult::failed(checked_at, message),
            Err(FetchError::Send {
                message,
                duration_ms,
            }) => {
                let mut result = ExecutionResult::failed(checked_at, message);
                result.duration_ms = Some(duration_ms);
                return result;
            }
        };

        let mut result = ExecutionResult::failed(checked_at, String::new());
        result.duration_ms = Some(fetched.duration_ms);
        result.status_code = Some(i32::from(fetched.status_code));

        let payload = match fetched.body {
            Ok(payload) => payload,
            Err(message) => {
                result.error_message = Some(message);
                return result;
            }
        };
        let limit = self.max_response_body_bytes;
        if payload.len() > limit {
            result.error_message = Some(format!(
                "response body exceeds {limit} bytes limit (increase MAX_RESPONSE_BODY_BYTES)"
            ));
            return result;
        }

        let evaluation = evaluate_response(
            fetched.status_code,
            &payload,
            &monitor.expected_type,
            monitor.selector.as_deref(),
            monitor.expected_response.as_deref(),
        );
        result.selection = evaluation.selection;
        match evaluation.error {
            None => {
                result.status = CheckStatus::Ok;
                result.error_message = None;
            }
            Some(message) => result.error_message = Some(message),
        }
        result
    }

    /// Sends the request and reads at most `limit + 1` bytes of the body, so callers can
    /// tell an oversized body from one that fits exactly.
    pub async fn fetch(&self, spec: RequestSpec<'_>) -> Result<FetchedResponse, FetchError> {
        let request = self.build_request(spec)?;

        let started = Instant::now();
        let response = self.client.execute(request).await;
        let duration_ms = elapsed_ms(started);
        let response = response.map_err(|e| FetchError::Send {
            message: e.to_string(),
            duration_ms,
        })?;

        let status_code = response.status().as_u16();
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes());
            headers
                .entry(name.as_str().to_string())
                .and_modify(|joined| {
                    joined.push_str(", ");
                    joined.push_str(&value);
                })
                .or_insert_with(|| value.to_string());
        }
        let body = read_limited(response, self.max_response_body_bytes)
            .await
            .map_err(|e| e.to_string());

        Ok(FetchedResponse {
            status_code,
            duration_ms,
            headers,
            body,
        })
    }

    fn build_request(&self, spec: RequestSpec<'_>) -> Result<reqwest::Request, FetchError> {
        let method = spec.method.trim();
        let method = if method.is_empty() {
            Method::GET
        } else {
            Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|_| FetchError::Build(format!("invalid HTTP method {method:?}")))?
        };

        let mut headers = HeaderMap::new();
        for (key, value) in spec.headers {
            set_header(&mut headers, key, value)?;
        }
        apply_auth(&mut headers, spec.auth)?;

        let mut builder = self.client.request(method, spec.url).headers(headers);
        if let Some(body) = spec.body {
            builder = builder.body(body.to_string());
        }
        builder.build().map_err(|e| FetchError::Build(e.to_string()))
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

async fn read_limited(mut response: Response, limit: usize) -> reqwest::Result<Vec<u8>> {
    let cap = limit.saturating_add(1);
    let mut payload = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let remaining = cap - payload.len();
        if chunk.len() >= remaining {
            payload.extend_from_slice(&chunk[..remaining]);
            break;
        }
        payload.extend_from_slice(&chunk);
    }
    Ok(payload)
}

fn set_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), FetchError> {
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|e| FetchError::Build(format!("invalid header name {name:?}: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| FetchError::Build(format!("invalid value for header {name}: {e}")))?;
    headers.insert(name, value);
    Ok(())
}

/// Adds credentials described by the monitor's auth map. Unknown or incomplete
/// descriptors add nothing.
pub fn apply_auth(headers: &mut HeaderMap, auth: &BTreeMap<String, String>) -> Result<(), FetchError> {
    let field = |key: &str| auth.get(key).map(String::as_str).unwrap_or_default();

    match field("type").trim().to_lowercase().as_str() {
        "bearer" => {
            let token = field("token").trim();
            if !token.is_empty() {
                set_header(headers, AUTHORIZATION.as_str(), &format!("Bearer {token}"))?;
            }
        }
        "basic" => {
            let (username, password) = (field("username"), field("password"));
            if !username.is_empty() || !password.is_empty() {
                let credentials = STANDARD.encode(format!("{username}:{password}"));
                set_header(headers, AUTHORIZATION.as_str(), &format!("Basic {credentials}"))?;
            }
        }
        "api_key_header" => {
            let (name, value) = (field("name").trim(), field("value"));
            if !name.is_empty() && !value.is_empty() {
                set_header(headers, name, value)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub error: Option<String>,
    pub selection: Option<Selection>,
}

impl Evaluation {
    fn ok(selection: Option<Selection>) -> Self {
        Self {
            error: None,
            selection,
        }
    }

    fn fail(message: impl Into<String>, selection: Option<Selection>) -> Self {
        Self {
            error: Some(message.into()),
            selection,
        }
    }
}

/// Judges a fully read response against the monitor's expectations.
pub fn evaluate_response(
    status_code: u16,
    payload: &[u8],
    expected_type: &str,
    selector_path: Option<&str>,
    expected: Option<&str>,
) -> Evaluation {
    if !(200..300).contains(&status_code) {
        return Evaluation::fail(format!("unexpected status code: {status_code}"), None);
    }

    let expected = expected.map(str::trim).unwrap_or_default();
    let selector_path = selector_path.map(str::trim).unwrap_or_default();

    match ExpectedType::parse(expected_type) {
        Some(ExpectedType::Json) => {
            let selection = match selector::evaluate(payload, selector_path) {
                Ok(selection) => selection,
                Err(SelectorError::InvalidJson(_)) => {
                    return Evaluation::fail("response is not valid JSON", None)
                }
                Err(e) => return Evaluation::fail(e.to_string(), None),
            };
            if !selector_path.is_empty() && !selection.exists {
                return Evaluation::fail(
                    format!("selector {selector_path:?} not found"),
                    Some(selection),
                );
            }
            if expected.is_empty() || selection.value == expected {
                Evaluation::ok(Some(selection))
            } else {
                Evaluation::fail("JSON assertion failed", Some(selection))
            }
        }
        Some(ExpectedType::Html | ExpectedType::Text) => {
            if !selector_path.is_empty() {
                return Evaluation::fail("selector is only supported for JSON expectedType", None);
            }
            if expected.is_empty() || String::from_utf8_lossy(payload).trim() == expected {
                Evaluation::ok(None)
            } else {
                Evaluation::fail("text assertion failed", None)
            }
        }
        None => Evaluation::fail("unsupported expectedType", None),
    }
}
