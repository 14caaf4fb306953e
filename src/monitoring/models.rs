use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::db::entities::{monitor, monitor_runtime, system_config};
use crate::db::enums::CheckStatus;
use crate::diff::DiffRecord;
use crate::selector::Selection;

/// A watched endpoint, decoded from its stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Monitor {
    pub id: i32,
    pub label: Option<String>,
    pub method: String,
    pub url: String,
    pub body: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub auth: BTreeMap<String, String>,
    pub selector: Option<String>,
    pub expected_type: String,
    pub expected_response: Option<String>,
    pub cron: String,
    pub enabled: bool,
    pub notification_channels: Vec<String>,
}

impl From<monitor::Model> for Monitor {
    fn from(model: monitor::Model) -> Self {
        let notification_channels = match model.notification_channels {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };

        Self {
            id: model.id,
            label: model.label,
            method: model.method,
            url: model.url,
            body: model.body,
            headers: string_map(model.headers),
            auth: string_map(model.auth),
            selector: model.selector,
            expected_type: model.expected_type,
            expected_response: model.expected_response,
            cron: model.cron,
            enabled: model.enabled,
            notification_channels,
        }
    }
}

/// Flattens a JSON object into string pairs. Scalars are stringified, nulls and nested
/// values are dropped.
fn string_map(value: Option<Value>) -> BTreeMap<String, String> {
    let Some(Value::Object(map)) = value else {
        return BTreeMap::new();
    };
    map.into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(text) => Some((key, text)),
            Value::Number(number) => Some((key, number.to_string())),
            Value::Bool(flag) => Some((key, flag.to_string())),
            _ => None,
        })
        .collect()
}

/// How a response body is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    Json,
    Html,
    Text,
}

impl ExpectedType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(ExpectedType::Json),
            "html" => Some(ExpectedType::Html),
            "text" => Some(ExpectedType::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorWithRuntime {
    pub monitor: Monitor,
    pub runtime: Option<monitor_runtime::Model>,
}

/// Global scheduler settings stored in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemSettings {
    pub checks_history_limit: i64,
    pub timezone: Option<String>,
}

impl From<system_config::Model> for SystemSettings {
    fn from(model: system_config::Model) -> Self {
        Self {
            checks_history_limit: i64::from(model.checks_history_limit),
            timezone: model.timezone,
        }
    }
}

/// A check result about to be appended to history.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckRecord {
    pub monitor_id: i32,
    pub status: CheckStatus,
    pub status_code: Option<i32>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub selection: Option<Selection>,
    pub diff: Option<DiffRecord>,
    pub checked_at: DateTime<Utc>,
}
