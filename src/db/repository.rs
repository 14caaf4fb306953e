//! Persistence seams consumed by the scheduler and the notification dispatcher.

use async_trait::async_trait;
use sea_orm::DbErr;
use thiserror::Error;

use crate::db::entities::monitor_runtime;
use crate::db::enums::RuntimeStatus;
use crate::monitoring::models::{CheckRecord, MonitorWithRuntime, SystemSettings};
use crate::notifications::encryption::EncryptionError;
use crate::notifications::models::{NewNotificationEvent, NotificationChannel};
use crate::selector::Selection;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Encryption error: {0}")]
    Encryption(#[from] EncryptionError),
    #[error("Not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait MonitorRepository: Send + Sync {
    /// Returns the global settings row, creating it with `default_history_limit` if missing.
    async fn ensure_system_config(
        &self,
        default_history_limit: i32,
    ) -> Result<SystemSettings, RepositoryError>;

    async fn list_monitors_with_runtime(&self) -> Result<Vec<MonitorWithRuntime>, RepositoryError>;

    async fn get_monitor_with_runtime(
        &self,
        monitor_id: i32,
    ) -> Result<Option<MonitorWithRuntime>, RepositoryError>;

    /// Inserts a runtime row; the `id` of the argument is ignored.
    async fn create_runtime(
        &self,
        runtime: monitor_runtime::Model,
    ) -> Result<monitor_runtime::Model, RepositoryError>;

    async fn update_runtime(&self, runtime: &monitor_runtime::Model) -> Result<(), RepositoryError>;

    async fn set_runtime_status(
        &self,
        runtime_id: i32,
        status: RuntimeStatus,
    ) -> Result<(), RepositoryError>;

    /// Appends a check result and writes the runtime in the same transaction.
    async fn record_check(
        &self,
        check: &CheckRecord,
        runtime: &monitor_runtime::Model,
    ) -> Result<(), RepositoryError>;

    /// Selection of the most recent check that stored one.
    async fn latest_selection(&self, monitor_id: i32) -> Result<Option<Selection>, RepositoryError>;

    /// Keeps the newest `keep` check results of a monitor. `keep <= 0` keeps everything.
    async fn prune_checks(&self, monitor_id: i32, keep: i64) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn enabled_channels(&self) -> Result<Vec<NotificationChannel>, RepositoryError>;

    async fn create_event(&self, event: NewNotificationEvent) -> Result<(), RepositoryError>;
}
