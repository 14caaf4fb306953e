//! sea-orm backed data access.
//!
//! Each sub-module holds free functions over a connection for one table group. They are
//! re-exported here and wired into the repository traits by [`DbRepository`].

pub mod channel_service;
pub mod check_result_service;
pub mod monitor_service;
pub mod system_config_service;

pub use channel_service::*;
pub use check_result_service::*;
pub use monitor_service::*;
pub use system_config_service::*;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::warn;

use crate::db::entities::{monitor_runtime, notification_channel};
use crate::db::enums::RuntimeStatus;
use crate::db::repository::{ChannelRepository, MonitorRepository, RepositoryError};
use crate::monitoring::models::{CheckRecord, MonitorWithRuntime, SystemSettings};
use crate::notifications::encryption::EncryptionService;
use crate::notifications::models::{ChannelConfig, NewNotificationEvent, NotificationChannel};
use crate::selector::Selection;

#[derive(Clone)]
pub struct DbRepository {
    db: DatabaseConnection,
    encryption: Arc<EncryptionService>,
}

impl DbRepository {
    pub fn new(db: DatabaseConnection, encryption: Arc<EncryptionService>) -> Self {
        Self { db, encryption }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    fn decode_channel(
        &self,
        row: notification_channel::Model,
    ) -> Result<NotificationChannel, RepositoryError> {
        let plain = self.encryption.decrypt(&row.config)?;
        let config: ChannelConfig = serde_json::from_slice(&plain)?;
        Ok(NotificationChannel {
            id: row.id,
            name: row.name,
            kind: row.kind,
            config,
            enabled: row.enabled,
        })
    }
}

#[async_trait]
impl MonitorRepository for DbRepository {
    async fn ensure_system_config(
        &self,
        default_history_limit: i32,
    ) -> Result<SystemSettings, RepositoryError> {
        Ok(ensure_system_config(&self.db, default_history_limit).await?.into())
    }

    async fn list_monitors_with_runtime(&self) -> Result<Vec<MonitorWithRuntime>, RepositoryError> {
        Ok(list_monitors_with_runtime(&self.db).await?)
    }

    async fn get_monitor_with_runtime(
        &self,
        monitor_id: i32,
    ) -> Result<Option<MonitorWithRuntime>, RepositoryError> {
        Ok(get_monitor_with_runtime(&self.db, monitor_id).await?)
    }

    async fn create_runtime(
        &self,
        runtime: monitor_runtime::Model,
    ) -> Result<monitor_runtime::Model, RepositoryError> {
        Ok(create_runtime(&self.db, &runtime).await?)
    }

    async fn update_runtime(&self, runtime: &monitor_runtime::Model) -> Result<(), RepositoryError> {
        update_runtime(&self.db, runtime).await?;
        Ok(())
    }

    async fn set_runtime_status(
        &self,
        runtime_id: i32,
        status: RuntimeStatus,
    ) -> Result<(), RepositoryError> {
        Ok(set_runtime_status(&self.db, runtime_id, status).await?)
    }

    async fn record_check(
        &self,
        check: &CheckRecord,
        runtime: &monitor_runtime::Model,
    ) -> Result<(), RepositoryError> {
        Ok(record_check(&self.db, check, runtime).await?)
    }

    async fn latest_selection(&self, monitor_id: i32) -> Result<Option<Selection>, RepositoryError> {
        Ok(latest_selection(&self.db, monitor_id).await?)
    }

    async fn prune_checks(&self, monitor_id: i32, keep: i64) -> Result<u64, RepositoryError> {
        Ok(prune_checks(&self.db, monitor_id, keep).await?)
    }
}

#[async_trait]
impl ChannelRepository for DbRepository {
    async fn enabled_channels(&self) -> Result<Vec<NotificationChannel>, RepositoryError> {
        let rows = get_enabled_channels(&self.db).await?;
        let mut channels = Vec::with_capacity(rows.len());
        for row in rows {
            let channel_id = row.id;
            match self.decode_channel(row) {
                Ok(channel) => channels.push(channel),
                Err(e) => {
                    warn!(channel_id, error = %e, "Skipping notification channel with unreadable config.")
                }
            }
        }
        Ok(channels)
    }

    async fn create_event(&self, event: NewNotificationEvent) -> Result<(), RepositoryError> {
        create_notification_event(&self.db, event).await?;
        Ok(())
    }
}
