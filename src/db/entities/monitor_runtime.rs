use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::RuntimeStatus;

/// Scheduler-owned state of a monitor. One row per monitor, created lazily.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monitor_runtimes")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub monitor_id: i32,
    pub status: RuntimeStatus,
    pub check_count: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub retry_count: i64,
    pub consecutive_successes: i64,
    pub consecutive_errors: i64,
    pub last_check_at: Option<ChronoDateTimeUtc>,
    pub last_success_at: Option<ChronoDateTimeUtc>,
    pub last_error_at: Option<ChronoDateTimeUtc>,
    pub last_status_code: Option<i32>,
    pub last_duration_ms: Option<i64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error_message: Option<String>,
    pub next_run_at: Option<ChronoDateTimeUtc>,
}

impl Model {
    /// A fresh runtime with zeroed counters. `id` is assigned on insert.
    pub fn new(monitor_id: i32, status: RuntimeStatus) -> Self {
        Self {
            id: 0,
            monitor_id,
            status,
            check_count: 0,
            success_count: 0,
            error_count: 0,
            retry_count: 0,
            consecutive_successes: 0,
            consecutive_errors: 0,
            last_check_at: None,
            last_success_at: None,
            last_error_at: None,
            last_status_code: None,
            last_duration_ms: None,
            last_error_message: None,
            next_run_at: None,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::monitor::Entity",
        from = "Column::MonitorId",
        to = "super::monitor::Column::Id",
        on_delete = "Cascade"
    )]
    Monitor,
}

impl Related<super::monitor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Monitor.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
