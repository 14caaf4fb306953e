use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A watched endpoint. Managed by the configuration surface; the scheduler only reads it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monitors")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub label: Option<String>,
    pub method: String,
    #[sea_orm(column_type = "Text")]
    pub url: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub body: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub headers: Option<Json>,
    // Auth descriptor: {"type": "bearer", "token": "..."} and friends.
    #[sea_orm(column_type = "Json", nullable)]
    pub auth: Option<Json>,
    pub selector: Option<String>,
    pub expected_type: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub expected_response: Option<String>,
    pub cron: String,
    pub enabled: bool,
    // Channel kinds to notify, e.g. ["telegram"].
    #[sea_orm(column_type = "Json", nullable)]
    pub notification_channels: Option<Json>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::monitor_runtime::Entity")]
    MonitorRuntime,
    #[sea_orm(has_many = "super::check_result::Entity")]
    CheckResult,
}

impl Related<super::monitor_runtime::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MonitorRuntime.def()
    }
}

impl Related<super::check_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CheckResult.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
