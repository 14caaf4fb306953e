use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::CheckStatus;

/// Append-only history of executed checks, pruned per monitor.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "check_results")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub monitor_id: i32,
    pub status: CheckStatus,
    pub status_code: Option<i32>,
    pub duration_ms: Option<i64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub selection_type: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub selection_value: Option<String>,
    pub diff_changed: Option<bool>,
    pub diff_kind: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub diff_summary: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub diff_details: Option<String>,
    pub checked_at: ChronoDateTimeUtc,
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
