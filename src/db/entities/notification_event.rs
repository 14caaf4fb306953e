use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::NotificationEventStatus;

/// One delivery attempt of a diff notification to one channel.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub monitor_id: i32,
    pub channel_id: i32,
    pub status: NotificationEventStatus,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub sent_at: ChronoDateTimeUtc,
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
    #[sea_orm(
        belongs_to = "super::notification_channel::Entity",
        from = "Column::ChannelId",
        to = "super::notification_channel::Column::Id",
        on_delete = "Cascade"
    )]
    NotificationChannel,
}

impl Related<super::monitor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Monitor.def()
    }
}

impl Related<super::notification_channel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NotificationChannel.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
