use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set,
};

use crate::db::entities::{notification_channel, notification_event};
use crate::notifications::models::NewNotificationEvent;

pub async fn get_enabled_channels(
    db: &DatabaseConnection,
) -> Result<Vec<notification_channel::Model>, DbErr> {
    notification_channel::Entity::find()
        .filter(notification_channel::Column::Enabled.eq(true))
        .order_by_asc(notification_channel::Column::Id)
        .all(db)
        .await
}

pub async fn create_notification_event(
    db: &DatabaseConnection,
    event: NewNotificationEvent,
) -> Result<notification_event::Model, DbErr> {
    notification_event::ActiveModel {
        id: NotSet,
        monitor_id: Set(event.monitor_id),
        channel_id: Set(event.channel_id),
        status: Set(event.status),
        message: Set(event.message),
        sent_at: Set(event.sent_at),
    }
    .insert(db)
    .await
}
