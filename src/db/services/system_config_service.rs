use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Set,
};

use crate::db::entities::system_config::{self, GLOBAL_KEY};

/// Returns the global config row, inserting it with defaults when absent.
pub async fn ensure_system_config(
    db: &DatabaseConnection,
    default_history_limit: i32,
) -> Result<system_config::Model, DbErr> {
    if let Some(existing) = system_config::Entity::find()
        .filter(system_config::Column::Key.eq(GLOBAL_KEY))
        .one(db)
        .await?
    {
        return Ok(existing);
    }

    system_config::ActiveModel {
        id: NotSet,
        key: Set(GLOBAL_KEY.to_owned()),
        checks_history_limit: Set(default_history_limit),
        timezone: Set(None),
        updated_at: Set(Utc::now()),
    }
    .insert(db)
    .await
}
