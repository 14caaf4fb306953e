//! Creates the tables the engine needs when they are missing.

use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::{
    check_result, monitor, monitor_runtime, notification_channel, notification_event,
    system_config,
};

async fn create_table<E: EntityTrait>(
    db: &DatabaseConnection,
    schema: &Schema,
    entity: E,
) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(backend.build(&statement)).await?;
    Ok(())
}

/// Parents first so foreign keys resolve.
pub async fn bootstrap(db: &DatabaseConnection) -> Result<(), DbErr> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, system_config::Entity).await?;
    create_table(db, &schema, monitor::Entity).await?;
    create_table(db, &schema, monitor_runtime::Entity).await?;
    create_table(db, &schema, check_result::Entity).await?;
    create_table(db, &schema, notification_channel::Entity).await?;
    create_table(db, &schema, notification_event::Entity).await?;

    info!("Database schema is ready.");
    Ok(())
}
