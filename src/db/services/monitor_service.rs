//! Reads monitors and maintains their runtime rows.

use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Unchanged, ConnectionTrait,
    DatabaseConnection, DbErr, EntityTrait, QueryOrder, Set,
};

use crate::db::entities::{monitor, monitor_runtime};
use crate::db::enums::RuntimeStatus;
use crate::monitoring::models::MonitorWithRuntime;

/// Lists every monitor (enabled or not) together with its runtime row, if any.
pub async fn list_monitors_with_runtime(
    db: &DatabaseConnection,
) -> Result<Vec<MonitorWithRuntime>, DbErr> {
    let rows = monitor::Entity::find()
        .find_also_related(monitor_runtime::Entity)
        .order_by_asc(monitor::Column::Id)
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(monitor, runtime)| MonitorWithRuntime {
            monitor: monitor.into(),
            runtime,
        })
        .collect())
}

pub async fn get_monitor_with_runtime(
    db: &DatabaseConnection,
    monitor_id: i32,
) -> Result<Option<MonitorWithRuntime>, DbErr> {
    let row = monitor::Entity::find_by_id(monitor_id)
        .find_also_related(monitor_runtime::Entity)
        .one(db)
        .await?;

    Ok(row.map(|(monitor, runtime)| MonitorWithRuntime {
        monitor: monitor.into(),
        runtime,
    }))
}

fn runtime_active_model(runtime: &monitor_runtime::Model) -> monitor_runtime::ActiveModel {
    monitor_runtime::ActiveModel {
        id: NotSet,
        monitor_id: Set(runtime.monitor_id),
        status: Set(runtime.status),
        check_count: Set(runtime.check_count),
        success_count: Set(runtime.success_count),
        error_count: Set(runtime.error_count),
        retry_count: Set(runtime.retry_count),
        consecutive_successes: Set(runtime.consecutive_successes),
        consecutive_errors: Set(runtime.consecutive_errors),
        last_check_at: Set(runtime.last_check_at),
        last_success_at: Set(runtime.last_success_at),
        last_error_at: Set(runtime.last_error_at),
        last_status_code: Set(runtime.last_status_code),
        last_duration_ms: Set(runtime.last_duration_ms),
        last_error_message: Set(runtime.last_error_message.clone()),
        next_run_at: Set(runtime.next_run_at),
    }
}

pub async fn create_runtime<C: ConnectionTrait>(
    db: &C,
    runtime: &monitor_runtime::Model,
) -> Result<monitor_runtime::Model, DbErr> {
    runtime_active_model(runtime).insert(db).await
}

/// Writes every column of the runtime row identified by `runtime.id`.
pub async fn update_runtime<C: ConnectionTrait>(
    db: &C,
    runtime: &monitor_runtime::Model,
) -> Result<monitor_runtime::Model, DbErr> {
    let mut active = runtime_active_model(runtime);
    active.id = Unchanged(runtime.id);
    active.update(db).await
}

pub async fn set_runtime_status<C: ConnectionTrait>(
    db: &C,
    runtime_id: i32,
    status: RuntimeStatus,
) -> Result<(), DbErr> {
    let active = monitor_runtime::ActiveModel {
        id: Unchanged(runtime_id),
        status: Set(status),
        ..Default::default()
    };
    active.update(db).await?;
    Ok(())
}
