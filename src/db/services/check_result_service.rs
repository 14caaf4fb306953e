//! Check history: append, look up the previous selection, prune.

use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use super::monitor_service;
use crate::db::entities::{check_result, monitor_runtime};
use crate::monitoring::models::CheckRecord;
use crate::selector::{Selection, ValueType};

fn check_active_model(check: &CheckRecord) -> check_result::ActiveModel {
    let selection = check.selection.as_ref().filter(|selection| selection.exists);
    let diff = check.diff.as_ref();

    check_result::ActiveModel {
        id: NotSet,
        monitor_id: Set(check.monitor_id),
        status: Set(check.status),
        status_code: Set(check.status_code),
        duration_ms: Set(check.duration_ms),
        error_message: Set(check.error_message.clone()),
        selection_type: Set(selection.map(|s| s.value_type.as_str().to_string())),
        selection_value: Set(selection.map(|s| s.value.clone())),
        diff_changed: Set(diff.map(|d| d.changed)),
        diff_kind: Set(diff.map(|d| d.kind.as_str().to_string())),
        diff_summary: Set(diff.map(|d| d.summary.clone())),
        diff_details: Set(diff.and_then(|d| d.details_json())),
        checked_at: Set(check.checked_at),
    }
}

/// Inserts the check result and writes the runtime row in one transaction, so the
/// runtime never advances without its history entry.
pub async fn record_check(
    db: &DatabaseConnection,
    check: &CheckRecord,
    runtime: &monitor_runtime::Model,
) -> Result<(), DbErr> {
    let txn = db.begin().await?;
    check_active_model(check).insert(&txn).await?;
    monitor_service::update_runtime(&txn, runtime).await?;
    txn.commit().await
}

/// Selection stored by the most recent check of the monitor that had one.
pub async fn latest_selection(
    db: &DatabaseConnection,
    monitor_id: i32,
) -> Result<Option<Selection>, DbErr> {
    let row = check_result::Entity::find()
        .filter(check_result::Column::MonitorId.eq(monitor_id))
        .filter(check_result::Column::SelectionType.is_not_null())
        .filter(check_result::Column::SelectionValue.is_not_null())
        .order_by_desc(check_result::Column::CheckedAt)
        .order_by_desc(check_result::Column::Id)
        .one(db)
        .await?;

    Ok(row.and_then(|row| {
        let value_type = ValueType::parse(row.selection_type.as_deref()?)?;
        Some(Selection::from_stored(value_type, row.selection_value?))
    }))
}

/// Deletes all but the newest `keep` results of a monitor.
pub async fn prune_checks(db: &DatabaseConnection, monitor_id: i32, keep: i64) -> Result<u64, DbErr> {
    if keep <= 0 {
        return Ok(0);
    }

    let stale: Vec<i32> = check_result::Entity::find()
        .select_only()
        .column(check_result::Column::Id)
        .filter(check_result::Column::MonitorId.eq(monitor_id))
        .order_by_desc(check_result::Column::CheckedAt)
        .order_by_desc(check_result::Column::Id)
        .offset(keep as u64)
        .into_tuple()
        .all(db)
        .await?;
    if stale.is_empty() {
        return Ok(0);
    }

    let result = check_result::Entity::delete_many()
        .filter(check_result::Column::Id.is_in(stale))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
