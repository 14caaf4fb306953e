//! The control loop: evaluates every monitor once per tick and runs the due ones.

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::models::{CheckRecord, Monitor};
use super::retry::RetryController;
use super::schedule::{is_startup_catch_up, next_run, resolve_timezone};
use super::shutdown::Shutdown;
use crate::db::entities::monitor_runtime;
use crate::db::enums::{CheckStatus, RuntimeStatus};
use crate::db::repository::{MonitorRepository, RepositoryError};
use crate::diff;
use crate::notifications::service::NotificationDispatcher;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_CHECKS_HISTORY_LIMIT: i32 = 200;
pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Retention written into the global config row when it is first created.
    pub checks_history_limit: i32,
    /// Cron timezone used when the global config names none.
    pub default_timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            checks_history_limit: DEFAULT_CHECKS_HISTORY_LIMIT,
            default_timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

pub struct Scheduler {
    repository: Arc<dyn MonitorRepository>,
    retry: RetryController,
    notifier: NotificationDispatcher,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        repository: Arc<dyn MonitorRepository>,
        retry: RetryController,
        notifier: NotificationDispatcher,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            repository,
            retry,
            notifier,
            config,
        }
    }

    /// Ticks until `shutdown` fires. The first tick runs immediately and treats every
    /// monitor scheduled at or before start as a catch-up run.
    pub async fn run(&self, mut shutdown: Shutdown) {
        let startup_at = Utc::now();
        info!(tick_interval = ?self.config.tick_interval, "Scheduler started.");
        self.tick(startup_at, Some(startup_at), &shutdown).await;

        let period = self.config.tick_interval;
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    info!("Scheduler received shutdown signal.");
                    break;
                }
                _ = interval.tick() => {
                    self.tick(Utc::now(), None, &shutdown).await;
                }
            }
        }
    }

    /// One pass over all monitors. Failures are logged per monitor and never abort the
    /// pass.
    pub async fn tick(
        &self,
        now: DateTime<Utc>,
        startup_cutoff: Option<DateTime<Utc>>,
        shutdown: &Shutdown,
    ) {
        let settings = match self
            .repository
            .ensure_system_config(self.config.checks_history_limit)
            .await
        {
            Ok(settings) => settings,
            Err(e) => {
                error!(error = %e, "Failed to load system config.");
                return;
            }
        };
        let tz = resolve_timezone(settings.timezone.as_deref(), &self.config.default_timezone);

        let rows = match self.repository.list_monitors_with_runtime().await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "Failed to list monitors.");
                return;
            }
        };

        for row in rows {
            if shutdown.is_triggered() {
                break;
            }
            let monitor = row.monitor;

            let runtime = match self.ensure_runtime(&monitor, row.runtime, now, tz).await {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!(monitor_id = monitor.id, error = %e, "Failed to prepare runtime.");
                    continue;
                }
            };

            let Some(next_run_at) = runtime.next_run_at else {
                continue;
            };
            if now < next_run_at {
                continue;
            }
            // A disabled monitor only runs when it was triggered by hand.
            let forced_once = !monitor.enabled;
            if forced_once && runtime.status != RuntimeStatus::Pending {
                continue;
            }

            if is_startup_catch_up(Some(next_run_at), startup_cutoff) {
                info!(monitor_id = monitor.id, %next_run_at, "Running check missed while the scheduler was down.");
            }

            let history_limit = settings.checks_history_limit;
            if let Err(e) = self
                .run_monitor(&monitor, runtime, now, tz, forced_once, history_limit, shutdown)
                .await
            {
                error!(monitor_id = monitor.id, error = %e, "Monitor run failed.");
            }
        }
    }

    /// Creates or reconciles the runtime row with the monitor's enabled flag and cron.
    pub async fn ensure_runtime(
        &self,
        monitor: &Monitor,
        runtime: Option<monitor_runtime::Model>,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Result<monitor_runtime::Model, RepositoryError> {
        let Some(mut runtime) = runtime else {
            let mut fresh = if monitor.enabled {
                monitor_runtime::Model::new(monitor.id, RuntimeStatus::Pending)
            } else {
                monitor_runtime::Model::new(monitor.id, RuntimeStatus::Disabled)
            };
            if monitor.enabled {
                fresh.next_run_at = next_run(&monitor.cron, now, tz).ok();
            }
            debug!(monitor_id = monitor.id, status = %fresh.status, "Creating monitor runtime.");
            return self.repository.create_runtime(fresh).await;
        };

        if !monitor.enabled {
            // Pending with a next run is a forced one-shot waiting to happen.
            if runtime.status == RuntimeStatus::Pending && runtime.next_run_at.is_some() {
                return Ok(runtime);
            }
            if runtime.status != RuntimeStatus::Disabled {
                runtime.status = RuntimeStatus::Disabled;
                runtime.next_run_at = None;
                self.repository.update_runtime(&runtime).await?;
            }
            return Ok(runtime);
        }

        if runtime.status == RuntimeStatus::Disabled {
            runtime.status = RuntimeStatus::Pending;
            if runtime.next_run_at.is_none() {
                runtime.next_run_at = next_run(&monitor.cron, now, tz).ok();
            }
            self.repository.update_runtime(&runtime).await?;
            return Ok(runtime);
        }

        if runtime.next_run_at.is_none() {
            match next_run(&monitor.cron, now, tz) {
                Ok(next) => runtime.next_run_at = Some(next),
                Err(e) => {
                    warn!(monitor_id = monitor.id, cron = %monitor.cron, error = %e, "Invalid cron expression.");
                    runtime.status = RuntimeStatus::Error;
                    runtime.last_error_message = Some(e.to_string());
                }
            }
            self.repository.update_runtime(&runtime).await?;
        }
        Ok(runtime)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_monitor(
        &self,
        monitor: &Monitor,
        mut runtime: monitor_runtime::Model,
        now: DateTime<Utc>,
        tz: Tz,
        forced_once: bool,
        history_limit: i64,
        shutdown: &Shutdown,
    ) -> Result<(), RepositoryError> {
        let (result, retries_used) = self.retry.run(monitor, runtime.id, shutdown).await;

        let diff = match result.selection.as_ref().filter(|selection| selection.exists) {
            Some(selection) => {
                let previous = self.repository.latest_selection(monitor.id).await?;
                diff::diff(previous.as_ref(), selection)
            }
            None => None,
        };

        runtime.check_count += 1;
        runtime.retry_count += i64::from(retries_used);
        runtime.last_check_at = Some(result.checked_at);

        if forced_once {
            runtime.status = RuntimeStatus::Disabled;
            runtime.next_run_at = None;
        } else {
            runtime.status = result.status.into();
            runtime.next_run_at = Some(
                next_run(&monitor.cron, now, tz).unwrap_or_else(|_| now + TimeDelta::minutes(1)),
            );
        }

        if result.status == CheckStatus::Ok {
            runtime.success_count += 1;
            runtime.consecutive_errors = 0;
            runtime.consecutive_successes += 1;
            runtime.last_success_at = Some(result.checked_at);
            runtime.last_error_message = None;
        } else {
            runtime.error_count += 1;
            runtime.consecutive_successes = 0;
            runtime.consecutive_errors += 1;
            runtime.last_error_at = Some(result.checked_at);
            if result.error_message.is_some() {
                runtime.last_error_message = result.error_message.clone();
            }
        }
        runtime.last_status_code = result.status_code;
        runtime.last_duration_ms = result.duration_ms;

        let record = CheckRecord {
            monitor_id: monitor.id,
            status: result.status,
            status_code: result.status_code,
            duration_ms: result.duration_ms,
            error_message: result.error_message,
            selection: result.selection,
            diff,
            checked_at: result.checked_at,
        };
        self.repository.record_check(&record, &runtime).await?;
        debug!(
            monitor_id = monitor.id,
            status = %record.status,
            retries = retries_used,
            next_run_at = ?runtime.next_run_at,
            "Check recorded."
        );

        if let Some(diff) = record.diff.as_ref().filter(|diff| diff.changed) {
            info!(monitor_id = monitor.id, kind = %diff.kind, summary = %diff.summary, "Change detected.");
            if let Err(e) = self.notifier.notify(monitor, diff, record.checked_at).await {
                warn!(monitor_id = monitor.id, error = %e, "Failed to notify about change.");
            }
        }

        let pruned = self.repository.prune_checks(monitor.id, history_limit).await?;
        if pruned > 0 {
            debug!(monitor_id = monitor.id, pruned, "Pruned check history.");
        }
        Ok(())
    }
}

/// Schedules a monitor to run on the next tick, enabled or not. Returns `None` when the
/// monitor does not exist.
pub async fn trigger_monitor(
    repository: &dyn MonitorRepository,
    monitor_id: i32,
    now: DateTime<Utc>,
) -> Result<Option<monitor_runtime::Model>, RepositoryError> {
    let Some(row) = repository.get_monitor_with_runtime(monitor_id).await? else {
        return Ok(None);
    };

    let runtime = match row.runtime {
        Some(mut runtime) => {
            runtime.status = RuntimeStatus::Pending;
            runtime.next_run_at = Some(now);
            repository.update_runtime(&runtime).await?;
            runtime
        }
        None => {
            let mut fresh = monitor_runtime::Model::new(monitor_id, RuntimeStatus::Pending);
            fresh.next_run_at = Some(now);
            repository.create_runtime(fresh).await?
        }
    };
    info!(monitor_id, "Monitor run triggered.");
    Ok(Some(runtime))
}
