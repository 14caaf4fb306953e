//! In-memory repository used by scheduler and dispatcher tests.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::db::entities::monitor_runtime;
use crate::db::enums::RuntimeStatus;
use crate::db::repository::{ChannelRepository, MonitorRepository, RepositoryError};
use crate::monitoring::models::{CheckRecord, Monitor, MonitorWithRuntime, SystemSettings};
use crate::notifications::models::{NewNotificationEvent, NotificationChannel};
use crate::selector::Selection;

#[derive(Debug, Default)]
struct State {
    settings: Option<SystemSettings>,
    monitors: Vec<Monitor>,
    runtimes: Vec<monitor_runtime::Model>,
    checks: Vec<(i32, CheckRecord)>,
    status_history: Vec<(i32, RuntimeStatus)>,
    channels: Vec<NotificationChannel>,
    events: Vec<NewNotificationEvent>,
    next_id: i32,
}

impl State {
    fn allocate_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(self, settings: SystemSettings) -> Self {
        self.state.lock().unwrap().settings = Some(settings);
        self
    }

    pub fn add_monitor(&self, monitor: Monitor) {
        self.state.lock().unwrap().monitors.push(monitor);
    }

    pub fn add_runtime(&self, mut runtime: monitor_runtime::Model) -> monitor_runtime::Model {
        let mut state = self.state.lock().unwrap();
        runtime.id = state.allocate_id();
        state.runtimes.push(runtime.clone());
        runtime
    }

    pub fn add_channel(&self, channel: NotificationChannel) {
        self.state.lock().unwrap().channels.push(channel);
    }

    pub fn runtime(&self, monitor_id: i32) -> Option<monitor_runtime::Model> {
        let state = self.state.lock().unwrap();
        state.runtimes.iter().find(|r| r.monitor_id == monitor_id).cloned()
    }

    /// Check records of a monitor, oldest first.
    pub fn checks(&self, monitor_id: i32) -> Vec<CheckRecord> {
        let state = self.state.lock().unwrap();
        state
            .checks
            .iter()
            .filter(|(_, check)| check.monitor_id == monitor_id)
            .map(|(_, check)| check.clone())
            .collect()
    }

    /// Statuses written through `set_runtime_status`, in order.
    pub fn status_history(&self, runtime_id: i32) -> Vec<RuntimeStatus> {
        let state = self.state.lock().unwrap();
        state
            .status_history
            .iter()
            .filter(|(id, _)| *id == runtime_id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn events(&self) -> Vec<NewNotificationEvent> {
        self.state.lock().unwrap().events.clone()
    }
}

#[async_trait]
impl MonitorRepository for MemoryRepository {
    async fn ensure_system_config(
        &self,
        default_history_limit: i32,
    ) -> Result<SystemSettings, RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let settings = state.settings.get_or_insert_with(|| SystemSettings {
            checks_history_limit: i64::from(default_history_limit),
            timezone: None,
        });
        Ok(settings.clone())
    }

    async fn list_monitors_with_runtime(&self) -> Result<Vec<MonitorWithRuntime>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .monitors
            .iter()
            .map(|monitor| MonitorWithRuntime {
                monitor: monitor.clone(),
                runtime: state.runtimes.iter().find(|r| r.monitor_id == monitor.id).cloned(),
            })
            .collect())
    }

    async fn get_monitor_with_runtime(
        &self,
        monitor_id: i32,
    ) -> Result<Option<MonitorWithRuntime>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state.monitors.iter().find(|m| m.id == monitor_id).map(|monitor| {
            MonitorWithRuntime {
                monitor: monitor.clone(),
                runtime: state.runtimes.iter().find(|r| r.monitor_id == monitor_id).cloned(),
            }
        }))
    }

    async fn create_runtime(
        &self,
        runtime: monitor_runtime::Model,
    ) -> Result<monitor_runtime::Model, RepositoryError> {
        Ok(self.add_runtime(runtime))
    }

    async fn update_runtime(&self, runtime: &monitor_runtime::Model) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let slot = state
            .runtimes
            .iter_mut()
            .find(|r| r.id == runtime.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("runtime {}", runtime.id)))?;
        *slot = runtime.clone();
        Ok(())
    }

    async fn set_runtime_status(
        &self,
        runtime_id: i32,
        status: RuntimeStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        state.status_history.push((runtime_id, status));
        if let Some(runtime) = state.runtimes.iter_mut().find(|r| r.id == runtime_id) {
            runtime.status = status;
        }
        Ok(())
    }

    async fn record_check(
        &self,
        check: &CheckRecord,
        runtime: &monitor_runtime::Model,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let id = state.allocate_id();
        state.checks.push((id, check.clone()));
        if let Some(slot) = state.runtimes.iter_mut().find(|r| r.id == runtime.id) {
            *slot = runtime.clone();
        }
        Ok(())
    }

    async fn latest_selection(&self, monitor_id: i32) -> Result<Option<Selection>, RepositoryError> {
        let state = self.state.lock().unwrap();
        let latest = state
            .checks
            .iter()
            .filter(|(_, check)| check.monitor_id == monitor_id)
            .filter_map(|(id, check)| {
                let selection = check.selection.as_ref().filter(|s| s.exists)?;
                Some((check.checked_at, *id, selection))
            })
            .max_by_key(|(checked_at, id, _)| (*checked_at, *id));
        Ok(latest.map(|(_, _, selection)| {
            Selection::from_stored(selection.value_type, selection.value.clone())
        }))
    }

    async fn prune_checks(&self, monitor_id: i32, keep: i64) -> Result<u64, RepositoryError> {
        if keep <= 0 {
            return Ok(0);
        }
        let mut state = self.state.lock().unwrap();
        let mut owned: Vec<(chrono::DateTime<chrono::Utc>, i32)> = state
            .checks
            .iter()
            .filter(|(_, check)| check.monitor_id == monitor_id)
            .map(|(id, check)| (check.checked_at, *id))
            .collect();
        owned.sort_by(|a, b| b.cmp(a));
        let stale: Vec<i32> = owned.into_iter().skip(keep as usize).map(|(_, id)| id).collect();
        state.checks.retain(|(id, _)| !stale.contains(id));
        Ok(stale.len() as u64)
    }
}

#[async_trait]
impl ChannelRepository for MemoryRepository {
    async fn enabled_channels(&self) -> Result<Vec<NotificationChannel>, RepositoryError> {
        let state = self.state.lock().unwrap();
        Ok(state.channels.iter().filter(|c| c.enabled).cloned().collect())
    }

    async fn create_event(&self, event: NewNotificationEvent) -> Result<(), RepositoryError> {
        self.state.lock().unwrap().events.push(event);
        Ok(())
    }
}
