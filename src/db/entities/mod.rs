//! sea-orm entities mapping the monitoring tables.

pub mod check_result;
pub mod monitor;
pub mod monitor_runtime;
pub mod notification_channel;
pub mod notification_event;
pub mod system_config;

pub mod prelude {
    pub use super::check_result::Entity as CheckResult;
    pub use super::check_result::Model as CheckResultModel;
    pub use super::check_result::ActiveModel as CheckResultActiveModel;
    pub use super::check_result::Column as CheckResultColumn;

    pub use super::monitor::Entity as Monitor;
    pub use super::monitor::Model as MonitorModel;
    pub use super::monitor::ActiveModel as MonitorActiveModel;
    pub use super::monitor::Column as MonitorColumn;

    pub use super::monitor_runtime::Entity as MonitorRuntime;
    pub use super::monitor_runtime::Model as MonitorRuntimeModel;
    pub use super::monitor_runtime::ActiveModel as MonitorRuntimeActiveModel;
    pub use super::monitor_runtime::Column as MonitorRuntimeColumn;

    pub use super::notification_channel::Entity as NotificationChannel;
    pub use super::notification_channel::Model as NotificationChannelModel;
    pub use super::notification_channel::ActiveModel as NotificationChannelActiveModel;
    pub use super::notification_channel::Column as NotificationChannelColumn;

    pub use super::notification_event::Entity as NotificationEvent;
    pub use super::notification_event::Model as NotificationEventModel;
    pub use super::notification_event::ActiveModel as NotificationEventActiveModel;
    pub use super::notification_event::Column as NotificationEventColumn;

    pub use super::system_config::Entity as SystemConfig;
    pub use super::system_config::Model as SystemConfigModel;
    pub use super::system_config::ActiveModel as SystemConfigActiveModel;
    pub use super::system_config::Column as SystemConfigColumn;
}
