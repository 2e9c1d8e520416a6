//! Host capabilities consumed by the scheduler

use super::config::RecurrenceRule;
use crate::error::{OsError, SignalError};
use chrono::{DateTime, Local};
use std::sync::Arc;

/// Callback the host scheduler invokes when a registered wake-up fires
pub type WakeupHandler = Arc<dyn Fn() + Send + Sync>;

/// Background-task registration with the host operating system
///
/// Calls may block; the schedule delegate never makes them while holding
/// the export state lock.
pub trait SchedulerRegistrar: Send + Sync {
    /// Whether a wake-up is currently registered (the host is the source of
    /// truth, not the local enabled flag)
    fn is_registered(&self) -> bool;

    /// Register `handler` to fire at `fire_at` and then on `rule`
    ///
    /// Registering again replaces the previous registration.
    fn register(
        &self,
        rule: &RecurrenceRule,
        fire_at: DateTime<Local>,
        handler: WakeupHandler,
    ) -> Result<(), OsError>;

    fn unregister(&self) -> Result<(), OsError>;
}

/// Environment readings used by the deferral policy
pub trait EnvironmentSignals: Send + Sync {
    fn on_battery_power(&self) -> Result<bool, SignalError>;

    fn host_app_is_open(&self) -> Result<bool, SignalError>;
}
