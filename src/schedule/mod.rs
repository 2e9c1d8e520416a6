//! Scheduled exports: recurrence, deferral policy and host registration

pub mod config;
pub mod deferral;
pub mod delegate;
pub mod signals;
pub mod timer;
pub mod traits;

pub use config::{DeferredRunPolicy, RecurrenceRule, ScheduleConfiguration};
pub use deferral::{evaluate, DeferralSignals, ExportDeferralReason};
pub use delegate::{ScheduleDelegate, ScheduleStatus, WakeupOutcome};
pub use signals::SystemSignals;
pub use timer::ThreadRegistrar;
pub use traits::{EnvironmentSignals, SchedulerRegistrar, WakeupHandler};
