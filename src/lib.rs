//! Music Library Exporter - scheduled export engine
//!
//! This library decides when a music library export may run, drives each
//! export attempt through its phases, and keeps the background scheduler
//! registration in step with the user's schedule configuration.

pub mod clock;
pub mod error;
pub mod export;
pub mod schedule;
pub mod sync;

pub use error::{
    BeginExportError, ConfigurationError, ExportFailure, InvalidTransition, OsError,
    RecurrenceError, RegistrationError, ScheduleError, SignalError,
};
pub use export::{
    ExportConfiguration, ExportDelegate, ExportEvent, ExportOutcome, ExportState, Exporter,
};
pub use schedule::{
    ExportDeferralReason, RecurrenceRule, ScheduleConfiguration, ScheduleDelegate,
    SchedulerRegistrar,
};
pub use sync::Shared;
