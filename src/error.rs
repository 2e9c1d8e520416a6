//! Error types for export attempts and scheduling

use crate::export::ExportState;
use std::path::PathBuf;
use thiserror::Error;

/// A state machine transition outside the allowed edges
///
/// Always a defect in the driving logic, never a user-facing condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid export state transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: ExportState,
    pub to: ExportState,
}

/// Why `begin_export` refused to start an attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BeginExportError {
    #[error("an export is already running ({0})")]
    AlreadyRunning(ExportState),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("failed to start export worker: {0}")]
    Spawn(String),
}

/// Export configuration that cannot be used for an attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("output directory is not set")]
    MissingOutputDirectory,

    #[error("output file name is not set")]
    MissingOutputFileName,

    #[error("custom playlist sort needs a sort column or sort order")]
    IncompleteCustomSort,

    #[error("custom sort for playlist {0} needs a sort column or sort order")]
    IncompletePlaylistSort(String),

    #[error("path remapping is enabled but the text to replace is empty")]
    EmptyRemapOriginal,
}

/// Reason an export attempt ended in the `Error` state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportFailure {
    #[error("invalid export configuration: {0}")]
    InvalidConfiguration(#[source] ConfigurationError),

    #[error("exporter failed while {phase}: {cause}")]
    ExporterFailure { phase: ExportState, cause: String },

    #[error("failed to write library to {destination:?}: {cause}")]
    WriteFailure { destination: PathBuf, cause: String },

    #[error(transparent)]
    InvalidTransition(InvalidTransition),
}

/// Recurrence rule that cannot be scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecurrenceError {
    #[error("export interval must be at least one hour")]
    ZeroInterval,

    #[error("export interval of {hours} hours is longer than a year")]
    IntervalTooLong { hours: u32 },

    #[error("next export time is out of range")]
    OutOfRange,

    #[error("{hour:02}:{minute:02} is not a valid time of day")]
    InvalidTimeOfDay { hour: u32, minute: u32 },
}

/// Failure reported by the host's background-task scheduler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OsError {
    pub message: String,
}

impl OsError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Scheduling-side failures, reported synchronously to the caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[source] RecurrenceError),

    #[error("scheduler registration failed: {0}")]
    RegistrationFailed(#[source] OsError),
}

/// Error surfaced to the configuration screen for (de)registration
pub type RegistrationError = ScheduleError;

/// An environment signal that could not be read
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("signal unavailable: {0}")]
    Unavailable(String),
}
