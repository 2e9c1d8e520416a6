//! Schedule delegate: registration with the host scheduler and wake-up handling

use super::config::{RecurrenceRule, ScheduleConfiguration};
use super::deferral::{self, DeferralSignals, ExportDeferralReason};
use super::traits::{EnvironmentSignals, SchedulerRegistrar, WakeupHandler};
use crate::clock::{Clock, SystemClock};
use crate::error::{
    BeginExportError, ExportFailure, RegistrationError, ScheduleError, SignalError,
};
use crate::export::{
    ExportConfiguration, ExportDelegate, ExportEvent, ExportOutcome, ExportState, Exporter,
};
use crate::sync::{lock, read, write, Shared};
use chrono::{DateTime, Local};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, Weak};
use std::thread;

/// What a wake-up did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeupOutcome {
    /// The schedule is switched off
    Disabled,
    /// The wake-up arrived after the schedule was deactivated
    Inactive,
    /// An export attempt was started
    Started,
    /// The deferral policy skipped this cycle
    Deferred(ExportDeferralReason),
    /// Another attempt was still running
    Busy,
    /// The attempt could not be started
    NotStarted(BeginExportError),
}

/// Snapshot for the configuration screen
///
/// A deferral and an export failure are reported separately: a deferral is
/// not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleStatus {
    pub registered: bool,
    pub last_deferral: Option<ExportDeferralReason>,
    pub last_failure: Option<ExportFailure>,
    pub export_state: ExportState,
    pub last_exported_at: Option<DateTime<Local>>,
    pub next_export_at: Option<DateTime<Local>>,
}

#[derive(Debug, Default)]
struct ScheduleState {
    last_decision: Option<ExportDeferralReason>,
    last_attempt_failed: bool,
    registered_rule: Option<RecurrenceRule>,
    register_error: Option<String>,
    unregister_error: Option<String>,
    /// Unregistration owed after a fatal export failure
    deactivate_pending: bool,
}

/// Ties a schedule configuration to an export delegate
///
/// Wake-ups, activation and deactivation all run inside one critical
/// section. Host registration calls happen inside it but never while the
/// export state machine is locked.
pub struct ScheduleDelegate<E, R, S>
where
    E: Exporter,
    R: SchedulerRegistrar,
    S: EnvironmentSignals,
{
    schedule: Shared<ScheduleConfiguration>,
    export_config: Shared<ExportConfiguration>,
    export: ExportDelegate<E>,
    registrar: R,
    signals: S,
    clock: Arc<dyn Clock>,
    gate: Mutex<ScheduleState>,
    this: Weak<Self>,
}

impl<E, R, S> ScheduleDelegate<E, R, S>
where
    E: Exporter + 'static,
    R: SchedulerRegistrar + 'static,
    S: EnvironmentSignals + 'static,
{
    pub fn new(
        schedule: Shared<ScheduleConfiguration>,
        export_config: Shared<ExportConfiguration>,
        export: ExportDelegate<E>,
        registrar: R,
        signals: S,
    ) -> Arc<Self> {
        Self::with_clock(
            schedule,
            export_config,
            export,
            registrar,
            signals,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        schedule: Shared<ScheduleConfiguration>,
        export_config: Shared<ExportConfiguration>,
        export: ExportDelegate<E>,
        registrar: R,
        signals: S,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let delegate = Arc::new_cyclic(|this| Self {
            schedule,
            export_config,
            export,
            registrar,
            signals,
            clock,
            gate: Mutex::new(ScheduleState::default()),
            this: this.clone(),
        });

        let this = Arc::downgrade(&delegate);
        delegate.export.on_completion(move |outcome| {
            if let Some(delegate) = this.upgrade() {
                delegate.on_export_complete(outcome);
            }
        });

        delegate
    }

    pub fn export_delegate(&self) -> &ExportDelegate<E> {
        &self.export
    }

    pub fn registrar(&self) -> &R {
        &self.registrar
    }

    pub fn signals(&self) -> &S {
        &self.signals
    }

    pub fn configuration(&self) -> Shared<ScheduleConfiguration> {
        Arc::clone(&self.schedule)
    }

    pub fn export_configuration(&self) -> Shared<ExportConfiguration> {
        Arc::clone(&self.export_config)
    }

    /// Phase changes and completions for progress display
    pub fn subscribe(&self) -> Receiver<ExportEvent> {
        self.export.subscribe()
    }

    /// Register the next wake-up with the host scheduler
    ///
    /// Also clears a previous export failure, so re-enabling resumes
    /// scheduled exports.
    pub fn activate_scheduler(&self) -> Result<(), ScheduleError> {
        let mut state = lock(&self.gate);
        self.activate_locked(&mut state)
    }

    /// Remove the wake-up; a no-op when nothing is registered
    pub fn deactivate_scheduler(&self) -> Result<(), ScheduleError> {
        let mut state = lock(&self.gate);
        self.deactivate_locked(&mut state)
    }

    /// Entry point for the host scheduler
    pub fn handle_wakeup(&self) -> WakeupOutcome {
        let mut state = lock(&self.gate);
        let config = read(&self.schedule).clone();

        if !config.enabled {
            log::info!("Wake-up ignored, scheduled exports are disabled");
            return WakeupOutcome::Disabled;
        }
        if state.registered_rule.is_none() {
            log::debug!("Wake-up ignored, scheduler is not active");
            if state.deactivate_pending {
                if let Err(e) = self.deactivate_locked(&mut state) {
                    log::error!("{}", e);
                }
            }
            return WakeupOutcome::Inactive;
        }

        let now = self.clock.now();
        let reason = match self.gather_signals(&config, state.last_attempt_failed) {
            Ok(signals) => deferral::evaluate(&signals),
            Err(e) => {
                log::warn!("Could not read environment: {}", e);
                ExportDeferralReason::Unknown
            }
        };
        state.last_decision = Some(reason);

        let outcome = if reason.defers() {
            log::info!("{}", reason);
            WakeupOutcome::Deferred(reason)
        } else {
            let export_config = read(&self.export_config).clone();
            match self.export.begin_export(&export_config) {
                Ok(_) => {
                    log::info!("Scheduled export started");
                    WakeupOutcome::Started
                }
                Err(BeginExportError::AlreadyRunning(phase)) => {
                    log::info!("Scheduled export skipped, an export is {}", phase);
                    WakeupOutcome::Busy
                }
                Err(e) => {
                    log::error!("Failed to start scheduled export: {}", e);
                    WakeupOutcome::NotStarted(e)
                }
            }
        };

        let next = match outcome {
            WakeupOutcome::Started => config.rule.next_after(now),
            _ => config.deferred_run.next_attempt(&config.rule, now),
        };
        match next {
            Ok(fire_at) => {
                if let Err(e) = self.register_locked(&mut state, &config.rule, fire_at) {
                    log::error!("Failed to reschedule export: {}", e);
                }
            }
            Err(e) => log::error!("Failed to reschedule export: {}", e),
        }

        outcome
    }

    /// Whether the host actually has a wake-up registered
    pub fn is_schedule_registered_with_system(&self) -> bool {
        self.registrar.is_registered()
    }

    pub fn register_scheduler_with_system(&self, register: bool) -> Result<(), RegistrationError> {
        if register {
            self.activate_scheduler()
        } else {
            self.deactivate_scheduler()
        }
    }

    /// Message for the last failed (un)registration, if any
    pub fn error_for_scheduler_registration(&self, register: bool) -> Option<String> {
        let state = lock(&self.gate);
        if register {
            state.register_error.clone()
        } else {
            state.unregister_error.clone()
        }
    }

    /// Flip the shared enabled flag and (un)register to match
    ///
    /// When enabling fails the scheduler stays deactivated, and so does the
    /// flag.
    pub fn set_schedule_enabled(&self, enabled: bool) -> Result<(), RegistrationError> {
        write(&self.schedule).enabled = enabled;
        let result = self.register_scheduler_with_system(enabled);
        if enabled && result.is_err() {
            write(&self.schedule).enabled = false;
        }
        result
    }

    /// Re-read the configuration after an external edit
    pub fn update_from_configuration(&self) -> Result<(), ScheduleError> {
        let mut state = lock(&self.gate);
        let config = read(&self.schedule).clone();
        let registered = self.registrar.is_registered();

        match (config.enabled, registered) {
            (true, false) => self.activate_locked(&mut state),
            (true, true) if state.registered_rule != Some(config.rule) => {
                self.activate_locked(&mut state)
            }
            (false, true) => self.deactivate_locked(&mut state),
            _ => Ok(()),
        }
    }

    pub fn status(&self) -> ScheduleStatus {
        let last_decision = lock(&self.gate).last_decision;
        let config = read(&self.schedule);

        ScheduleStatus {
            registered: self.registrar.is_registered(),
            last_deferral: last_decision.filter(|reason| reason.defers()),
            last_failure: self
                .export
                .last_outcome()
                .and_then(|outcome| outcome.failure().cloned()),
            export_state: self.export.current_state(),
            last_exported_at: config.last_exported_at,
            next_export_at: config.next_export_at,
        }
    }

    fn activate_locked(&self, state: &mut ScheduleState) -> Result<(), ScheduleError> {
        let config = read(&self.schedule).clone();
        let now = self.clock.now();

        let fire_at = match config.rule.next_due(config.last_exported_at, now) {
            Ok(fire_at) => fire_at,
            Err(e) => {
                log::warn!("Not scheduling exports: {}", e);
                state.register_error = Some(format!("Unable to schedule automatic exports: {}", e));
                if self.registrar.is_registered() {
                    if let Err(e) = self.deactivate_locked(state) {
                        log::error!("{}", e);
                    }
                }
                return Err(ScheduleError::InvalidSchedule(e));
            }
        };

        self.register_locked(state, &config.rule, fire_at)?;
        state.last_attempt_failed = false;
        log::info!("Scheduled exports activated, next export at {}", fire_at);
        Ok(())
    }

    fn register_locked(
        &self,
        state: &mut ScheduleState,
        rule: &RecurrenceRule,
        fire_at: DateTime<Local>,
    ) -> Result<(), ScheduleError> {
        match self.registrar.register(rule, fire_at, self.wakeup_handler()) {
            Ok(()) => {
                state.registered_rule = Some(*rule);
                state.register_error = None;
                state.deactivate_pending = false;
                write(&self.schedule).next_export_at = Some(fire_at);
                log::debug!("Next export wake-up at {}", fire_at);
                Ok(())
            }
            Err(e) => {
                log::error!("Scheduler registration failed: {}", e);
                state.registered_rule = None;
                state.register_error = Some(format!("Unable to schedule automatic exports: {}", e));
                write(&self.schedule).next_export_at = None;
                Err(ScheduleError::RegistrationFailed(e))
            }
        }
    }

    fn deactivate_locked(&self, state: &mut ScheduleState) -> Result<(), ScheduleError> {
        if self.registrar.is_registered() {
            if let Err(e) = self.registrar.unregister() {
                log::error!("Scheduler unregistration failed: {}", e);
                state.unregister_error = Some(format!("Unable to stop automatic exports: {}", e));
                return Err(ScheduleError::RegistrationFailed(e));
            }
            log::info!("Scheduled exports deactivated");
        }

        state.registered_rule = None;
        state.unregister_error = None;
        state.deactivate_pending = false;
        write(&self.schedule).next_export_at = None;
        Ok(())
    }

    /// Finish a deactivation requested from the export worker
    fn settle_pending_deactivation(&self) {
        let mut state = lock(&self.gate);
        if state.deactivate_pending {
            if let Err(e) = self.deactivate_locked(&mut state) {
                log::error!("{}", e);
            }
        }
    }

    fn gather_signals(
        &self,
        config: &ScheduleConfiguration,
        last_attempt_failed: bool,
    ) -> Result<DeferralSignals, SignalError> {
        let on_battery_power = if config.skip_on_battery {
            self.signals.on_battery_power()?
        } else {
            false
        };

        Ok(DeferralSignals {
            schedule_enabled: config.enabled,
            on_battery_power,
            host_app_is_open: self.signals.host_app_is_open()?,
            last_attempt_ended_in_error: last_attempt_failed,
        })
    }

    /// Runs on the export worker before it resets, so it never calls the
    /// host scheduler itself.
    fn on_export_complete(&self, outcome: &ExportOutcome) {
        let mut state = lock(&self.gate);

        match outcome {
            ExportOutcome::Finished { .. } => {
                state.last_attempt_failed = false;
                write(&self.schedule).last_exported_at = Some(self.clock.now());
            }
            ExportOutcome::Failed(failure) => {
                state.last_attempt_failed = true;
                if let ExportFailure::InvalidConfiguration(e) = failure {
                    log::warn!("Deactivating scheduled exports: {}", e);
                    state.registered_rule = None;
                    state.deactivate_pending = true;
                    write(&self.schedule).next_export_at = None;
                    drop(state);
                    self.spawn_pending_deactivation();
                }
            }
        }
    }

    fn spawn_pending_deactivation(&self) {
        let Some(delegate) = self.this.upgrade() else {
            return;
        };
        let spawned = thread::Builder::new()
            .name("export-scheduler-stop".to_string())
            .spawn(move || delegate.settle_pending_deactivation());
        if let Err(e) = spawned {
            // Left pending; the next wake-up or (de)activation settles it
            log::warn!("Failed to start scheduler shutdown thread: {}", e);
        }
    }

    fn wakeup_handler(&self) -> WakeupHandler {
        let this = self.this.clone();
        Arc::new(move || {
            if let Some(delegate) = this.upgrade() {
                delegate.handle_wakeup();
            }
        })
    }
}
