//! Export attempt orchestration

use super::config::ExportConfiguration;
use super::state::{EventBus, ExportEvent, ExportState, StateMachine};
use super::traits::Exporter;
use crate::error::{BeginExportError, ExportFailure};
use crate::sync::lock;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Terminal result of an export attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Finished { destination: PathBuf },
    Failed(ExportFailure),
}

impl ExportOutcome {
    /// Terminal state this outcome leaves the machine in
    pub fn state(&self) -> ExportState {
        match self {
            ExportOutcome::Finished { .. } => ExportState::Finished,
            ExportOutcome::Failed(_) => ExportState::Error,
        }
    }

    pub fn failure(&self) -> Option<&ExportFailure> {
        match self {
            ExportOutcome::Finished { .. } => None,
            ExportOutcome::Failed(failure) => Some(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExportOutcome::Finished { .. })
    }
}

type CompletionHandler = Arc<dyn Fn(&ExportOutcome) + Send + Sync>;

struct Inner<E> {
    exporter: E,
    machine: Mutex<StateMachine>,
    events: EventBus,
    handlers: Mutex<Vec<CompletionHandler>>,
    snapshot: Mutex<Option<Arc<ExportConfiguration>>>,
    last_outcome: Mutex<Option<ExportOutcome>>,
}

/// Owns export attempts for one destination
///
/// At most one attempt runs at a time; a second `begin_export` while one is
/// in flight is rejected rather than queued. Clones share the same attempt.
pub struct ExportDelegate<E: Exporter> {
    inner: Arc<Inner<E>>,
}

impl<E: Exporter> Clone for ExportDelegate<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Exporter + 'static> ExportDelegate<E> {
    pub fn new(exporter: E) -> Self {
        let events = EventBus::new();
        Self {
            inner: Arc::new(Inner {
                exporter,
                machine: Mutex::new(StateMachine::new(events.clone())),
                events,
                handlers: Mutex::new(Vec::new()),
                snapshot: Mutex::new(None),
                last_outcome: Mutex::new(None),
            }),
        }
    }

    /// Live state of the current attempt
    pub fn current_state(&self) -> ExportState {
        lock(&self.inner.machine).state()
    }

    /// Receive phase changes and completions for every future attempt
    pub fn subscribe(&self) -> Receiver<ExportEvent> {
        self.inner.events.subscribe()
    }

    /// Register a callback run with each terminal outcome, before the
    /// delegate resets to `Stopped`
    pub fn on_completion<F>(&self, handler: F)
    where
        F: Fn(&ExportOutcome) + Send + Sync + 'static,
    {
        lock(&self.inner.handlers).push(Arc::new(handler));
    }

    pub fn last_outcome(&self) -> Option<ExportOutcome> {
        lock(&self.inner.last_outcome).clone()
    }

    /// Configuration snapshot of the current or most recent attempt
    pub fn configuration(&self) -> Option<Arc<ExportConfiguration>> {
        lock(&self.inner.snapshot).clone()
    }

    pub fn exporter(&self) -> &E {
        &self.inner.exporter
    }

    /// Start an attempt on a frozen copy of `config`
    ///
    /// Returns once the attempt is in `Preparing`; the phases run on a
    /// worker thread.
    pub fn begin_export(
        &self,
        config: &ExportConfiguration,
    ) -> Result<ExportHandle, BeginExportError> {
        let snapshot = Arc::new(config.clone());

        {
            let mut machine = lock(&self.inner.machine);
            let state = machine.state();
            if state != ExportState::Stopped {
                log::warn!("Export requested while {}, rejecting", state);
                return Err(BeginExportError::AlreadyRunning(state));
            }
            machine.transition(ExportState::Preparing)?;
            *lock(&self.inner.snapshot) = Some(Arc::clone(&snapshot));
        }

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("library-export".to_string())
            .spawn(move || inner.run_attempt(snapshot));

        match spawned {
            Ok(worker) => Ok(ExportHandle { worker }),
            Err(e) => {
                log::error!("Failed to start export worker: {}", e);
                let mut machine = lock(&self.inner.machine);
                for to in [ExportState::Error, ExportState::Stopped] {
                    if let Err(e) = machine.transition(to) {
                        log::error!("{}", e);
                    }
                }
                Err(BeginExportError::Spawn(e.to_string()))
            }
        }
    }

    /// Run an attempt to completion on the worker and wait for it
    pub fn export_blocking(
        &self,
        config: &ExportConfiguration,
    ) -> Result<ExportOutcome, BeginExportError> {
        Ok(self.begin_export(config)?.wait())
    }
}

/// Handle to a running attempt
#[derive(Debug)]
pub struct ExportHandle {
    worker: JoinHandle<ExportOutcome>,
}

impl ExportHandle {
    /// Block until the attempt has finished and the delegate is `Stopped`
    pub fn wait(self) -> ExportOutcome {
        self.worker.join().unwrap_or_else(|payload| {
            ExportOutcome::Failed(ExportFailure::ExporterFailure {
                phase: ExportState::Error,
                cause: panic_message(payload.as_ref()),
            })
        })
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }
}

impl<E: Exporter> Inner<E> {
    fn run_attempt(&self, config: Arc<ExportConfiguration>) -> ExportOutcome {
        log::info!("Starting library export to {:?}", config.destination());

        let result = self.run_phases(&config);
        let outcome = self.settle(result);

        match &outcome {
            ExportOutcome::Finished { destination } => {
                log::info!("Export complete: {:?}", destination)
            }
            ExportOutcome::Failed(failure) => log::warn!("Export failed: {}", failure),
        }

        *lock(&self.last_outcome) = Some(outcome.clone());
        self.events.publish(ExportEvent::Completed(outcome.clone()));
        self.notify(&outcome);
        self.reset();

        outcome
    }

    /// Drive the phase sequence; every failure stops at the phase boundary
    fn run_phases(&self, config: &ExportConfiguration) -> Result<PathBuf, ExportFailure> {
        // Preparing
        config
            .validate()
            .map_err(ExportFailure::InvalidConfiguration)?;
        let destination = config.destination();

        self.advance(ExportState::GeneratingTracks)?;
        let tracks = guarded(|| self.exporter.generate_tracks(config)).map_err(|cause| {
            ExportFailure::ExporterFailure {
                phase: ExportState::GeneratingTracks,
                cause,
            }
        })?;

        self.advance(ExportState::GeneratingPlaylists)?;
        let playlists = guarded(|| self.exporter.generate_playlists(config, tracks)).map_err(
            |cause| ExportFailure::ExporterFailure {
                phase: ExportState::GeneratingPlaylists,
                cause,
            },
        )?;

        self.advance(ExportState::WritingToDisk)?;
        guarded(|| self.exporter.write(playlists, &destination)).map_err(|cause| {
            ExportFailure::WriteFailure {
                destination: destination.clone(),
                cause,
            }
        })?;

        Ok(destination)
    }

    fn advance(&self, to: ExportState) -> Result<(), ExportFailure> {
        lock(&self.machine).transition(to).map_err(|e| {
            log::error!("Aborting export: {}", e);
            ExportFailure::InvalidTransition(e)
        })
    }

    /// Move to the terminal state matching `result`
    fn settle(&self, result: Result<PathBuf, ExportFailure>) -> ExportOutcome {
        let outcome = match result {
            Ok(destination) => ExportOutcome::Finished { destination },
            Err(failure) => ExportOutcome::Failed(failure),
        };

        let mut machine = lock(&self.machine);
        match machine.transition(outcome.state()) {
            Ok(()) => outcome,
            Err(e) => {
                log::error!("Aborting export: {}", e);
                if machine.state().is_running() {
                    if let Err(e) = machine.transition(ExportState::Error) {
                        log::error!("{}", e);
                    }
                }
                ExportOutcome::Failed(ExportFailure::InvalidTransition(e))
            }
        }
    }

    fn notify(&self, outcome: &ExportOutcome) {
        let handlers = lock(&self.handlers).clone();
        for handler in handlers {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(outcome))) {
                log::error!(
                    "Export completion handler panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    fn reset(&self) {
        if let Err(e) = lock(&self.machine).transition(ExportState::Stopped) {
            log::error!("Failed to reset export state: {}", e);
        }
    }
}

/// Run an exporter call, turning errors and panics into a printable cause
fn guarded<T>(call: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}
