//! Fake capabilities shared by the integration tests

#![allow(dead_code)]

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use music_library_exporter::error::{OsError, SignalError};
use music_library_exporter::export::{ExportConfiguration, ExportState, Exporter};
use music_library_exporter::schedule::{
    EnvironmentSignals, RecurrenceRule, SchedulerRegistrar, WakeupHandler,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Exporter that writes a small text library
#[derive(Default)]
pub struct FakeExporter {
    fail_at: Option<ExportState>,
    gate: Option<Mutex<Receiver<()>>>,
    pub writes: Mutex<Vec<PathBuf>>,
}

impl FakeExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the given phase
    pub fn failing_at(phase: ExportState) -> Self {
        Self {
            fail_at: Some(phase),
            ..Self::default()
        }
    }

    /// Blocks in `generate_tracks` until the returned sender fires
    pub fn gated() -> (Self, Sender<()>) {
        let (release, gate) = mpsc::channel();
        let exporter = Self {
            gate: Some(Mutex::new(gate)),
            ..Self::default()
        };
        (exporter, release)
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

impl Exporter for FakeExporter {
    type Tracks = Vec<String>;
    type Playlists = String;

    fn generate_tracks(&self, _config: &ExportConfiguration) -> Result<Vec<String>> {
        if let Some(gate) = &self.gate {
            gate.lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(10))
                .context("test never released the exporter")?;
        }
        if self.fail_at == Some(ExportState::GeneratingTracks) {
            bail!("music library is unavailable");
        }
        Ok(vec!["Blue Monday".to_string(), "Atmosphere".to_string()])
    }

    fn generate_playlists(
        &self,
        config: &ExportConfiguration,
        tracks: Vec<String>,
    ) -> Result<String> {
        if self.fail_at == Some(ExportState::GeneratingPlaylists) {
            bail!("playlist folder loop detected");
        }
        let flatten = if config.flatten_playlist_hierarchy {
            "flat"
        } else {
            "nested"
        };
        Ok(format!("{}\n{}\n", flatten, tracks.join("\n")))
    }

    fn write(&self, playlists: String, destination: &Path) -> Result<()> {
        fs::write(destination, playlists)
            .with_context(|| format!("Failed to write {:?}", destination))?;
        self.writes.lock().unwrap().push(destination.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]
struct RegistrarState {
    registered: bool,
    registrations: Vec<(RecurrenceRule, DateTime<Local>)>,
    handler: Option<WakeupHandler>,
    fail_with: Option<String>,
    unregister_calls: usize,
}

/// Records registrations instead of talking to a host scheduler
#[derive(Default)]
pub struct FakeRegistrar {
    state: Mutex<RegistrarState>,
    unregister_gate: Mutex<Option<Receiver<()>>>,
}

impl FakeRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every registration attempt fails with `message`
    pub fn failing(message: &str) -> Self {
        let registrar = Self::default();
        registrar.state.lock().unwrap().fail_with = Some(message.to_string());
        registrar
    }

    /// Unregistration blocks until the returned sender fires
    pub fn slow_unregister() -> (Self, Sender<()>) {
        let (release, gate) = mpsc::channel();
        let registrar = Self {
            unregister_gate: Mutex::new(Some(gate)),
            ..Self::default()
        };
        (registrar, release)
    }

    pub fn registrations(&self) -> Vec<(RecurrenceRule, DateTime<Local>)> {
        self.state.lock().unwrap().registrations.clone()
    }

    pub fn last_registration(&self) -> Option<(RecurrenceRule, DateTime<Local>)> {
        self.registrations().last().copied()
    }

    pub fn unregister_calls(&self) -> usize {
        self.state.lock().unwrap().unregister_calls
    }

    /// The host drops the registration behind the delegate's back
    pub fn revoke(&self) {
        let mut state = self.state.lock().unwrap();
        state.registered = false;
        state.handler = None;
    }

    /// Deliver a wake-up the way the host would
    pub fn fire(&self) -> bool {
        let handler = self.state.lock().unwrap().handler.clone();
        match handler {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }
}

impl SchedulerRegistrar for FakeRegistrar {
    fn is_registered(&self) -> bool {
        self.state.lock().unwrap().registered
    }

    fn register(
        &self,
        rule: &RecurrenceRule,
        fire_at: DateTime<Local>,
        handler: WakeupHandler,
    ) -> Result<(), OsError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = &state.fail_with {
            return Err(OsError::new(message.clone()));
        }
        state.registered = true;
        state.registrations.push((*rule, fire_at));
        state.handler = Some(handler);
        Ok(())
    }

    fn unregister(&self) -> Result<(), OsError> {
        if let Some(gate) = self.unregister_gate.lock().unwrap().as_ref() {
            let _ = gate.recv_timeout(Duration::from_secs(5));
        }
        let mut state = self.state.lock().unwrap();
        state.registered = false;
        state.handler = None;
        state.unregister_calls += 1;
        Ok(())
    }
}

/// Environment readings controlled by the test
#[derive(Default)]
pub struct FakeSignals {
    on_battery: AtomicBool,
    app_open: AtomicBool,
    unavailable: AtomicBool,
    reads: AtomicUsize,
}

impl FakeSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_battery(&self, value: bool) {
        self.on_battery.store(value, Ordering::SeqCst);
    }

    pub fn set_app_open(&self, value: bool) {
        self.app_open.store(value, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn read(&self, flag: &AtomicBool) -> Result<bool, SignalError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SignalError::Unavailable("power state unknown".to_string()));
        }
        Ok(flag.load(Ordering::SeqCst))
    }
}

impl EnvironmentSignals for FakeSignals {
    fn on_battery_power(&self) -> Result<bool, SignalError> {
        self.read(&self.on_battery)
    }

    fn host_app_is_open(&self) -> Result<bool, SignalError> {
        self.read(&self.app_open)
    }
}

/// Poll `condition` until it holds or five seconds pass
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
