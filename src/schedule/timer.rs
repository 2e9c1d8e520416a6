//! In-process scheduler registrar backed by a timer thread

use super::config::RecurrenceRule;
use super::traits::{SchedulerRegistrar, WakeupHandler};
use crate::error::OsError;
use crate::sync::lock;
use chrono::{DateTime, Local};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread;

/// Registrar for hosts without a background-task service
///
/// Each registration owns one timer thread. Replacing or removing the
/// registration drops its cancel sender, which ends the thread at its next
/// wait.
#[derive(Debug, Default)]
pub struct ThreadRegistrar {
    active: Mutex<Option<Sender<()>>>,
}

impl ThreadRegistrar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulerRegistrar for ThreadRegistrar {
    fn is_registered(&self) -> bool {
        lock(&self.active).is_some()
    }

    fn register(
        &self,
        rule: &RecurrenceRule,
        fire_at: DateTime<Local>,
        handler: WakeupHandler,
    ) -> Result<(), OsError> {
        rule.validate().map_err(|e| OsError::new(e.to_string()))?;

        let (cancel, cancelled) = mpsc::channel();
        let rule = *rule;
        thread::Builder::new()
            .name("export-scheduler".to_string())
            .spawn(move || run_timer(rule, fire_at, handler, cancelled))
            .map_err(|e| OsError::new(format!("failed to start scheduler thread: {}", e)))?;

        // Dropping the previous sender stops the old timer
        let previous = lock(&self.active).replace(cancel);
        if previous.is_some() {
            log::debug!("Replaced existing export wake-up");
        }
        Ok(())
    }

    fn unregister(&self) -> Result<(), OsError> {
        lock(&self.active).take();
        Ok(())
    }
}

fn run_timer(
    rule: RecurrenceRule,
    mut fire_at: DateTime<Local>,
    handler: WakeupHandler,
    cancelled: Receiver<()>,
) {
    loop {
        let wait = (fire_at - Local::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        match cancelled.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {
                handler();
                fire_at = match rule.next_after(fire_at.max(Local::now())) {
                    Ok(next) => next,
                    Err(e) => {
                        log::error!("Stopping export timer: {}", e);
                        return;
                    }
                };
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
