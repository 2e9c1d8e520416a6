//! Export attempt state machine and phase-change notifications

use super::delegate::ExportOutcome;
use crate::error::InvalidTransition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Phase of an export attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportState {
    Stopped,
    Preparing,
    GeneratingTracks,
    GeneratingPlaylists,
    WritingToDisk,
    Finished,
    Error,
}

impl ExportState {
    /// `Finished` and `Error` end an attempt
    pub fn is_terminal(self) -> bool {
        matches!(self, ExportState::Finished | ExportState::Error)
    }

    /// Whether an attempt is in flight
    pub fn is_running(self) -> bool {
        !self.is_terminal() && self != ExportState::Stopped
    }

    /// Whether `self -> to` is an allowed edge
    pub fn can_transition_to(self, to: ExportState) -> bool {
        use ExportState::*;

        match (self, to) {
            (Stopped, Preparing)
            | (Preparing, GeneratingTracks)
            | (GeneratingTracks, GeneratingPlaylists)
            | (GeneratingPlaylists, WritingToDisk)
            | (WritingToDisk, Finished)
            | (Finished, Stopped)
            | (Error, Stopped) => true,
            (from, Error) => from.is_running(),
            _ => false,
        }
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportState::Stopped => "stopped",
            ExportState::Preparing => "preparing",
            ExportState::GeneratingTracks => "generating tracks",
            ExportState::GeneratingPlaylists => "generating playlists",
            ExportState::WritingToDisk => "writing to disk",
            ExportState::Finished => "finished",
            ExportState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Notification published by an export delegate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEvent {
    PhaseChanged { from: ExportState, to: ExportState },
    Completed(ExportOutcome),
}

/// Fan-out of export events to any number of subscribers
///
/// Sends go to unbounded channels, so a slow or absent reader never stalls
/// the publisher. Subscribers that hung up are pruned on the next publish.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<ExportEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<ExportEvent> {
        let (tx, rx) = mpsc::channel();
        crate::sync::lock(&self.subscribers).push(tx);
        rx
    }

    pub fn publish(&self, event: ExportEvent) {
        let mut subscribers = crate::sync::lock(&self.subscribers);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        crate::sync::lock(&self.subscribers).len()
    }
}

/// Tracks the phase of one export attempt at a time
#[derive(Debug)]
pub struct StateMachine {
    state: ExportState,
    events: EventBus,
}

impl StateMachine {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: ExportState::Stopped,
            events,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    /// Move to `to` along an allowed edge and publish the change
    ///
    /// An out-of-graph request leaves the state untouched.
    pub fn transition(&mut self, to: ExportState) -> Result<(), InvalidTransition> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(InvalidTransition { from, to });
        }

        self.state = to;
        log::debug!("Export state: {} -> {}", from, to);
        self.events.publish(ExportEvent::PhaseChanged { from, to });
        Ok(())
    }
}
