//! Deferral policy for scheduled exports

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a scheduled export did not start this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportDeferralReason {
    OnBattery,
    MainAppOpen,
    Error,
    Unknown,
    NoDeferral,
}

impl ExportDeferralReason {
    pub fn defers(self) -> bool {
        self != ExportDeferralReason::NoDeferral
    }

    /// Message for the configuration screen
    pub fn description(self) -> &'static str {
        match self {
            ExportDeferralReason::OnBattery => "Scheduled export skipped while on battery power",
            ExportDeferralReason::MainAppOpen => {
                "Scheduled export skipped while Music Library Exporter is open"
            }
            ExportDeferralReason::Error => {
                "Scheduled exports paused after the last export failed"
            }
            ExportDeferralReason::Unknown => {
                "Scheduled export skipped because the system state could not be read"
            }
            ExportDeferralReason::NoDeferral => "Scheduled export allowed",
        }
    }
}

impl fmt::Display for ExportDeferralReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Environment observed at a scheduling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeferralSignals {
    pub schedule_enabled: bool,
    pub on_battery_power: bool,
    pub host_app_is_open: bool,
    pub last_attempt_ended_in_error: bool,
}

/// Decide whether a scheduled export may proceed
///
/// First match wins: battery, then the host app, then a previous failure.
/// Callers short-circuit disabled schedules and never pass them in.
pub fn evaluate(signals: &DeferralSignals) -> ExportDeferralReason {
    debug_assert!(
        signals.schedule_enabled,
        "deferral policy evaluated for a disabled schedule"
    );

    if signals.on_battery_power {
        ExportDeferralReason::OnBattery
    } else if signals.host_app_is_open {
        ExportDeferralReason::MainAppOpen
    } else if signals.last_attempt_ended_in_error {
        ExportDeferralReason::Error
    } else {
        ExportDeferralReason::NoDeferral
    }
}
