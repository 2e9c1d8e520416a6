//! Schedule configuration and recurrence rules

use crate::error::RecurrenceError;
use chrono::{DateTime, Days, Duration, Local, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Longest interval a schedule may use, one leap year
pub const MAX_INTERVAL_HOURS: u32 = 24 * 366;

/// How often a scheduled export fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrenceRule {
    /// Every `hours` hours after the last export
    Interval { hours: u32 },
    /// Once a day at a local time of day
    Daily { hour: u32, minute: u32 },
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        RecurrenceRule::Interval { hours: 24 }
    }
}

impl RecurrenceRule {
    pub fn every_hours(hours: u32) -> Self {
        RecurrenceRule::Interval { hours }
    }

    pub fn daily_at(hour: u32, minute: u32) -> Self {
        RecurrenceRule::Daily { hour, minute }
    }

    pub fn validate(&self) -> Result<(), RecurrenceError> {
        match *self {
            RecurrenceRule::Interval { hours: 0 } => Err(RecurrenceError::ZeroInterval),
            RecurrenceRule::Interval { hours } if hours > MAX_INTERVAL_HOURS => {
                Err(RecurrenceError::IntervalTooLong { hours })
            }
            RecurrenceRule::Interval { .. } => Ok(()),
            RecurrenceRule::Daily { hour, minute } => time_of_day(hour, minute).map(|_| ()),
        }
    }

    /// First fire time strictly after `after`
    pub fn next_after(&self, after: DateTime<Local>) -> Result<DateTime<Local>, RecurrenceError> {
        self.validate()?;

        match *self {
            RecurrenceRule::Interval { hours } => offset(after, Duration::hours(i64::from(hours))),
            RecurrenceRule::Daily { hour, minute } => {
                let time = time_of_day(hour, minute)?;
                let today = after.date_naive();

                // A DST gap can swallow the time of day, so look a couple of
                // days ahead before giving up.
                for days in 0..3 {
                    let Some(day) = today.checked_add_days(Days::new(days)) else {
                        break;
                    };
                    if let Some(local) = resolve_local(day.and_time(time)) {
                        if local > after {
                            return Ok(local);
                        }
                    }
                }
                offset(after, Duration::days(1))
            }
        }
    }

    /// When the next export is due given the last successful one
    ///
    /// Overdue runs are due `now`. Interval schedules that never ran are due
    /// immediately; daily schedules wait for their time of day.
    pub fn next_due(
        &self,
        last_run: Option<DateTime<Local>>,
        now: DateTime<Local>,
    ) -> Result<DateTime<Local>, RecurrenceError> {
        let due = match (self, last_run) {
            (_, Some(last)) => self.next_after(last)?,
            (RecurrenceRule::Interval { .. }, None) => {
                self.validate()?;
                now
            }
            (RecurrenceRule::Daily { .. }, None) => self.next_after(now)?,
        };
        Ok(due.max(now))
    }
}

fn offset(at: DateTime<Local>, by: Duration) -> Result<DateTime<Local>, RecurrenceError> {
    at.checked_add_signed(by).ok_or(RecurrenceError::OutOfRange)
}

fn time_of_day(hour: u32, minute: u32) -> Result<NaiveTime, RecurrenceError> {
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or(RecurrenceError::InvalidTimeOfDay { hour, minute })
}

fn resolve_local(naive: NaiveDateTime) -> Option<DateTime<Local>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            let shifted = naive.checked_add_signed(Duration::hours(1))?;
            Local.from_local_datetime(&shifted).earliest()
        })
}

/// What to do with the fire time after a wake-up was deferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeferredRunPolicy {
    /// Skip this cycle and wait for the next regular occurrence
    #[default]
    AdvanceToNextOccurrence,
    /// Try again after a short delay
    RetryAfter { minutes: u32 },
}

impl DeferredRunPolicy {
    /// Fire time for the wake-up following a deferral at `now`
    pub fn next_attempt(
        &self,
        rule: &RecurrenceRule,
        now: DateTime<Local>,
    ) -> Result<DateTime<Local>, RecurrenceError> {
        match *self {
            DeferredRunPolicy::AdvanceToNextOccurrence => rule.next_after(now),
            DeferredRunPolicy::RetryAfter { minutes } => {
                offset(now, Duration::minutes(i64::from(minutes.max(1))))
            }
        }
    }
}

/// User's automatic export schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfiguration {
    pub enabled: bool,

    pub rule: RecurrenceRule,

    /// Defer scheduled exports while running on battery
    pub skip_on_battery: bool,

    pub deferred_run: DeferredRunPolicy,

    /// Last successful export, written back by the schedule delegate
    pub last_exported_at: Option<DateTime<Local>>,

    /// Next registered wake-up, written back by the schedule delegate
    pub next_export_at: Option<DateTime<Local>>,
}

impl Default for ScheduleConfiguration {
    fn default() -> Self {
        Self {
            enabled: false,
            rule: RecurrenceRule::default(),
            skip_on_battery: true,
            deferred_run: DeferredRunPolicy::default(),
            last_exported_at: None,
            next_export_at: None,
        }
    }
}

impl ScheduleConfiguration {
    /// An enabled schedule firing on `rule`
    pub fn new(rule: RecurrenceRule) -> Self {
        Self {
            enabled: true,
            rule,
            ..Self::default()
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_skip_on_battery(mut self, skip: bool) -> Self {
        self.skip_on_battery = skip;
        self
    }

    pub fn with_deferred_run(mut self, policy: DeferredRunPolicy) -> Self {
        self.deferred_run = policy;
        self
    }

    /// The rule only has to be well formed while the schedule is enabled
    pub fn validate(&self) -> Result<(), RecurrenceError> {
        if self.enabled {
            self.rule.validate()
        } else {
            Ok(())
        }
    }
}
