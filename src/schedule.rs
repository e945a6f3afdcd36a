//! Scheduled sweeps of the source folder.
//!
//! In [`ScanMode::Scheduled`] the monitor does not watch for arrivals. It wakes
//! every [`SCHEDULE_CHECK_INTERVAL`] and sorts the whole source folder when one
//! of the configured times of day comes around. Times that passed while the
//! monitor was not running can be caught up with one sweep on start.
//!
//! Everything here takes the current time as an argument so the rules can be
//! checked against fixed clocks.

use crate::error::ConfigError;
use chrono::{DateTime, Days, Local, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often the schedule thread asks whether a sweep is due.
pub const SCHEDULE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Completed runs kept in the configuration file.
pub const COMPLETED_SCHEDULES_LIMIT: usize = 50;

/// How far back missed runs are looked for.
const CATCH_UP_DAYS: u64 = 7;

/// Half-width of the window around a scheduled time, and the minimum gap
/// between two scheduled sweeps.
fn due_window() -> TimeDelta {
    TimeDelta::seconds(60)
}

/// How the source folder is monitored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Watch for arrivals and sort each file once it is stable.
    #[default]
    Regular,
    /// Sweep the whole folder at fixed times of day.
    Scheduled,
}

/// Parses an `HH:MM` time of day.
pub fn parse_scheduled_time(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| ConfigError::Invalid {
        reason: format!("scheduled time '{}' is not HH:MM: {}", value, e),
    })
}

pub fn parse_scheduled_times(values: &[String]) -> Result<Vec<NaiveTime>, ConfigError> {
    values.iter().map(|v| parse_scheduled_time(v)).collect()
}

/// `time` on the local calendar day of `day`. `None` inside a DST gap.
fn on_day(day: &DateTime<Local>, time: NaiveTime) -> Option<DateTime<Local>> {
    day.date_naive()
        .and_time(time)
        .and_local_timezone(Local)
        .earliest()
}

/// Tracks when the last scheduled sweep ran.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    last_scan: Option<DateTime<Local>>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the scheduled slot due at `now`, if any, and records the sweep.
    ///
    /// A slot is due within a minute either side of its time, and only if the
    /// previous sweep is more than a minute old.
    pub fn due(&mut self, times: &[NaiveTime], now: DateTime<Local>) -> Option<DateTime<Local>> {
        if let Some(last) = self.last_scan
            && now - last <= due_window()
        {
            return None;
        }

        let slot = times
            .iter()
            .filter_map(|time| on_day(&now, *time))
            .find(|slot| (now - *slot).abs() < due_window())?;

        self.last_scan = Some(now);
        Some(slot)
    }
}

/// Scheduled slots of the last week that passed without a recorded run.
///
/// Only slots after the most recent entry of `completed` count, so nothing is
/// caught up before the first scheduled sweep has ever completed.
pub fn missed_schedules(
    times: &[NaiveTime],
    completed: &[String],
    now: DateTime<Local>,
) -> Vec<DateTime<Local>> {
    let Some(last_completed) = completed
        .last()
        .and_then(|stamp| DateTime::parse_from_rfc3339(stamp).ok())
        .map(|stamp| stamp.with_timezone(&Local))
    else {
        return Vec::new();
    };

    let mut missed: Vec<DateTime<Local>> = (0..=CATCH_UP_DAYS)
        .filter_map(|days_ago| now.checked_sub_days(Days::new(days_ago)))
        .flat_map(|day| times.iter().filter_map(move |time| on_day(&day, *time)))
        .filter(|slot| last_completed < *slot && *slot < now)
        .filter(|slot| !completed.contains(&slot.to_rfc3339()))
        .collect();

    missed.sort();
    missed.dedup();
    missed
}

/// Appends `slot` to `completed`, keeping the newest [`COMPLETED_SCHEDULES_LIMIT`].
pub fn record_completed(completed: &mut Vec<String>, slot: DateTime<Local>) {
    let stamp = slot.to_rfc3339();
    if !completed.contains(&stamp) {
        completed.push(stamp);
    }
    if completed.len() > COMPLETED_SCHEDULES_LIMIT {
        let excess = completed.len() - COMPLETED_SCHEDULES_LIMIT;
        completed.drain(..excess);
    }
}
