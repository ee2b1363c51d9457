//! Pure "compute the next fire time" functions.
//!
//! The drivers sleep for exactly what these return, so scheduling policy
//! is testable without timers: never a fixed interval, always the delay
//! to the next local wall-clock boundary in the configured zone.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;

use crate::timefmt::parse_iso_date;

const DAY_SECS: u64 = 86_400;

/// Parse a `HH:MM` wall-clock target.
pub fn parse_hh_mm(raw: &str) -> Option<(u32, u32)> {
    let (h, m) = raw.trim().split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

fn local_seconds_of_day(now_ms: i64, zone: Tz) -> u64 {
    let utc = DateTime::<Utc>::from_timestamp_millis(now_ms).unwrap_or_default();
    u64::from(utc.with_timezone(&zone).num_seconds_from_midnight())
}

/// Delay until the next occurrence of `HH:MM` local time in `zone`.
///
/// A target at or before the current second rolls to tomorrow. Floors at
/// half a second so a fire exactly on the boundary cannot spin.
pub fn next_daily_delay(now_ms: i64, hour: u32, minute: u32, zone: Tz) -> Duration {
    let now_sec = local_seconds_of_day(now_ms, zone);
    let target_sec = u64::from(hour) * 3600 + u64::from(minute) * 60;

    let delta = if target_sec > now_sec {
        target_sec - now_sec
    } else {
        target_sec + DAY_SECS - now_sec
    };
    Duration::from_secs(delta).max(Duration::from_millis(500))
}

/// Delay until the next interval boundary of the local day.
///
/// Boundaries are multiples of `interval_minutes` counted from local
/// midnight, so concurrent processes aim at the same instants and the
/// advisory lock can collapse them to one run.
pub fn next_interval_delay(now_ms: i64, interval_minutes: u32, zone: Tz) -> Duration {
    let interval = u64::from(interval_minutes.max(1)) * 60;
    let now_sec = local_seconds_of_day(now_ms, zone);
    let remainder = now_sec % interval;
    let mut delta = interval - remainder;
    // A boundary past the end of the day snaps to midnight.
    if now_sec + delta > DAY_SECS {
        delta = DAY_SECS - now_sec;
    }
    Duration::from_secs(delta.max(5))
}

/// The catch-up window: the last `days` calendar dates ending at `today`,
/// oldest first. `days` is clamped to `1..=14`.
pub fn catchup_dates(today: &str, days: u32) -> Vec<String> {
    let Some(today) = parse_iso_date(today) else {
        return Vec::new();
    };
    let days = days.clamp(1, 14) as i64;
    (0..days)
        .rev()
        .map(|offset| format_date(today - chrono::Duration::days(offset)))
        .collect()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Whether `local_hour` falls inside the quiet window `[start, end)`,
/// which may wrap midnight. `start == end` means the window is disabled.
pub fn in_quiet_hours(local_hour: u32, start: u32, end: u32) -> bool {
    let hour = local_hour.min(23);
    let start = start.min(23);
    let end = end.min(23);
    if start == end {
        return false;
    }
    if start < end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}
