//! Timezone-aware calendar helpers.
//!
//! Conversation records carry unix-millisecond timestamps plus the IANA
//! zone the user was in; every calendar decision (diary dates, quiet
//! hours, daily counters) is made in that local zone.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use kizuna_types::settings::DEFAULT_TIMEZONE;

/// Parse an IANA zone name, falling back to the system default zone for
/// blank or unknown names.
pub fn parse_zone(name: Option<&str>) -> Tz {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .and_then(|n| n.parse::<Tz>().ok())
        .unwrap_or_else(|| {
            DEFAULT_TIMEZONE
                .parse::<Tz>()
                .unwrap_or(chrono_tz::UTC)
        })
}

fn to_zone(timestamp_ms: i64, zone: Tz) -> DateTime<Tz> {
    let utc = DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).unwrap());
    utc.with_timezone(&zone)
}

/// Local calendar date as `YYYY-MM-DD`.
pub fn local_date(timestamp_ms: i64, zone: Tz) -> String {
    to_zone(timestamp_ms, zone).format("%Y-%m-%d").to_string()
}

/// Local wall-clock time as `HH:MM`.
pub fn local_time_hm(timestamp_ms: i64, zone: Tz) -> String {
    to_zone(timestamp_ms, zone).format("%H:%M").to_string()
}

/// Local wall-clock time as `HH:MM:SS`.
pub fn local_time_hms(timestamp_ms: i64, zone: Tz) -> String {
    to_zone(timestamp_ms, zone).format("%H:%M:%S").to_string()
}

/// Local hour of day, `0..=23`.
pub fn local_hour(timestamp_ms: i64, zone: Tz) -> u32 {
    to_zone(timestamp_ms, zone).hour()
}

/// Parse a strict `YYYY-MM-DD` date string.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// The ISO date one day before the given ISO date.
pub fn previous_iso_date(date: &str) -> Option<String> {
    parse_iso_date(date).map(|d| (d - chrono::Duration::days(1)).format("%Y-%m-%d").to_string())
}

/// Whole days between two ISO dates (absolute).
pub fn days_between(a: &str, b: &str) -> Option<i64> {
    let da = parse_iso_date(a)?;
    let db = parse_iso_date(b)?;
    Some((db - da).num_days().abs())
}

/// Extract the `YYYY-MM-DD` prefix of a client-reported ISO-8601 time.
pub fn date_from_client_iso(client_time_iso: &str) -> Option<String> {
    let trimmed = client_time_iso.trim();
    if trimmed.len() < 10 {
        return None;
    }
    let candidate = &trimmed[..10];
    parse_iso_date(candidate).map(|_| candidate.to_string())
}

/// Human date+weekday used in diary prompts, e.g. `2026-08-07 (Friday)`.
pub fn diary_date_label(date: &str) -> String {
    match parse_iso_date(date) {
        Some(d) => format!("{} ({})", date, weekday_name(d)),
        None => date.to_string(),
    }
}

fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2026-08-07 00:30:00 UTC
    const TS: i64 = 1_786_062_600_000;

    #[test]
    fn test_parse_zone_fallbacks() {
        assert_eq!(parse_zone(Some("America/New_York")), chrono_tz::America::New_York);
        assert_eq!(parse_zone(Some("not/a/zone")), parse_zone(None));
        assert_eq!(parse_zone(Some("  ")), parse_zone(None));
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        // 00:30 UTC is still the previous day in New York (-4 in August).
        let ny = chrono_tz::America::New_York;
        let utc = chrono_tz::UTC;
        let date_ny = local_date(TS, ny);
        let date_utc = local_date(TS, utc);
        assert_ne!(date_ny, date_utc);
    }

    #[test]
    fn test_local_hour() {
        assert_eq!(local_hour(TS, chrono_tz::UTC), 0);
        assert_eq!(local_hour(TS, chrono_tz::Asia::Tokyo), 9);
    }

    #[test]
    fn test_previous_iso_date() {
        assert_eq!(previous_iso_date("2026-08-01").as_deref(), Some("2026-07-31"));
        assert_eq!(previous_iso_date("2026-01-01").as_deref(), Some("2025-12-31"));
        assert!(previous_iso_date("garbage").is_none());
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between("2026-08-01", "2026-08-08"), Some(7));
        assert_eq!(days_between("2026-08-08", "2026-08-01"), Some(7));
        assert!(days_between("x", "2026-08-01").is_none());
    }

    #[test]
    fn test_date_from_client_iso() {
        assert_eq!(
            date_from_client_iso("2026-08-07T21:03:00+09:00").as_deref(),
            Some("2026-08-07")
        );
        assert!(date_from_client_iso("2026-8-7").is_none());
        assert!(date_from_client_iso("").is_none());
    }

    #[test]
    fn test_diary_date_label() {
        assert_eq!(diary_date_label("2026-08-07"), "2026-08-07 (Friday)");
        assert_eq!(diary_date_label("nope"), "nope");
    }
}
