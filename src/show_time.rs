//! Show times are stored in UTC and interpreted in Eastern time, where the
//! shows happen. RSVPs close once a show has started.

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::DomainError;

pub const SHOW_TIMEZONE: Tz = chrono_tz::America::New_York;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShowTimeError {
    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid time `{0}`, expected HH:MM")]
    InvalidTime(String),
    #[error("{0} does not exist in Eastern time (daylight saving gap)")]
    NonexistentLocalTime(NaiveDateTime),
}

impl From<ShowTimeError> for DomainError {
    fn from(err: ShowTimeError) -> Self {
        DomainError::Validation(err.to_string())
    }
}

pub fn to_eastern(timestamp: DateTime<Utc>) -> DateTime<Tz> {
    timestamp.with_timezone(&SHOW_TIMEZONE)
}

/// A show is past once its Eastern start time is earlier than the Eastern time of `now`.
pub fn is_show_past_at(starts_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    to_eastern(starts_at) < to_eastern(now)
}

/// Rejects RSVP changes for shows that have already started.
pub fn ensure_rsvp_open(starts_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), DomainError> {
    if is_show_past_at(starts_at, now) {
        return Err(DomainError::conflict(
            "RSVPs are closed because the show has already started",
        ));
    }
    Ok(())
}

/// Turns a date and wall-clock time entered in Eastern time into a UTC instant.
///
/// Ambiguous times (the repeated hour in November) resolve to the earlier instant.
pub fn parse_eastern_local(date: &str, time: &str) -> Result<DateTime<Utc>, ShowTimeError> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| ShowTimeError::InvalidDate(date.to_string()))?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .map_err(|_| ShowTimeError::InvalidTime(time.to_string()))?;
    let local = date.and_time(time);

    match SHOW_TIMEZONE.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(ShowTimeError::NonexistentLocalTime(local)),
    }
}

/// e.g. "Sat, Oct 24, 2026"
pub fn format_show_date(starts_at: DateTime<Utc>) -> String {
    to_eastern(starts_at).format("%a, %b %-d, %Y").to_string()
}

/// e.g. "8:00 PM"
pub fn format_show_time(starts_at: DateTime<Utc>) -> String {
    to_eastern(starts_at).format("%-I:%M %p").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_show_later_today_is_not_past() {
        // 8pm EDT show, checked at noon EDT the same day
        let starts_at = utc("2026-06-12T00:00:00Z");
        let now = utc("2026-06-11T16:00:00Z");
        assert!(!is_show_past_at(starts_at, now));
    }

    #[test]
    fn test_show_is_past_after_start() {
        let starts_at = utc("2026-06-12T00:00:00Z");
        let now = utc("2026-06-12T00:00:01Z");
        assert!(is_show_past_at(starts_at, now));
    }

    #[test]
    fn test_show_at_exact_start_is_not_past() {
        let starts_at = utc("2026-06-12T00:00:00Z");
        assert!(!is_show_past_at(starts_at, starts_at));
    }

    #[test]
    fn test_late_evening_show_crossing_utc_midnight() {
        // 11pm EST on Jan 10 is already Jan 11 in UTC
        let starts_at = utc("2026-01-11T04:00:00Z");
        let now = utc("2026-01-11T01:00:00Z"); // 8pm EST Jan 10
        assert!(!is_show_past_at(starts_at, now));
        assert_eq!(format_show_date(starts_at), "Sat, Jan 10, 2026");
        assert_eq!(format_show_time(starts_at), "11:00 PM");
    }

    #[test]
    fn test_ensure_rsvp_open_rejects_started_show() {
        let starts_at = utc("2026-03-01T01:00:00Z");
        let now = utc("2026-03-01T02:00:00Z");
        let err = ensure_rsvp_open(starts_at, now).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert!(ensure_rsvp_open(now, starts_at).is_ok());
    }

    #[test]
    fn test_parse_eastern_local_standard_and_daylight_time() {
        // EST is UTC-5
        assert_eq!(
            parse_eastern_local("2026-01-15", "20:00").unwrap(),
            utc("2026-01-16T01:00:00Z")
        );
        // EDT is UTC-4
        assert_eq!(
            parse_eastern_local("2026-07-15", "20:00").unwrap(),
            utc("2026-07-16T00:00:00Z")
        );
    }

    #[test]
    fn test_parse_eastern_local_spring_forward_gap() {
        // Clocks jump from 2:00 to 3:00 on 2026-03-08
        let err = parse_eastern_local("2026-03-08", "02:30").unwrap_err();
        assert!(matches!(err, ShowTimeError::NonexistentLocalTime(_)));
    }

    #[test]
    fn test_parse_eastern_local_fall_back_picks_earlier() {
        // 1:30 happens twice on 2026-11-01; the first is still EDT
        assert_eq!(
            parse_eastern_local("2026-11-01", "01:30").unwrap(),
            utc("2026-11-01T05:30:00Z")
        );
    }

    #[test]
    fn test_parse_eastern_local_rejects_garbage() {
        assert!(matches!(
            parse_eastern_local("10/24/2026", "20:00"),
            Err(ShowTimeError::InvalidDate(_))
        ));
        assert!(matches!(
            parse_eastern_local("2026-10-24", "8pm"),
            Err(ShowTimeError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_past_detection_across_fall_back() {
        // Show at 1:10 EST (second 1am), now is 1:50 EDT (first 1am): 20 minutes before the show
        let starts_at = utc("2026-11-01T06:10:00Z");
        let now = utc("2026-11-01T05:50:00Z");
        assert!(!is_show_past_at(starts_at, now));
    }
}
