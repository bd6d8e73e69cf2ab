//! Date and timestamp helpers shared by the index and the classifier.
//!
//! Membership dates are persisted as `YYYY-MM-DD HH:MM:SS` text without an
//! offset. Snapshot timestamps taken from file metadata are interpreted as UTC.

use std::time::SystemTime;

use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

#[must_use]
pub fn format_date_time(value: PrimitiveDateTime) -> String {
    value
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| value.to_string())
}

pub fn parse_date_time(value: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
}

#[must_use]
pub fn format_date(value: Date) -> String {
    value
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| value.to_string())
}

pub fn parse_date(value: &str) -> Result<Date, time::error::Parse> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
}

#[must_use]
pub fn start_of_day(date: Date) -> PrimitiveDateTime {
    PrimitiveDateTime::new(date, Time::MIDNIGHT)
}

/// Converts a filesystem timestamp to whole seconds in UTC.
///
/// Returns `None` for timestamps outside the representable calendar range.
#[must_use]
pub fn from_system_time(value: SystemTime) -> Option<PrimitiveDateTime> {
    let seconds = match value.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_secs()).ok()?,
        Err(err) => {
            // Pre-epoch times round down to the previous whole second.
            let before = err.duration();
            let whole = i64::try_from(before.as_secs()).ok()?;
            -(whole + i64::from(before.subsec_nanos() > 0))
        }
    };
    let utc = OffsetDateTime::from_unix_timestamp(seconds).ok()?;
    Some(PrimitiveDateTime::new(utc.date(), utc.time()))
}

/// Seconds since the Unix epoch for a UTC-interpreted timestamp.
#[must_use]
pub fn unix_seconds(value: PrimitiveDateTime) -> i64 {
    value.assume_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use time::macros::{date, datetime};

    #[test]
    fn round_trips_through_index_format() {
        let value = datetime!(2008-03-15 00:00:00);
        let text = format_date_time(value);
        assert_eq!(text, "2008-03-15 00:00:00");
        assert_eq!(parse_date_time(&text).expect("parse"), value);
    }

    #[test]
    fn system_time_drops_subseconds() {
        let at = SystemTime::UNIX_EPOCH + Duration::from_millis(1_200_000_000_500);
        let value = from_system_time(at).expect("in range");
        assert_eq!(value, datetime!(2008-01-10 21:20:00));
        assert_eq!(unix_seconds(value), 1_200_000_000);
    }

    #[test]
    fn pre_epoch_times_round_down() {
        let at = SystemTime::UNIX_EPOCH - Duration::from_millis(1_500);
        assert_eq!(from_system_time(at), Some(datetime!(1969-12-31 23:59:58)));
    }

    #[test]
    fn out_of_range_times_have_no_date() {
        let at = SystemTime::UNIX_EPOCH
            .checked_add(Duration::from_secs(400_000_000_000))
            .expect("representable system time");
        assert_eq!(from_system_time(at), None);
    }

    #[test]
    fn parses_plain_dates() {
        assert_eq!(parse_date("2007-12-18").expect("date"), date!(2007 - 12 - 18));
        assert!(parse_date("18/12/2007").is_err());
    }
}
