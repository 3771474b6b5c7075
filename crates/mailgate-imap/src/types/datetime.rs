//! IMAP `date-time` and `date` values.

use chrono::{DateTime, FixedOffset, NaiveDate};

const DATE_TIME_FORMAT: &str = "%d-%b-%Y %H:%M:%S %z";
const DATE_FORMAT: &str = "%d-%b-%Y";

/// Formats an INTERNALDATE / APPEND date-time, without quotes.
#[must_use]
pub fn format_date_time(dt: &DateTime<FixedOffset>) -> String {
    dt.format(DATE_TIME_FORMAT).to_string()
}

/// Parses a date-time such as `17-Jul-1996 02:44:25 -0700`.
///
/// A space-padded day (` 7-Jul-1996 ...`) is accepted.
#[must_use]
pub fn parse_date_time(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s.trim_start(), DATE_TIME_FORMAT).ok()
}

/// Formats a SEARCH date such as `1-Feb-1994`.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses a SEARCH date.
#[must_use]
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn date_time_round_trip() {
        let dt = parse_date_time("17-Jul-1996 02:44:25 -0700").unwrap();
        assert_eq!(dt.year(), 1996);
        assert_eq!(dt.hour(), 2);
        assert_eq!(dt.offset().local_minus_utc(), -7 * 3600);
        assert_eq!(format_date_time(&dt), "17-Jul-1996 02:44:25 -0700");
    }

    #[test]
    fn space_padded_day() {
        let dt = parse_date_time(" 7-Jul-1996 02:44:25 +0000").unwrap();
        assert_eq!(dt.day(), 7);
        assert_eq!(format_date_time(&dt), "07-Jul-1996 02:44:25 +0000");
    }

    #[test]
    fn dates() {
        let d = parse_date("1-Feb-1994").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (1994, 2, 1));
        assert_eq!(format_date(d), "01-Feb-1994");
        assert!(parse_date("1994-02-01").is_none());
        assert!(parse_date_time("garbage").is_none());
    }
}
