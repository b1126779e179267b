// Column helpers shared by the SQLite repositories
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::dates;
use crate::db::StoreError;

/// Fixed-width RFC 3339 in UTC, so stored timestamps sort as text
pub fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// RFC 3339, or SQLite's `datetime('now')` format used by column defaults
pub fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .map_err(|_| StoreError::Corrupt(format!("{}: bad timestamp {:?}", column, value)))
}

pub fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.map(|v| parse_timestamp(column, &v)).transpose()
}

pub fn parse_optional_date(column: &str, value: Option<String>) -> Result<Option<NaiveDate>, StoreError> {
    value
        .map(|v| {
            dates::from_storage(&v)
                .ok_or_else(|| StoreError::Corrupt(format!("{}: bad date {:?}", column, v)))
        })
        .transpose()
}

/// Parse an enum column through its `FromStr`-style parser
pub fn parse_enum<T>(column: &str, value: &str, parse: fn(&str) -> Option<T>) -> Result<T, StoreError> {
    parse(value).ok_or_else(|| StoreError::Corrupt(format!("{}: unknown value {:?}", column, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_round_trip() {
        let t = Utc.with_ymd_and_hms(2026, 4, 1, 8, 30, 0).unwrap();
        assert_eq!(parse_timestamp("created_at", &timestamp(t)).unwrap(), t);
        assert_eq!(parse_timestamp("created_at", "2026-04-01 08:30:00").unwrap(), t);
    }

    #[test]
    fn bad_values_are_corrupt_rows() {
        assert!(matches!(
            parse_timestamp("created_at", "yesterday"),
            Err(StoreError::Corrupt(_))
        ));
        assert!(matches!(
            parse_optional_date("event_date", Some("12/31/2026".into())),
            Err(StoreError::Corrupt(_))
        ));
        assert_eq!(parse_optional_date("event_date", None).unwrap(), None);
    }
}
