// Calendar dates: parsed once at the boundary, compared in one place
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::engine::{EngineError, EngineResult};

/// Display format used by the mobile clients
const DISPLAY_FORMAT: &str = "%d/%m/%Y";
/// Storage format
const ISO_FORMAT: &str = "%Y-%m-%d";

/// Parse a client-supplied date. Accepts `DD/MM/YYYY` and ISO `YYYY-MM-DD`.
pub fn parse_date(input: &str) -> EngineResult<NaiveDate> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, DISPLAY_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(trimmed, ISO_FORMAT))
        .map_err(|_| EngineError::validation(format!("Invalid date: {:?}", input)))
}

pub fn to_storage(date: NaiveDate) -> String {
    date.format(ISO_FORMAT).to_string()
}

pub fn from_storage(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, ISO_FORMAT).ok()
}

/// The calendar date of `now` in the reference offset
pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Date-only deadline check: open through the whole deadline day, closed after.
pub fn is_open_on(today: NaiveDate, deadline: NaiveDate) -> bool {
    today <= deadline
}
