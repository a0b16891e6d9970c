use chrono::{Datelike, NaiveDate};

use crate::limits::MAX_RANGE_DAYS;

use super::Failure;

/// Parse a strict `YYYY-MM-DD` calendar date. `field` names the input in the failure.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, Failure> {
    let invalid = || Failure::InvalidDate {
        field: field.to_string(),
        value: value.to_string(),
    };
    let bytes = value.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shaped {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid())
}

/// Parse both endpoints and check `start <= end` and the span limit.
pub fn parse_range(start: &str, end: &str) -> Result<(NaiveDate, NaiveDate), Failure> {
    let start = parse_date("start_date", start)?;
    let end = parse_date("end_date", end)?;
    check_range(start, end)?;
    Ok((start, end))
}

pub fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), Failure> {
    if start > end {
        return Err(Failure::InvalidRange { start, end });
    }
    let days = (end - start).num_days() + 1;
    if days > MAX_RANGE_DAYS {
        return Err(Failure::RangeTooLong {
            days,
            max: MAX_RANGE_DAYS,
        });
    }
    Ok(())
}

/// Every calendar day from `start` to `end`, both inclusive.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

pub fn format_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `June 1, 2026`
pub fn format_display(date: NaiveDate) -> String {
    format!("{} {}, {}", date.format("%B"), date.day(), date.year())
}
