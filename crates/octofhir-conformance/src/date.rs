//! FHIR date values as half-open instant ranges.
//!
//! A value covers everything its precision allows:
//! - `2024` -> [2024-01-01, 2025-01-01)
//! - `2024-03` -> [2024-03-01, 2024-04-01)
//! - `2024-03-01` -> [2024-03-01, 2024-03-02)
//! - `2024-03-01T10:00:00Z` -> one second starting at that instant
//!
//! Values without an offset are taken as UTC. Two values match when their
//! ranges overlap, so `2024-03-01T10:00:00Z` and `2024-03-01T05:00:00-05:00`
//! are the same instant.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DateRange {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl DateRange {
    /// `None` when `value` is not a FHIR date, dateTime or instant.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        match value.len() {
            4 => {
                let year: i32 = value.parse().ok()?;
                let start = midnight(Date::from_calendar_date(year, Month::January, 1).ok()?);
                let end = midnight(Date::from_calendar_date(year + 1, Month::January, 1).ok()?);
                Some(Self { start, end })
            }
            7 => {
                let (year, month) = value.split_once('-')?;
                let year: i32 = year.parse().ok()?;
                let month = Month::try_from(month.parse::<u8>().ok()?).ok()?;
                let first = Date::from_calendar_date(year, month, 1).ok()?;
                let next = match month {
                    Month::December => Date::from_calendar_date(year + 1, Month::January, 1),
                    _ => Date::from_calendar_date(year, month.next(), 1),
                }
                .ok()?;
                Some(Self {
                    start: midnight(first),
                    end: midnight(next),
                })
            }
            10 => {
                let date = Date::parse(value, format_description!("[year]-[month]-[day]")).ok()?;
                let start = midnight(date);
                Some(Self {
                    start,
                    end: start + Duration::days(1),
                })
            }
            _ => {
                let start = parse_instant(value)?;
                Some(Self {
                    start,
                    end: start + Duration::seconds(1),
                })
            }
        }
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

fn midnight(date: Date) -> OffsetDateTime {
    date.with_time(Time::MIDNIGHT).assume_utc()
}

fn parse_instant(value: &str) -> Option<OffsetDateTime> {
    if let Ok(instant) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(instant);
    }
    PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(value, format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    })
    .ok()
    .map(PrimitiveDateTime::assume_utc)
}

/// Whether two date values can denote the same moment.
///
/// Falls back to a prefix comparison when either side does not parse.
pub(crate) fn dates_match(found: &str, requested: &str) -> bool {
    match (DateRange::parse(found), DateRange::parse(requested)) {
        (Some(found), Some(requested)) => found.overlaps(&requested),
        _ => found.starts_with(requested) || requested.starts_with(found),
    }
}
