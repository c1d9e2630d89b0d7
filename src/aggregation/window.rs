//! Window boundary arithmetic and timestamp parsing.
//!
//! All boundaries are naive local wall-clock times. Timestamps that carry a UTC
//! offset are compared by their wall-clock part with the offset dropped, which
//! matches how reports have historically been bucketed. For stores whose
//! clients write offsets other than the deployment's own zone this shifts
//! reports across day boundaries; see DESIGN.md.

use crate::models::{Granularity, Period, PeriodRange};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Inclusive time range covered by one summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub granularity: Granularity,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    /// The day (Day) or the Monday (Week) identifying this window.
    pub fn label(&self) -> NaiveDate {
        self.start.date()
    }

    /// Inclusive on both ends.
    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Period descriptor written into summaries.
    pub fn period(&self) -> Period {
        match self.granularity {
            Granularity::Day => Period::Day { date: self.label() },
            Granularity::Week => Period::Week {
                period: PeriodRange {
                    start: self.start,
                    end: self.end,
                },
            },
        }
    }
}

/// Last millisecond before midnight following `date + days`.
fn end_of(date: NaiveDate, days: i64) -> NaiveDateTime {
    (date + Duration::days(days + 1)).and_time(NaiveTime::MIN) - Duration::milliseconds(1)
}

/// Computes the window preceding `reference`.
///
/// Day: the calendar day before `reference`'s date.
/// Week: the Monday-Sunday week before the week containing `reference`.
pub fn compute_window(granularity: Granularity, reference: NaiveDateTime) -> Window {
    let today = reference.date();

    let (first_day, length) = match granularity {
        Granularity::Day => (today - Duration::days(1), 1),
        Granularity::Week => {
            let offset = i64::from(today.weekday().num_days_from_monday());
            let this_monday = today - Duration::days(offset);
            (this_monday - Duration::days(7), 7)
        }
    };

    Window {
        granularity,
        start: first_day.and_time(NaiveTime::MIN),
        end: end_of(first_day, length - 1),
    }
}

/// ISO 8601 forms carrying an offset that RFC 3339 parsing rejects:
/// minutes-only times, basic offsets (`+0000`) and a space separator.
const OFFSET_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%dT%H:%M%:z",
];

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parses a stored `created_at` value into a naive wall-clock time.
///
/// Accepts ISO date-times with an offset (offset dropped), naive ISO
/// date-times and bare dates (midnight). Returns `None` for anything else.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(raw, format).ok())
    {
        return Some(dt.naive_local());
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}
