//! Report selection and statistics.
//!
//! This module filters reports into a window and reduces them into a
//! [`WindowSummary`].

use super::window::{parse_timestamp, Window};
use crate::models::{
    BusiestDay, Granularity, Report, Tally, Trends, WindowSummary, CRITICAL_URGENCY,
};
use chrono::{DateTime, Local, NaiveDateTime};
use tracing::warn;

/// A report paired with its parsed creation time.
#[derive(Debug, Clone)]
pub struct DatedReport<'a> {
    pub report: &'a Report,
    pub created_at: NaiveDateTime,
}

/// Selects reports created inside `window`, keeping scan order.
///
/// Reports with a missing or unparsable `created_at` are logged and left out.
pub fn select_in_window<'a>(reports: &'a [Report], window: &Window) -> Vec<DatedReport<'a>> {
    reports
        .iter()
        .filter_map(|report| {
            let Some(raw) = report.created_at.as_deref() else {
                warn!(
                    report_id = report.label(),
                    "Excluding report without created_at"
                );
                return None;
            };

            match parse_timestamp(raw) {
                Some(created_at) => Some(DatedReport { report, created_at }),
                None => {
                    warn!(
                        report_id = report.label(),
                        created_at = raw,
                        "Excluding report with unparsable created_at"
                    );
                    None
                }
            }
        })
        .filter(|dated| window.contains(dated.created_at))
        .collect()
}

/// Counts values in first-seen order.
pub fn tally<'a, I>(values: I) -> Tally
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts = Tally::new();
    for value in values {
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }
    counts
}

/// The entry with the highest count. Ties go to the first-seen key.
pub fn most_common(counts: &Tally) -> Option<(&str, usize)> {
    let mut best: Option<(&str, usize)> = None;
    for (key, &count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((key.as_str(), count));
        }
    }
    best
}

fn empty_message(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Day => "No reports this day",
        Granularity::Week => "No reports this week",
    }
}

/// Reduces the selected reports into a summary for `window`.
pub fn reduce(
    selected: &[DatedReport<'_>],
    window: &Window,
    generated_at: DateTime<Local>,
) -> WindowSummary {
    let weekly = window.granularity == Granularity::Week;

    if selected.is_empty() {
        return WindowSummary {
            period: window.period(),
            total_reports: 0,
            message: Some(empty_message(window.granularity).to_string()),
            by_category: Tally::new(),
            by_urgency: Tally::new(),
            by_status: Tally::new(),
            critical_reports: 0,
            average_resolution_time: None,
            trends: weekly.then(Trends::default),
            generated_at,
        };
    }

    let reports = || selected.iter().map(|dated| dated.report);

    let by_category = tally(reports().map(|r| r.category.as_str()));
    let by_urgency = tally(reports().map(|r| r.urgency.as_str()));
    let by_status = tally(reports().map(|r| r.status.as_str()));
    let critical_reports = reports()
        .filter(|r| r.urgency == CRITICAL_URGENCY)
        .count();

    let trends = weekly.then(|| {
        let days: Vec<String> = selected
            .iter()
            .map(|dated| dated.created_at.format("%Y-%m-%d").to_string())
            .collect();
        let by_day = tally(days.iter().map(String::as_str));

        Trends {
            busiest_day: most_common(&by_day).map(|(date, total)| BusiestDay {
                date: date.to_string(),
                total,
            }),
            most_common_category: most_common(&by_category).map(|(k, _)| k.to_string()),
            most_common_urgency: most_common(&by_urgency).map(|(k, _)| k.to_string()),
        }
    });

    let summary = WindowSummary {
        period: window.period(),
        total_reports: selected.len(),
        message: None,
        by_category,
        by_urgency,
        by_status,
        critical_reports,
        average_resolution_time: None,
        trends,
        generated_at,
    };
    debug_assert!(summary.is_consistent(), "tallies must sum to total_reports");
    summary
}
