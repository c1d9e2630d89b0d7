//! Data models for incident reports and their derived artifacts.
//!
//! Reports are validated at the repository boundary: missing or null tags
//! resolve to their documented defaults during deserialization so business
//! logic never has to repeat them.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category assumed when a report does not declare one.
pub const DEFAULT_CATEGORY: &str = "other";
/// Urgency assumed when a report does not declare one.
pub const DEFAULT_URGENCY: &str = "medium";
/// Status assumed when a report does not declare one.
pub const DEFAULT_STATUS: &str = "pending";
/// Urgency tag counted as critical in summaries.
pub const CRITICAL_URGENCY: &str = "critical";
/// Kind tag attached to every classification notification.
pub const NOTIFICATION_KIND: &str = "classification";

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_urgency() -> String {
    DEFAULT_URGENCY.to_string()
}

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

fn category_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_else(default_category))
}

fn urgency_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_else(default_urgency))
}

fn status_or_default<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_else(default_status))
}

/// A single incident report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Report identifier (first half of the composite key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    /// Creation timestamp as stored (second half of the composite key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Declared category tag.
    #[serde(default = "default_category", deserialize_with = "category_or_default")]
    pub category: String,
    /// Urgency tag.
    #[serde(default = "default_urgency", deserialize_with = "urgency_or_default")]
    pub urgency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Workflow status tag.
    #[serde(default = "default_status", deserialize_with = "status_or_default")]
    pub status: String,
    /// Set once the classification pipeline has handled this report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classified_automatically: Option<bool>,
    /// Contact of the area responsible for this report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible_area: Option<String>,
}

#[cfg(test)]
impl Report {
    /// Creates a pending, unclassified report with default tags.
    pub fn new(report_id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            report_id: Some(report_id.into()),
            created_at: Some(created_at.into()),
            category: default_category(),
            urgency: default_urgency(),
            location: None,
            description: None,
            status: default_status(),
            classified_automatically: None,
            responsible_area: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_urgency(mut self, urgency: impl Into<String>) -> Self {
        self.urgency = urgency.into();
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

impl Report {
    /// Returns the composite key when both halves are present and non-empty.
    pub fn identity(&self) -> Option<(&str, &str)> {
        let id = self.report_id.as_deref().filter(|s| !s.is_empty())?;
        let created_at = self.created_at.as_deref().filter(|s| !s.is_empty())?;
        Some((id, created_at))
    }

    /// Whether the pipeline has already classified this report.
    pub fn is_classified(&self) -> bool {
        self.classified_automatically.unwrap_or(false)
    }

    /// Identifier used in log lines.
    pub fn label(&self) -> &str {
        self.report_id.as_deref().unwrap_or("unknown")
    }
}

/// Payload published once per newly classified report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub report_id: String,
    pub category: String,
    pub urgency: String,
    pub location: String,
    pub description: String,
    pub responsible_area: String,
    pub notification_kind: String,
    pub timestamp: DateTime<Local>,
}

impl NotificationMessage {
    /// Builds the notification for a report that has just been classified.
    pub fn for_report(
        report_id: &str,
        report: &Report,
        responsible_area: &str,
        timestamp: DateTime<Local>,
    ) -> Self {
        Self {
            report_id: report_id.to_string(),
            category: report.category.clone(),
            urgency: report.urgency.clone(),
            location: report.location.clone().unwrap_or_default(),
            description: report.description.clone().unwrap_or_default(),
            responsible_area: responsible_area.to_string(),
            notification_kind: NOTIFICATION_KIND.to_string(),
            timestamp,
        }
    }

    pub fn subject(&self) -> String {
        format!(
            "New {} report - {}",
            self.category.to_uppercase(),
            self.urgency.to_uppercase()
        )
    }

    /// Categorical attributes for filtered subscriptions.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("category".to_string(), self.category.clone()),
            ("urgency".to_string(), self.urgency.clone()),
            ("notification_kind".to_string(), self.notification_kind.clone()),
        ])
    }
}

/// Aggregation window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Day => write!(f, "daily"),
            Granularity::Week => write!(f, "weekly"),
        }
    }
}

/// Insertion-ordered tag counts. Order follows first appearance in the scan.
pub type Tally = IndexMap<String, usize>;

/// Start and end of a weekly period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Period a summary covers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Period {
    Day { date: NaiveDate },
    Week { period: PeriodRange },
}

/// Busiest calendar day of a week.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusiestDay {
    pub date: String,
    pub total: usize,
}

/// Weekly trend indicators. Every field is absent for an empty week.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trends {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busiest_day: Option<BusiestDay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_common_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_common_urgency: Option<String>,
}

/// Statistical summary of the reports created within one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSummary {
    #[serde(flatten)]
    pub period: Period,
    pub total_reports: usize,
    /// Human-readable marker, present only when the window is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub by_category: Tally,
    pub by_urgency: Tally,
    pub by_status: Tally,
    pub critical_reports: usize,
    /// Reserved; no resolution data is tracked yet.
    pub average_resolution_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trends: Option<Trends>,
    pub generated_at: DateTime<Local>,
}

impl WindowSummary {
    /// Checks that every count mapping sums to the total.
    pub fn is_consistent(&self) -> bool {
        let total = self.total_reports;
        [&self.by_category, &self.by_urgency, &self.by_status]
            .iter()
            .all(|tally| tally.values().sum::<usize>() == total)
    }
}
