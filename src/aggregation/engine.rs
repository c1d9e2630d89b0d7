//! Windowed aggregation job.

use super::aggregator::{reduce, select_in_window};
use super::window::{compute_window, Window};
use crate::models::{Granularity, WindowSummary};
use crate::output::generate_json_snapshot;
use crate::store::{ReportRepository, SnapshotStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use std::sync::Arc;
use tracing::{debug, info};

/// Content type of persisted snapshots.
pub const SNAPSHOT_CONTENT_TYPE: &str = "application/json";

/// Result of one aggregation run.
#[derive(Debug, Clone)]
pub struct AggregationRun {
    pub window: Window,
    pub summary: WindowSummary,
    /// Snapshot path, `None` when the summary was not persisted.
    pub path: Option<String>,
}

/// Deterministic snapshot path for a window.
pub fn snapshot_path(prefix: &str, window: &Window) -> String {
    let prefix = prefix.trim_matches('/');
    let label = window.label().format("%Y-%m-%d");
    let name = match window.granularity {
        Granularity::Day => format!("daily/{}.json", label),
        Granularity::Week => format!("weekly/week-{}.json", label),
    };

    if prefix.is_empty() {
        name
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Computes window summaries from the full report population and stores them.
pub struct AggregationEngine {
    repository: Arc<dyn ReportRepository>,
    snapshots: Arc<dyn SnapshotStore>,
    prefix: String,
}

impl AggregationEngine {
    pub fn new(
        repository: Arc<dyn ReportRepository>,
        snapshots: Arc<dyn SnapshotStore>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            snapshots,
            prefix: prefix.into(),
        }
    }

    /// Computes the summary for the window preceding `reference` without
    /// persisting it.
    pub async fn compute(
        &self,
        granularity: Granularity,
        reference: NaiveDateTime,
        generated_at: DateTime<Local>,
    ) -> Result<AggregationRun> {
        let window = compute_window(granularity, reference);
        debug!(
            "{} window: {} .. {}",
            granularity, window.start, window.end
        );

        let reports = self
            .repository
            .scan_all()
            .await
            .context("Failed to scan reports")?;

        let selected = select_in_window(&reports, &window);
        info!(
            "{} of {} reports fall in the {} window starting {}",
            selected.len(),
            reports.len(),
            granularity,
            window.label()
        );

        let summary = reduce(&selected, &window, generated_at);

        Ok(AggregationRun {
            window,
            summary,
            path: None,
        })
    }

    /// Writes `summary` as the snapshot for `window`, replacing any previous one.
    pub async fn persist(&self, summary: &WindowSummary, window: &Window) -> Result<String> {
        let path = snapshot_path(&self.prefix, window);
        let content = generate_json_snapshot(summary)?;

        self.snapshots
            .put(&path, &content, SNAPSHOT_CONTENT_TYPE)
            .await
            .with_context(|| format!("Failed to write snapshot {}", path))?;

        info!("Saved {} summary to {}", window.granularity, path);
        Ok(path)
    }

    /// Computes and persists the summary for the window preceding `reference`.
    pub async fn run(
        &self,
        granularity: Granularity,
        reference: NaiveDateTime,
        generated_at: DateTime<Local>,
    ) -> Result<AggregationRun> {
        let mut run = self.compute(granularity, reference, generated_at).await?;
        let path = self.persist(&run.summary, &run.window).await?;
        run.path = Some(path);
        Ok(run)
    }
}
