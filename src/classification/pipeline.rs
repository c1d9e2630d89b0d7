//! Classification and dispatch of pending reports.
//!
//! For every pending report that has not been classified yet the pipeline
//! assigns a responsible area, marks the report through a conditional update,
//! and only then publishes a notification. A crash between the two steps can
//! therefore never notify about an unmarked report; a crash before the update
//! means the report is picked up again on the next run.

use super::classifier::Classifier;
use crate::error::StoreError;
use crate::models::{NotificationMessage, Report, DEFAULT_STATUS};
use crate::store::{NotificationPublisher, ReportRepository, UpdateOutcome};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a candidate was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `report_id` or `created_at` is missing, so the report cannot be addressed.
    MissingIdentity,
    /// A concurrent run marked the report between the scan and the update.
    AlreadyClassified,
    /// The report disappeared between the scan and the update.
    NotFound,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingIdentity => write!(f, "missing report_id or created_at"),
            SkipReason::AlreadyClassified => write!(f, "already classified"),
            SkipReason::NotFound => write!(f, "not found"),
        }
    }
}

/// Step at which a candidate failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// The report was not marked and stays eligible for the next run.
    Update,
    /// The report is already marked; its notification is lost.
    Encode,
    /// The report is already marked; its notification is lost.
    Publish,
}

impl FailureStage {
    /// Whether the report had been marked classified before this stage
    /// failed. Marked reports are never picked up again.
    pub fn after_marking(self) -> bool {
        matches!(self, FailureStage::Encode | FailureStage::Publish)
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Update => write!(f, "update"),
            FailureStage::Encode => write!(f, "encode"),
            FailureStage::Publish => write!(f, "publish"),
        }
    }
}

/// Result of processing one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Processed {
        report_id: String,
        responsible_area: String,
    },
    Skipped {
        report_id: Option<String>,
        reason: SkipReason,
    },
    Failed {
        report_id: String,
        stage: FailureStage,
        error: String,
    },
}

impl ItemOutcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, ItemOutcome::Processed { .. })
    }
}

/// Aggregate result of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Pending, unclassified reports found by the scan.
    pub candidates: usize,
    /// One outcome per candidate, in completion order.
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_processed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Skipped { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Failed { .. }))
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} of {} unclassified reports",
            self.processed(),
            self.candidates
        )
    }
}

/// A candidate and the area it would be assigned, for dry runs.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedClassification {
    pub report: Report,
    pub responsible_area: String,
}

/// Scans, classifies, marks and notifies.
pub struct ClassificationPipeline {
    repository: Arc<dyn ReportRepository>,
    publisher: Arc<dyn NotificationPublisher>,
    classifier: Classifier,
    channel: String,
    concurrency: usize,
}

impl ClassificationPipeline {
    pub fn new(
        repository: Arc<dyn ReportRepository>,
        publisher: Arc<dyn NotificationPublisher>,
        classifier: Classifier,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            publisher,
            classifier,
            channel: channel.into(),
            concurrency: 1,
        }
    }

    /// Number of candidates processed at the same time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Pending reports that still need classification.
    ///
    /// A scan failure is fatal: there is no partial work set to iterate.
    pub async fn candidates(&self) -> Result<Vec<Report>> {
        let pending = self
            .repository
            .scan_by_status(DEFAULT_STATUS)
            .await
            .context("Failed to scan pending reports")?;

        let scanned = pending.len();
        let candidates: Vec<Report> = pending.into_iter().filter(|r| !r.is_classified()).collect();
        debug!(
            "{} pending reports, {} unclassified",
            scanned,
            candidates.len()
        );

        Ok(candidates)
    }

    /// Candidates paired with their target area, without side effects.
    pub async fn plan(&self) -> Result<Vec<PlannedClassification>> {
        Ok(self
            .candidates()
            .await?
            .into_iter()
            .map(|report| {
                let responsible_area = self.classifier.classify(&report.category).to_string();
                PlannedClassification {
                    report,
                    responsible_area,
                }
            })
            .collect())
    }

    /// Runs one classification pass. `now` stamps the notifications.
    pub async fn run(&self, now: DateTime<Local>) -> Result<BatchReport> {
        let candidates = self.candidates().await?;
        let total = candidates.len();

        if total == 0 {
            info!("No unclassified pending reports");
            return Ok(BatchReport::default());
        }

        info!(
            "Classifying {} reports (concurrency {})",
            total, self.concurrency
        );

        let outcomes: Vec<ItemOutcome> = stream::iter(candidates)
            .map(|report| async move { self.process(report, now).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let batch = BatchReport {
            candidates: total,
            outcomes,
        };
        info!("{}", batch);

        Ok(batch)
    }

    /// Processes a single candidate. Never aborts the batch.
    async fn process(&self, report: Report, now: DateTime<Local>) -> ItemOutcome {
        let Some((report_id, created_at)) = report.identity() else {
            warn!(
                report_id = report.label(),
                "Skipping report: {}",
                SkipReason::MissingIdentity
            );
            return ItemOutcome::Skipped {
                report_id: report.report_id.clone(),
                reason: SkipReason::MissingIdentity,
            };
        };

        let responsible_area = self.classifier.classify(&report.category);

        match self
            .repository
            .update_if_unclassified(report_id, created_at, responsible_area)
            .await
        {
            Ok(UpdateOutcome::Updated) => {}
            Ok(UpdateOutcome::AlreadyClassified) => {
                return skipped(report_id, SkipReason::AlreadyClassified)
            }
            Ok(UpdateOutcome::NotFound) => return skipped(report_id, SkipReason::NotFound),
            Err(e) => return failed(report_id, FailureStage::Update, e),
        }

        let message = NotificationMessage::for_report(report_id, &report, responsible_area, now);
        let body = match serde_json::to_string_pretty(&message) {
            Ok(body) => body,
            Err(e) => return failed(report_id, FailureStage::Encode, StoreError::from(e)),
        };

        if let Err(e) = self
            .publisher
            .publish(&self.channel, &message.subject(), &body, &message.attributes())
            .await
        {
            return failed(report_id, FailureStage::Publish, e);
        }

        info!(
            report_id,
            "Report classified and notified to {}", responsible_area
        );

        ItemOutcome::Processed {
            report_id: report_id.to_string(),
            responsible_area: responsible_area.to_string(),
        }
    }
}

fn skipped(report_id: &str, reason: SkipReason) -> ItemOutcome {
    warn!(report_id, "Skipping report: {}", reason);
    ItemOutcome::Skipped {
        report_id: Some(report_id.to_string()),
        reason,
    }
}

fn failed(report_id: &str, stage: FailureStage, err: StoreError) -> ItemOutcome {
    error!(report_id, error = %err, "Report {} failed", stage);

    let error = if stage.after_marking() {
        warn!(
            report_id,
            "Report stays classified; its notification is lost and will not be retried"
        );
        format!(
            "{}; report already marked, notification lost and will not be retried",
            err
        )
    } else {
        err.to_string()
    };

    ItemOutcome::Failed {
        report_id: report_id.to_string(),
        stage,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryPublisher, MemoryRepository};

    fn pipeline(repo: &MemoryRepository, publisher: &MemoryPublisher) -> ClassificationPipeline {
        ClassificationPipeline::new(
            Arc::new(repo.clone()),
            Arc::new(publisher.clone()),
            Classifier::default(),
            "incidents",
        )
        .with_concurrency(4)
    }

    fn sample_reports() -> Vec<Report> {
        vec![
            Report::new("r1", "2024-03-12T08:00:00")
                .with_category("security")
                .with_urgency("critical"),
            Report::new("r2", "2024-03-12T09:00:00").with_category("cleaning"),
            Report::new("r3", "2024-03-12T10:00:00").with_category("graffiti"),
        ]
    }

    #[tokio::test]
    async fn test_run_classifies_and_notifies() {
        let repo = MemoryRepository::new(sample_reports());
        let publisher = MemoryPublisher::new();

        let batch = pipeline(&repo, &publisher).run(Local::now()).await.unwrap();

        assert_eq!(batch.candidates, 3);
        assert_eq!(batch.processed(), 3);
        assert!(!batch.has_failures());

        let classifier = Classifier::default();
        for report in repo.snapshot().await {
            assert!(report.is_classified());
            assert_eq!(
                report.responsible_area.as_deref(),
                Some(classifier.classify(&report.category))
            );
        }

        let published = publisher.published().await;
        assert_eq!(published.len(), 3);
        let security = published
            .iter()
            .find(|m| m.report_id().as_deref() == Some("r1"))
            .unwrap();
        assert_eq!(security.channel, "incidents");
        assert_eq!(security.subject, "New SECURITY report - CRITICAL");
        assert_eq!(
            security.attributes.get("notification_kind").map(String::as_str),
            Some("classification")
        );

        let body: serde_json::Value = serde_json::from_str(&security.body).unwrap();
        assert_eq!(body["responsible_area"], "area-security@utec.edu.pe");
        assert_eq!(body["location"], "");
    }

    #[tokio::test]
    async fn test_second_run_does_not_renotify() {
        let repo = MemoryRepository::new(sample_reports());
        let publisher = MemoryPublisher::new();
        let pipeline = pipeline(&repo, &publisher);

        pipeline.run(Local::now()).await.unwrap();
        let second = pipeline.run(Local::now()).await.unwrap();

        assert_eq!(second.candidates, 0);
        assert_eq!(publisher.published().await.len(), 3);
    }

    #[tokio::test]
    async fn test_overlapping_runs_notify_once() {
        let repo = MemoryRepository::new(sample_reports());
        let publisher = MemoryPublisher::new();
        let first = pipeline(&repo, &publisher);
        let second = pipeline(&repo, &publisher);

        let (a, b) = tokio::join!(first.run(Local::now()), second.run(Local::now()));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.processed() + b.processed(), 3);
        assert_eq!(publisher.published().await.len(), 3);
    }

    #[tokio::test]
    async fn test_only_pending_unclassified_are_candidates() {
        let mut done = Report::new("r4", "2024-03-12T11:00:00");
        done.classified_automatically = Some(true);
        let mut explicit_false = Report::new("r5", "2024-03-12T12:00:00");
        explicit_false.classified_automatically = Some(false);

        let repo = MemoryRepository::new(vec![
            done,
            explicit_false,
            Report::new("r6", "2024-03-12T13:00:00").with_status("closed"),
        ]);
        let publisher = MemoryPublisher::new();

        let batch = pipeline(&repo, &publisher).run(Local::now()).await.unwrap();

        assert_eq!(batch.candidates, 1);
        assert_eq!(
            batch.outcomes,
            vec![ItemOutcome::Processed {
                report_id: "r5".to_string(),
                responsible_area: "area-general@utec.edu.pe".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_identity_is_skipped() {
        let mut no_date = Report::new("r1", "");
        no_date.created_at = None;
        let mut no_id = Report::new("", "2024-03-12T08:00:00");
        no_id.report_id = None;

        let repo = MemoryRepository::new(vec![
            no_date,
            no_id,
            Report::new("r3", "2024-03-12T10:00:00"),
        ]);
        let publisher = MemoryPublisher::new();

        let batch = pipeline(&repo, &publisher).run(Local::now()).await.unwrap();

        assert_eq!(batch.candidates, 3);
        assert_eq!(batch.processed(), 1);
        assert_eq!(batch.skipped(), 2);
        assert_eq!(publisher.published().await.len(), 1);
    }

    #[tokio::test]
    async fn test_item_failures_do_not_abort_batch() {
        let repo = MemoryRepository::new(sample_reports()).with_failing_update("r1");
        let publisher = MemoryPublisher::new().with_failure_for("r2");

        let batch = pipeline(&repo, &publisher).run(Local::now()).await.unwrap();

        assert_eq!(batch.candidates, 3);
        assert_eq!(batch.processed(), 1);
        assert_eq!(batch.failed(), 2);
        assert!(batch.outcomes.iter().any(|o| matches!(
            o,
            ItemOutcome::Failed { report_id, stage: FailureStage::Update, .. } if report_id == "r1"
        )));
        assert!(batch.outcomes.iter().any(|o| matches!(
            o,
            ItemOutcome::Failed { report_id, stage: FailureStage::Publish, .. } if report_id == "r2"
        )));

        // r1 stays eligible for the next run; r2 was marked before the publish failed.
        let stored = repo.snapshot().await;
        assert!(!stored[0].is_classified());
        assert!(stored[1].is_classified());

        let error_for = |id: &str| {
            batch
                .outcomes
                .iter()
                .find_map(|o| match o {
                    ItemOutcome::Failed {
                        report_id, error, ..
                    } if report_id == id => Some(error.clone()),
                    _ => None,
                })
                .unwrap()
        };
        assert!(error_for("r2").contains("notification lost and will not be retried"));
        assert!(!error_for("r1").contains("notification lost"));

        // The lost notification is not recovered by a later run.
        let retry = pipeline(&repo, &publisher).run(Local::now()).await.unwrap();
        assert_eq!(retry.candidates, 1);
        assert!(publisher
            .published()
            .await
            .iter()
            .all(|m| m.report_id().as_deref() != Some("r2")));
    }

    #[tokio::test]
    async fn test_scan_failure_is_fatal() {
        let repo = MemoryRepository::new(sample_reports()).with_failing_scans();
        let publisher = MemoryPublisher::new();

        let result = pipeline(&repo, &publisher).run(Local::now()).await;
        assert!(result.is_err());
        assert!(publisher.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_plan_has_no_side_effects() {
        let repo = MemoryRepository::new(sample_reports());
        let publisher = MemoryPublisher::new();

        let plan = pipeline(&repo, &publisher).plan().await.unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan[2].responsible_area, "area-general@utec.edu.pe");
        assert!(repo.snapshot().await.iter().all(|r| !r.is_classified()));
        assert!(publisher.published().await.is_empty());
    }

    #[test]
    fn test_batch_report_display() {
        let batch = BatchReport {
            candidates: 2,
            outcomes: vec![
                ItemOutcome::Processed {
                    report_id: "r1".to_string(),
                    responsible_area: "a".to_string(),
                },
                ItemOutcome::Skipped {
                    report_id: None,
                    reason: SkipReason::MissingIdentity,
                },
            ],
        };
        assert_eq!(batch.to_string(), "Processed 1 of 2 unclassified reports");
    }
}
