//! Report table stored as a JSON array on disk.
//!
//! Every scan re-reads the file. Records that fail validation are logged and
//! left out of scan results, but are preserved verbatim when the table is
//! rewritten by an update.

use super::{replace_file, ReportRepository, UpdateOutcome};
use crate::error::StoreError;
use crate::models::Report;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// JSON-file backed [`ReportRepository`].
pub struct JsonFileRepository {
    path: PathBuf,
    /// Serializes read-modify-write cycles so conditional updates are atomic.
    write_lock: Mutex<()>,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_records(&self) -> Result<Vec<Value>, StoreError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|source| StoreError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    async fn write_records(&self, records: &[Value]) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(records)?;
        replace_file(self.path.clone(), content).await
    }

    fn decode(&self, records: Vec<Value>) -> Vec<Report> {
        records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| match serde_json::from_value::<Report>(record) {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        index,
                        error = %e,
                        "Skipping malformed report record"
                    );
                    None
                }
            })
            .collect()
    }
}

fn field_is(record: &Value, field: &str, expected: &str) -> bool {
    record.get(field).and_then(Value::as_str) == Some(expected)
}

#[async_trait]
impl ReportRepository for JsonFileRepository {
    async fn scan_by_status(&self, status: &str) -> Result<Vec<Report>, StoreError> {
        let reports = self.scan_all().await?;
        Ok(reports.into_iter().filter(|r| r.status == status).collect())
    }

    async fn scan_all(&self) -> Result<Vec<Report>, StoreError> {
        let records = self.read_records().await?;
        debug!("Read {} records from {}", records.len(), self.path.display());
        Ok(self.decode(records))
    }

    async fn update_if_unclassified(
        &self,
        report_id: &str,
        created_at: &str,
        responsible_area: &str,
    ) -> Result<UpdateOutcome, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_records().await?;

        let Some(record) = records.iter_mut().find(|record| {
            field_is(record, "report_id", report_id) && field_is(record, "created_at", created_at)
        }) else {
            return Ok(UpdateOutcome::NotFound);
        };

        let already = record
            .get("classified_automatically")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if already {
            return Ok(UpdateOutcome::AlreadyClassified);
        }

        let Some(fields) = record.as_object_mut() else {
            return Ok(UpdateOutcome::NotFound);
        };
        fields.insert("classified_automatically".to_string(), Value::Bool(true));
        fields.insert(
            "responsible_area".to_string(),
            Value::String(responsible_area.to_string()),
        );

        self.write_records(&records).await?;
        Ok(UpdateOutcome::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_table(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("reports.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_scan_skips_malformed_records() {
        let dir = TempDir::new().unwrap();
        let path = write_table(
            &dir,
            r#"[
                {"report_id": "r1", "created_at": "2024-03-12T10:00:00", "category": "security"},
                {"report_id": "r2", "created_at": "2024-03-12T11:00:00", "category": 42},
                {"report_id": "r3", "created_at": "2024-03-12T12:00:00", "status": "closed"}
            ]"#,
        );
        let repo = JsonFileRepository::new(path);

        let all = repo.scan_all().await.unwrap();
        assert_eq!(all.len(), 2);

        let pending = repo.scan_by_status("pending").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].category, "security");
    }

    #[tokio::test]
    async fn test_update_preserves_other_fields() {
        let dir = TempDir::new().unwrap();
        let path = write_table(
            &dir,
            r#"[
                {"report_id": "r1", "created_at": "2024-03-12T10:00:00", "reporter": "ana"},
                {"report_id": "r2", "created_at": "2024-03-12T11:00:00", "category": 42}
            ]"#,
        );
        let repo = JsonFileRepository::new(&path);

        let outcome = repo
            .update_if_unclassified("r1", "2024-03-12T10:00:00", "area-general@utec.edu.pe")
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated);

        let raw: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0]["reporter"], "ana");
        assert_eq!(raw[0]["classified_automatically"], true);
        assert_eq!(raw[0]["responsible_area"], "area-general@utec.edu.pe");
        assert_eq!(raw[1]["category"], 42);
    }

    #[tokio::test]
    async fn test_update_is_conditional() {
        let dir = TempDir::new().unwrap();
        let path = write_table(
            &dir,
            r#"[{"report_id": "r1", "created_at": "t1", "classified_automatically": true, "responsible_area": "a"}]"#,
        );
        let repo = JsonFileRepository::new(path);

        let outcome = repo.update_if_unclassified("r1", "t1", "b").await.unwrap();
        assert_eq!(outcome, UpdateOutcome::AlreadyClassified);

        let outcome = repo.update_if_unclassified("r1", "t2", "b").await.unwrap();
        assert_eq!(outcome, UpdateOutcome::NotFound);

        let reports = repo.scan_all().await.unwrap();
        assert_eq!(reports[0].responsible_area.as_deref(), Some("a"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_mark_once() {
        let dir = TempDir::new().unwrap();
        let path = write_table(
            &dir,
            r#"[
                {"report_id": "r1", "created_at": "t1"},
                {"report_id": "r2", "created_at": "t2"}
            ]"#,
        );
        let repo = std::sync::Arc::new(JsonFileRepository::new(&path));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    let area = format!("area-{}", i);
                    repo.update_if_unclassified("r1", "t1", &area).await
                })
            })
            .collect();

        let mut updated = 0;
        for task in futures::future::join_all(tasks).await {
            match task.unwrap().unwrap() {
                UpdateOutcome::Updated => updated += 1,
                outcome => assert_eq!(outcome, UpdateOutcome::AlreadyClassified),
            }
        }
        assert_eq!(updated, 1);

        let reports = repo.scan_all().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].is_classified());
        assert!(!reports[1].is_classified());
    }

    #[tokio::test]
    async fn test_missing_or_broken_table_is_an_error() {
        let dir = TempDir::new().unwrap();
        let repo = JsonFileRepository::new(dir.path().join("absent.json"));
        assert!(matches!(repo.scan_all().await, Err(StoreError::Io { .. })));

        let path = write_table(&dir, "{ not json");
        let repo = JsonFileRepository::new(path);
        assert!(matches!(
            repo.scan_all().await,
            Err(StoreError::Malformed { .. })
        ));
    }

    fn fixture_copy(dir: &TempDir) -> PathBuf {
        let fixture =
            std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/reports.json");
        let path = dir.path().join("reports.json");
        std::fs::copy(fixture, &path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_fixture_classification_and_daily_summary() {
        use crate::aggregation::AggregationEngine;
        use crate::classification::{ClassificationPipeline, Classifier};
        use crate::models::Granularity;
        use crate::store::{MemoryPublisher, MemorySnapshotStore};
        use chrono::{Local, NaiveDate};
        use std::sync::Arc;

        let dir = TempDir::new().unwrap();
        let path = fixture_copy(&dir);
        let repo = Arc::new(JsonFileRepository::new(&path));

        // rep-0006 has a non-string category and is left out.
        assert_eq!(repo.scan_all().await.unwrap().len(), 5);

        let publisher = MemoryPublisher::new();
        let pipeline = ClassificationPipeline::new(
            repo.clone(),
            Arc::new(publisher.clone()),
            Classifier::default(),
            "incidents",
        );
        let batch = pipeline.run(Local::now()).await.unwrap();
        assert_eq!(batch.candidates, 3);
        assert_eq!(batch.processed(), 3);

        let raw: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.len(), 6);
        assert_eq!(raw[4]["responsible_area"], "area-general@utec.edu.pe");
        assert_eq!(raw[5]["category"][0], "security");
        assert!(raw[3].get("classified_automatically").is_none());

        let engine = AggregationEngine::new(repo, Arc::new(MemorySnapshotStore::new()), "stats");
        let reference = NaiveDate::from_ymd_opt(2024, 3, 13)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let run = engine
            .compute(Granularity::Day, reference, Local::now())
            .await
            .unwrap();

        assert_eq!(run.summary.total_reports, 4);
        assert_eq!(run.summary.critical_reports, 1);
        assert_eq!(run.summary.by_category.get("other"), Some(&1));
        assert_eq!(run.summary.by_status.get("in_progress"), Some(&1));
        assert!(run.summary.is_consistent());
    }

    #[tokio::test]
    async fn test_empty_table() {
        let dir = TempDir::new().unwrap();
        let path = write_table(&dir, "");
        let repo = JsonFileRepository::new(path);
        assert!(repo.scan_all().await.unwrap().is_empty());
    }
}
