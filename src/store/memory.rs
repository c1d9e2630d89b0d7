//! In-memory collaborators for the test suites.
//!
//! Each double can be told to fail so batch isolation can be exercised.

use super::{NotificationPublisher, ReportRepository, SnapshotStore, UpdateOutcome};
use crate::error::StoreError;
use crate::models::Report;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Report table held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryRepository {
    reports: Arc<Mutex<Vec<Report>>>,
    fail_scans: bool,
    failing_updates: HashSet<String>,
}

impl MemoryRepository {
    pub fn new(reports: Vec<Report>) -> Self {
        Self {
            reports: Arc::new(Mutex::new(reports)),
            ..Self::default()
        }
    }

    /// Makes every scan fail.
    pub fn with_failing_scans(mut self) -> Self {
        self.fail_scans = true;
        self
    }

    /// Makes updates of the given report fail.
    pub fn with_failing_update(mut self, report_id: &str) -> Self {
        self.failing_updates.insert(report_id.to_string());
        self
    }

    /// Current contents of the table.
    pub async fn snapshot(&self) -> Vec<Report> {
        self.reports.lock().await.clone()
    }

    fn check_scan(&self) -> Result<(), StoreError> {
        if self.fail_scans {
            return Err(StoreError::Unavailable("scan rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReportRepository for MemoryRepository {
    async fn scan_by_status(&self, status: &str) -> Result<Vec<Report>, StoreError> {
        self.check_scan()?;
        let reports = self.reports.lock().await;
        Ok(reports
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn scan_all(&self) -> Result<Vec<Report>, StoreError> {
        self.check_scan()?;
        Ok(self.reports.lock().await.clone())
    }

    async fn update_if_unclassified(
        &self,
        report_id: &str,
        created_at: &str,
        responsible_area: &str,
    ) -> Result<UpdateOutcome, StoreError> {
        if self.failing_updates.contains(report_id) {
            return Err(StoreError::Unavailable(format!(
                "update of {} rejected",
                report_id
            )));
        }

        let mut reports = self.reports.lock().await;
        let Some(report) = reports.iter_mut().find(|r| {
            r.report_id.as_deref() == Some(report_id) && r.created_at.as_deref() == Some(created_at)
        }) else {
            return Ok(UpdateOutcome::NotFound);
        };

        if report.is_classified() {
            return Ok(UpdateOutcome::AlreadyClassified);
        }

        report.classified_automatically = Some(true);
        report.responsible_area = Some(responsible_area.to_string());
        Ok(UpdateOutcome::Updated)
    }
}

/// A message captured by [`MemoryPublisher`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub channel: String,
    pub subject: String,
    pub body: String,
    pub attributes: BTreeMap<String, String>,
}

impl PublishedMessage {
    /// The `report_id` field of a JSON notification body.
    pub fn report_id(&self) -> Option<String> {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()?
            .get("report_id")?
            .as_str()
            .map(String::from)
    }
}

/// Publisher that records every message instead of sending it.
#[derive(Debug, Default, Clone)]
pub struct MemoryPublisher {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    failing_reports: HashSet<String>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes publishing fail for notifications about the given report.
    pub fn with_failure_for(mut self, report_id: &str) -> Self {
        self.failing_reports.insert(report_id.to_string());
        self
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl NotificationPublisher for MemoryPublisher {
    async fn publish(
        &self,
        channel: &str,
        subject: &str,
        body: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let message = PublishedMessage {
            channel: channel.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            attributes: attributes.clone(),
        };

        if let Some(id) = message.report_id() {
            if self.failing_reports.contains(&id) {
                return Err(StoreError::Unavailable(format!("publish for {} rejected", id)));
            }
        }

        self.published.lock().await.push(message);
        Ok(())
    }
}

/// Blob store held in memory, keyed by path.
#[derive(Debug, Default, Clone)]
pub struct MemorySnapshotStore {
    blobs: Arc<Mutex<BTreeMap<String, (String, String)>>>,
    fail_writes: bool,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Content stored at `path`.
    pub async fn get(&self, path: &str) -> Option<String> {
        self.blobs
            .lock()
            .await
            .get(path)
            .map(|(content, _)| content.clone())
    }

    /// Content type stored at `path`.
    pub async fn content_type(&self, path: &str) -> Option<String> {
        self.blobs
            .lock()
            .await
            .get(path)
            .map(|(_, content_type)| content_type.clone())
    }

    pub async fn paths(&self) -> Vec<String> {
        self.blobs.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn put(&self, path: &str, content: &str, content_type: &str) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Unavailable(format!("write to {} rejected", path)));
        }
        self.blobs.lock().await.insert(
            path.to_string(),
            (content.to_string(), content_type.to_string()),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_conditional_update() {
        let repo = MemoryRepository::new(vec![Report::new("r1", "2024-03-12T10:00:00")]);

        let first = repo
            .update_if_unclassified("r1", "2024-03-12T10:00:00", "area-a")
            .await
            .unwrap();
        let second = repo
            .update_if_unclassified("r1", "2024-03-12T10:00:00", "area-b")
            .await
            .unwrap();
        let missing = repo
            .update_if_unclassified("r1", "2024-03-13T10:00:00", "area-a")
            .await
            .unwrap();

        assert_eq!(first, UpdateOutcome::Updated);
        assert_eq!(second, UpdateOutcome::AlreadyClassified);
        assert_eq!(missing, UpdateOutcome::NotFound);

        let stored = repo.snapshot().await;
        assert_eq!(stored[0].responsible_area.as_deref(), Some("area-a"));
        assert!(stored[0].is_classified());
    }

    #[tokio::test]
    async fn test_scan_by_status() {
        let repo = MemoryRepository::new(vec![
            Report::new("r1", "t1"),
            Report::new("r2", "t2").with_status("closed"),
        ]);

        let pending = repo.scan_by_status("pending").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].label(), "r1");
        assert_eq!(repo.scan_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let repo = MemoryRepository::default().with_failing_scans();
        assert!(repo.scan_all().await.is_err());

        let publisher = MemoryPublisher::new().with_failure_for("r1");
        let result = publisher
            .publish("ch", "s", r#"{"report_id": "r1"}"#, &BTreeMap::new())
            .await;
        assert!(result.is_err());
        assert!(publisher.published().await.is_empty());

        let store = MemorySnapshotStore::new().with_failing_writes();
        assert!(store.put("a", "b", "text/plain").await.is_err());
    }
}
