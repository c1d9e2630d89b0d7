//! External collaborators: report repository, notification publisher and
//! snapshot store.
//!
//! The jobs only talk to these traits. Bundled implementations cover a JSON
//! report table on disk, an HTTP or log-only publisher, and a filesystem
//! snapshot root. Tests use the in-memory doubles in `memory`.

pub mod file;
#[cfg(test)]
pub mod memory;
pub mod publisher;
pub mod snapshot;

use crate::error::StoreError;
use crate::models::Report;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

pub use file::JsonFileRepository;
#[cfg(test)]
pub use memory::{MemoryPublisher, MemoryRepository, MemorySnapshotStore};
pub use publisher::{HttpPublisher, LogPublisher};
pub use snapshot::FsSnapshotStore;

/// Result of a conditional classification update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The report was unmarked and is now classified.
    Updated,
    /// Another run marked the report first; nothing was written.
    AlreadyClassified,
    /// No report exists under the given key.
    NotFound,
}

/// Durable report table.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Returns every report whose status equals `status`, fully drained.
    async fn scan_by_status(&self, status: &str) -> Result<Vec<Report>, StoreError>;

    /// Returns every report.
    async fn scan_all(&self) -> Result<Vec<Report>, StoreError>;

    /// Sets `classified_automatically` and `responsible_area` on the report
    /// keyed by `(report_id, created_at)`, only if it is not classified yet.
    /// The check and the write must be atomic per key.
    async fn update_if_unclassified(
        &self,
        report_id: &str,
        created_at: &str,
        responsible_area: &str,
    ) -> Result<UpdateOutcome, StoreError>;
}

/// Publish-to-channel notification transport.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        subject: &str,
        body: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<(), StoreError>;
}

/// Path-addressed blob store with overwrite semantics.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn put(&self, path: &str, content: &str, content_type: &str) -> Result<(), StoreError>;
}

/// Replaces `target` with `content` through a temporary file in the same
/// directory, so readers see either the old or the new file. The blocking
/// file work runs off the async workers.
pub(crate) async fn replace_file(target: PathBuf, content: String) -> Result<(), StoreError> {
    tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&target)
            .map_err(|e| StoreError::io(&target, e.error))?;
        Ok(())
    })
    .await?
}
