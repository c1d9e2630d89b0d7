//! Filesystem snapshot store.

use super::{replace_file, SnapshotStore};
use crate::error::StoreError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Writes snapshots as files below a root directory.
///
/// Paths are relative and slash-separated. Writes go through a temporary file
/// and a rename, so a reader never observes a half-written snapshot.
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a snapshot path below the root, rejecting escapes.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let valid = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !valid {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn put(&self, path: &str, content: &str, content_type: &str) -> Result<(), StoreError> {
        let target = self.resolve(path)?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        replace_file(target.clone(), content.to_string()).await?;

        debug!(
            "Wrote snapshot {} ({} bytes, {})",
            target.display(),
            content.len(),
            content_type
        );
        Ok(())
    }
}
