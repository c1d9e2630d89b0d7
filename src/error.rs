//! Error types for collaborators and configuration.
//!
//! Job-level code uses `anyhow` with context; these typed errors cover the
//! boundaries where callers need to tell failure kinds apart.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a report repository, publisher or snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed report table {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid snapshot path: {0}")]
    InvalidPath(String),

    #[error("Blocking file task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[cfg(test)]
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Invalid configuration values, detected before any job runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Area mapping must contain a fallback entry for '{key}'")]
    MissingFallback { key: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
