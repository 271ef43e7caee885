//! # Archive Storage Interface
//!
//! Durable storage for branch archives, keyed by
//! `<project>/<repository>/<branch>.zip`.

use crate::archiver::{ArchiveError, ArchiveStream};
use async_trait::async_trait;
use std::{fmt, io};
use thiserror::Error;

// ============================================================================
// Core Types
// ============================================================================

/// Object key of a branch archive
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveKey(String);

impl ArchiveKey {
    /// Key for a branch archive.
    ///
    /// Branch names may contain `/` (e.g. `feature/login`), which is kept as
    /// is and yields nested keys.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if any component is empty.
    pub fn for_branch(project: &str, repository: &str, branch: &str) -> Result<Self, StorageError> {
        let key = format!("{}/{}/{}.zip", project, repository, branch);
        for (field, value) in [("project", project), ("repository", repository), ("branch", branch)] {
            if value.is_empty() {
                return Err(StorageError::InvalidKey {
                    key,
                    reason: format!("{} cannot be empty", field),
                });
            }
        }

        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArchive {
    pub key: ArchiveKey,
    pub size_bytes: u64,
}

// ============================================================================
// Core Trait
// ============================================================================

/// Interface for archive persistence
///
/// Implementations must read the stream to its end before treating the upload
/// as successful: a failed archive process only becomes visible at the end of
/// the stream. Uploads are single attempts.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn put_archive(
        &self,
        key: &ArchiveKey,
        archive: ArchiveStream,
    ) -> Result<StoredArchive, StorageError>;
}

// ============================================================================
// Errors
// ============================================================================

/// Archive storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid archive key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Archive for {key} could not be produced: {source}")]
    ArchiveFailed {
        key: String,
        #[source]
        source: ArchiveError,
    },

    #[error("Failed to read archive for {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to upload {key}: {message}")]
    Upload { key: String, message: String },

    #[error("Storage I/O error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// Classify an error raised while reading an [`ArchiveStream`].
    ///
    /// Errors carrying an [`ArchiveError`] become
    /// [`StorageError::ArchiveFailed`]; anything else is a plain read failure.
    pub fn from_read(key: &ArchiveKey, error: io::Error) -> Self {
        let key = key.to_string();
        if !error
            .get_ref()
            .is_some_and(|inner| inner.is::<ArchiveError>())
        {
            return Self::Read { key, source: error };
        }

        match error.into_inner().map(|inner| inner.downcast::<ArchiveError>()) {
            Some(Ok(archive)) => Self::ArchiveFailed {
                key,
                source: *archive,
            },
            Some(Err(other)) => Self::Read {
                key,
                source: io::Error::other(other),
            },
            None => Self::Read {
                key,
                source: io::Error::other("archive stream failed"),
            },
        }
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
