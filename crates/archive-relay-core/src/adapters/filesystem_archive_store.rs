//! # Filesystem Archive Store
//!
//! Local filesystem implementation of [`ArchiveStore`] for development.
//! Archives land at `<base_path>/<project>/<repository>/<branch>.zip`.

use crate::archiver::ArchiveStream;
use crate::storage::{ArchiveKey, ArchiveStore, StorageError, StoredArchive};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

/// Filesystem-based archive store
///
/// # Examples
///
/// ```no_run
/// use archive_relay_core::adapters::FilesystemArchiveStore;
/// use std::path::PathBuf;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = FilesystemArchiveStore::new(PathBuf::from("./data/archives")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FilesystemArchiveStore {
    base_path: PathBuf,
}

impl FilesystemArchiveStore {
    /// Create the store, creating `base_path` if needed.
    pub async fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path)
            .await
            .map_err(|source| StorageError::Io {
                key: base_path.display().to_string(),
                source,
            })?;

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a key below the base path, rejecting keys that would escape it.
    fn archive_path(&self, key: &ArchiveKey) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key.as_str());
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
                reason: "key must be a relative path without '..' components".to_string(),
            });
        }

        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl ArchiveStore for FilesystemArchiveStore {
    async fn put_archive(
        &self,
        key: &ArchiveKey,
        mut archive: ArchiveStream,
    ) -> Result<StoredArchive, StorageError> {
        let path = self.archive_path(key)?;
        let io_error = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        // Write to a temporary file first so a failed archive never replaces
        // a previous good one.
        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        let mut file = fs::File::create(&temp_path).await.map_err(io_error)?;

        let copied = tokio::io::copy(&mut archive, &mut file).await;
        let size_bytes = match copied {
            Ok(size) => size,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&temp_path).await;
                return Err(StorageError::from_read(key, e));
            }
        };

        file.flush().await.map_err(io_error)?;
        drop(file);

        fs::rename(&temp_path, &path).await.map_err(io_error)?;
        debug!(path = %path.display(), size_bytes, "Stored archive");

        Ok(StoredArchive {
            key: key.clone(),
            size_bytes,
        })
    }
}

#[cfg(test)]
#[path = "filesystem_archive_store_tests.rs"]
mod tests;
