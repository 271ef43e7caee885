//! # Amazon S3 Archive Store Adapter
//!
//! Uploads archives with `PutObject` and AES256 server-side encryption.
//!
//! The archive is read completely before the request is sent, so an archive
//! process that fails part way never produces an object.

use crate::archiver::ArchiveStream;
use crate::storage::{ArchiveKey, ArchiveStore, StorageError, StoredArchive};
use async_trait::async_trait;
use aws_sdk_s3::{
    error::DisplayErrorContext, primitives::ByteStream, types::ServerSideEncryption, Client,
};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

/// [`ArchiveStore`] backed by an S3 bucket
#[derive(Debug, Clone)]
pub struct S3ArchiveStore {
    client: Client,
    bucket: String,
}

impl S3ArchiveStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn from_config(config: &aws_config::SdkConfig, bucket: impl Into<String>) -> Self {
        Self::new(Client::new(config), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ArchiveStore for S3ArchiveStore {
    #[instrument(skip(self, archive), fields(bucket = %self.bucket, key = %key))]
    async fn put_archive(
        &self,
        key: &ArchiveKey,
        mut archive: ArchiveStream,
    ) -> Result<StoredArchive, StorageError> {
        let mut body = Vec::new();
        archive
            .read_to_end(&mut body)
            .await
            .map_err(|e| StorageError::from_read(key, e))?;
        let size_bytes = body.len() as u64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key.as_str())
            .server_side_encryption(ServerSideEncryption::Aes256)
            .content_type("application/zip")
            .content_length(body.len() as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(size_bytes, "Uploaded archive to S3");
        Ok(StoredArchive {
            key: key.clone(),
            size_bytes,
        })
    }
}
