//! Streaming backup upload to S3
//!
//! Files that fit in one part are sent with a single `PutObject` whose body
//! is streamed from disk. Larger files go through a multipart upload, one
//! part in memory at a time.

use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::BackupSink;
use crate::config::StorageConfig;
use crate::error::{AppError, Result};

const CONTENT_TYPE: &str = "application/xml";

/// Byte range of one multipart part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    /// 1-based part number
    pub number: i32,
    pub offset: u64,
    pub length: u64,
}

/// Split `size` bytes into parts of `part_size`
///
/// The last part holds the remainder. An empty file yields no parts.
pub fn plan_parts(size: u64, part_size: u64) -> Vec<PartRange> {
    let part_size = part_size.max(1);
    let mut parts = Vec::new();
    let mut offset = 0;
    let mut number = 1;

    while offset < size {
        let length = part_size.min(size - offset);
        parts.push(PartRange {
            number,
            offset,
            length,
        });
        offset += length;
        number += 1;
    }

    parts
}

fn storage_error(action: &str, error: impl std::error::Error) -> AppError {
    AppError::Storage(format!("{} failed: {}", action, DisplayErrorContext(&error)))
}

/// Uploads backup files to one S3 bucket
pub struct S3BackupSink {
    client: S3Client,
    bucket: String,
    part_size: u64,
}

impl S3BackupSink {
    /// Create a sink from the storage configuration
    pub fn new(config: &StorageConfig) -> Self {
        Self::with_client(
            super::build_s3_client(config),
            config.bucket.clone(),
            config.part_size,
        )
    }

    pub fn with_client(client: S3Client, bucket: String, part_size: u64) -> Self {
        Self {
            client,
            bucket,
            part_size,
        }
    }

    /// Single request, body streamed from the file
    async fn put_single(&self, path: &Path, key: &str) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| storage_error("Opening backup file for upload", e))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| storage_error("S3 upload", e))?;

        Ok(())
    }

    /// Multipart upload, aborted on any failure after creation
    async fn put_multipart(&self, path: &Path, key: &str, size: u64) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| storage_error("Creating multipart upload", e))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| AppError::Storage("S3 returned no multipart upload id".to_string()))?
            .to_string();

        match self.upload_parts(path, key, &upload_id, size).await {
            Ok(parts) => {
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();
                let result = self
                    .client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(|e| storage_error("Completing multipart upload", e));

                if let Err(error) = result {
                    self.abort(key, &upload_id).await;
                    return Err(error);
                }
                Ok(())
            }
            Err(error) => {
                self.abort(key, &upload_id).await;
                Err(error)
            }
        }
    }

    async fn upload_parts(
        &self,
        path: &Path,
        key: &str,
        upload_id: &str,
        size: u64,
    ) -> Result<Vec<CompletedPart>> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut completed = Vec::new();

        for part in plan_parts(size, self.part_size) {
            let mut buffer = vec![0u8; part.length as usize];
            file.seek(std::io::SeekFrom::Start(part.offset)).await?;
            file.read_exact(&mut buffer).await?;

            let output = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part.number)
                .body(ByteStream::from(buffer))
                .send()
                .await
                .map_err(|e| storage_error("Uploading part", e))?;

            tracing::debug!(part = part.number, length = part.length, "Uploaded part");

            completed.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part.number)
                    .build(),
            );
        }

        Ok(completed)
    }

    async fn abort(&self, key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(
                key,
                upload_id,
                error = %DisplayErrorContext(&e),
                "Failed to abort multipart upload"
            );
        }
    }
}

impl BackupSink for S3BackupSink {
    async fn upload(&self, path: &Path, key: &str) -> Result<()> {
        let size = tokio::fs::metadata(path).await?.len();
        tracing::info!(bucket = %self.bucket, key, size, "Uploading backup");

        if size <= self.part_size {
            self.put_single(path, key).await
        } else {
            self.put_multipart(path, key, size).await
        }
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}
