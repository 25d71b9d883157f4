//! Backup run orchestration
//!
//! Fetch, then upload. Each step completes (including the local flush)
//! before the next one starts.

use chrono::{DateTime, Local};
use reqwest::StatusCode;
use std::path::PathBuf;

use crate::artifact::{LocalArtifact, artifact_file_name};
use crate::error::{AppError, Result};
use crate::fetch::BackupSource;
use crate::retry::RetryPolicy;
use crate::storage::BackupSink;

/// One configured backup run
pub struct BackupJob<S, K> {
    source: S,
    sink: K,
    retry: RetryPolicy,
    keep_local: bool,
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Object key in the bucket
    pub key: String,
    pub bucket: String,
    /// Bytes uploaded
    pub size: u64,
    /// Where the artifact was written
    pub local_path: PathBuf,
    /// Whether the artifact is still on disk
    pub kept_local: bool,
}

impl<S, K> BackupJob<S, K>
where
    S: BackupSource,
    K: BackupSink,
{
    pub fn new(source: S, sink: K, retry: RetryPolicy, keep_local: bool) -> Self {
        Self {
            source,
            sink,
            retry,
            keep_local,
        }
    }

    /// Run a backup now, keyed by the artifact file name
    pub async fn run(&self) -> Result<BackupReport> {
        self.run_at(Local::now(), None).await
    }

    /// Run a backup as if the fetch started at `started_at`
    ///
    /// # Arguments
    /// * `started_at` - Timestamp the artifact name is derived from
    /// * `key` - Object key; defaults to the artifact file name
    pub async fn run_at(
        &self,
        started_at: DateTime<Local>,
        key: Option<&str>,
    ) -> Result<BackupReport> {
        let file_name = artifact_file_name(&started_at);

        let artifact = self
            .retry
            .run("fetch", |_| self.source.fetch(&file_name))
            .await?;

        let key = key.unwrap_or(&artifact.file_name).to_string();
        let uploaded = self
            .retry
            .run("upload", |_| self.sink.upload(artifact.path(), &key))
            .await;

        if let Err(error) = uploaded {
            tracing::warn!(
                path = %artifact.path.display(),
                "Upload failed, backup file left on disk"
            );
            return Err(error);
        }

        let kept_local = self.keep_local || !self.discard(&artifact).await;

        Ok(BackupReport {
            key,
            bucket: self.sink.bucket().to_string(),
            size: artifact.size,
            local_path: artifact.path,
            kept_local,
        })
    }

    /// Remove the uploaded artifact; returns whether it is gone
    async fn discard(&self, artifact: &LocalArtifact) -> bool {
        match artifact.remove().await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    path = %artifact.path.display(),
                    %error,
                    "Failed to remove uploaded backup file"
                );
                false
            }
        }
    }
}

/// What to tell the operator about a failed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReport {
    /// The backup API answered with an error status
    SourceResponse { status: StatusCode, body: String },
    /// Any other failure
    Other(String),
}

impl From<&AppError> for FailureReport {
    fn from(error: &AppError) -> Self {
        match error.source_response() {
            Some((status, body)) => FailureReport::SourceResponse {
                status,
                body: body.to_string(),
            },
            None => FailureReport::Other(error.to_string()),
        }
    }
}

impl FailureReport {
    pub fn log(&self) {
        match self {
            FailureReport::SourceResponse { status, body } => {
                tracing::error!(
                    status = status.as_u16(),
                    body = %body,
                    "API response error"
                );
            }
            FailureReport::Other(message) => {
                tracing::error!(error = %message, "Backup failed");
            }
        }
    }
}
