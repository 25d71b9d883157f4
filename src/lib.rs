//! opnsense-backup - OPNsense configuration backup to S3
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │    config    │────▶│      fetch       │────▶│     storage      │
//! │ (env vars)   │     │ GET + Basic Auth │     │ PutObject or     │
//! │              │     │ → <ts>.xml       │     │ multipart upload │
//! └──────────────┘     └──────────────────┘     └──────────────────┘
//!                               ▲                        ▲
//!                               └──── service (retry) ───┘
//! ```
//!
//! # Modules
//!
//! - `config`: Environment-driven configuration
//! - `artifact`: Timestamped backup file naming and cleanup
//! - `fetch`: OPNsense backup API client
//! - `storage`: S3 upload
//! - `retry`: Bounded retry with exponential backoff
//! - `service`: Run orchestration and failure reporting
//! - `error`: Error types

pub mod artifact;
pub mod config;
pub mod error;
pub mod fetch;
pub mod retry;
pub mod service;
pub mod storage;

use crate::config::AppConfig;
use crate::error::Result;
use crate::fetch::HttpBackupSource;
use crate::retry::RetryPolicy;
use crate::service::{BackupJob, BackupReport};
use crate::storage::S3BackupSink;

/// Build the HTTP source, S3 sink and retry policy from `config`
pub fn build_job(config: &AppConfig) -> Result<BackupJob<HttpBackupSource, S3BackupSink>> {
    let source = HttpBackupSource::new(&config.source, config.artifact.directory.clone())?;
    let sink = S3BackupSink::new(&config.storage);

    Ok(BackupJob::new(
        source,
        sink,
        RetryPolicy::from(&config.retry),
        config.artifact.keep_local,
    ))
}

/// Fetch one backup and upload it
pub async fn run_backup(config: &AppConfig) -> Result<BackupReport> {
    build_job(config)?.run().await
}
