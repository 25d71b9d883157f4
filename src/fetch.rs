//! Backup fetcher
//!
//! Downloads the configuration export from the OPNsense API and streams it
//! to a local file, chunk by chunk.

use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::artifact::LocalArtifact;
use crate::config::SourceConfig;
use crate::error::{AppError, Result};

/// Something that can produce a backup file on local disk
pub trait BackupSource {
    /// Fetch one backup and store it as `file_name`
    fn fetch(&self, file_name: &str) -> impl Future<Output = Result<LocalArtifact>> + Send;
}

/// OPNsense backup API client
///
/// Authenticates with HTTP Basic Auth (API key / secret) and writes the
/// response body into the configured output directory.
pub struct HttpBackupSource {
    client: reqwest::Client,
    url: Url,
    api_key: String,
    api_secret: String,
    directory: PathBuf,
}

impl HttpBackupSource {
    /// Create the fetcher
    ///
    /// # Arguments
    /// * `config` - Source endpoint and credentials
    /// * `directory` - Where backup files are created
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &SourceConfig, directory: PathBuf) -> Result<Self> {
        if !config.verify_tls {
            tracing::warn!(
                url = %config.url,
                "TLS certificate validation is disabled for the backup API"
            );
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("opnsense-backup/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!config.verify_tls);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            directory,
        })
    }

    /// Request the export and stream it into `path`
    ///
    /// # Returns
    /// Number of bytes written
    async fn download(&self, path: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(self.url.clone())
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::SourceResponse { status, body });
        }

        // create_new: an existing artifact is never truncated or reused
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;

        let written = match write_body(&mut response, &mut file).await {
            Ok(written) => written,
            Err(error) => {
                drop(file);
                if let Err(remove_error) = tokio::fs::remove_file(path).await {
                    tracing::warn!(
                        path = %path.display(),
                        error = %remove_error,
                        "Failed to remove partial backup file"
                    );
                }
                return Err(error);
            }
        };

        Ok(written)
    }
}

async fn write_body(response: &mut reqwest::Response, file: &mut tokio::fs::File) -> Result<u64> {
    let mut written = 0u64;
    // a truncated or reset body surfaces here, not in send()
    while let Some(chunk) = response.chunk().await.map_err(AppError::SourceStream)? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

impl BackupSource for HttpBackupSource {
    async fn fetch(&self, file_name: &str) -> Result<LocalArtifact> {
        let path = self.directory.join(file_name);
        tracing::info!(url = %self.url, path = %path.display(), "Downloading backup");

        let size = self.download(&path).await?;

        tracing::debug!(size, path = %path.display(), "Backup written to disk");
        Ok(LocalArtifact::new(path, file_name.to_string(), size))
    }
}
