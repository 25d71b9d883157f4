//! Configuration management
//!
//! All settings come from the process environment. Required values have
//! no defaults; optional tuning knobs do.
//!
//! # Required
//! - `BACKUP_API_URL`
//! - `OPNSENSE_API_KEY`, `OPNSENSE_SECRET_KEY`
//! - `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_REGION`, `S3_BUCKET_NAME`

use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::error::{AppError, ConfigError};

/// Smallest part size S3 accepts for all but the last part of a multipart upload
pub const MIN_PART_SIZE_MB: u64 = 5;

const MIB: u64 = 1024 * 1024;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub storage: StorageConfig,
    pub artifact: ArtifactConfig,
    pub retry: RetryConfig,
}

/// Backup source (OPNsense API) configuration
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Full URL of the backup export endpoint
    pub url: Url,
    /// Basic Auth username
    pub api_key: String,
    /// Basic Auth password
    pub api_secret: String,
    /// Validate the server certificate (default: true)
    pub verify_tls: bool,
    /// Whole-request timeout, none by default
    pub timeout: Option<Duration>,
}

/// S3 storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// S3-compatible endpoint override (e.g. MinIO)
    pub endpoint_url: Option<String>,
    /// Multipart part size in bytes
    pub part_size: u64,
}

/// Local artifact handling
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    /// Directory the backup file is written to
    pub directory: PathBuf,
    /// Keep the file after a successful upload
    pub keep_local: bool,
}

/// Retry behavior for the fetch and upload steps
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts per step, including the first one
    pub max_attempts: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Upper bound for a single backoff delay
    pub max_delay: Duration,
}

/// Raw environment, as deserialized by the `config` crate
///
/// Keys are the lowercased variable names.
#[derive(Debug, Deserialize)]
struct EnvSettings {
    backup_api_url: Option<String>,
    opnsense_api_key: Option<String>,
    opnsense_secret_key: Option<String>,
    aws_access_key_id: Option<String>,
    aws_secret_access_key: Option<String>,
    aws_region: Option<String>,
    s3_bucket_name: Option<String>,
    aws_endpoint_url: Option<String>,
    backup_verify_tls: bool,
    backup_http_timeout_secs: Option<u64>,
    backup_output_dir: PathBuf,
    backup_keep_local: bool,
    backup_max_attempts: u32,
    backup_retry_base_ms: u64,
    backup_retry_max_ms: u64,
    backup_upload_part_size_mb: u64,
}

impl AppConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value is invalid
    pub fn load() -> Result<Self, AppError> {
        Self::from_environment(config::Environment::default())
    }

    /// Load configuration from an explicit variable map
    ///
    /// Same rules as [`AppConfig::load`], without touching the process
    /// environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: config::Map<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::from_environment(config::Environment::default().source(Some(map)))
    }

    fn from_environment(environment: config::Environment) -> Result<Self, AppError> {
        use config::Config;

        let settings = Config::builder()
            .set_default("backup_verify_tls", true)?
            .set_default("backup_output_dir", ".")?
            .set_default("backup_keep_local", false)?
            .set_default("backup_max_attempts", 3)?
            .set_default("backup_retry_base_ms", 1000)?
            .set_default("backup_retry_max_ms", 30_000)?
            .set_default("backup_upload_part_size_mb", 8)?
            .add_source(environment)
            .build()?;

        let raw: EnvSettings = settings.try_deserialize()?;
        Ok(Self::from_settings(raw)?)
    }

    fn from_settings(raw: EnvSettings) -> Result<Self, ConfigError> {
        let api_key = present(raw.opnsense_api_key);
        let api_secret = present(raw.opnsense_secret_key);
        let (api_key, api_secret) = match (api_key, api_secret) {
            (Some(key), Some(secret)) => (key, secret),
            (key, secret) => {
                let mut missing = Vec::new();
                if key.is_none() {
                    missing.push("OPNSENSE_API_KEY");
                }
                if secret.is_none() {
                    missing.push("OPNSENSE_SECRET_KEY");
                }
                return Err(ConfigError::MissingSourceCredentials(missing));
            }
        };

        let access_key_id = present(raw.aws_access_key_id);
        let secret_access_key = present(raw.aws_secret_access_key);
        let region = present(raw.aws_region);
        let bucket = present(raw.s3_bucket_name);
        let (access_key_id, secret_access_key, region, bucket) =
            match (access_key_id, secret_access_key, region, bucket) {
                (Some(id), Some(secret), Some(region), Some(bucket)) => {
                    (id, secret, region, bucket)
                }
                (id, secret, region, bucket) => {
                    let missing = [
                        ("AWS_ACCESS_KEY_ID", id.is_none()),
                        ("AWS_SECRET_ACCESS_KEY", secret.is_none()),
                        ("AWS_REGION", region.is_none()),
                        ("S3_BUCKET_NAME", bucket.is_none()),
                    ]
                    .into_iter()
                    .filter_map(|(name, is_missing)| is_missing.then_some(name))
                    .collect();
                    return Err(ConfigError::MissingStorageConfig(missing));
                }
            };

        let url = present(raw.backup_api_url)
            .ok_or(ConfigError::MissingSourceEndpoint("BACKUP_API_URL"))?;
        let url = parse_source_url(&url)?;

        if raw.backup_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "BACKUP_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if raw.backup_upload_part_size_mb < MIN_PART_SIZE_MB {
            return Err(ConfigError::Invalid(format!(
                "BACKUP_UPLOAD_PART_SIZE_MB must be at least {}",
                MIN_PART_SIZE_MB
            )));
        }

        let endpoint_url = present(raw.aws_endpoint_url);
        if let Some(endpoint) = endpoint_url.as_deref() {
            Url::parse(endpoint).map_err(|e| {
                ConfigError::Invalid(format!("AWS_ENDPOINT_URL is not a valid URL: {}", e))
            })?;
        }

        let base_delay = Duration::from_millis(raw.backup_retry_base_ms);
        let max_delay = Duration::from_millis(raw.backup_retry_max_ms).max(base_delay);

        Ok(Self {
            source: SourceConfig {
                url,
                api_key,
                api_secret,
                verify_tls: raw.backup_verify_tls,
                timeout: raw
                    .backup_http_timeout_secs
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
            },
            storage: StorageConfig {
                region,
                access_key_id,
                secret_access_key,
                bucket,
                endpoint_url,
                part_size: raw.backup_upload_part_size_mb * MIB,
            },
            artifact: ArtifactConfig {
                directory: raw.backup_output_dir,
                keep_local: raw.backup_keep_local,
            },
            retry: RetryConfig {
                max_attempts: raw.backup_max_attempts,
                base_delay,
                max_delay,
            },
        })
    }
}

/// Empty and whitespace-only values count as unset
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_source_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::Invalid(format!("BACKUP_API_URL is not a valid URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::Invalid(format!(
            "BACKUP_API_URL must use http or https, got {}",
            scheme
        ))),
    }
}
