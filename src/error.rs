//! Error types for opnsense-backup
//!
//! Every failure in a run is converted to `AppError`. Configuration
//! problems have their own `ConfigError` so the three startup failure
//! classes stay distinguishable.

use reqwest::StatusCode;
use thiserror::Error;

/// Startup configuration error
///
/// Raised before any network or disk activity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// OPNsense API key and/or secret are not set
    #[error("Missing OPNsense credentials: {}", .0.join(", "))]
    MissingSourceCredentials(Vec<&'static str>),

    /// One or more S3 settings are not set
    #[error("Missing AWS configuration: {}", .0.join(", "))]
    MissingStorageConfig(Vec<&'static str>),

    /// The backup endpoint URL is not set
    #[error("Missing OPNsense API configuration: {0}")]
    MissingSourceEndpoint(&'static str),

    /// A value is present but unusable
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error (fatal, pre-flight)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The backup endpoint answered with a non-success status
    #[error("Backup API responded with {status}")]
    SourceResponse { status: StatusCode, body: String },

    /// HTTP client error (connection, TLS, timeout)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The backup body stopped arriving before it was complete
    #[error("Backup download interrupted: {0}")]
    SourceStream(#[source] reqwest::Error),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// S3 storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// A retried step kept failing
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        source: Box<AppError>,
    },
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(ConfigError::Invalid(err.to_string()))
    }
}

impl AppError {
    /// Whether another attempt of the same step could succeed
    ///
    /// Network failures, timeouts, throttling and server-side errors are
    /// transient. Everything caused by our own input or local disk is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::SourceResponse { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            AppError::HttpClient(error) => {
                error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
            }
            AppError::SourceStream(_) | AppError::Storage(_) => true,
            AppError::Config(_) | AppError::Io(_) | AppError::RetriesExhausted { .. } => false,
        }
    }

    /// Status and body of the source response behind this error, if any
    pub fn source_response(&self) -> Option<(StatusCode, &str)> {
        match self {
            AppError::SourceResponse { status, body } => Some((*status, body.as_str())),
            AppError::RetriesExhausted { source, .. } => source.source_response(),
            _ => None,
        }
    }

    /// Process exit status for this failure
    ///
    /// `2` for configuration errors, `1` for everything that failed during
    /// the run itself.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
