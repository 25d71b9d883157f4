//! S3 storage module
//!
//! Handles:
//! - S3 client construction (AWS or any S3-compatible endpoint)
//! - Streaming backup upload (single PUT or multipart)

mod upload;

pub use upload::{PartRange, S3BackupSink, plan_parts};

use std::future::Future;
use std::path::Path;

use crate::config::StorageConfig;
use crate::error::Result;

/// Destination for finished backup files
pub trait BackupSink {
    /// Store the file at `path` under `key`
    fn upload(&self, path: &Path, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Bucket (or equivalent container) the sink writes to
    fn bucket(&self) -> &str;
}

pub(crate) fn build_s3_http_client() -> aws_sdk_s3::config::SharedHttpClient {
    use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;

    // plain http is allowed for local S3-compatible endpoints
    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();

    HyperClientBuilder::new().build(https_connector)
}

/// Build an S3 client from static credentials
///
/// SDK-level retries are turned off; the caller owns the retry policy.
/// With an endpoint override, path-style addressing is used.
pub fn build_s3_client(config: &StorageConfig) -> aws_sdk_s3::Client {
    use aws_sdk_s3::config::retry::RetryConfig as SdkRetryConfig;
    use aws_sdk_s3::config::{
        BehaviorVersion, Credentials, Region, RequestChecksumCalculation,
        ResponseChecksumValidation,
    };

    let credentials = Credentials::new(
        &config.access_key_id,
        &config.secret_access_key,
        None,
        None,
        "opnsense-backup-env",
    );

    let mut builder = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .http_client(build_s3_http_client())
        .region(Region::new(config.region.clone()))
        .credentials_provider(credentials)
        .retry_config(SdkRetryConfig::disabled())
        .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
        .response_checksum_validation(ResponseChecksumValidation::WhenRequired);

    if let Some(endpoint) = config.endpoint_url.as_deref() {
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }

    aws_sdk_s3::Client::from_conf(builder.build())
}
