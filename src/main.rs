//! opnsense-backup binary entry point

use opnsense_backup::config::AppConfig;
use opnsense_backup::service::FailureReport;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Steps
/// 1. Initialize tracing/logging
/// 2. Load configuration from the environment
/// 3. Fetch the backup, then upload it
///
/// Exits with 0 on success, 1 if the run failed, 2 on a configuration error.
#[tokio::main]
async fn main() -> ExitCode {
    // 1. Initialize tracing/logging
    let log_format = std::env::var("BACKUP_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "opnsense_backup=info".into());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    // 2. Load configuration
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "Configuration error");
            return ExitCode::from(error.exit_code());
        }
    };
    tracing::info!(
        url = %config.source.url,
        bucket = %config.storage.bucket,
        region = %config.storage.region,
        "Configuration loaded"
    );

    // 3. Run
    match opnsense_backup::run_backup(&config).await {
        Ok(report) => {
            tracing::info!(
                bucket = %report.bucket,
                key = %report.key,
                size = report.size,
                "The backup file has been uploaded to the S3 bucket successfully."
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            FailureReport::from(&error).log();
            ExitCode::from(error.exit_code())
        }
    }
}
