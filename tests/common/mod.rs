//! Common test utilities for E2E tests

use chrono::{DateTime, Local, TimeZone};
use opnsense_backup::config::AppConfig;
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wiremock::MockServer;

pub const BUCKET: &str = "firewall-backups";
pub const BACKUP_PATH: &str = "/api/core/backup/download/this";
pub const API_KEY: &str = "opnsense-key";
pub const API_SECRET: &str = "opnsense-secret";

/// Mock OPNsense API, mock S3 endpoint and a scratch output directory
pub struct TestEnv {
    pub source: MockServer,
    pub s3: MockServer,
    pub output_dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self {
            source: MockServer::start().await,
            s3: MockServer::start().await,
            output_dir: TempDir::new().unwrap(),
        }
    }

    /// Environment variables pointing at the mock servers
    pub fn vars(&self) -> Vec<(String, String)> {
        vec![
            ("BACKUP_API_URL".into(), format!("{}{}", self.source.uri(), BACKUP_PATH)),
            ("OPNSENSE_API_KEY".into(), API_KEY.into()),
            ("OPNSENSE_SECRET_KEY".into(), API_SECRET.into()),
            ("AWS_ACCESS_KEY_ID".into(), "AKIDEXAMPLE".into()),
            ("AWS_SECRET_ACCESS_KEY".into(), "aws-secret".into()),
            ("AWS_REGION".into(), "us-east-1".into()),
            ("S3_BUCKET_NAME".into(), BUCKET.into()),
            ("AWS_ENDPOINT_URL".into(), self.s3.uri()),
            (
                "BACKUP_OUTPUT_DIR".into(),
                self.output_dir.path().display().to_string(),
            ),
            ("BACKUP_MAX_ATTEMPTS".into(), "2".into()),
            ("BACKUP_RETRY_BASE_MS".into(), "1".into()),
            ("BACKUP_RETRY_MAX_MS".into(), "5".into()),
        ]
    }

    /// Configuration with extra variables appended
    pub fn config_with(&self, extra: &[(&str, &str)]) -> AppConfig {
        let mut vars = self.vars();
        vars.extend(
            extra
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        );
        AppConfig::from_vars(vars).unwrap()
    }

    pub fn config(&self) -> AppConfig {
        self.config_with(&[])
    }

    /// Object path on the mock S3 endpoint (path-style addressing)
    pub fn object_path(key: &str) -> String {
        format!("/{}/{}", BUCKET, key)
    }
}

/// 2024-01-01 12:00:00 local time
pub fn noon() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// Raw HTTP server answering one connection per entry, closing each after writing
///
/// Lets a test cut a response off mid-body, which a mock server cannot do.
pub async fn serve_raw(responses: Vec<Vec<u8>>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = socket.read(&mut buf).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
            }
            socket.write_all(&response).await.unwrap();
            let _ = socket.shutdown().await;
        }
    });
    addr
}
