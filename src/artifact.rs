//! Local backup artifact
//!
//! A backup is written to `<timestamp>.xml`, with the timestamp taken from
//! the local wall clock when the fetch starts. Two runs within the same
//! second produce the same name; the second one then fails to create its
//! file instead of overwriting the first.

use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// `YYYY_MM_DD_HH_mm_ss`
pub const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Extension of the exported configuration
pub const ARTIFACT_EXTENSION: &str = "xml";

/// Build the artifact file name for a fetch started at `at`
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use opnsense_backup::artifact::artifact_file_name;
///
/// let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
/// assert_eq!(artifact_file_name(&at), "2024_01_01_12_00_00.xml");
/// ```
pub fn artifact_file_name<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("{}.{}", at.format(TIMESTAMP_FORMAT), ARTIFACT_EXTENSION)
}

/// A completely written backup file on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    /// Full path of the file
    pub path: PathBuf,
    /// File name, also the default object key
    pub file_name: String,
    /// Bytes written
    pub size: u64,
}

impl LocalArtifact {
    pub fn new(path: PathBuf, file_name: String, size: u64) -> Self {
        Self {
            path,
            file_name,
            size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file from local disk
    pub async fn remove(&self) -> std::io::Result<()> {
        tokio::fs::remove_file(&self.path).await
    }
}
