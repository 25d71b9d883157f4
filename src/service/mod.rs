//! Service layer
//!
//! Runs a backup from source to sink and reports the outcome.

mod backup;

pub use backup::{BackupJob, BackupReport, FailureReport};
