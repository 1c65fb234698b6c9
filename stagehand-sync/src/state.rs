//! Per-service record of the last sync attempt.
//!
//! Persists a [`SyncRecord`] JSON document at
//! `<state_dir>/sync/<service>.json`, written atomically (`.tmp` + rename).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::io_err, mirror::SyncReport, SyncError};

/// How the last attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedOutcome {
    Success,
    PartialFailure,
    SourceUnavailable,
}

impl std::fmt::Display for RecordedOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordedOutcome::Success => write!(f, "ok"),
            RecordedOutcome::PartialFailure => write!(f, "partial"),
            RecordedOutcome::SourceUnavailable => write!(f, "source missing"),
        }
    }
}

/// On-disk sync record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncRecord {
    pub synced_at: DateTime<Utc>,
    pub outcome: RecordedOutcome,
    #[serde(default)]
    pub files_copied: usize,
    #[serde(default)]
    pub files_deleted: usize,
    #[serde(default)]
    pub failed: Vec<PathBuf>,
}

impl SyncRecord {
    pub fn from_report(report: &SyncReport) -> Self {
        Self {
            synced_at: Utc::now(),
            outcome: if report.is_success() {
                RecordedOutcome::Success
            } else {
                RecordedOutcome::PartialFailure
            },
            files_copied: report.files_copied(),
            files_deleted: report.files_deleted(),
            failed: report.failed_paths(),
        }
    }

    pub fn source_unavailable() -> Self {
        Self {
            synced_at: Utc::now(),
            outcome: RecordedOutcome::SourceUnavailable,
            files_copied: 0,
            files_deleted: 0,
            failed: Vec::new(),
        }
    }
}

/// `<state_dir>/sync/<service>.json`
pub fn record_path_at(state_dir: &Path, service: &str) -> PathBuf {
    state_dir.join("sync").join(format!("{service}.json"))
}

/// Load the last record for `service`; `None` if it never synced.
pub fn load_at(state_dir: &Path, service: &str) -> Result<Option<SyncRecord>, SyncError> {
    let path = record_path_at(state_dir, service);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Save `record` for `service` atomically.
pub fn save_at(state_dir: &Path, service: &str, record: &SyncRecord) -> Result<(), SyncError> {
    let path = record_path_at(state_dir, service);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid sync record path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Human age such as `just now`, `5m ago`, `3h ago`, `2d ago`.
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn missing_record_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load_at(tmp.path(), "api").unwrap().is_none());
    }

    #[test]
    fn saved_record_loads_back_without_tmp() {
        let tmp = TempDir::new().unwrap();
        let record = SyncRecord {
            synced_at: Utc::now(),
            outcome: RecordedOutcome::PartialFailure,
            files_copied: 3,
            files_deleted: 1,
            failed: vec![PathBuf::from("locked.txt")],
        };
        save_at(tmp.path(), "api", &record).unwrap();

        assert_eq!(load_at(tmp.path(), "api").unwrap(), Some(record));
        let tmp_path = record_path_at(tmp.path(), "api").with_extension("json.tmp");
        assert!(!tmp_path.exists());
    }

    #[test]
    fn record_from_report_carries_failures() {
        let mut report = SyncReport::default();
        report.copied.push(PathBuf::from("a.txt"));
        report.failures.push(crate::FailedEntry {
            path: PathBuf::from("b.txt"),
            op: crate::FileOp::Copy,
            error: "denied".into(),
        });
        let record = SyncRecord::from_report(&report);
        assert_eq!(record.outcome, RecordedOutcome::PartialFailure);
        assert_eq!(record.files_copied, 1);
        assert_eq!(record.failed, vec![PathBuf::from("b.txt")]);
    }

    #[test]
    fn ages_are_bucketed() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "just now");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_age(now - Duration::hours(3), now), "3h ago");
        assert_eq!(format_age(now - Duration::days(2), now), "2d ago");
        assert_eq!(format_age(now + Duration::minutes(1), now), "just now");
    }
}
