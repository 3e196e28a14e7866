use crate::common::{DoorError, Result};
use crate::core::access::{AccessAttempt, AccessLogStore, UnlockMethod};
use chrono::{DateTime, Local};
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const LOG_FILE_NAME: &str = "access_log.jsonl";
const IMAGES_DIR_NAME: &str = "intruder_images";

/// One persisted line of the access log.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AccessLogRecord {
    pub timestamp: DateTime<Local>,
    pub identity: String,
    pub authorized: bool,
    pub method: UnlockMethod,
    #[serde(default)]
    pub evidence_path: Option<PathBuf>,
}

/// Append-only JSON-lines access log with intruder snapshots stored
/// next to it as JPEG files.
pub struct JsonlAccessLog {
    log_file: PathBuf,
    images_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAccessLog {
    pub fn new(data_dir: &Path) -> Result<Self> {
        let images_dir = data_dir.join(IMAGES_DIR_NAME);
        fs::create_dir_all(data_dir)?;
        fs::create_dir_all(&images_dir)?;

        Ok(Self {
            log_file: data_dir.join(LOG_FILE_NAME),
            images_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    fn save_evidence(&self, frame: &DynamicImage, at: DateTime<Local>) -> Result<PathBuf> {
        let suffix: u32 = rand::random();
        let file_name = format!("intruder_{}_{:08x}.jpg", at.format("%Y%m%d_%H%M%S"), suffix);
        let path = self.images_dir.join(file_name);

        // JPEG has no alpha channel
        DynamicImage::ImageRgb8(frame.to_rgb8()).save_with_format(&path, ImageFormat::Jpeg)?;
        Ok(path)
    }

    pub fn read_all(&self) -> Result<Vec<AccessLogRecord>> {
        if !self.log_file.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&self.log_file)?);
        let mut records = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AccessLogRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping malformed access log line {}: {}", index + 1, e),
            }
        }
        Ok(records)
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AccessLogRecord>> {
        let mut records = self.read_all()?;
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    /// Unauthorized attempts at or after `since`, newest first.
    pub fn unauthorized_since(
        &self,
        since: Option<DateTime<Local>>,
    ) -> Result<Vec<AccessLogRecord>> {
        let mut records: Vec<_> = self
            .read_all()?
            .into_iter()
            .filter(|r| !r.authorized)
            .filter(|r| since.map_or(true, |since| r.timestamp >= since))
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(records)
    }
}

impl AccessLogStore for JsonlAccessLog {
    fn log_access(&self, attempt: &AccessAttempt) -> Result<()> {
        let evidence_path = match (&attempt.evidence, attempt.authorized) {
            (Some(frame), false) => match self.save_evidence(frame, attempt.timestamp) {
                Ok(path) => Some(path),
                Err(e) => {
                    // The record itself is still worth keeping
                    tracing::warn!("Failed to save evidence image: {}", e);
                    None
                }
            },
            _ => None,
        };

        let record = AccessLogRecord {
            timestamp: attempt.timestamp,
            identity: attempt.identity.clone(),
            authorized: attempt.authorized,
            method: attempt.method,
            evidence_path,
        };
        let line = serde_json::to_string(&record)?;

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .map_err(|e| DoorError::Storage(format!(
                "Failed to open access log {}: {}", self.log_file.display(), e
            )))?;
        writeln!(file, "{}", line)?;

        tracing::debug!("Logged {} access for {} (authorized: {})",
                        record.method, record.identity, record.authorized);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn attempt_at(identity: &str, authorized: bool, at: DateTime<Local>) -> AccessAttempt {
        let mut attempt = AccessAttempt::face(identity, authorized, None);
        attempt.timestamp = at;
        attempt
    }

    #[test]
    fn test_log_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlAccessLog::new(temp_dir.path()).unwrap();

        log.log_access(&AccessAttempt::pin(true)).unwrap();
        log.log_access(&AccessAttempt::face("alice", true, None)).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identity, "UNKNOWN");
        assert_eq!(records[0].method, UnlockMethod::Pin);
        assert_eq!(records[1].identity, "alice");
        assert!(records.iter().all(|r| r.evidence_path.is_none()));

        let raw = fs::read_to_string(log.log_file()).unwrap();
        assert!(raw.lines().next().unwrap().contains("\"method\":\"PIN\""));
    }

    #[test]
    fn test_unauthorized_attempt_saves_evidence() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlAccessLog::new(temp_dir.path()).unwrap();

        let frame = DynamicImage::new_rgba8(16, 16);
        log.log_access(&AccessAttempt::face("Stranger", false, Some(frame))).unwrap();

        let records = log.read_all().unwrap();
        let path = records[0].evidence_path.clone().expect("evidence path");
        assert!(path.exists());
        assert!(path.starts_with(temp_dir.path().join(IMAGES_DIR_NAME)));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("intruder_") && name.ends_with(".jpg"));
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlAccessLog::new(temp_dir.path()).unwrap();
        let now = Local::now();

        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            log.log_access(&attempt_at(name, true, now + Duration::seconds(i as i64))).unwrap();
        }

        let recent = log.recent(2).unwrap();
        let names: Vec<_> = recent.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(names, vec!["c", "b"]);
    }

    #[test]
    fn test_unauthorized_since_filters() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlAccessLog::new(temp_dir.path()).unwrap();
        let now = Local::now();

        log.log_access(&attempt_at("old", false, now - Duration::days(2))).unwrap();
        log.log_access(&attempt_at("alice", true, now)).unwrap();
        log.log_access(&attempt_at("new", false, now)).unwrap();

        let today = log.unauthorized_since(Some(now - Duration::hours(1))).unwrap();
        assert_eq!(today.len(), 1);
        assert_eq!(today[0].identity, "new");

        assert_eq!(log.unauthorized_since(None).unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlAccessLog::new(temp_dir.path()).unwrap();

        log.log_access(&AccessAttempt::pin(true)).unwrap();
        let mut file = OpenOptions::new().append(true).open(log.log_file()).unwrap();
        writeln!(file, "{{not json").unwrap();
        log.log_access(&AccessAttempt::pin(true)).unwrap();

        assert_eq!(log.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let log = JsonlAccessLog::new(&temp_dir.path().join("nested")).unwrap();
        assert!(log.recent(10).unwrap().is_empty());
    }
}
