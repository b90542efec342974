//! Append-only daily audit log (one JSON line per mutation).

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::warn;

use crate::models::AuditRecord;

/// Directory of `YYYY-MM-DD.jsonl` files, one per UTC day.
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding records for a UTC date.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Append one record to the file for its timestamp's UTC day.
    pub fn append(&self, record: &AuditRecord) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(record.timestamp.date_naive()))?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }

    /// All readable records for a day; unparsable lines are skipped.
    pub fn read_day(&self, date: NaiveDate) -> Vec<AuditRecord> {
        let path = self.path_for(date);
        let Ok(body) = fs::read_to_string(&path) else {
            return Vec::new();
        };
        body.lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable audit line");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditAction, LearnedEntry, DEFAULT_CONTEXT};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_records_split_by_utc_day() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("logs"));
        let entry = LearnedEntry::new("fever", DEFAULT_CONTEXT);

        let late = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 1).unwrap();
        log.append(&AuditRecord::learn(&entry, late)).unwrap();
        log.append(&AuditRecord::unlearn("fever", DEFAULT_CONTEXT, true, early)).unwrap();

        let day1 = log.read_day(late.date_naive());
        let day2 = log.read_day(early.date_naive());
        assert_eq!(day1.len(), 1);
        assert_eq!(day1[0].action, AuditAction::Learn);
        assert_eq!(day2.len(), 1);
        assert_eq!(day2[0].keep_aliases, Some(true));
        assert!(log.path_for(late.date_naive()).ends_with("2024-03-01.jsonl"));
    }

    #[test]
    fn test_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path());
        let entry = LearnedEntry::new("cough", DEFAULT_CONTEXT);
        let now = Utc::now();

        log.append(&AuditRecord::learn(&entry, now)).unwrap();
        let first = fs::read_to_string(log.path_for(now.date_naive())).unwrap();
        log.append(&AuditRecord::learn(&entry, now)).unwrap();
        let second = fs::read_to_string(log.path_for(now.date_naive())).unwrap();

        assert!(second.starts_with(&first));
        assert_eq!(log.read_day(now.date_naive()).len(), 2);
    }
}
