//! Append-only attack detection log.
//!
//! One line per analyzed flow file:
//! `timestamp,basename,total_flows,attack_flows,attack_percentage,attack_type_counts`.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use tracing::error;

use crate::error::{ClassifierError, ClassifierResult};

/// Timestamp layout used in detection log lines.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One detection log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    /// Local time of the analysis.
    pub timestamp: DateTime<Local>,
    /// Basename of the analyzed flow file.
    pub file: String,
    /// Rows classified.
    pub total_flows: u64,
    /// Rows classified as a non-benign class.
    pub attack_flows: u64,
    /// `attack_flows / total_flows * 100`, or `0` for an empty file.
    pub attack_percentage: f64,
    /// Per-label attack counts.
    pub attack_types: BTreeMap<String, u64>,
}

impl DetectionRecord {
    /// Render the record as a newline-terminated log line.
    #[must_use]
    pub fn to_line(&self) -> String {
        let types = self
            .attack_types
            .iter()
            .map(|(label, count)| format!("{label}:{count}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{},{},{},{},{:.2},{}\n",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.file,
            self.total_flows,
            self.attack_flows,
            self.attack_percentage,
            types
        )
    }
}

/// Serialized appender for the detection log.
///
/// Clones share one lock, so concurrent analyses never interleave lines.
#[derive(Debug, Clone)]
pub struct DetectionLog {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl DetectionLog {
    /// Append to the log at `path`; the file and its directory are created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Same log lock, different file; used when the configured location changes.
    #[must_use]
    pub fn relocated(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::clone(&self.lock),
        }
    }

    /// Log location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single write.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory or file cannot be created or written.
    pub fn append(&self, record: &DetectionRecord) -> ClassifierResult<()> {
        let line = record.to_line();
        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!(path = %self.path.display(), "detection log lock poisoned; continuing");
                poisoned.into_inner()
            }
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| ClassifierError::io("create_log_dir", parent, source))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| ClassifierError::io("open_detection_log", &self.path, source))?;
        file.write_all(line.as_bytes())
            .map_err(|source| ClassifierError::io("append_detection_log", &self.path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(total: u64, attack: u64, pct: f64) -> anyhow::Result<DetectionRecord> {
        let timestamp = Local
            .with_ymd_and_hms(2025, 5, 7, 12, 23, 2)
            .single()
            .ok_or_else(|| anyhow::anyhow!("ambiguous local time"))?;
        Ok(DetectionRecord {
            timestamp,
            file: "gtp_removed_capture.pcap_Flow.csv".into(),
            total_flows: total,
            attack_flows: attack,
            attack_percentage: pct,
            attack_types: BTreeMap::new(),
        })
    }

    #[test]
    fn line_matches_documented_layout() -> anyhow::Result<()> {
        let mut entry = record(4, 3, 75.0)?;
        entry.attack_types.insert("DDoS".into(), 2);
        entry.attack_types.insert("Intra_UPF_UE_DoS".into(), 1);
        assert_eq!(
            entry.to_line(),
            "2025-05-07 12:23:02,gtp_removed_capture.pcap_Flow.csv,4,3,75.00,DDoS:2, Intra_UPF_UE_DoS:1\n"
        );
        Ok(())
    }

    #[test]
    fn empty_analysis_renders_zero_percentage() -> anyhow::Result<()> {
        let line = record(0, 0, 0.0)?.to_line();
        assert!(line.ends_with(",0,0,0.00,\n"));
        Ok(())
    }

    #[test]
    fn append_creates_directories_and_appends() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let log = DetectionLog::new(dir.path().join("logs").join("attack_detection.log"));
        log.append(&record(1, 0, 0.0)?)?;
        log.append(&record(2, 1, 50.0)?)?;
        let body = fs::read_to_string(log.path())?;
        assert_eq!(body.lines().count(), 2);

        let moved = log.relocated(dir.path().join("other.log"));
        moved.append(&record(3, 0, 0.0)?)?;
        assert!(Arc::ptr_eq(&log.lock, &moved.lock));
        assert_eq!(fs::read_to_string(moved.path())?.lines().count(), 1);
        Ok(())
    }
}
