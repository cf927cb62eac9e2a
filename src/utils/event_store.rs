use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use image::DynamicImage;
use tracing::{debug, error, info};

use crate::error::DrowsewatchError;

/// One confirmed episode as persisted: a line in the log file plus a
/// snapshot image named after the same timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub filename: String,
}

impl LogEntry {
    /// Derives both the log timestamp and the snapshot filename from a
    /// single clock reading so they always agree.
    pub fn from_timestamp(timestamp: DateTime<Local>) -> Self {
        let stamp = timestamp.format("%Y-%m-%d_%H-%M-%S").to_string();
        Self {
            filename: format!("{}.jpg", stamp),
            timestamp: stamp,
        }
    }

    fn parse(line: &str) -> Option<Self> {
        let (timestamp, filename) = line.split_once('|')?;
        let timestamp = timestamp.trim();
        let filename = filename.trim();
        if timestamp.is_empty() || filename.is_empty() {
            return None;
        }
        Some(Self {
            timestamp: timestamp.to_string(),
            filename: filename.to_string(),
        })
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} | {}", self.timestamp, self.filename)
    }
}

/// Append-only store for confirmed episodes: a flat text log plus a
/// directory of snapshot images.
#[derive(Debug, Clone)]
pub struct EventStore {
    log_path: PathBuf,
    snapshot_dir: PathBuf,
}

impl EventStore {
    pub fn new(log_path: impl Into<PathBuf>, snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            snapshot_dir: snapshot_dir.into(),
        }
    }

    pub fn snapshot_path(&self, filename: &str) -> PathBuf {
        self.snapshot_dir.join(filename)
    }

    /// Persists one confirmed episode. The snapshot is written before the
    /// log line: a crash in between leaves an orphan image, never a log
    /// line pointing at a missing file.
    pub fn append(
        &self,
        entry: &LogEntry,
        snapshot: &DynamicImage,
    ) -> Result<(), DrowsewatchError> {
        fs::create_dir_all(&self.snapshot_dir)?;
        let image_path = self.snapshot_dir.join(&entry.filename);
        snapshot.save(&image_path)?;

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(log, "{}", entry)?;

        info!(
            "Logged episode {} with snapshot {}",
            entry.timestamp,
            image_path.display()
        );
        Ok(())
    }

    /// Parses the full log. Malformed lines are skipped; a missing log file
    /// is an empty history, not an error.
    pub fn read_all(&self) -> Vec<LogEntry> {
        let raw = match fs::read_to_string(&self.log_path) {
            Ok(raw) => raw,
            Err(_) => return vec![],
        };
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let entry = LogEntry::parse(line);
                if entry.is_none() {
                    debug!("Skipping malformed log line: {}", line);
                }
                entry
            })
            .collect()
    }

    /// Deletes the log file and every snapshot. Best-effort: a failed
    /// deletion is recorded and the rest still runs; the combined failures
    /// come back as one error.
    pub fn clear(&self) -> Result<(), DrowsewatchError> {
        let mut failures: Vec<String> = vec![];

        if self.log_path.exists() {
            if let Err(err) = fs::remove_file(&self.log_path) {
                error!("Failed to delete {}: {}", self.log_path.display(), err);
                failures.push(format!("{}: {}", self.log_path.display(), err));
            }
        }

        if let Ok(entries) = fs::read_dir(&self.snapshot_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if let Err(err) = fs::remove_file(&path) {
                    error!("Failed to delete {}: {}", path.display(), err);
                    failures.push(format!("{}: {}", path.display(), err));
                }
            }
        }

        if failures.is_empty() {
            info!("Event history cleared");
            Ok(())
        } else {
            Err(DrowsewatchError::Other(format!(
                "History clear incomplete: {}",
                failures.join("; ")
            )))
        }
    }
}
