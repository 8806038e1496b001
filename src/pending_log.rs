//! Durable pending-event log.
//!
//! Every normalized event is appended to `<log_dir>/pending-events.jsonl`
//! whether or not the gateway is reachable. The file is JSON Lines: one
//! object per line, the event's fields flattened next to a `timestamp`
//! recording when the line was written.
//!
//! ```text
//! {"timestamp":"2025-12-11T10:00:00.12Z","family":"deploy","providerId":"vercel",...}
//! {"timestamp":"2025-12-11T10:00:03.57Z","family":"ci_cd","providerId":"jenkins",...}
//! ```
//!
//! Each append is a single `write_all` on an append-mode handle, so lines
//! from concurrent requests never interleave. Nothing coordinates appends
//! with the [`Archiver`](crate::archive::Archiver): a line written between
//! its read and its truncate is lost.

use crate::effects::{Effect, EffectError, EffectResult};
use crate::event::Event;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PendingLogError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PendingLogError {
    fn io(path: &Path, source: io::Error) -> Self {
        PendingLogError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One line of the pending log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: Event,
}

/// Lines read back from the log.
#[derive(Debug, Default)]
pub struct ReadOutcome {
    pub entries: Vec<LogEntry>,
    /// Non-blank lines that did not parse as an entry
    pub skipped: usize,
}

/// Append-only JSONL log of events awaiting archival.
#[derive(Debug, Clone)]
pub struct PendingLog {
    path: PathBuf,
}

impl PendingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log inside `log_dir` under the standard file name.
    pub fn in_dir(log_dir: impl AsRef<Path>) -> Self {
        Self::new(log_dir.as_ref().join(crate::PENDING_LOG_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a single line and flush it.
    pub async fn append(&self, event: &Event) -> Result<(), PendingLogError> {
        let entry = LogEntry {
            timestamp: Utc::now(),
            event: event.clone(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| PendingLogError::io(&self.path, e))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| PendingLogError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| PendingLogError::io(&self.path, e))?;

        debug!(path = %self.path.display(), bytes = line.len(), "Appended event to pending log");
        Ok(())
    }

    /// Read every parsable entry. A missing file reads as empty.
    pub fn read_entries(&self) -> Result<ReadOutcome, PendingLogError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ReadOutcome::default()),
            Err(e) => return Err(PendingLogError::io(&self.path, e)),
        };

        let mut outcome = ReadOutcome::default();
        // Raw byte lines: a torn append may leave a partial UTF-8 sequence.
        for (index, line) in BufReader::new(file).split(b'\n').enumerate() {
            let line = line.map_err(|e| PendingLogError::io(&self.path, e))?;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<LogEntry>(&line) {
                Ok(entry) => outcome.entries.push(entry),
                Err(e) => {
                    debug!(line = index + 1, error = %e, "Skipping unparsable pending log line");
                    outcome.skipped += 1;
                }
            }
        }
        Ok(outcome)
    }

    /// Empty the log, keeping the file in place.
    pub fn truncate(&self) -> Result<(), PendingLogError> {
        std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&self.path)
            .map(|_| ())
            .map_err(|e| PendingLogError::io(&self.path, e))
    }
}

#[async_trait]
impl Effect for PendingLog {
    fn name(&self) -> &str {
        "pending-log"
    }

    async fn execute(&self, event: &Event) -> Result<EffectResult, EffectError> {
        self.append(event).await?;
        Ok(EffectResult::success(
            self.name(),
            format!("Appended {} event to {}", event.kind, self.path.display()),
        ))
    }
}
