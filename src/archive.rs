//! Batch archiver for the pending log.
//!
//! One pass reads every pending entry, groups the events into buckets,
//! renders a boxed summary, moves the entries into
//! `<log_dir>/archive/events-<timestamp>.jsonl` and empties the pending
//! log. Runs out-of-band (cron, the `archiver` binary); the server never
//! calls it.
//!
//! # Buckets
//!
//! ```text
//! Event                               | Bucket
//! ------------------------------------|-----------------------
//! type = "error" (any family)         | errors
//! version_control, type push          | github.push
//! version_control, type pull_request  | github.pull_request
//! version_control, type issue         | github.issue
//! version_control, type release       | github.release
//! version_control, anything else      | github.other
//! ci_cd                               | cicd
//! deploy                              | deploy
//! generic                             | other
//! ```
//!
//! Every event lands in exactly one bucket, so the bucket counts always sum
//! to the total.

use crate::event::{Event, Family, Priority};
use crate::pending_log::{LogEntry, PendingLog, PendingLogError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::json;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Inner width of the summary box, in characters.
const BOX_WIDTH: usize = 74;

/// Upper bound on `-N` suffixes tried when archive names collide.
const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    PendingLog(#[from] PendingLogError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no free archive file name for {0}")]
    NameExhausted(String),
}

/// Version-control bucket counts by event type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GithubCounts {
    pub push: usize,
    pub pull_request: usize,
    pub issue: usize,
    pub release: usize,
    pub other: usize,
}

impl GithubCounts {
    pub fn total(&self) -> usize {
        self.push + self.pull_request + self.issue + self.release + self.other
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketCounts {
    pub github: GithubCounts,
    pub cicd: usize,
    pub deploy: usize,
    pub errors: usize,
    pub other: usize,
    /// CI/CD events at high or critical priority
    pub cicd_failed: usize,
    /// Deploy events at high or critical priority
    pub deploy_failed: usize,
    /// Deploy events at normal priority
    pub deploy_succeeded: usize,
}

impl BucketCounts {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut counts = BucketCounts::default();
        for event in events {
            counts.add(event);
        }
        counts
    }

    fn add(&mut self, event: &Event) {
        if event.is_error() {
            self.errors += 1;
            return;
        }
        match event.family {
            Family::VersionControl => match event.kind.as_str() {
                "push" => self.github.push += 1,
                "pull_request" => self.github.pull_request += 1,
                "issue" => self.github.issue += 1,
                "release" => self.github.release += 1,
                _ => self.github.other += 1,
            },
            Family::CiCd => {
                self.cicd += 1;
                if event.priority.is_escalated() {
                    self.cicd_failed += 1;
                }
            }
            Family::Deploy => {
                self.deploy += 1;
                if event.priority.is_escalated() {
                    self.deploy_failed += 1;
                } else if event.priority == Priority::Normal {
                    self.deploy_succeeded += 1;
                }
            }
            Family::Generic => self.other += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.github.total() + self.cicd + self.deploy + self.errors + self.other
    }
}

/// Outcome of one archive pass.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    pub total: usize,
    pub groups: BucketCounts,
    pub summary: String,
    /// `None` when there was nothing to archive
    pub archive_path: Option<PathBuf>,
    /// Unparsable pending-log lines that were dropped
    pub skipped: usize,
}

impl ArchiveReport {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// The report as a generic-family `summary` event, for relaying.
    pub fn to_event(&self) -> Event {
        let failures = self.groups.cicd_failed + self.groups.deploy_failed;
        let priority = if failures > 0 || self.groups.errors > 0 {
            Priority::High
        } else {
            Priority::Normal
        };

        let details = json!({
            "total": self.total,
            "github": self.groups.github.total(),
            "cicd": self.groups.cicd,
            "deploy": self.groups.deploy,
            "errors": self.groups.errors,
            "other": self.groups.other,
            "failures": failures,
            "archive": self.archive_path.as_ref().map(|p| p.display().to_string()),
            "summary": self.summary,
        });

        Event::new(
            Family::Generic,
            "hookrelay",
            "summary",
            "Webhook events summary",
            format!("{} event(s) archived, {} failure(s)", self.total, failures),
        )
        .with_details(match details {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        })
        .with_priority(priority)
    }
}

/// Moves pending entries into timestamped archive files.
#[derive(Debug, Clone)]
pub struct Archiver {
    log: PendingLog,
    archive_dir: PathBuf,
}

impl Archiver {
    /// Archiver for the standard layout under `log_dir`.
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        let log_dir = log_dir.as_ref();
        Self {
            log: PendingLog::in_dir(log_dir),
            archive_dir: log_dir.join(crate::ARCHIVE_DIR),
        }
    }

    pub fn with_paths(log: PendingLog, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            log,
            archive_dir: archive_dir.into(),
        }
    }

    pub fn run(&self) -> Result<ArchiveReport, ArchiveError> {
        self.run_at(Utc::now())
    }

    /// One archive pass, naming the archive after `now`.
    pub fn run_at(&self, now: DateTime<Utc>) -> Result<ArchiveReport, ArchiveError> {
        info!(path = %self.log.path().display(), "Processing pending webhook events");

        let outcome = self.log.read_entries()?;
        if outcome.skipped > 0 {
            debug!(skipped = outcome.skipped, "Dropped unparsable pending log lines");
        }

        let entries = outcome.entries;
        if entries.is_empty() {
            info!("No pending events to process");
            return Ok(ArchiveReport {
                total: 0,
                groups: BucketCounts::default(),
                summary: "No pending events to process.".to_string(),
                archive_path: None,
                skipped: outcome.skipped,
            });
        }

        let groups = BucketCounts::from_events(entries.iter().map(|e| &e.event));
        let summary = render_summary(&groups, entries.len());

        let archive_path = self.write_archive(&entries, now)?;
        self.log.truncate()?;

        info!(
            total = entries.len(),
            archive = %archive_path.display(),
            "Archived pending events"
        );

        Ok(ArchiveReport {
            total: entries.len(),
            groups,
            summary,
            archive_path: Some(archive_path),
            skipped: outcome.skipped,
        })
    }

    fn write_archive(&self, entries: &[LogEntry], now: DateTime<Utc>) -> Result<PathBuf, ArchiveError> {
        std::fs::create_dir_all(&self.archive_dir).map_err(|source| ArchiveError::Io {
            path: self.archive_dir.clone(),
            source,
        })?;

        let mut contents = String::new();
        for entry in entries {
            contents.push_str(&serde_json::to_string(entry)?);
            contents.push('\n');
        }

        let stem = archive_stem(now);
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{}.jsonl", stem)
            } else {
                format!("{}-{}.jsonl", stem, attempt)
            };
            let path = self.archive_dir.join(name);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(ArchiveError::Io { path, source }),
            };
            file.write_all(contents.as_bytes())
                .and_then(|_| file.sync_all())
                .map_err(|source| ArchiveError::Io {
                    path: path.clone(),
                    source,
                })?;
            return Ok(path);
        }

        Err(ArchiveError::NameExhausted(stem))
    }
}

/// `events-2025-12-11T10-00-00-000Z`
fn archive_stem(now: DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("events-{}", stamp)
}

/// Render the boxed textual summary.
pub fn render_summary(groups: &BucketCounts, total: usize) -> String {
    let top = format!("╔{}╗", "═".repeat(BOX_WIDTH));
    let divider = format!("╠{}╣", "═".repeat(BOX_WIDTH));
    let bottom = format!("╚{}╝", "═".repeat(BOX_WIDTH));

    let mut lines = vec![
        top,
        row(&format!("{:^width$}", "WEBHOOK EVENTS SUMMARY", width = BOX_WIDTH - 2)),
        divider.clone(),
        row(&format!("Total Events: {}", total)),
    ];

    if groups.github.total() > 0 {
        lines.push(divider.clone());
        lines.push(row(&format!("GitHub Events: {}", groups.github.total())));
        lines.push(row(&format!("  Push:         {}", groups.github.push)));
        lines.push(row(&format!("  Pull Request: {}", groups.github.pull_request)));
        lines.push(row(&format!("  Issues:       {}", groups.github.issue)));
        lines.push(row(&format!("  Releases:     {}", groups.github.release)));
        if groups.github.other > 0 {
            lines.push(row(&format!("  Other:        {}", groups.github.other)));
        }
    }

    if groups.cicd > 0 {
        lines.push(divider.clone());
        lines.push(row(&format!("CI/CD Events: {}", groups.cicd)));
        if groups.cicd_failed > 0 {
            lines.push(row(&format!("  Failed/Warning: {}", groups.cicd_failed)));
        }
    }

    if groups.deploy > 0 {
        lines.push(divider.clone());
        lines.push(row(&format!("Deploy Events: {}", groups.deploy)));
        lines.push(row(&format!("  Successful: {}", groups.deploy_succeeded)));
        if groups.deploy_failed > 0 {
            lines.push(row(&format!("  Failed:     {}", groups.deploy_failed)));
        }
    }

    if groups.other > 0 {
        lines.push(divider.clone());
        lines.push(row(&format!("Other Events: {}", groups.other)));
    }

    if groups.errors > 0 {
        lines.push(divider);
        lines.push(row(&format!("Processing Errors: {}", groups.errors)));
    }

    lines.push(bottom);
    lines.join("\n")
}

/// One `║  text<pad>║` line.
fn row(text: &str) -> String {
    let used = text.chars().count() + 2;
    let pad = BOX_WIDTH.saturating_sub(used);
    format!("║  {}{}║", text, " ".repeat(pad))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event(family: Family, kind: &str, priority: Priority) -> Event {
        Event::new(family, "test", kind, "t", "m").with_priority(priority)
    }

    async fn seed(dir: &Path, events: &[Event]) {
        let log = PendingLog::in_dir(dir);
        for e in events {
            log.append(e).await.unwrap();
        }
    }

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-12-11T10:00:00.123Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_bucket_counts() {
        let events = vec![
            event(Family::VersionControl, "push", Priority::Normal),
            event(Family::VersionControl, "pull_request", Priority::High),
            event(Family::VersionControl, "issue", Priority::Normal),
            event(Family::VersionControl, "release", Priority::High),
            event(Family::VersionControl, "star", Priority::Low),
            event(Family::CiCd, "jenkins", Priority::High),
            event(Family::CiCd, "circleci", Priority::Normal),
            event(Family::Deploy, "vercel", Priority::Critical),
            event(Family::Deploy, "netlify", Priority::Normal),
            event(Family::Deploy, "error", Priority::Critical),
            event(Family::Generic, "summary", Priority::Normal),
        ];
        let counts = BucketCounts::from_events(&events);

        assert_eq!(counts.github.push, 1);
        assert_eq!(counts.github.other, 1);
        assert_eq!(counts.cicd, 2);
        assert_eq!(counts.cicd_failed, 1);
        assert_eq!(counts.deploy, 2);
        assert_eq!(counts.deploy_failed, 1);
        assert_eq!(counts.deploy_succeeded, 1);
        assert_eq!(counts.errors, 1);
        assert_eq!(counts.other, 1);
        assert_eq!(counts.total(), events.len());
    }

    #[test]
    fn test_archive_stem() {
        assert_eq!(archive_stem(at()), "events-2025-12-11T10-00-00-123Z");
    }

    #[test]
    fn test_summary_box_rows_have_equal_width() {
        let counts = BucketCounts {
            github: GithubCounts { push: 3, ..Default::default() },
            cicd: 2,
            cicd_failed: 1,
            errors: 1,
            ..Default::default()
        };
        let summary = render_summary(&counts, 6);
        let widths: Vec<usize> = summary.lines().map(|l| l.chars().count()).collect();
        assert!(widths.iter().all(|w| *w == BOX_WIDTH + 2), "{:?}", widths);
        assert!(summary.contains("Total Events: 6"));
        assert!(summary.contains("Failed/Warning: 1"));
        assert!(summary.contains("Processing Errors: 1"));
        assert!(!summary.contains("Deploy Events"));
    }

    #[tokio::test]
    async fn test_run_archives_and_truncates() {
        let dir = TempDir::new().unwrap();
        seed(
            dir.path(),
            &[
                event(Family::VersionControl, "push", Priority::Normal),
                event(Family::CiCd, "jenkins", Priority::High),
                event(Family::Deploy, "vercel", Priority::Critical),
            ],
        )
        .await;

        let report = Archiver::new(dir.path()).run_at(at()).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.groups.github.push, 1);
        assert_eq!(report.groups.cicd_failed, 1);
        assert_eq!(report.groups.deploy_failed, 1);

        let archive = report.archive_path.unwrap();
        assert_eq!(
            archive,
            dir.path().join("archive").join("events-2025-12-11T10-00-00-123Z.jsonl")
        );
        assert_eq!(std::fs::read_to_string(&archive).unwrap().lines().count(), 3);

        let pending = dir.path().join(crate::PENDING_LOG_FILE);
        assert_eq!(std::fs::read_to_string(pending).unwrap(), "");
    }

    #[test]
    fn test_empty_log_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let report = Archiver::new(dir.path()).run_at(at()).unwrap();
        assert!(report.is_empty());
        assert!(report.archive_path.is_none());
        assert!(!dir.path().join("archive").exists());
    }

    #[test]
    fn test_only_garbage_lines_leave_log_untouched() {
        let dir = TempDir::new().unwrap();
        let pending = dir.path().join(crate::PENDING_LOG_FILE);
        std::fs::write(&pending, "garbage\n{\"half\":\n").unwrap();

        let report = Archiver::new(dir.path()).run_at(at()).unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(std::fs::read_to_string(pending).unwrap(), "garbage\n{\"half\":\n");
    }

    #[tokio::test]
    async fn test_torn_line_is_skipped_not_fatal() {
        use std::io::Write;

        let dir = TempDir::new().unwrap();
        let log = PendingLog::in_dir(dir.path());
        log.append(&event(Family::VersionControl, "push", Priority::Normal))
            .await
            .unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .unwrap()
            .write_all(b"{\"message\":\"Deployment \xE2\x9D\n")
            .unwrap();
        log.append(&event(Family::CiCd, "jenkins", Priority::Normal))
            .await
            .unwrap();

        let report = Archiver::new(dir.path()).run_at(at()).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.groups.github.push, 1);
        assert_eq!(report.groups.cicd, 1);
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "");
    }

    #[tokio::test]
    async fn test_name_collision_gets_suffix() {
        let dir = TempDir::new().unwrap();
        let archiver = Archiver::new(dir.path());

        seed(dir.path(), &[event(Family::CiCd, "jenkins", Priority::Normal)]).await;
        let first = archiver.run_at(at()).unwrap().archive_path.unwrap();

        seed(dir.path(), &[event(Family::CiCd, "jenkins", Priority::Normal)]).await;
        let second = archiver.run_at(at()).unwrap().archive_path.unwrap();

        assert_ne!(first, second);
        assert!(second.to_string_lossy().ends_with("-123Z-1.jsonl"));
        assert_eq!(std::fs::read_to_string(first).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_report_to_event() {
        let dir = TempDir::new().unwrap();
        seed(
            dir.path(),
            &[
                event(Family::Deploy, "vercel", Priority::Critical),
                event(Family::Deploy, "vercel", Priority::Normal),
            ],
        )
        .await;

        let report = Archiver::new(dir.path()).run_at(at()).unwrap();
        let summary = report.to_event();
        assert_eq!(summary.family, Family::Generic);
        assert_eq!(summary.kind, "summary");
        assert_eq!(summary.priority, Priority::High);
        assert_eq!(summary.details["total"], 2);
        assert_eq!(summary.details["failures"], 1);
    }
}
