//! User feedback records for Style Warden.
//!
//! Feedback is a user's judgment on a surfaced candidate: was the flag a real
//! violation or not. Entries are appended as JSON lines to one file per day
//! and read back in bulk by the reliability tuner. Feedback files are
//! append-only; a malformed line is skipped on read, never fatal.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::candidate::ContentType;

/// Extension of feedback batch files.
pub const FEEDBACK_FILE_EXTENSION: &str = "jsonl";

/// Errors writing or locating feedback files.
#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("Feedback directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize feedback entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Type of judgment a user gave.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum FeedbackType {
    /// The flag was a genuine violation.
    Correct,
    /// The flag was a false positive.
    Incorrect,
    /// The user could not tell.
    Unclear,
    /// Any other label; counted toward totals only.
    Other,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Correct => "correct",
            FeedbackType::Incorrect => "incorrect",
            FeedbackType::Unclear => "unclear",
            FeedbackType::Other => "other",
        }
    }
}

impl From<String> for FeedbackType {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "correct" | "accepted" => FeedbackType::Correct,
            "incorrect" | "rejected" | "false_positive" => FeedbackType::Incorrect,
            "unclear" => FeedbackType::Unclear,
            _ => FeedbackType::Other,
        }
    }
}

impl std::fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user judgment on a surfaced candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackEntry {
    /// Unique identifier for this feedback entry.
    #[serde(default = "generate_id")]
    pub feedback_id: String,
    /// Session the feedback came from.
    #[serde(default)]
    pub session_id: String,
    /// Rule category of the judged candidate.
    #[serde(alias = "error_type")]
    pub category: String,
    /// The user's judgment.
    pub feedback_type: FeedbackType,
    /// Evidence score the candidate had when it was surfaced.
    pub confidence_score: f64,
    /// Optional free-text reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_reason: Option<String>,
    /// When the feedback was given.
    pub timestamp: DateTime<Utc>,
    /// The flagged text, used for term-level feedback memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flagged_text: Option<String>,
    /// Content type of the document the candidate came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

impl FeedbackEntry {
    /// Creates a new feedback entry stamped with the current time.
    pub fn new(
        category: impl Into<String>,
        feedback_type: FeedbackType,
        confidence_score: f64,
    ) -> Self {
        Self {
            feedback_id: generate_id(),
            session_id: String::new(),
            category: category.into(),
            feedback_type,
            confidence_score,
            user_reason: None,
            timestamp: Utc::now(),
            flagged_text: None,
            content_type: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.user_reason = Some(reason.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_flagged_text(mut self, text: impl Into<String>) -> Self {
        self.flagged_text = Some(text.into());
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Checks the fields a parsed line must satisfy to be usable.
    fn validate(&self) -> Result<(), String> {
        if self.category.trim().is_empty() {
            return Err("empty category".to_string());
        }
        if !self.confidence_score.is_finite() || !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(format!(
                "confidence_score {} outside [0, 1]",
                self.confidence_score
            ));
        }
        Ok(())
    }
}

/// A record that could not be used.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub path: PathBuf,
    /// 1-based line number.
    pub line: usize,
    pub reason: String,
}

/// Entries read from one or more feedback files.
#[derive(Debug, Clone, Default)]
pub struct FeedbackBatch {
    pub entries: Vec<FeedbackEntry>,
    pub skipped: Vec<SkippedRecord>,
    /// Files that were read successfully.
    pub files_read: usize,
    /// Files that could not be opened.
    pub unreadable: Vec<PathBuf>,
}

impl FeedbackBatch {
    /// Drops entries older than `cutoff`, returning how many were removed.
    pub fn retain_since(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.timestamp >= cutoff);
        before - self.entries.len()
    }

    /// Drops entries older than `days` before `now`.
    ///
    /// A window reaching past the earliest representable time keeps every entry.
    pub fn retain_lookback(&mut self, days: u32, now: DateTime<Utc>) -> usize {
        match now.checked_sub_signed(Duration::days(i64::from(days))) {
            Some(cutoff) => self.retain_since(cutoff),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads feedback entries from JSON-lines files.
///
/// Blank lines are ignored. Lines that fail to parse or validate are
/// recorded in [`FeedbackBatch::skipped`] and logged; unreadable files are
/// recorded in [`FeedbackBatch::unreadable`]. Neither aborts the batch.
#[instrument(skip(paths), fields(files = paths.len()))]
pub fn load_feedback<P: AsRef<Path>>(paths: &[P]) -> FeedbackBatch {
    let mut batch = FeedbackBatch::default();

    for path in paths {
        let path = path.as_ref();
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot open feedback file");
                batch.unreadable.push(path.to_path_buf());
                continue;
            }
        };
        batch.files_read += 1;

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line_no = index + 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    skip(&mut batch, path, line_no, format!("read error: {e}"));
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<FeedbackEntry>(&line) {
                Ok(entry) => match entry.validate() {
                    Ok(()) => batch.entries.push(entry),
                    Err(reason) => skip(&mut batch, path, line_no, reason),
                },
                Err(e) => skip(&mut batch, path, line_no, e.to_string()),
            }
        }
    }

    debug!(
        entries = batch.entries.len(),
        skipped = batch.skipped.len(),
        "Feedback loaded"
    );
    batch
}

fn skip(batch: &mut FeedbackBatch, path: &Path, line: usize, reason: String) {
    warn!(path = %path.display(), line, reason = %reason, "Skipping malformed feedback record");
    batch.skipped.push(SkippedRecord {
        path: path.to_path_buf(),
        line,
        reason,
    });
}

/// Lists feedback batch files in a directory, sorted by name.
pub fn discover_feedback_files(dir: &Path) -> Result<Vec<PathBuf>, FeedbackError> {
    if !dir.is_dir() {
        return Err(FeedbackError::DirectoryNotFound(dir.to_path_buf()));
    }

    let read_dir = std::fs::read_dir(dir).map_err(|source| FeedbackError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| p.extension().is_some_and(|ext| ext == FEEDBACK_FILE_EXTENSION))
        .collect();
    files.sort();
    Ok(files)
}

/// File name holding feedback for a given day.
pub fn feedback_file_name(date: NaiveDate) -> String {
    format!("feedback_{}.{}", date.format("%Y-%m-%d"), FEEDBACK_FILE_EXTENSION)
}

/// Appends feedback entries to daily JSON-lines files.
#[derive(Debug)]
pub struct FeedbackLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FeedbackLog {
    /// Creates a log writing into `dir`; the directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends one entry to the file for the entry's day, returning its path.
    pub fn append(&self, entry: &FeedbackEntry) -> Result<PathBuf, FeedbackError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let path = self
            .dir
            .join(feedback_file_name(entry.timestamp.date_naive()));

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        std::fs::create_dir_all(&self.dir).map_err(|source| FeedbackError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| FeedbackError::Io {
                path: path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .map_err(|source| FeedbackError::Io {
                path: path.clone(),
                source,
            })?;

        debug!(
            path = %path.display(),
            category = %entry.category,
            feedback_type = %entry.feedback_type,
            "Feedback recorded"
        );
        Ok(path)
    }
}
