//! Retention pruner: keep the N newest files per pattern, delete the rest.
//!
//! Pipeline per pattern: list directory -> match name -> stat -> sort by mtime
//! desc -> keep first N -> delete remainder -> log results.
//!
//! Patterns are processed in order and each one re-lists the directory, so a
//! file already removed under an earlier pattern is not seen by a later one.
//! A failed deletion is recorded and the pass continues, unless
//! `stop_on_error` is set, in which case the whole pass stops there.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::core::errors::{JanitorError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::retention::glob::FilenamePattern;

// ──────────────────── configuration ────────────────────

/// Files kept per pattern when the caller does not say.
pub const DEFAULT_MAX_FILES: usize = 5;

/// Knobs for one pruning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneConfig {
    /// Files to keep per pattern.
    pub max_files: usize,
    /// Stop the whole pass at the first failed deletion.
    pub stop_on_error: bool,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            stop_on_error: false,
        }
    }
}

// ──────────────────── retention set ────────────────────

/// One matching file with the metadata the pruner sorts and reports on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionCandidate {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size_bytes: u64,
}

/// Files matching one pattern, newest first.
#[derive(Debug, Clone)]
pub struct RetentionSet {
    pub pattern: String,
    files: Vec<RetentionCandidate>,
}

impl RetentionSet {
    /// Order candidates newest first; equal mtimes fall back to path, descending.
    pub fn new(pattern: impl Into<String>, mut files: Vec<RetentionCandidate>) -> Self {
        files.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.path.cmp(&a.path))
        });
        Self {
            pattern: pattern.into(),
            files,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[RetentionCandidate] {
        &self.files
    }

    /// The `max_files` newest entries.
    pub fn kept(&self, max_files: usize) -> &[RetentionCandidate] {
        &self.files[..max_files.min(self.files.len())]
    }

    /// Everything past the first `max_files`.
    pub fn expired(&self, max_files: usize) -> &[RetentionCandidate] {
        &self.files[max_files.min(self.files.len())..]
    }
}

// ──────────────────── report types ────────────────────

/// Per-pattern counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternOutcome {
    pub pattern: String,
    pub matched: usize,
    pub kept: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// A single failed deletion.
#[derive(Debug, Clone, Serialize)]
pub struct DeletionFailure {
    pub path: PathBuf,
    pub pattern: String,
    pub error: String,
    pub error_code: String,
}

/// Summary of one pruning pass.
#[derive(Debug, Clone, Serialize)]
pub struct PruneReport {
    pub dir: PathBuf,
    pub max_files: usize,
    pub patterns: Vec<PatternOutcome>,
    pub files_deleted: usize,
    pub files_failed: usize,
    pub bytes_freed: u64,
    pub failures: Vec<DeletionFailure>,
    /// True when `stop_on_error` cut the pass short.
    pub stopped_early: bool,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl PruneReport {
    pub fn new(dir: impl Into<PathBuf>, max_files: usize) -> Self {
        Self {
            dir: dir.into(),
            max_files,
            patterns: Vec::new(),
            files_deleted: 0,
            files_failed: 0,
            bytes_freed: 0,
            failures: Vec::new(),
            stopped_early: false,
            duration: Duration::ZERO,
        }
    }

    /// No deletion failed.
    pub fn is_clean(&self) -> bool {
        self.files_failed == 0
    }
}

#[allow(clippy::cast_possible_truncation)]
fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

// ──────────────────── pruner ────────────────────

pub struct RetentionPruner {
    dir: PathBuf,
    patterns: Vec<FilenamePattern>,
    config: PruneConfig,
    logger: Option<ActivityLoggerHandle>,
}

impl RetentionPruner {
    /// Compile `patterns` up front so a bad pattern fails before anything is deleted.
    pub fn new<S: AsRef<str>>(
        dir: impl Into<PathBuf>,
        patterns: &[S],
        config: PruneConfig,
        logger: Option<ActivityLoggerHandle>,
    ) -> Result<Self> {
        if patterns.is_empty() {
            return Err(JanitorError::Usage {
                details: "at least one file pattern is required".to_string(),
            });
        }
        let patterns = patterns
            .iter()
            .map(|p| FilenamePattern::compile(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            dir: dir.into(),
            patterns,
            config,
            logger,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> PruneConfig {
        self.config
    }

    /// Run every pattern in order and report what happened.
    ///
    /// Only a missing or unlistable directory is an error; deletion failures
    /// land in the report.
    pub fn prune(&self) -> Result<PruneReport> {
        let start = Instant::now();
        self.ensure_directory()?;

        let mut report = PruneReport::new(&self.dir, self.config.max_files);
        for pattern in &self.patterns {
            let set = self.retention_set(pattern)?;
            if !self.apply(&set, &mut report) {
                report.stopped_early = true;
                break;
            }
        }

        report.duration = start.elapsed();
        Ok(report)
    }

    /// List the directory and collect the files `pattern` matches.
    ///
    /// Files that vanish or cannot be stat'ed between listing and stat are dropped.
    pub fn retention_set(&self, pattern: &FilenamePattern) -> Result<RetentionSet> {
        let entries = fs::read_dir(&self.dir).map_err(|e| JanitorError::io(&self.dir, e))?;
        let mut files = Vec::new();

        for entry_result in entries {
            let entry = entry_result.map_err(|e| JanitorError::io(&self.dir, e))?;
            // Names that are not UTF-8 match through their lossy form; the
            // real path is what gets deleted.
            if !pattern.is_match(&entry.file_name().to_string_lossy()) {
                continue;
            }

            let path = entry.path();
            // Follows symlinks: a link to a file is pruned by its target's mtime.
            let Ok(meta) = fs::metadata(&path) else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let Ok(modified) = meta.modified() else {
                continue;
            };
            files.push(RetentionCandidate {
                path,
                modified,
                size_bytes: meta.len(),
            });
        }

        Ok(RetentionSet::new(pattern.as_str(), files))
    }

    /// Delete the expired part of `set`, recording the outcome in `report`.
    ///
    /// Returns false when the pass should stop (strict mode hit a failure).
    pub fn apply(&self, set: &RetentionSet, report: &mut PruneReport) -> bool {
        let max_files = self.config.max_files;
        let mut outcome = PatternOutcome {
            pattern: set.pattern.clone(),
            matched: set.len(),
            kept: set.kept(max_files).len(),
            deleted: 0,
            failed: 0,
        };
        let mut keep_going = true;

        for candidate in set.expired(max_files) {
            match fs::remove_file(&candidate.path) {
                Ok(()) => {
                    outcome.deleted += 1;
                    report.files_deleted += 1;
                    report.bytes_freed = report.bytes_freed.saturating_add(candidate.size_bytes);
                    self.log_event(ActivityEvent::FileDeleted {
                        path: candidate.path.to_string_lossy().into_owned(),
                        pattern: set.pattern.clone(),
                        size_bytes: candidate.size_bytes,
                        modified: format_mtime(candidate.modified),
                    });
                }
                Err(source) => {
                    let err = JanitorError::io(&candidate.path, source);
                    outcome.failed += 1;
                    report.files_failed += 1;
                    self.log_event(ActivityEvent::DeletionFailed {
                        path: candidate.path.to_string_lossy().into_owned(),
                        pattern: set.pattern.clone(),
                        error_code: err.code().to_string(),
                        error_message: err.to_string(),
                    });
                    report.failures.push(DeletionFailure {
                        path: candidate.path.clone(),
                        pattern: set.pattern.clone(),
                        error: err.to_string(),
                        error_code: err.code().to_string(),
                    });
                    if self.config.stop_on_error {
                        keep_going = false;
                        break;
                    }
                }
            }
        }

        self.log_event(ActivityEvent::PatternPruned {
            dir: self.dir.to_string_lossy().into_owned(),
            pattern: outcome.pattern.clone(),
            matched: outcome.matched,
            kept: outcome.kept,
            deleted: outcome.deleted,
            failed: outcome.failed,
        });
        report.patterns.push(outcome);
        keep_going
    }

    fn ensure_directory(&self) -> Result<()> {
        let meta = fs::metadata(&self.dir).map_err(|e| JanitorError::io(&self.dir, e))?;
        if !meta.is_dir() {
            return Err(JanitorError::NotADirectory {
                path: self.dir.clone(),
            });
        }
        Ok(())
    }

    fn log_event(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

fn format_mtime(mtime: SystemTime) -> String {
    DateTime::<Utc>::from(mtime).to_rfc3339_opts(SecondsFormat::Millis, true)
}
