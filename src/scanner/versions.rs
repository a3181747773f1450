//! Version scanner: latest artifact per (channel, project) under a downloads tree.
//!
//! Pipeline: walk -> keep directories whose basename is a channel -> match
//! artifact extension -> parse `project-version` -> fold into [`ChannelMap`].
//!
//! The fold keeps, per channel and project, the entry with the highest
//! [`ReleaseVersion`]. A candidate that is not strictly greater than the held
//! entry is discarded, so at equal versions the first file seen wins.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};

use crate::core::config::{MalformedPolicy, VersionsConfig};
use crate::core::errors::{JanitorError, Result};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::scanner::artifact::{ArtifactName, match_extension};
use crate::scanner::version::ReleaseVersion;
use crate::scanner::walker::{DirectoryWalker, WalkerConfig};

/// Best-known artifact for one project in one channel.
#[derive(Debug, Clone, Serialize)]
pub struct VersionEntry {
    #[serde(skip)]
    pub project: String,
    pub version: String,
    pub filename: String,
    #[serde(skip)]
    parsed: ReleaseVersion,
}

impl VersionEntry {
    /// Parsed form of `version`.
    pub fn release(&self) -> &ReleaseVersion {
        &self.parsed
    }
}

impl PartialEq for VersionEntry {
    fn eq(&self, other: &Self) -> bool {
        self.project == other.project
            && self.version == other.version
            && self.filename == other.filename
    }
}

impl Eq for VersionEntry {}

/// `channel -> project -> VersionEntry`, ordered for stable rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChannelMap {
    channels: BTreeMap<String, BTreeMap<String, VersionEntry>>,
}

impl ChannelMap {
    /// Empty map with every channel present as a key.
    pub fn with_channels<S: AsRef<str>>(channels: &[S]) -> Self {
        Self {
            channels: channels
                .iter()
                .map(|c| (c.as_ref().to_string(), BTreeMap::new()))
                .collect(),
        }
    }

    /// Fold a sequence of `(channel, candidate)` observations into a map.
    pub fn from_candidates<S, I>(channels: &[S], candidates: I) -> Self
    where
        S: AsRef<str>,
        I: IntoIterator<Item = (String, ArtifactName)>,
    {
        candidates
            .into_iter()
            .fold(Self::with_channels(channels), |map, (channel, candidate)| {
                map.fold_candidate(&channel, candidate)
            })
    }

    /// Pure form of [`Self::observe`].
    #[must_use]
    pub fn fold_candidate(mut self, channel: &str, candidate: ArtifactName) -> Self {
        self.observe(channel, candidate);
        self
    }

    /// Offer a candidate; returns true when it became the channel's entry for its project.
    pub fn observe(&mut self, channel: &str, candidate: ArtifactName) -> bool {
        let parsed = ReleaseVersion::parse(&candidate.version);
        let projects = self.channels.entry(channel.to_string()).or_default();

        if let Some(existing) = projects.get(&candidate.project)
            && existing.parsed >= parsed
        {
            return false;
        }

        projects.insert(
            candidate.project.clone(),
            VersionEntry {
                project: candidate.project,
                version: candidate.version,
                filename: candidate.filename,
                parsed,
            },
        );
        true
    }

    pub fn get(&self, channel: &str, project: &str) -> Option<&VersionEntry> {
        self.channels.get(channel)?.get(project)
    }

    pub fn channel(&self, channel: &str) -> Option<&BTreeMap<String, VersionEntry>> {
        self.channels.get(channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, VersionEntry>)> {
        self.channels.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of (channel, project) entries.
    pub fn entry_count(&self) -> usize {
        self.channels.values().map(BTreeMap::len).sum()
    }
}

/// A file that looked like an artifact but could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedArtifact {
    pub path: PathBuf,
    pub error_code: String,
    pub reason: String,
}

/// Result of one scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub root: PathBuf,
    pub channels: ChannelMap,
    pub skipped: Vec<SkippedArtifact>,
    pub directories_walked: usize,
    pub files_inspected: usize,
    /// Files in channel directories with a recognized extension.
    pub artifacts_considered: usize,
    /// Directories at `max_depth` whose contents were not scanned.
    pub depth_limited: Vec<PathBuf>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

#[allow(clippy::cast_possible_truncation)]
fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Walks a downloads tree and reports the latest version per channel and project.
pub struct VersionScanner {
    config: VersionsConfig,
    logger: Option<ActivityLoggerHandle>,
}

impl VersionScanner {
    /// Create a scanner with the given config and optional logger handle.
    pub fn new(config: VersionsConfig, logger: Option<ActivityLoggerHandle>) -> Self {
        Self { config, logger }
    }

    /// Scan a different root than `config.downloads_dir`.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.downloads_dir = root.into();
        self
    }

    pub fn root(&self) -> &std::path::Path {
        &self.config.downloads_dir
    }

    /// Walk the tree and build the channel map.
    ///
    /// Walk failures are fatal. Malformed artifact names are skipped or fatal
    /// according to `on_malformed`.
    pub fn scan(&self) -> Result<ScanReport> {
        let start = Instant::now();
        let config = &self.config;
        let walker = DirectoryWalker::new(WalkerConfig {
            root: config.downloads_dir.clone(),
            max_depth: config.max_depth,
            follow_symlinks: config.follow_symlinks,
        });

        let channel_names: HashSet<&str> = config.channels.iter().map(String::as_str).collect();
        let mut map = ChannelMap::with_channels(&config.channels);
        let mut skipped = Vec::new();
        let mut considered = 0usize;

        let stats = walker.visit(|listing| {
            let Some(channel) = listing.basename().filter(|b| channel_names.contains(b)) else {
                return Ok(());
            };

            for file in &listing.files {
                let lossy = file.to_string_lossy();
                let Some(ext) = match_extension(&lossy, &config.extensions) else {
                    continue;
                };
                considered += 1;

                let parsed = match file.to_str() {
                    Some(filename) => {
                        ArtifactName::parse(&listing.path, filename, ext, &config.interpreter_tags)
                    }
                    None => Err(JanitorError::MalformedArtifact {
                        filename: lossy.to_string(),
                        dir: listing.path.clone(),
                        reason: "filename is not valid UTF-8".to_string(),
                    }),
                };
                match parsed {
                    Ok(candidate) => {
                        map.observe(channel, candidate);
                    }
                    Err(err) if config.on_malformed == MalformedPolicy::Abort => return Err(err),
                    Err(err) => {
                        let skip = SkippedArtifact {
                            path: listing.path.join(file),
                            error_code: err.code().to_string(),
                            reason: err.to_string(),
                        };
                        self.log_event(ActivityEvent::ArtifactSkipped {
                            path: skip.path.to_string_lossy().into_owned(),
                            error_code: skip.error_code.clone(),
                            reason: skip.reason.clone(),
                        });
                        skipped.push(skip);
                    }
                }
            }
            Ok(())
        })?;

        let report = ScanReport {
            root: config.downloads_dir.clone(),
            channels: map,
            skipped,
            directories_walked: stats.directories,
            files_inspected: stats.files,
            artifacts_considered: considered,
            depth_limited: stats.depth_limited,
            duration: start.elapsed(),
        };

        #[allow(clippy::cast_possible_truncation)]
        self.log_event(ActivityEvent::ScanCompleted {
            root: report.root.to_string_lossy().into_owned(),
            directories_walked: report.directories_walked,
            files_inspected: report.files_inspected,
            projects_found: report.channels.entry_count(),
            artifacts_skipped: report.skipped.len(),
            depth_limited: report.depth_limited.len(),
            duration_ms: report.duration.as_millis() as u64,
        });

        Ok(report)
    }

    fn log_event(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}
