//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::{JanitorError, Result};

/// Full downloads-janitor configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub versions: VersionsConfig,
    pub paths: PathsConfig,
}

/// What the version scanner does with a filename it cannot split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Skip the file, report it, keep scanning.
    #[default]
    Skip,
    /// Fail the whole scan with the offending filename.
    Abort,
}

impl fmt::Display for MalformedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skip => "skip",
            Self::Abort => "abort",
        })
    }
}

impl FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(format!("expected \"skip\" or \"abort\", got {other:?}")),
        }
    }
}

/// Version scanner inputs: where to look and what counts as an artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VersionsConfig {
    pub downloads_dir: PathBuf,
    /// Directory basenames treated as release channels.
    pub channels: Vec<String>,
    /// Artifact suffixes in priority order; the first match wins.
    pub extensions: Vec<String>,
    /// Version suffixes stripped before comparison.
    pub interpreter_tags: Vec<String>,
    pub on_malformed: MalformedPolicy,
    pub follow_symlinks: bool,
    /// Directories nested deeper than this below `downloads_dir` are not
    /// scanned; each one cut off is reported as a warning.
    pub max_depth: usize,
}

/// Filesystem paths used by dlj.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub activity_log: PathBuf,
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from("/var/www/review-board.org/htdocs/downloads"),
            channels: vec!["nightlies".to_string(), "bleeding".to_string()],
            extensions: [".egg", ".tar.gz", ".zip", ".exe"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            interpreter_tags: ["-py2.4", "-py2.5", "-py2.6"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            on_malformed: MalformedPolicy::Skip,
            follow_symlinks: false,
            max_depth: 32,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[DLJ-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("dlj").join("config.toml"),
            activity_log: home_dir
                .join(".local")
                .join("share")
                .join("dlj")
                .join("activity.jsonl"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| JanitorError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(JanitorError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the activity log.
    ///
    /// FNV-1a over canonical JSON so the value is stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("DLJ_DOWNLOADS_DIR") {
            self.versions.downloads_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("DLJ_CHANNELS") {
            self.versions.channels = split_list(&raw);
        }
        if let Some(raw) = lookup("DLJ_EXTENSIONS") {
            self.versions.extensions = split_list(&raw);
        }
        if let Some(raw) = lookup("DLJ_ON_MALFORMED") {
            self.versions.on_malformed =
                raw.parse().map_err(|details| JanitorError::ConfigParse {
                    context: "env",
                    details: format!("DLJ_ON_MALFORMED={raw:?}: {details}"),
                })?;
        }
        if let Some(raw) = lookup("DLJ_MAX_DEPTH") {
            self.versions.max_depth = parse_env("DLJ_MAX_DEPTH", &raw)?;
        }
        if let Some(raw) = lookup("DLJ_FOLLOW_SYMLINKS") {
            self.versions.follow_symlinks = parse_env("DLJ_FOLLOW_SYMLINKS", &raw)?;
        }
        if let Some(raw) = lookup("DLJ_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }
        Ok(())
    }

    /// Normalize paths and list entries for consistent comparison.
    fn normalize_paths(&mut self) {
        let dir = self.versions.downloads_dir.to_string_lossy();
        if dir.len() > 1
            && let Some(stripped) = dir.strip_suffix('/')
        {
            self.versions.downloads_dir = PathBuf::from(stripped);
        }

        for channel in &mut self.versions.channels {
            let trimmed = channel.trim().trim_end_matches('/');
            *channel = trimmed.to_string();
        }
        for ext in &mut self.versions.extensions {
            *ext = ext.trim().to_string();
        }
    }

    /// Check invariants the scanner and pruner rely on.
    pub fn validate(&self) -> Result<()> {
        let versions = &self.versions;

        if versions.channels.is_empty() {
            return Err(JanitorError::InvalidConfig {
                details: "versions.channels must name at least one channel".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for channel in &versions.channels {
            if channel.is_empty() || channel.contains('/') {
                return Err(JanitorError::InvalidConfig {
                    details: format!("versions.channels entry {channel:?} is not a basename"),
                });
            }
            if !seen.insert(channel.as_str()) {
                return Err(JanitorError::InvalidConfig {
                    details: format!("versions.channels lists {channel:?} twice"),
                });
            }
        }

        if versions.extensions.is_empty() {
            return Err(JanitorError::InvalidConfig {
                details: "versions.extensions must name at least one extension".to_string(),
            });
        }
        for ext in &versions.extensions {
            if ext.len() < 2 || !ext.starts_with('.') {
                return Err(JanitorError::InvalidConfig {
                    details: format!("versions.extensions entry {ext:?} must look like \".zip\""),
                });
            }
        }

        for tag in &versions.interpreter_tags {
            if tag.len() < 2 || !tag.starts_with('-') {
                return Err(JanitorError::InvalidConfig {
                    details: format!(
                        "versions.interpreter_tags entry {tag:?} must look like \"-py2.6\""
                    ),
                });
            }
        }

        if versions.max_depth == 0 {
            return Err(JanitorError::InvalidConfig {
                details: "versions.max_depth must be >= 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Split a comma-separated override into trimmed, non-empty items.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| JanitorError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

#[cfg(test)]
mod tests {
    use super::{Config, JanitorError, MalformedPolicy};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.versions.max_depth, 32);
        assert_eq!(cfg.versions.channels, vec!["nightlies", "bleeding"]);
        assert_eq!(cfg.versions.extensions[0], ".egg");
    }

    #[test]
    fn empty_channels_rejected() {
        let mut cfg = Config::default();
        cfg.versions.channels.clear();
        let err = cfg.validate().expect_err("expected channel error");
        assert!(err.to_string().contains("versions.channels"));
    }

    #[test]
    fn duplicate_channels_rejected() {
        let mut cfg = Config::default();
        cfg.versions.channels.push("nightlies".to_string());
        let err = cfg.validate().expect_err("expected duplicate error");
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn extension_without_dot_rejected() {
        let mut cfg = Config::default();
        cfg.versions.extensions = vec!["zip".to_string()];
        let err = cfg.validate().expect_err("expected extension error");
        assert!(err.to_string().contains("versions.extensions"));
    }

    #[test]
    fn interpreter_tag_without_dash_rejected() {
        let mut cfg = Config::default();
        cfg.versions.interpreter_tags = vec!["py2.7".to_string()];
        let err = cfg.validate().expect_err("expected tag error");
        assert!(err.to_string().contains("interpreter_tags"));
    }

    #[test]
    fn zero_max_depth_rejected() {
        let mut cfg = Config::default();
        cfg.versions.max_depth = 0;
        let err = cfg.validate().expect_err("expected depth error");
        assert!(err.to_string().contains("max_depth"));
    }

    #[test]
    fn env_overrides_replace_lists_and_scalars() {
        let mut cfg = Config::default();
        let overrides = vars(&[
            ("DLJ_DOWNLOADS_DIR", "/srv/downloads"),
            ("DLJ_CHANNELS", "nightlies, bleeding ,beta,"),
            ("DLJ_EXTENSIONS", ".whl,.tar.gz"),
            ("DLJ_ON_MALFORMED", "Abort"),
            ("DLJ_MAX_DEPTH", "9"),
            ("DLJ_FOLLOW_SYMLINKS", "true"),
        ]);

        cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect("env overrides should parse");

        assert_eq!(cfg.versions.downloads_dir, PathBuf::from("/srv/downloads"));
        assert_eq!(cfg.versions.channels, vec!["nightlies", "bleeding", "beta"]);
        assert_eq!(cfg.versions.extensions, vec![".whl", ".tar.gz"]);
        assert_eq!(cfg.versions.on_malformed, MalformedPolicy::Abort);
        assert_eq!(cfg.versions.max_depth, 9);
        assert!(cfg.versions.follow_symlinks);
    }

    #[test]
    fn env_invalid_number_rejected() {
        let mut cfg = Config::default();
        let overrides = vars(&[("DLJ_MAX_DEPTH", "-1")]);

        let err = cfg
            .apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect_err("negative count should fail");
        match err {
            JanitorError::ConfigParse { context, details } => {
                assert_eq!(context, "env");
                assert!(details.contains("DLJ_MAX_DEPTH"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn env_invalid_malformed_policy_rejected() {
        let mut cfg = Config::default();
        let overrides = vars(&[("DLJ_ON_MALFORMED", "ignore")]);
        let err = cfg
            .apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect_err("unknown policy should fail");
        assert!(err.to_string().contains("DLJ_ON_MALFORMED"));
    }

    #[test]
    fn normalize_paths_trims_trailing_slashes_and_keeps_root() {
        let mut cfg = Config::default();
        cfg.versions.downloads_dir = PathBuf::from("/srv/downloads/");
        cfg.versions.channels = vec![" nightlies/".to_string()];
        cfg.normalize_paths();
        assert_eq!(cfg.versions.downloads_dir, PathBuf::from("/srv/downloads"));
        assert_eq!(cfg.versions.channels, vec!["nightlies"]);

        cfg.versions.downloads_dir = PathBuf::from("/");
        cfg.normalize_paths();
        assert_eq!(cfg.versions.downloads_dir, PathBuf::from("/"));
    }

    #[test]
    fn toml_sections_parse_with_defaults_for_missing_keys() {
        let raw = r#"
            [versions]
            downloads_dir = "/srv/dl"
            on_malformed = "abort"

            [paths]
            activity_log = "/var/log/dlj/activity.jsonl"
        "#;
        let cfg: Config = toml::from_str(raw).expect("valid toml");
        assert_eq!(cfg.versions.downloads_dir, PathBuf::from("/srv/dl"));
        assert_eq!(cfg.versions.on_malformed, MalformedPolicy::Abort);
        assert_eq!(cfg.versions.channels.len(), 2);
        assert_eq!(cfg.paths.activity_log, PathBuf::from("/var/log/dlj/activity.jsonl"));
        assert_eq!(cfg.versions.max_depth, 32);
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[versions]\nmax_depth = 2\n").unwrap();
        let cfg = Config::load(Some(&path)).expect("load");
        assert_eq!(cfg.versions.max_depth, 2);
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let result = Config::load(Some(Path::new("/nonexistent/dlj/config.toml")));
        assert!(matches!(result, Err(JanitorError::MissingConfig { .. })));
    }

    #[test]
    fn stable_hash_changes_when_config_changes() {
        let cfg = Config::default();
        let before = cfg.stable_hash().expect("hash should compute");
        let mut modified = Config::default();
        modified.versions.max_depth += 1;
        let after = modified.stable_hash().expect("hash should compute");
        assert_ne!(before, after);
        assert_eq!(before, cfg.stable_hash().expect("hash"));
    }
}
