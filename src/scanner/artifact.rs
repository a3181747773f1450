//! Release-artifact filename parsing: `project-version[-pyX.Y].ext`.

#![allow(missing_docs)]

use std::path::Path;

use crate::core::errors::{JanitorError, Result};

/// Separator between project name and version.
pub const PROJECT_SEPARATOR: char = '-';

/// Project name and version pulled out of an artifact filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub project: String,
    pub version: String,
    pub filename: String,
    /// The extension that matched, e.g. `.tar.gz`.
    pub extension: String,
}

impl ArtifactName {
    /// Split `filename` into project and version.
    ///
    /// `extension` must already be known to be a suffix of `filename`
    /// (see [`match_extension`]). The project is everything before the
    /// first `-`; the version is the rest minus the extension, with one
    /// interpreter tag from `tags` stripped.
    pub fn parse(dir: &Path, filename: &str, extension: &str, tags: &[String]) -> Result<Self> {
        let malformed = |reason: &str| JanitorError::MalformedArtifact {
            filename: filename.to_string(),
            dir: dir.to_path_buf(),
            reason: reason.to_string(),
        };

        let stem = filename
            .strip_suffix(extension)
            .ok_or_else(|| malformed("extension does not match"))?;
        let (project, rest) = stem
            .split_once(PROJECT_SEPARATOR)
            .ok_or_else(|| malformed("no '-' between project and version"))?;
        if project.is_empty() {
            return Err(malformed("empty project name"));
        }

        let version = strip_interpreter_tag(rest, tags);
        if version.is_empty() {
            return Err(malformed("empty version"));
        }

        Ok(Self {
            project: project.to_string(),
            version: version.to_string(),
            filename: filename.to_string(),
            extension: extension.to_string(),
        })
    }
}

/// First extension in `extensions` that `filename` ends with.
///
/// Order matters: with `[".gz", ".tar.gz"]` a tarball matches `.gz`.
pub fn match_extension<'a>(filename: &str, extensions: &'a [String]) -> Option<&'a str> {
    extensions
        .iter()
        .map(String::as_str)
        .find(|ext| filename.len() > ext.len() && filename.ends_with(ext))
}

/// Remove one trailing interpreter tag (`-py2.6`) from a version string.
///
/// Only exact suffixes from `tags` are removed, so a version that merely ends
/// in similar characters (`1.0-py2.60`) is left alone.
pub fn strip_interpreter_tag<'a>(version: &'a str, tags: &[String]) -> &'a str {
    tags.iter()
        .find_map(|tag| version.strip_suffix(tag.as_str()))
        .unwrap_or(version)
}
