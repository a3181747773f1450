//! Release-version ordering for artifact version strings.
//!
//! Versions the download server publishes follow Python packaging rules
//! (`1.2.10`, `1.0rc1`, `2.0b3`, `1.5.post2`, `1.6.dev4`, `1.0+local`); those are
//! parsed and ordered by [`pep440_rs::Version`]. Anything it rejects
//! (`2.0-py2.7`, `1.5-nightly`) is kept as a *legacy* version: its leading
//! numeric release still takes part in the comparison, and the remaining text
//! only breaks ties, so `2.0-py2.7` is newer than `1.0`.

#![allow(missing_docs)]

use std::str::FromStr;

use pep440_rs::Version;

/// Everything after the release numbers. At equal release a legacy version
/// sorts below a standard one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Detail {
    Legacy(String),
    Standard(Version),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey {
    epoch: u64,
    /// Release segments with trailing zeros removed, so `1.0 == 1.0.0`.
    release: Vec<u64>,
    detail: Detail,
}

/// A parsed, totally ordered release version.
///
/// Equality and ordering use the parsed key, not the raw text:
/// `"1.0" == "1.0.0"` and `"1.0RC1" == "1.0rc1"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReleaseVersion {
    key: SortKey,
}

impl ReleaseVersion {
    /// Parse a version string. Never fails; unparseable input becomes a legacy version.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let key = match Version::from_str(trimmed) {
            Ok(version) => SortKey {
                epoch: version.epoch(),
                release: trim_zeros(version.release().iter().copied().collect()),
                detail: Detail::Standard(version),
            },
            Err(_) => {
                let lowered = trimmed.to_ascii_lowercase();
                SortKey {
                    epoch: 0,
                    release: trim_zeros(leading_release(&lowered)),
                    detail: Detail::Legacy(lowered),
                }
            }
        };
        Self { key }
    }
}

/// Dotted numbers at the start of a legacy string: `2.0.0-20100101-git` → `[2, 0, 0]`.
fn leading_release(lowered: &str) -> Vec<u64> {
    let body = lowered.strip_prefix('v').unwrap_or(lowered);
    let mut release = Vec::new();
    for part in body.split('.') {
        let digits = part.bytes().take_while(u8::is_ascii_digit).count();
        let Ok(n) = part[..digits].parse::<u64>() else {
            break;
        };
        release.push(n);
        if digits < part.len() {
            break;
        }
    }
    release
}

fn trim_zeros(mut release: Vec<u64>) -> Vec<u64> {
    while release.last() == Some(&0) {
        release.pop();
    }
    release
}
