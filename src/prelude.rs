//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use downloads_janitor::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, MalformedPolicy};
pub use crate::core::errors::{JanitorError, Result};

// Logger
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};

// Scanner
pub use crate::scanner::artifact::ArtifactName;
pub use crate::scanner::version::ReleaseVersion;
pub use crate::scanner::versions::{ChannelMap, ScanReport, VersionEntry, VersionScanner};
pub use crate::scanner::walker::{DirectoryWalker, WalkerConfig};

// Retention
pub use crate::retention::glob::{FilenamePattern, split_patterns};
pub use crate::retention::pruner::{PruneConfig, PruneReport, RetentionPruner};
