#![forbid(unsafe_code)]

//! Downloads Janitor (dlj): housekeeping for a software-download server.
//!
//! Two jobs:
//! 1. **Version scanner**: walk the downloads tree and report the newest
//!    artifact per project in each release channel (`nightlies`, `bleeding`)
//! 2. **Retention pruner**: keep the N most recently modified files per glob
//!    pattern in a directory and delete the rest
//!
//! # Library usage
//!
//! ```rust,no_run
//! use downloads_janitor::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use downloads_janitor::core::config::Config;
//! use downloads_janitor::retention::pruner::{PruneConfig, RetentionPruner};
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod retention;
pub mod scanner;
