//! Retention pruning: filename globs and the keep-newest-N pruner.

pub mod glob;
pub mod pruner;
