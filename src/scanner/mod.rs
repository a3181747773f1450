//! Version scanner: directory walker, artifact filename parsing, version ordering.

pub mod artifact;
pub mod version;
pub mod versions;
pub mod walker;
