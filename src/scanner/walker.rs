//! Sequential directory walker for the version scanner.
//!
//! Depth-first, pre-order, children visited in name order so repeated scans of
//! the same tree see files in the same order. Each directory is listed once and
//! handed to the caller as a [`DirListing`] of its direct files.
//!
//! Safety invariants:
//! - Honors `follow_symlinks` during traversal
//! - Visits each canonical directory at most once when following symlinks
//! - Bounded by `max_depth`; directories past the limit are reported in
//!   [`WalkStats::depth_limited`] instead of being dropped silently

#![allow(missing_docs)]

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::errors::{JanitorError, Result};

/// Walker configuration derived from `VersionsConfig`.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    pub root: PathBuf,
    pub max_depth: usize,
    pub follow_symlinks: bool,
}

/// One directory reached by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub path: PathBuf,
    /// Root is depth 0.
    pub depth: usize,
    /// Names of the direct regular files, sorted. Kept as `OsString` so names
    /// that are not valid UTF-8 still reach the caller.
    pub files: Vec<OsString>,
}

impl DirListing {
    /// Final path component, or `None` for paths like `/`.
    pub fn basename(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Counters for a completed walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub directories: usize,
    pub files: usize,
    /// Directories not descended into because they sit at `max_depth`.
    pub depth_limited: Vec<PathBuf>,
}

/// Item on the explicit DFS stack: (directory_path, depth).
type WorkItem = (PathBuf, usize);

pub struct DirectoryWalker {
    config: WalkerConfig,
}

impl DirectoryWalker {
    pub fn new(config: WalkerConfig) -> Self {
        Self { config }
    }

    /// Walk the tree, calling `visitor` once per directory.
    ///
    /// Any IO failure (missing root, unreadable directory) aborts the walk; a
    /// partial listing would make "latest version" answers silently wrong.
    /// An error returned by `visitor` also aborts the walk.
    pub fn visit<F>(&self, mut visitor: F) -> Result<WalkStats>
    where
        F: FnMut(DirListing) -> Result<()>,
    {
        let root = &self.config.root;
        let meta = fs::metadata(root).map_err(|e| JanitorError::io(root, e))?;
        if !meta.is_dir() {
            return Err(JanitorError::NotADirectory { path: root.clone() });
        }

        let mut stats = WalkStats::default();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut stack: Vec<WorkItem> = vec![(root.clone(), 0)];

        while let Some((dir_path, depth)) = stack.pop() {
            if self.config.follow_symlinks {
                let canonical =
                    fs::canonicalize(&dir_path).map_err(|e| JanitorError::io(&dir_path, e))?;
                if !visited.insert(canonical) {
                    continue;
                }
            }

            let (listing, children) = self.process_directory(&dir_path, depth, &mut stats)?;
            stats.directories += 1;
            stats.files += listing.files.len();
            visitor(listing)?;

            // Reverse so the smallest name is popped first.
            for child in children.into_iter().rev() {
                stack.push((child, depth + 1));
            }
        }

        Ok(stats)
    }

    /// List one directory: its direct files, plus the child directories to descend into.
    fn process_directory(
        &self,
        dir_path: &Path,
        depth: usize,
        stats: &mut WalkStats,
    ) -> Result<(DirListing, Vec<PathBuf>)> {
        let entries = fs::read_dir(dir_path).map_err(|e| JanitorError::io(dir_path, e))?;

        let mut files = Vec::new();
        let mut children = Vec::new();

        for entry_result in entries {
            let entry = entry_result.map_err(|e| JanitorError::io(dir_path, e))?;
            let child_path = entry.path();
            let Ok(ft) = entry.file_type() else {
                continue;
            };

            // Symlinks: files count as files; directories only when following.
            let (is_file, is_dir) = if ft.is_symlink() {
                match fs::metadata(&child_path) {
                    Ok(target) => (target.is_file(), target.is_dir() && self.config.follow_symlinks),
                    // Dangling link.
                    Err(_) => (false, false),
                }
            } else {
                (ft.is_file(), ft.is_dir())
            };

            if is_file {
                files.push(entry.file_name());
            } else if is_dir && depth < self.config.max_depth {
                children.push(child_path);
            } else if is_dir {
                stats.depth_limited.push(child_path);
            }
        }

        files.sort();
        children.sort();

        Ok((
            DirListing {
                path: dir_path.to_path_buf(),
                depth,
                files,
            },
            children,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn test_config(root: &Path) -> WalkerConfig {
        WalkerConfig {
            root: root.to_path_buf(),
            max_depth: 10,
            follow_symlinks: false,
        }
    }

    fn walk(config: WalkerConfig) -> Result<Vec<DirListing>> {
        let mut out = Vec::new();
        DirectoryWalker::new(config).visit(|listing| {
            out.push(listing);
            Ok(())
        })?;
        Ok(out)
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn walks_simple_tree_in_name_order() {
        let tmp = TempDir::new().unwrap();

        // root/
        //   b/
        //     z.zip
        //   a/
        //     c/
        //   top.txt
        touch(&tmp.path().join("b").join("z.zip"));
        fs::create_dir_all(tmp.path().join("a").join("c")).unwrap();
        touch(&tmp.path().join("top.txt"));

        let listings = walk(test_config(tmp.path())).unwrap();

        let paths: Vec<_> = listings.iter().map(|l| l.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                tmp.path().to_path_buf(),
                tmp.path().join("a"),
                tmp.path().join("a").join("c"),
                tmp.path().join("b"),
            ]
        );
        assert_eq!(listings[0].files, vec!["top.txt"]);
        assert_eq!(listings[3].files, vec!["z.zip"]);
        assert_eq!(listings[2].depth, 2);
    }

    #[test]
    fn files_are_direct_children_only() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("nightlies").join("a-1.0.zip"));
        touch(&tmp.path().join("nightlies").join("old").join("a-0.9.zip"));

        let listings = walk(test_config(tmp.path())).unwrap();
        let nightlies = listings
            .iter()
            .find(|l| l.basename() == Some("nightlies"))
            .unwrap();
        assert_eq!(nightlies.files, vec!["a-1.0.zip"]);
    }

    #[test]
    fn respects_max_depth() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a").join("b").join("c")).unwrap();

        let mut config = test_config(tmp.path());
        config.max_depth = 1;
        let listings = walk(config).unwrap();

        let paths: Vec<_> = listings.iter().map(|l| l.path.clone()).collect();
        assert!(paths.contains(&tmp.path().join("a")));
        assert!(!paths.contains(&tmp.path().join("a").join("b")));
    }

    #[test]
    fn depth_limited_directories_are_reported() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a").join("b").join("c")).unwrap();
        fs::create_dir_all(tmp.path().join("a").join("d")).unwrap();

        let mut config = test_config(tmp.path());
        config.max_depth = 1;
        let stats = DirectoryWalker::new(config).visit(|_| Ok(())).unwrap();
        assert_eq!(stats.directories, 2);
        assert_eq!(
            stats.depth_limited,
            vec![tmp.path().join("a").join("b"), tmp.path().join("a").join("d")]
        );
    }

    #[test]
    fn stats_count_directories_and_files() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("x").join("1"));
        touch(&tmp.path().join("x").join("2"));
        touch(&tmp.path().join("y").join("3"));

        let stats = DirectoryWalker::new(test_config(tmp.path()))
            .visit(|_| Ok(()))
            .unwrap();
        assert_eq!(
            stats,
            WalkStats {
                directories: 3,
                files: 3,
                depth_limited: Vec::new(),
            }
        );
    }

    #[test]
    fn visitor_error_aborts_walk() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("a")).unwrap();
        fs::create_dir_all(tmp.path().join("b")).unwrap();

        let mut seen = 0;
        let result = DirectoryWalker::new(test_config(tmp.path())).visit(|_| {
            seen += 1;
            if seen == 2 {
                return Err(JanitorError::Runtime {
                    details: "stop".to_string(),
                });
            }
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(seen, 2);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = walk(test_config(&tmp.path().join("nope"))).unwrap_err();
        assert_eq!(err.code(), "DLJ-3002");
    }

    #[test]
    fn file_root_is_not_a_directory() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file.zip");
        touch(&file);
        let err = walk(test_config(&file)).unwrap_err();
        assert!(matches!(err, JanitorError::NotADirectory { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("a").join("ok.zip"));
        let locked = tmp.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores directory permissions; nothing to check there.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = walk(test_config(tmp.path()));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let err = result.unwrap_err();
        assert_eq!(err.code(), "DLJ-3002");
        assert!(err.to_string().contains("locked"), "{err}");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_file_names_are_listed_verbatim() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        let raw = OsStr::from_bytes(b"widget-\xff.zip");
        touch(&tmp.path().join(raw));

        let listings = walk(test_config(tmp.path())).unwrap();
        assert_eq!(listings[0].files, vec![raw.to_os_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn does_not_follow_symlinked_dirs_by_default() {
        let tmp = TempDir::new().unwrap();
        let real_dir = tmp.path().join("real");
        fs::create_dir_all(real_dir.join("nested")).unwrap();
        std::os::unix::fs::symlink(&real_dir, tmp.path().join("link")).unwrap();

        let listings = walk(test_config(tmp.path())).unwrap();
        let paths: Vec<_> = listings.iter().map(|l| l.path.clone()).collect();
        assert!(paths.contains(&real_dir));
        assert!(!paths.contains(&tmp.path().join("link")));
        // The symlinked directory is not reported as a file either.
        assert!(listings[0].files.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_files_are_listed() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("real.zip"));
        std::os::unix::fs::symlink(tmp.path().join("real.zip"), tmp.path().join("alias.zip"))
            .unwrap();
        std::os::unix::fs::symlink(tmp.path().join("gone"), tmp.path().join("dangling.zip"))
            .unwrap();

        let listings = walk(test_config(tmp.path())).unwrap();
        assert_eq!(listings[0].files, vec!["alias.zip", "real.zip"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loops_are_visited_once_when_following() {
        let tmp = TempDir::new().unwrap();
        let inner = tmp.path().join("a");
        fs::create_dir_all(&inner).unwrap();
        std::os::unix::fs::symlink(tmp.path(), inner.join("loop")).unwrap();

        let mut config = test_config(tmp.path());
        config.follow_symlinks = true;
        let listings = walk(config).unwrap();
        assert_eq!(listings.len(), 2);
    }
}
