pub mod assembler;
pub mod cache;
pub mod error;
pub mod file_handler;
pub mod formatter;
pub mod ignore;
pub mod matcher;
pub mod tokens;
pub mod tree_generator;
pub mod walker;

use std::path::{Component, Path, PathBuf};

/// Whether a discovered path is a regular file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// A path relative to the project root, as produced by one walk.
///
/// Directories are kept so a front end can render empty folders; only files
/// ever take part in content inclusion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScannedPath {
    pub path: PathBuf,
    pub kind: EntryKind,
}

impl ScannedPath {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Renders a relative path with `/` separators regardless of platform.
///
/// This is the form used for cache keys and document headers.
pub fn posix_string(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub use assembler::{ContextAssembler, GeneratedContext, ProjectContext, ScanOutcome};
pub use cache::{CacheEntry, MtimeStore, ScanCache};
pub use error::CoreError;
pub use file_handler::FileHandler;
pub use ignore::{IgnoreRule, IgnoreRuleSet, RuleSource};
pub use matcher::{MatchNothing, PathMatcher, PatternMatcher};
pub use tokens::TokenEstimator;
pub use tree_generator::TreeGenerator;
pub use walker::{ConcurrentWalker, WorkerPool};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posix_string_joins_with_forward_slashes() {
        let path: PathBuf = ["src", "core", "mod.rs"].iter().collect();
        assert_eq!(posix_string(&path), "src/core/mod.rs");
    }

    #[test]
    fn test_posix_string_drops_current_dir_markers() {
        assert_eq!(posix_string(Path::new("./a/b.txt")), "a/b.txt");
    }
}
