//! Gitignore-style pattern matching over project-relative paths.
//!
//! Patterns follow gitignore glob syntax: `*`, `**`, `?`, bracket classes,
//! anchored (`/` prefix) and directory-only (trailing `/`) patterns, and `!`
//! negation with last-match-wins semantics. A path is also excluded when any
//! of its parent directories is, so a file below `build/` matches `build/`.
//! An excluded parent wins over a negation of the path itself, as in git.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// Decides whether a project-relative path is excluded.
///
/// This is the seam the directory walker consumes: a real ignore rule set
/// for a filtered walk, or [`MatchNothing`] for the unfiltered discovery pass.
pub trait PathMatcher: Send + Sync {
    /// Returns `true` if `relative` is excluded. `is_dir` selects whether
    /// directory-only patterns may apply.
    fn is_excluded(&self, relative: &Path, is_dir: bool) -> bool;
}

/// A matcher that never excludes anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchNothing;

impl PathMatcher for MatchNothing {
    fn is_excluded(&self, _relative: &Path, _is_dir: bool) -> bool {
        false
    }
}

/// A compiled set of gitignore-style patterns.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    inner: Gitignore,
    accepted: usize,
    skipped: usize,
}

impl PatternMatcher {
    /// Compiles `patterns` in order.
    ///
    /// Blank lines and `#` comments are skipped. Lines that cannot be parsed
    /// are dropped with a warning; compilation itself never fails.
    pub fn compile<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GitignoreBuilder::new("");
        let mut accepted = 0;
        let mut skipped = 0;

        for pattern in patterns {
            let trimmed = pattern.as_ref().trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match builder.add_line(None, trimmed) {
                Ok(_) => accepted += 1,
                Err(e) => {
                    tracing::warn!("Skipping malformed ignore pattern '{}': {}", trimmed, e);
                    skipped += 1;
                }
            }
        }

        let inner = builder.build().unwrap_or_else(|e| {
            tracing::error!("Failed to build matcher from patterns: {}", e);
            Gitignore::empty()
        });

        Self {
            inner,
            accepted,
            skipped,
        }
    }

    /// Tests a posix-style relative path.
    ///
    /// A trailing `/` marks the candidate as a directory, so both
    /// `matches("out/", false)` and `matches("out", true)` test the directory form.
    pub fn matches(&self, relative: &str, is_dir: bool) -> bool {
        match relative.strip_suffix('/') {
            Some(stripped) => self.is_excluded(Path::new(stripped), true),
            None => self.is_excluded(Path::new(relative), is_dir),
        }
    }

    /// Number of patterns that compiled successfully.
    pub fn pattern_count(&self) -> usize {
        self.accepted
    }

    /// Number of malformed lines that were dropped.
    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.accepted == 0
    }
}

impl PathMatcher for PatternMatcher {
    fn is_excluded(&self, relative: &Path, is_dir: bool) -> bool {
        if relative.has_root() {
            tracing::warn!(
                "Pattern matching expects a project-relative path, got {}",
                relative.display()
            );
            return false;
        }
        let components: Vec<_> = relative.components().collect();
        let mut ancestor = PathBuf::new();
        for component in &components[..components.len().saturating_sub(1)] {
            ancestor.push(component);
            if self.inner.matched(&ancestor, true).is_ignore() {
                return true;
            }
        }
        self.inner.matched(relative, is_dir).is_ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_unanchored_glob_matches_at_any_depth() {
        let matcher = PatternMatcher::compile(["*.log"]);
        assert!(matcher.matches("server.log", false));
        assert!(matcher.matches("deep/nested/server.log", false));
        assert!(!matcher.matches("server.log.txt", false));
    }

    #[test]
    fn test_anchored_pattern_only_matches_at_root() {
        let matcher = PatternMatcher::compile(["/build"]);
        assert!(matcher.matches("build", true));
        assert!(matcher.matches("build/output.txt", false));
        assert!(!matcher.matches("src/build", true));
    }

    #[test]
    fn test_directory_only_pattern_needs_directory_form() {
        let matcher = PatternMatcher::compile(["out/"]);
        assert!(matcher.matches("out/", false));
        assert!(matcher.matches("out", true));
        assert!(!matcher.matches("out", false));
        // Contents are excluded through the parent directory.
        assert!(matcher.matches("out/report.txt", false));
    }

    #[test]
    fn test_double_star_question_mark_and_classes() {
        let matcher = PatternMatcher::compile(["**/cache/*.bin", "file?.txt", "[ab].md"]);
        assert!(matcher.matches("a/b/cache/blob.bin", false));
        assert!(matcher.matches("file1.txt", false));
        assert!(!matcher.matches("file10.txt", false));
        assert!(matcher.matches("a.md", false));
        assert!(!matcher.matches("c.md", false));
    }

    #[test]
    fn test_negation_follows_last_match() {
        let negated = PatternMatcher::compile(["*.log", "!keep.log"]);
        assert!(negated.matches("drop.log", false));
        assert!(!negated.matches("keep.log", false));

        let re_excluded = PatternMatcher::compile(["*.log", "!keep.log", "keep.log"]);
        assert!(re_excluded.matches("keep.log", false));
    }

    #[test]
    fn test_negation_cannot_reinclude_below_excluded_directory() {
        let matcher = PatternMatcher::compile(["out/", "!out/keep.txt"]);
        assert!(matcher.matches("out", true));
        assert!(matcher.matches("out/keep.txt", false));
        assert!(matcher.matches("out/nested/keep.txt", false));

        let files_only = PatternMatcher::compile(["out/*", "!out/keep.txt"]);
        assert!(!files_only.matches("out/keep.txt", false));
        assert!(files_only.matches("out/other.txt", false));
    }

    #[test]
    fn test_comments_and_blank_lines_are_not_patterns() {
        let matcher = PatternMatcher::compile(["", "   ", "# a comment", "*.tmp"]);
        assert_eq!(matcher.pattern_count(), 1);
        assert!(matcher.matches("x.tmp", false));
    }

    #[test]
    #[traced_test]
    fn test_malformed_pattern_is_skipped_with_warning() {
        let matcher = PatternMatcher::compile(["{a,b", "*.tmp"]);
        assert_eq!(matcher.skipped_count(), 1);
        assert_eq!(matcher.pattern_count(), 1);
        assert!(matcher.matches("x.tmp", false));
        assert!(!matcher.matches("{a,b", false));
        assert!(logs_contain("Skipping malformed ignore pattern"));
    }

    #[test]
    fn test_absolute_paths_are_never_matched() {
        let matcher = PatternMatcher::compile(["*.rs"]);
        assert!(!matcher.is_excluded(Path::new("/abs/main.rs"), false));
    }

    #[test]
    fn test_match_nothing_never_excludes() {
        assert!(!MatchNothing.is_excluded(Path::new(".git"), true));
        assert!(!MatchNothing.is_excluded(Path::new("anything.png"), false));
    }
}
