//! Parallel breadth-first directory traversal on a bounded worker pool.
//!
//! The coordinating thread owns a queue of absolute directory paths. While the
//! queue is non-empty and fewer than `max_workers` listings are in flight, it
//! hands one directory to the pool; each finished listing returns the entries
//! to keep and the subdirectories to enqueue. The walk ends once the queue is
//! empty and nothing is in flight. Discovery order is not deterministic.

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::VecDeque;
use std::fmt;
use std::fs::{self, DirEntry};
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, OnceLock};
use std::time::Instant;

use super::error::{CoreError, WalkError};
use super::matcher::PathMatcher;
use super::ScannedPath;

/// Environment variable that overrides the walker's worker count.
pub const MAX_WORKERS_ENV: &str = "DUMPCB_MAX_WORKERS";

static SHARED_POOL: OnceLock<Arc<WorkerPool>> = OnceLock::new();

/// Resolves the worker count: `DUMPCB_MAX_WORKERS`, then `configured`, then
/// the host's available parallelism. Invalid environment values fall back
/// with a warning.
pub fn resolve_max_workers(configured: Option<usize>) -> usize {
    let fallback = configured
        .filter(|workers| *workers >= 1)
        .unwrap_or_else(host_parallelism);

    match std::env::var(MAX_WORKERS_ENV) {
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(workers) if workers >= 1 => {
                tracing::info!("Using {}={} for the walker pool.", MAX_WORKERS_ENV, workers);
                workers
            }
            _ => {
                tracing::warn!(
                    "Invalid value for {}: '{}'. Using default: {}.",
                    MAX_WORKERS_ENV,
                    raw,
                    fallback
                );
                fallback
            }
        },
        Err(_) => fallback,
    }
}

fn host_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// A fixed-size pool of walk workers.
pub struct WorkerPool {
    pool: ThreadPool,
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Result<Self, CoreError> {
        let max_workers = max_workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|index| format!("dumpcb-walk-{index}"))
            .build()?;
        Ok(Self { pool, max_workers })
    }

    /// The process-wide pool, created on first use.
    ///
    /// `configured` only matters for the call that creates the pool.
    pub fn shared(configured: Option<usize>) -> Result<Arc<Self>, CoreError> {
        if let Some(pool) = SHARED_POOL.get() {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new(Self::new(resolve_max_workers(configured))?);
        Ok(Arc::clone(SHARED_POOL.get_or_init(|| pool)))
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("max_workers", &self.max_workers)
            .finish()
    }
}

/// Result of listing a single directory.
#[derive(Debug, Default)]
struct DirListing {
    entries: Vec<ScannedPath>,
    subdirs: Vec<PathBuf>,
}

/// Walks directory trees on a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct ConcurrentWalker {
    pool: Arc<WorkerPool>,
}

impl ConcurrentWalker {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    pub fn max_workers(&self) -> usize {
        self.pool.max_workers
    }

    /// Returns every path below `root` that `matcher` does not exclude,
    /// relative to `root`.
    ///
    /// Excluded directories are pruned without being listed. Listing failures
    /// are logged and count as empty directories. Must not be called from one
    /// of this walker's own pool threads.
    pub fn walk(&self, root: &Path, matcher: Arc<dyn PathMatcher>) -> Vec<ScannedPath> {
        let started = Instant::now();
        let root: Arc<Path> = Arc::from(root);
        let (tx, rx) = mpsc::channel::<DirListing>();

        let mut queue = VecDeque::from([root.to_path_buf()]);
        let mut in_flight = 0usize;
        let mut discovered = Vec::new();

        loop {
            while in_flight < self.pool.max_workers {
                let Some(dir) = queue.pop_front() else {
                    break;
                };
                let tx = tx.clone();
                let root = Arc::clone(&root);
                let matcher = Arc::clone(&matcher);
                self.pool.pool.spawn(move || {
                    let listing = panic::catch_unwind(AssertUnwindSafe(|| {
                        list_directory(&root, &dir, matcher.as_ref())
                    }))
                    .unwrap_or_else(|_| {
                        tracing::error!("{}", WalkError::Panicked(dir.clone()));
                        DirListing::default()
                    });
                    // The receiver outlives every in-flight listing.
                    let _ = tx.send(listing);
                });
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }

            match rx.recv() {
                Ok(listing) => {
                    in_flight -= 1;
                    discovered.extend(listing.entries);
                    queue.extend(listing.subdirs);
                }
                Err(_) => break,
            }
        }

        tracing::debug!(
            "Walk of {} found {} entries in {:?}",
            root.display(),
            discovered.len(),
            started.elapsed()
        );
        discovered
    }
}

fn list_directory(root: &Path, dir: &Path, matcher: &dyn PathMatcher) -> DirListing {
    let mut listing = DirListing::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) => {
            tracing::warn!(
                "{}",
                WalkError::ReadDir {
                    path: dir.to_path_buf(),
                    source,
                }
            );
            return listing;
        }
    };

    for entry in entries {
        let classified = entry
            .map_err(|source| WalkError::Entry {
                path: dir.to_path_buf(),
                source,
            })
            .and_then(|entry| classify_entry(root, &entry, matcher));

        match classified {
            Ok(Some(Classified::Directory(absolute, relative))) => {
                listing.entries.push(ScannedPath::directory(relative));
                listing.subdirs.push(absolute);
            }
            Ok(Some(Classified::File(relative))) => {
                listing.entries.push(ScannedPath::file(relative));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("{}", e),
        }
    }

    listing
}

enum Classified {
    Directory(PathBuf, PathBuf),
    File(PathBuf),
}

fn classify_entry(
    root: &Path,
    entry: &DirEntry,
    matcher: &dyn PathMatcher,
) -> Result<Option<Classified>, WalkError> {
    let absolute = entry.path();
    let file_type = entry.file_type().map_err(|source| WalkError::Entry {
        path: absolute.clone(),
        source,
    })?;
    let Ok(relative) = absolute.strip_prefix(root).map(Path::to_path_buf) else {
        return Ok(None);
    };

    if file_type.is_dir() {
        if matcher.is_excluded(&relative, true) {
            tracing::debug!("Pruning directory and contents: {}/", relative.display());
            return Ok(None);
        }
        if matcher.is_excluded(&relative, false) {
            return Ok(None);
        }
        return Ok(Some(Classified::Directory(absolute, relative)));
    }

    if matcher.is_excluded(&relative, false) {
        tracing::debug!("Ignoring entry: {}", relative.display());
        return Ok(None);
    }
    if file_type.is_file() {
        Ok(Some(Classified::File(relative)))
    } else {
        // Symlinks and special files are not followed.
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matcher::{MatchNothing, PatternMatcher};
    use serial_test::serial;
    use std::collections::HashSet;

    fn create_tree(root: &Path, files: &[&str]) {
        for file in files {
            let path = root.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "content").unwrap();
        }
    }

    fn files_of(paths: &[ScannedPath]) -> HashSet<String> {
        paths
            .iter()
            .filter(|p| p.is_file())
            .map(|p| crate::core::posix_string(&p.path))
            .collect()
    }

    fn walker(workers: usize) -> ConcurrentWalker {
        ConcurrentWalker::new(Arc::new(WorkerPool::new(workers).unwrap()))
    }

    #[test]
    fn test_walk_discovers_nested_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        create_tree(
            dir.path(),
            &["a.txt", "src/main.rs", "src/core/mod.rs", "docs/deep/er/x.md"],
        );
        fs::create_dir(dir.path().join("empty")).unwrap();

        let found = walker(4).walk(dir.path(), Arc::new(MatchNothing));

        assert_eq!(
            files_of(&found),
            HashSet::from(
                ["a.txt", "src/main.rs", "src/core/mod.rs", "docs/deep/er/x.md"]
                    .map(String::from)
            )
        );
        let dirs: HashSet<_> = found
            .iter()
            .filter(|p| p.is_dir())
            .map(|p| crate::core::posix_string(&p.path))
            .collect();
        assert!(dirs.contains("empty"));
        assert!(dirs.contains("docs/deep/er"));
        assert!(found.iter().all(|p| p.path.is_relative()));
    }

    #[test]
    fn test_walk_prunes_excluded_directories_and_drops_excluded_files() {
        let dir = tempfile::tempdir().unwrap();
        create_tree(
            dir.path(),
            &["keep.rs", "skip.log", "node_modules/pkg/index.js", "src/app.rs"],
        );
        let matcher = PatternMatcher::compile(["node_modules/", "*.log"]);

        let found = walker(2).walk(dir.path(), Arc::new(matcher));

        assert_eq!(
            files_of(&found),
            HashSet::from(["keep.rs", "src/app.rs"].map(String::from))
        );
        assert!(!found
            .iter()
            .any(|p| p.path.starts_with("node_modules")));
    }

    #[test]
    fn test_single_worker_walk_matches_parallel_walk() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<String> = (0..40)
            .map(|i| format!("d{}/sub{}/f{}.txt", i % 5, i % 3, i))
            .collect();
        let refs: Vec<&str> = files.iter().map(String::as_str).collect();
        create_tree(dir.path(), &refs);

        let serial = walker(1).walk(dir.path(), Arc::new(MatchNothing));
        let parallel = walker(8).walk(dir.path(), Arc::new(MatchNothing));

        assert_eq!(files_of(&serial), files_of(&parallel));
        assert_eq!(files_of(&serial).len(), 40);
    }

    #[test]
    fn test_missing_root_yields_no_entries() {
        let dir = tempfile::tempdir().unwrap();
        let found = walker(2).walk(&dir.path().join("gone"), Arc::new(MatchNothing));
        assert!(found.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;
        if crate::utils::test_helpers::running_as_root() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        create_tree(dir.path(), &["ok.txt", "locked/secret.txt"]);
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let found = walker(2).walk(dir.path(), Arc::new(MatchNothing));

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(files_of(&found), HashSet::from(["ok.txt".to_string()]));
    }

    #[test]
    #[serial]
    fn test_env_override_sets_worker_count() {
        std::env::set_var(MAX_WORKERS_ENV, "3");
        assert_eq!(resolve_max_workers(Some(7)), 3);
        std::env::remove_var(MAX_WORKERS_ENV);
    }

    #[test]
    #[serial]
    fn test_invalid_env_values_fall_back() {
        for raw in ["zero", "0", "-2", ""] {
            std::env::set_var(MAX_WORKERS_ENV, raw);
            assert_eq!(resolve_max_workers(Some(5)), 5, "value {raw:?}");
            assert!(resolve_max_workers(None) >= 1);
        }
        std::env::remove_var(MAX_WORKERS_ENV);
    }

    #[test]
    #[serial]
    fn test_configured_value_used_without_env() {
        std::env::remove_var(MAX_WORKERS_ENV);
        assert_eq!(resolve_max_workers(Some(6)), 6);
        assert_eq!(resolve_max_workers(Some(0)), host_parallelism());
    }

    #[test]
    fn test_pool_size_is_at_least_one() {
        assert_eq!(WorkerPool::new(0).unwrap().max_workers(), 1);
    }
}
