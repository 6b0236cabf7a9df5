//! Orchestrates scanning, filtering, token estimation and document generation
//! for one project root.

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use super::cache::{current_mtimes, should_regenerate, CacheEntry, MtimeStore};
use super::error::CoreError;
use super::formatter::format_output;
use super::ignore::{IgnoreRule, IgnoreRuleSet};
use super::matcher::MatchNothing;
use super::posix_string;
use super::tokens::TokenEstimator;
use super::walker::{ConcurrentWalker, WorkerPool};
use crate::config::AppConfig;
use crate::utils::file_detection::BinaryClassifier;

/// The partition of a project's files produced by one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Files that pass every ignore rule, sorted.
    pub included: Vec<PathBuf>,
    /// Files excluded by at least one rule, sorted.
    pub ignored: Vec<PathBuf>,
    /// Whether the path list came from the cache.
    pub cache_hit: bool,
}

/// A generated document plus its statistics.
#[derive(Debug, Clone)]
pub struct GeneratedContext {
    pub content: String,
    pub file_size: u64,
    pub line_count: usize,
    /// The selected files that made it into the document, relative to the root.
    pub selected: Vec<PathBuf>,
}

/// The root of an open project and its current ignore rules.
#[derive(Debug)]
pub struct ProjectContext {
    root: PathBuf,
    defaults: Vec<String>,
    rules: RwLock<Arc<IgnoreRuleSet>>,
}

impl ProjectContext {
    /// Opens `root`, which must be an existing directory.
    pub fn open(root: &Path, defaults: Vec<String>) -> Result<Self, CoreError> {
        if !root.is_dir() {
            return Err(CoreError::NotADirectory(root.to_path_buf()));
        }
        let root = root
            .canonicalize()
            .map_err(|e| CoreError::Io(e, root.to_path_buf()))?;
        let rules = IgnoreRuleSet::build_with_defaults(&root, &defaults);
        tracing::info!(
            "Opened project {} with {} ignore rules",
            root.display(),
            rules.rules().len()
        );
        Ok(Self {
            root,
            defaults,
            rules: RwLock::new(Arc::new(rules)),
        })
    }

    /// The canonical project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The current rules, rebuilt first if an ignore file changed on disk.
    pub fn rules(&self) -> Arc<IgnoreRuleSet> {
        {
            let current = self.rules.read().unwrap_or_else(PoisonError::into_inner);
            if !current.is_stale() {
                return Arc::clone(&current);
            }
        }

        let mut current = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if current.is_stale() {
            tracing::info!("Ignore files changed, reloading rules for {}", self.root.display());
            *current = Arc::new(IgnoreRuleSet::build_with_defaults(&self.root, &self.defaults));
        }
        Arc::clone(&current)
    }
}

/// The blocking entry point for everything a front end needs from one project.
pub struct ContextAssembler {
    project: ProjectContext,
    cache: Arc<dyn MtimeStore>,
    walker: ConcurrentWalker,
    classifier: BinaryClassifier,
    estimator: TokenEstimator,
}

impl std::fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("project", &self.project)
            .field("walker", &self.walker)
            .field("classifier", &self.classifier)
            .field("estimator", &self.estimator)
            .finish_non_exhaustive()
    }
}

impl ContextAssembler {
    /// Opens a project with the shared worker pool and settings from `config`.
    pub fn open(
        root: &Path,
        config: &AppConfig,
        cache: Arc<dyn MtimeStore>,
    ) -> Result<Self, CoreError> {
        let project = ProjectContext::open(root, config.default_ignore_patterns.clone())?;
        let walker = ConcurrentWalker::new(WorkerPool::shared(config.max_workers)?);
        let classifier = BinaryClassifier::new(config.binary_sniff_bytes);
        let estimator = if config.use_exact_tokenizer {
            TokenEstimator::new()
        } else {
            TokenEstimator::heuristic()
        }
        .with_max_read_bytes(config.max_token_read_bytes)
        .with_classifier(classifier);

        Ok(Self {
            project,
            cache,
            walker,
            classifier,
            estimator,
        })
    }

    pub fn with_walker(mut self, walker: ConcurrentWalker) -> Self {
        self.walker = walker;
        self
    }

    pub fn with_token_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn root(&self) -> &Path {
        self.project.root()
    }

    pub fn project(&self) -> &ProjectContext {
        &self.project
    }

    /// Splits every file under the root into included and ignored.
    ///
    /// The tree is always walked to detect changes. When nothing changed since
    /// the cached scan and `force` is false, the cached path list is
    /// reclassified against the current rules and the cache is not rewritten.
    pub fn scan(&self, force: bool) -> Result<ScanOutcome, CoreError> {
        let started = Instant::now();
        let root = self.project.root();

        let mut files: Vec<PathBuf> = self
            .walker
            .walk(root, Arc::new(MatchNothing))
            .into_iter()
            .filter(|entry| entry.is_file())
            .map(|entry| entry.path)
            .collect();
        files.sort();
        let mtimes = current_mtimes(root, &files);
        let rules = self.project.rules();

        if !force {
            if let Some(cached) = self.cache.load(root) {
                if !cached.has_unknown_mtimes() && !should_regenerate(&mtimes, &cached.mtimes) {
                    let paths: Vec<PathBuf> = cached.files.iter().map(PathBuf::from).collect();
                    let outcome = classify(&rules, paths, true);
                    tracing::info!(
                        "Scan of {} served from cache: {} included, {} ignored ({:?})",
                        root.display(),
                        outcome.included.len(),
                        outcome.ignored.len(),
                        started.elapsed()
                    );
                    return Ok(outcome);
                }
                tracing::debug!("Modification times changed for {}", root.display());
            }
        }

        let entry = CacheEntry {
            mtimes,
            files: files.iter().map(|file| posix_string(file)).collect(),
        };
        let outcome = classify(&rules, files, false);
        self.cache.save(root, entry);
        tracing::info!(
            "Scanned {}: {} included, {} ignored ({:?})",
            root.display(),
            outcome.included.len(),
            outcome.ignored.len(),
            started.elapsed()
        );
        Ok(outcome)
    }

    /// Token estimates keyed by the given paths, which may be relative to the
    /// root or absolute.
    pub fn estimate_tokens(&self, paths: &[PathBuf]) -> BTreeMap<PathBuf, usize> {
        paths
            .iter()
            .map(|path| {
                let tokens = self.estimator.estimate_file(&self.project.root().join(path));
                (path.clone(), tokens)
            })
            .collect()
    }

    /// The first rule that excludes `path`, for diagnostics.
    pub fn explain_ignore(&self, path: &Path) -> Option<IgnoreRule> {
        self.project.rules().explain(path)
    }

    /// Builds the document for `selected`.
    ///
    /// Entries that are no longer files inside the root, or that are binary,
    /// are dropped. Fails with [`CoreError::NoValidSelection`] if none remain.
    pub fn generate(&self, selected: &[PathBuf]) -> Result<GeneratedContext, CoreError> {
        let started = Instant::now();
        let outcome = self.scan(false)?;

        let mut seen = HashSet::new();
        let valid: Vec<PathBuf> = selected
            .iter()
            .filter_map(|path| self.validate_selection(path))
            .filter(|relative| seen.insert(relative.clone()))
            .collect();
        if valid.is_empty() {
            tracing::warn!("No valid files selected for generation");
            return Err(CoreError::NoValidSelection);
        }

        let tokens = self.estimate_tokens(&outcome.included);
        let content = format_output(self.project.root(), &outcome.included, &valid, &tokens);
        let file_size = content.len() as u64;
        let line_count = content.lines().count();

        tracing::info!(
            "Generated document with {} files ({} bytes, {} lines) in {:?}",
            valid.len(),
            file_size,
            line_count,
            started.elapsed()
        );
        Ok(GeneratedContext {
            content,
            file_size,
            line_count,
            selected: valid,
        })
    }

    /// Maps a selected path to its root-relative form if it is still a text file.
    fn validate_selection(&self, path: &Path) -> Option<PathBuf> {
        let root = self.project.root();
        let relative = if path.is_absolute() {
            let stripped = path.strip_prefix(root).map(Path::to_path_buf).or_else(|_| {
                path.canonicalize()
                    .ok()
                    .and_then(|canonical| canonical.strip_prefix(root).ok().map(Path::to_path_buf))
                    .ok_or(())
            });
            match stripped {
                Ok(relative) => relative,
                Err(()) => {
                    tracing::warn!("Selected path {} is outside the project", path.display());
                    return None;
                }
            }
        } else if path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
        {
            path.components()
                .filter(|component| matches!(component, Component::Normal(_)))
                .collect()
        } else {
            tracing::warn!("Selected path {} escapes the project", path.display());
            return None;
        };

        let absolute = root.join(&relative);
        if !absolute
            .canonicalize()
            .is_ok_and(|canonical| canonical.starts_with(root))
        {
            tracing::warn!("Selected path {} resolves outside the project", relative.display());
            return None;
        }
        if !absolute.is_file() {
            tracing::warn!("Selected path {} is not a file, skipping", relative.display());
            return None;
        }
        if self.classifier.is_binary(&absolute) {
            tracing::warn!("Selected file {} is binary, skipping", relative.display());
            return None;
        }
        Some(relative)
    }
}

fn classify(rules: &IgnoreRuleSet, paths: Vec<PathBuf>, cache_hit: bool) -> ScanOutcome {
    let (mut ignored, mut included): (Vec<PathBuf>, Vec<PathBuf>) = paths
        .into_iter()
        .partition(|path| rules.is_ignored_relative(path, false));
    included.sort();
    ignored.sort();
    ScanOutcome {
        included,
        ignored,
        cache_hit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::ScanCache;
    use std::fs;
    use tempfile::TempDir;

    fn config() -> AppConfig {
        AppConfig {
            use_exact_tokenizer: false,
            max_workers: Some(2),
            ..AppConfig::default()
        }
    }

    fn project(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        dir
    }

    fn assembler(dir: &TempDir) -> ContextAssembler {
        ContextAssembler::open(dir.path(), &config(), Arc::new(ScanCache::in_memory())).unwrap()
    }

    #[test]
    fn test_open_rejects_non_directories() {
        let dir = project(&[("file.txt", "x")]);
        let err = ContextAssembler::open(
            &dir.path().join("file.txt"),
            &config(),
            Arc::new(ScanCache::in_memory()),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::NotADirectory(_)));
    }

    #[test]
    fn test_scan_partitions_files() {
        let dir = project(&[
            ("src/main.py", "print()"),
            ("node_modules/pkg/index.js", "x"),
            ("debug.log", "x"),
            (".git/HEAD", "ref"),
        ]);
        let outcome = assembler(&dir).scan(true).unwrap();

        assert_eq!(outcome.included, vec![PathBuf::from("src/main.py")]);
        assert!(outcome.ignored.contains(&PathBuf::from("node_modules/pkg/index.js")));
        assert!(outcome.ignored.contains(&PathBuf::from("debug.log")));
        assert!(outcome.ignored.contains(&PathBuf::from(".git/HEAD")));
        assert!(!outcome.cache_hit);
    }

    #[test]
    fn test_second_scan_is_served_from_cache() {
        let dir = project(&[("a.py", "x")]);
        let assembler = assembler(&dir);
        let first = assembler.scan(false).unwrap();
        let second = assembler.scan(false).unwrap();
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.included, second.included);
    }

    #[test]
    fn test_rules_reload_when_ignore_file_changes() {
        let dir = project(&[("a.py", "x"), ("b.py", "y")]);
        let assembler = assembler(&dir);
        assert_eq!(assembler.scan(false).unwrap().included.len(), 2);

        fs::write(dir.path().join(".llmignore"), "b.py\n").unwrap();
        let outcome = assembler.scan(false).unwrap();
        assert_eq!(outcome.included, vec![PathBuf::from("a.py")]);
        assert!(outcome.ignored.contains(&PathBuf::from("b.py")));
    }

    #[test]
    fn test_generate_filters_selection() {
        let dir = project(&[("a.py", "print('a')"), ("blob.unknown", "\0\0\0\0")]);
        let assembler = assembler(&dir);
        let selection = vec![
            PathBuf::from("a.py"),
            dir.path().join("a.py"),
            PathBuf::from("blob.unknown"),
            PathBuf::from("missing.py"),
        ];

        let generated = assembler.generate(&selection).unwrap();
        assert_eq!(generated.selected, vec![PathBuf::from("a.py")]);
        assert_eq!(generated.content.matches("--- File: a.py ---").count(), 1);
        assert_eq!(generated.file_size, generated.content.len() as u64);
        assert_eq!(generated.line_count, generated.content.lines().count());
    }

    #[test]
    fn test_generate_rejects_paths_escaping_the_root() {
        let outer = tempfile::tempdir().unwrap();
        fs::write(outer.path().join("secret.txt"), "TOP SECRET").unwrap();
        fs::create_dir_all(outer.path().join("project/src")).unwrap();
        fs::write(outer.path().join("project/a.py"), "print('a')").unwrap();
        let assembler = ContextAssembler::open(
            &outer.path().join("project"),
            &config(),
            Arc::new(ScanCache::in_memory()),
        )
        .unwrap();

        let selection = vec![
            PathBuf::from("../secret.txt"),
            PathBuf::from("src/../../secret.txt"),
            PathBuf::from("./a.py"),
        ];
        let generated = assembler.generate(&selection).unwrap();
        assert_eq!(generated.selected, vec![PathBuf::from("a.py")]);
        assert!(!generated.content.contains("TOP SECRET"));
        assert!(!generated.content.contains("--- File: secret.txt ---"));

        let escaping = [PathBuf::from("../secret.txt")];
        let err = assembler.generate(&escaping).unwrap_err();
        assert!(matches!(err, CoreError::NoValidSelection));
    }

    #[test]
    fn test_generate_without_valid_files() {
        let dir = project(&[("img.png", "x")]);
        let err = assembler(&dir).generate(&[PathBuf::from("img.png")]).unwrap_err();
        assert!(matches!(err, CoreError::NoValidSelection));
    }

    #[test]
    fn test_estimate_tokens_keys_by_input_path() {
        let dir = project(&[("a.py", "12345678")]);
        let tokens = assembler(&dir).estimate_tokens(&[PathBuf::from("a.py")]);
        assert_eq!(tokens[&PathBuf::from("a.py")], 2);
    }

    #[test]
    fn test_explain_ignore_reports_rule() {
        let dir = project(&[(".gitignore", "*.csv\n"), ("data.csv", "a,b")]);
        let rule = assembler(&dir).explain_ignore(Path::new("data.csv")).unwrap();
        assert_eq!(rule.display_source(), ".gitignore:1");
        assert_eq!(rule.pattern, "*.csv");
    }
}
