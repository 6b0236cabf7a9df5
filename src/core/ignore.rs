//! Ignore rules loaded from built-in defaults, `.gitignore` and `.llmignore`.
//!
//! Rules are kept in load order (defaults, then `.gitignore` by line, then
//! `.llmignore` by line). Inclusion decisions use the union of all patterns;
//! [`IgnoreRuleSet::explain`] reports the first rule in load order that matches.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use super::matcher::{PathMatcher, PatternMatcher};

pub const GITIGNORE_FILE: &str = ".gitignore";
pub const LLMIGNORE_FILE: &str = ".llmignore";

/// Name of the version-control metadata directory that is always ignored at the root.
const VCS_DIR: &str = ".git";

/// Built-in default patterns, applied before any project ignore file.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // Git specific
    ".git/",
    ".gitignore",
    ".gitattributes",
    ".gitmodules",
    // Python specific
    "__pycache__/",
    "*.pyc",
    "*.pyo",
    "*.pyd",
    ".Python",
    "build/",
    "develop-eggs/",
    "dist/",
    "downloads/",
    "eggs/",
    ".eggs/",
    "lib/",
    "lib64/",
    "parts/",
    "sdist/",
    "var/",
    "wheels/",
    "share/python-wheels/",
    "*.egg-info/",
    ".installed.cfg",
    "*.egg",
    "MANIFEST",
    // Virtual environments
    "env/",
    "venv/",
    ".env/",
    ".venv/",
    "ENV/",
    "VENV/",
    ".direnv/",
    // IDE and editor specific
    ".vscode/",
    ".idea/",
    "*.suo",
    "*.ntvs*",
    "*.njsproj",
    "*.sln",
    "*.swp",
    "*~",
    // OS specific
    ".DS_Store",
    "Thumbs.db",
    // Dependency lock files
    "package-lock.json",
    "yarn.lock",
    "composer.lock",
    "Gemfile.lock",
    "Pipfile.lock",
    "poetry.lock",
    // CI and hosting metadata
    ".github/",
    ".gitlab-ci.yml",
    "firebase.json",
    "netlify.toml",
    ".firebaserc",
    // Other common ignores
    "node_modules/",
    "logs/",
    "*.log",
    "tmp/",
    "temp/",
    "*.tmp",
    ".llmignore",
    // C# / .NET
    "bin/",
    "obj/",
    ".vs/",
    "packages/",
    "TestResults/",
    "*.csproj.user",
    "*.nupkg",
    // Images
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.ico",
    "*.svg",
    // Generated Qt resource files
    "*resources_rc.py",
];

/// Where an ignore rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleSource {
    Default,
    GitIgnoreFile,
    CustomIgnoreFile,
}

impl RuleSource {
    pub fn label(&self) -> &'static str {
        match self {
            RuleSource::Default => "default",
            RuleSource::GitIgnoreFile => GITIGNORE_FILE,
            RuleSource::CustomIgnoreFile => LLMIGNORE_FILE,
        }
    }
}

/// A single ignore pattern together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreRule {
    pub pattern: String,
    pub source: RuleSource,
    /// 1-based line in the ignore file; `None` for built-in defaults.
    pub source_line: Option<usize>,
}

impl IgnoreRule {
    /// `default`, `.gitignore:3` or `.llmignore:12`.
    pub fn display_source(&self) -> String {
        match self.source_line {
            Some(line) => format!("{}:{}", self.source.label(), line),
            None => self.source.label().to_string(),
        }
    }
}

impl fmt::Display for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.pattern, self.display_source())
    }
}

/// Modification stamps of the ignore files a rule set was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceStamps {
    gitignore: Option<(SystemTime, u64)>,
    llmignore: Option<(SystemTime, u64)>,
}

impl SourceStamps {
    fn read(root: &Path) -> Self {
        Self {
            gitignore: stamp(&root.join(GITIGNORE_FILE)),
            llmignore: stamp(&root.join(LLMIGNORE_FILE)),
        }
    }
}

fn stamp(path: &Path) -> Option<(SystemTime, u64)> {
    let metadata = fs::metadata(path).ok()?;
    Some((metadata.modified().ok()?, metadata.len()))
}

/// The ordered ignore rules of one project root.
#[derive(Debug, Clone)]
pub struct IgnoreRuleSet {
    root: PathBuf,
    rules: Vec<IgnoreRule>,
    combined: PatternMatcher,
    per_rule: Vec<PatternMatcher>,
    stamps: SourceStamps,
}

impl IgnoreRuleSet {
    /// Builds the rule set for `root` using the built-in defaults.
    pub fn build(root: &Path) -> Self {
        Self::build_with_defaults(root, DEFAULT_IGNORE_PATTERNS)
    }

    /// Builds the rule set for `root` with a caller-supplied default layer.
    ///
    /// Missing ignore files contribute no rules; malformed patterns are
    /// dropped with a warning.
    pub fn build_with_defaults<S: AsRef<str>>(root: &Path, defaults: &[S]) -> Self {
        let stamps = SourceStamps::read(root);

        let mut candidates: Vec<IgnoreRule> = defaults
            .iter()
            .map(|raw| raw.as_ref().trim())
            .filter(|pattern| !pattern.is_empty() && !pattern.starts_with('#'))
            .map(|pattern| IgnoreRule {
                pattern: pattern.to_string(),
                source: RuleSource::Default,
                source_line: None,
            })
            .collect();

        for (file_name, source) in [
            (GITIGNORE_FILE, RuleSource::GitIgnoreFile),
            (LLMIGNORE_FILE, RuleSource::CustomIgnoreFile),
        ] {
            let file_rules = load_patterns_from_file(&root.join(file_name))
                .into_iter()
                .map(|(pattern, line)| IgnoreRule {
                    pattern,
                    source,
                    source_line: Some(line),
                });
            candidates.extend(file_rules);
        }

        let mut rules = Vec::with_capacity(candidates.len());
        let mut per_rule = Vec::with_capacity(candidates.len());
        for rule in candidates {
            let matcher = PatternMatcher::compile([rule.pattern.as_str()]);
            if matcher.skipped_count() > 0 {
                tracing::warn!("Dropping ignore rule {} that could not be compiled", rule);
                continue;
            }
            per_rule.push(matcher);
            rules.push(rule);
        }

        let combined = PatternMatcher::compile(rules.iter().map(|rule| rule.pattern.as_str()));
        tracing::debug!(
            "Compiled {} ignore rules for {}",
            rules.len(),
            root.display()
        );

        Self {
            root: root.to_path_buf(),
            rules,
            combined,
            per_rule,
            stamps,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All rules in load order.
    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    /// Returns `true` if `.gitignore` or `.llmignore` changed since this set was built.
    pub fn is_stale(&self) -> bool {
        SourceStamps::read(&self.root) != self.stamps
    }

    /// Returns `true` if the absolute `path` should be ignored.
    ///
    /// A path that cannot be made relative to the root is treated as ignored.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let relative = match path.strip_prefix(&self.root) {
            Ok(relative) => relative,
            Err(e) => {
                tracing::error!(
                    "Path {} is not inside project root {}: {}",
                    path.display(),
                    self.root.display(),
                    e
                );
                return true;
            }
        };
        self.is_ignored_relative(relative, path.is_dir())
    }

    /// Same as [`is_ignored`](Self::is_ignored) for a path already relative to the root.
    pub fn is_ignored_relative(&self, relative: &Path, is_dir: bool) -> bool {
        if is_root_vcs_path(relative) {
            tracing::debug!("Ignoring version-control metadata: {}", relative.display());
            return true;
        }
        let ignored = self.combined.is_excluded(relative, is_dir);
        if ignored {
            tracing::debug!("Ignoring path: {}", relative.display());
        }
        ignored
    }

    /// Returns the first rule, in load order, that matches `path`.
    ///
    /// `path` may be absolute or relative to the root. Directories are tried
    /// in their directory form first, then as a plain path.
    pub fn explain(&self, path: &Path) -> Option<IgnoreRule> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let relative = match absolute.strip_prefix(&self.root) {
            Ok(relative) => relative,
            Err(_) => {
                tracing::error!(
                    "Cannot explain ignore for path outside project root: {}",
                    path.display()
                );
                return None;
            }
        };

        let candidates: &[bool] = if absolute.is_dir() {
            &[true, false]
        } else {
            &[false]
        };
        candidates.iter().find_map(|&is_dir| {
            self.rules
                .iter()
                .zip(&self.per_rule)
                .find(|(_, matcher)| matcher.is_excluded(relative, is_dir))
                .map(|(rule, _)| rule.clone())
        })
    }
}

impl PathMatcher for IgnoreRuleSet {
    fn is_excluded(&self, relative: &Path, is_dir: bool) -> bool {
        self.is_ignored_relative(relative, is_dir)
    }
}

fn is_root_vcs_path(relative: &Path) -> bool {
    matches!(
        relative.components().next(),
        Some(Component::Normal(first)) if first == VCS_DIR
    )
}

/// Reads `(pattern, line)` pairs from an ignore file.
///
/// Invalid bytes are replaced rather than failing the read; a missing file
/// yields no patterns.
fn load_patterns_from_file(file_path: &Path) -> Vec<(String, usize)> {
    let bytes = match fs::read(file_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("Ignore file not found: {}", file_path.display());
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!("Error reading ignore file {}: {}", file_path.display(), e);
            return Vec::new();
        }
    };

    let contents = String::from_utf8_lossy(&bytes);
    let patterns: Vec<(String, usize)> = contents
        .lines()
        .enumerate()
        .filter_map(|(idx, raw_line)| {
            let pattern = raw_line.trim();
            (!pattern.is_empty() && !pattern.starts_with('#'))
                .then(|| (pattern.to_string(), idx + 1))
        })
        .collect();

    tracing::info!(
        "Loaded {} patterns from {}",
        patterns.len(),
        file_path.display()
    );
    patterns
}
