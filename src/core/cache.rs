//! Modification-time cache of scanned projects.
//!
//! One entry per project root (keyed by the canonical absolute path) holds the
//! mtime of every file and the full file list from the last recomputed scan.
//! The whole map is mirrored to a single JSON file and rewritten on every save.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

use super::error::CacheError;
use super::posix_string;

/// File name of the cache in the user's home directory.
pub const CACHE_FILE_NAME: &str = ".dumpcb-cache.json";

/// Relative posix path to modification time in seconds since the epoch.
pub type MtimeMap = BTreeMap<String, f64>;

/// The cached state of one project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub mtimes: MtimeMap,
    pub files: Vec<String>,
}

impl CacheEntry {
    /// Returns `true` if some listed file has no recorded mtime.
    ///
    /// The writer keeps both in sync, but the format does not enforce it; a
    /// reader treats an unknown mtime as a change.
    pub fn has_unknown_mtimes(&self) -> bool {
        self.files.iter().any(|file| !self.mtimes.contains_key(file))
    }
}

/// Storage for per-root scan state.
pub trait MtimeStore: Send + Sync {
    fn load(&self, root: &Path) -> Option<CacheEntry>;
    fn save(&self, root: &Path, entry: CacheEntry);
}

/// Returns `~/.dumpcb-cache.json`, if a home directory can be determined.
pub fn default_cache_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CACHE_FILE_NAME))
}

/// JSON-backed [`MtimeStore`].
///
/// The in-memory map is authoritative for the life of the process; disk
/// failures are logged and never surfaced.
#[derive(Debug)]
pub struct ScanCache {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ScanCache {
    /// Opens the cache stored at `path`, tolerating a missing or corrupt file.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_from_disk(&path) {
            Ok(entries) => {
                tracing::debug!(
                    "Loaded {} cached project(s) from {}",
                    entries.len(),
                    path.display()
                );
                entries
            }
            Err(e) => {
                tracing::warn!("{}. Ignoring cache.", e);
                HashMap::new()
            }
        };
        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    /// Opens the cache in the user's home directory, or an in-memory cache
    /// when there is no home directory.
    pub fn open_default() -> Self {
        match default_cache_path() {
            Some(path) => Self::open(path),
            None => {
                tracing::warn!("No home directory found; scan cache will not be persisted.");
                Self::in_memory()
            }
        }
    }

    /// A cache that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl MtimeStore for ScanCache {
    fn load(&self, root: &Path) -> Option<CacheEntry> {
        let key = cache_key(root);
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&key).cloned()
    }

    fn save(&self, root: &Path, entry: CacheEntry) {
        let key = cache_key(root);
        // The lock also covers the disk write so concurrent saves cannot lose updates.
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.clone(), entry);

        let Some(path) = &self.path else {
            return;
        };
        match write_to_disk(path, &entries) {
            Ok(()) => tracing::debug!("Cache saved successfully for {}", key),
            Err(e) => tracing::warn!("Error saving scan cache: {}", e),
        }
    }
}

fn cache_key(root: &Path) -> String {
    root.canonicalize()
        .unwrap_or_else(|_| root.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn read_from_disk(path: &Path) -> Result<HashMap<String, CacheEntry>, CacheError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(CacheError::Read(e, path.to_path_buf())),
    };

    let raw: HashMap<String, serde_json::Value> = serde_json::from_str(&contents)?;
    let entries = raw
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<CacheEntry>(value) {
            Ok(entry) => Some((key, entry)),
            Err(e) => {
                tracing::debug!("Skipping malformed cache entry for {}: {}", key, e);
                None
            }
        })
        .collect();
    Ok(entries)
}

fn write_to_disk(path: &Path, entries: &HashMap<String, CacheEntry>) -> Result<(), CacheError> {
    let json = serde_json::to_string_pretty(entries)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CacheError::Write(e, path.to_path_buf()))?;
    tmp.write_all(json.as_bytes())
        .map_err(|e| CacheError::Write(e, path.to_path_buf()))?;
    tmp.persist(path)?;
    Ok(())
}

/// Returns `true` if the file sets differ or any shared file's mtime changed.
pub fn should_regenerate(current: &MtimeMap, cached: &MtimeMap) -> bool {
    current.len() != cached.len()
        || current
            .iter()
            .any(|(path, mtime)| cached.get(path) != Some(mtime))
}

/// Stats every relative path under `root` and records file mtimes.
///
/// Non-files are skipped and files that vanished since the walk are dropped
/// silently.
pub fn current_mtimes(root: &Path, relative_paths: &[PathBuf]) -> MtimeMap {
    let mut mtimes = MtimeMap::new();
    for relative in relative_paths {
        let absolute = root.join(relative);
        let metadata = match fs::metadata(&absolute) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::warn!("Could not stat file {}: {}", absolute.display(), e);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }
        match metadata.modified() {
            Ok(modified) => {
                mtimes.insert(posix_string(relative), epoch_seconds(modified));
            }
            Err(e) => tracing::warn!("No modification time for {}: {}", absolute.display(), e),
        }
    }
    mtimes
}

fn epoch_seconds(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs_f64(),
        Err(before) => -before.duration().as_secs_f64(),
    }
}
