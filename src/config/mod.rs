pub mod settings;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::cache::default_cache_path;
use crate::core::ignore::DEFAULT_IGNORE_PATTERNS;
use crate::core::tokens::MAX_READ_BYTES;
use crate::utils::file_detection::DEFAULT_SNIFF_BYTES;

/// User settings, stored as JSON. Missing fields take their default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// The built-in layer of ignore rules, applied before `.gitignore` and `.llmignore`.
    pub default_ignore_patterns: Vec<String>,
    /// Walker pool size. `DUMPCB_MAX_WORKERS` takes precedence.
    pub max_workers: Option<usize>,
    /// Location of the scan cache; `~/.dumpcb-cache.json` when unset.
    pub cache_file: Option<PathBuf>,
    pub max_token_read_bytes: u64,
    pub binary_sniff_bytes: usize,
    pub use_exact_tokenizer: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        settings::load_config(None)
    }

    /// The cache file to use, if any location can be determined.
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache_file.clone().or_else(default_cache_path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|pattern| pattern.to_string())
                .collect(),
            max_workers: None,
            cache_file: None,
            max_token_read_bytes: MAX_READ_BYTES,
            binary_sniff_bytes: DEFAULT_SNIFF_BYTES,
            use_exact_tokenizer: true,
        }
    }
}
