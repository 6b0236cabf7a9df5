//! Token estimates for display and for the generated document.
//!
//! With the `tiktoken` feature the `cl100k_base` encoding gives exact counts;
//! otherwise, and for every file above the read limit, the estimate is one
//! token per four characters (bytes, for files counted from their size).

use std::fs;
use std::path::Path;
#[cfg(feature = "tiktoken")]
use std::sync::{Arc, OnceLock};

use super::file_handler::FileHandler;
use crate::utils::file_detection::BinaryClassifier;

/// Files larger than this are estimated from their size without being read.
pub const MAX_READ_BYTES: u64 = 400 * 1024;

const CHARS_PER_TOKEN: u64 = 4;

#[cfg(feature = "tiktoken")]
fn shared_bpe() -> Option<Arc<tiktoken_rs::CoreBPE>> {
    static BPE: OnceLock<Option<Arc<tiktoken_rs::CoreBPE>>> = OnceLock::new();
    BPE.get_or_init(|| match tiktoken_rs::cl100k_base() {
        Ok(bpe) => Some(Arc::new(bpe)),
        Err(e) => {
            tracing::warn!("Tokenizer unavailable, falling back to estimates: {}", e);
            None
        }
    })
    .clone()
}

/// `ceil(len / 4)`.
pub fn heuristic_count(len: u64) -> usize {
    len.div_ceil(CHARS_PER_TOKEN) as usize
}

pub struct TokenEstimator {
    #[cfg(feature = "tiktoken")]
    bpe: Option<Arc<tiktoken_rs::CoreBPE>>,
    max_read_bytes: u64,
    classifier: BinaryClassifier,
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("exact", &self.has_exact_tokenizer())
            .field("max_read_bytes", &self.max_read_bytes)
            .field("classifier", &self.classifier)
            .finish()
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEstimator {
    /// Uses the exact tokenizer when it is compiled in and loads.
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "tiktoken")]
            bpe: shared_bpe(),
            max_read_bytes: MAX_READ_BYTES,
            classifier: BinaryClassifier::default(),
        }
    }

    /// Always uses the `/4` heuristic.
    pub fn heuristic() -> Self {
        Self {
            #[cfg(feature = "tiktoken")]
            bpe: None,
            max_read_bytes: MAX_READ_BYTES,
            classifier: BinaryClassifier::default(),
        }
    }

    pub fn with_max_read_bytes(mut self, max_read_bytes: u64) -> Self {
        self.max_read_bytes = max_read_bytes;
        self
    }

    pub fn with_classifier(mut self, classifier: BinaryClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn has_exact_tokenizer(&self) -> bool {
        #[cfg(feature = "tiktoken")]
        {
            self.bpe.is_some()
        }
        #[cfg(not(feature = "tiktoken"))]
        {
            false
        }
    }

    pub fn estimate_text(&self, text: &str) -> usize {
        #[cfg(feature = "tiktoken")]
        {
            if let Some(bpe) = &self.bpe {
                return bpe.encode_with_special_tokens(text).len();
            }
        }
        heuristic_count(text.chars().count() as u64)
    }

    /// Estimates a file's tokens. Never fails: binary and unreadable files
    /// count as zero.
    ///
    /// Files above the read limit skip the tokenizer and are estimated from
    /// their size, an approximation taken for speed.
    pub fn estimate_file(&self, path: &Path) -> usize {
        if self.classifier.is_binary(path) {
            return 0;
        }
        let size = match fs::metadata(path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                tracing::warn!("Could not stat {} for token estimate: {}", path.display(), e);
                return 0;
            }
        };
        if size > self.max_read_bytes {
            tracing::debug!(
                "{} is {} bytes; estimating tokens from size",
                path.display(),
                size
            );
            return heuristic_count(size);
        }
        match FileHandler::read_file_content(path) {
            Ok(decoded) => self.estimate_text(&decoded.text),
            Err(e) => {
                tracing::warn!("{}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_heuristic_rounds_up() {
        assert_eq!(heuristic_count(0), 0);
        assert_eq!(heuristic_count(1), 1);
        assert_eq!(heuristic_count(4), 1);
        assert_eq!(heuristic_count(5), 2);
    }

    #[test]
    fn test_plain_text_file_without_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "word".repeat(1000)).unwrap();

        let estimator = TokenEstimator::heuristic();
        assert!(!estimator.has_exact_tokenizer());
        assert_eq!(estimator.estimate_file(&path), 1000);
    }

    #[test]
    fn test_binary_files_are_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        fs::write(&path, "not really an image but named like one").unwrap();
        assert_eq!(TokenEstimator::heuristic().estimate_file(&path), 0);
    }

    #[test]
    fn test_large_files_are_estimated_from_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.md");
        // Multi-byte characters: a full read would count 100 chars, the size is 200 bytes.
        fs::write(&path, "é".repeat(100)).unwrap();

        let estimator = TokenEstimator::heuristic().with_max_read_bytes(150);
        assert_eq!(estimator.estimate_file(&path), 50);

        let estimator = TokenEstimator::heuristic();
        assert_eq!(estimator.estimate_file(&path), 25);
    }

    #[test]
    #[traced_test]
    fn test_missing_file_is_zero_and_logged() {
        let estimator = TokenEstimator::heuristic();
        assert_eq!(estimator.estimate_file(Path::new("/no/such/file.txt")), 0);
        assert!(logs_contain("Could not stat"));
    }

    #[test]
    fn test_estimate_text_counts_characters() {
        assert_eq!(TokenEstimator::heuristic().estimate_text("abcdefgh"), 2);
        assert_eq!(TokenEstimator::heuristic().estimate_text(""), 0);
    }

    #[cfg(feature = "tiktoken")]
    #[test]
    fn test_exact_tokenizer_counts_tokens() {
        let estimator = TokenEstimator::new();
        if estimator.has_exact_tokenizer() {
            assert!(estimator.estimate_text("hello world") > 0);
            assert!(estimator.estimate_text("hello world") < 11);
        }
    }
}
