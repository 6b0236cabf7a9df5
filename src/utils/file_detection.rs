//! Binary/text classification and Markdown language tags.
//!
//! Classification is decided by extension first. Only files whose extension is
//! in neither table have their leading bytes sniffed.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Extensions (lowercase, without the dot) that are always treated as binary.
pub const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "tiff", "ico", "webp",
    // audio
    "mp3", "wav", "ogg", "flac", "aac",
    // video
    "mp4", "avi", "mov", "mkv", "wmv",
    // archives
    "zip", "rar", "7z", "tar", "gz", "bz2",
    // office documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp",
    // executables and libraries
    "exe", "dll", "so", "dylib", "app", "msi",
    // fonts
    "ttf", "otf", "woff", "woff2",
    // raw data and compiled bytecode
    "bin", "dat", "iso", "img", "pickle", "pkl", "pyc", "pyo", "pyd", "class", "jar", "swf",
    // databases
    "db", "sqlite", "sqlite3",
];

/// Extension (lowercase, without the dot) to Markdown fence language.
pub const LANGUAGE_MAP: &[(&str, &str)] = &[
    ("py", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("html", "html"),
    ("css", "css"),
    ("scss", "scss"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("swift", "swift"),
    ("c", "c"),
    ("cpp", "cpp"),
    ("cs", "csharp"),
    ("go", "go"),
    ("php", "php"),
    ("rb", "ruby"),
    ("rs", "rust"),
    ("sh", "bash"),
    ("ps1", "powershell"),
    ("sql", "sql"),
    ("md", "markdown"),
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("toml", "toml"),
    ("xml", "xml"),
    ("dockerfile", "dockerfile"),
];

const DOCKERFILE: &str = "Dockerfile";

/// Default number of leading bytes inspected for files of unknown type.
pub const DEFAULT_SNIFF_BYTES: usize = 1024;

const NULL_BYTE_RATIO: usize = 4;
const NON_TEXT_THRESHOLD: f64 = 0.15;

/// What the file name alone says about a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    KnownBinary,
    KnownText,
    Unknown,
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
}

fn is_dockerfile(path: &Path) -> bool {
    path.file_name().and_then(|name| name.to_str()) == Some(DOCKERFILE)
}

/// Classifies a path by its name only.
pub fn classify_extension(path: &Path) -> FileClass {
    if is_dockerfile(path) {
        return FileClass::KnownText;
    }
    match lowercase_extension(path) {
        Some(ext) if BINARY_EXTENSIONS.contains(&ext.as_str()) => FileClass::KnownBinary,
        Some(ext) if LANGUAGE_MAP.iter().any(|(known, _)| *known == ext) => FileClass::KnownText,
        _ => FileClass::Unknown,
    }
}

/// Returns the fence language for `path`, or `""` when unknown.
pub fn language_identifier(path: &Path) -> &'static str {
    if is_dockerfile(path) {
        return "dockerfile";
    }
    lowercase_extension(path)
        .and_then(|ext| {
            LANGUAGE_MAP
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, language)| *language)
        })
        .unwrap_or("")
}

fn is_text_byte(byte: u8) -> bool {
    matches!(byte, 7..=13 | 27 | 0x20..=0x7E | 0x80 | 0xFE | 0xFF)
}

/// Content heuristic for a leading chunk of a file.
///
/// More than a quarter null bytes, or more than 15% non-null bytes outside
/// the text-like set, marks the chunk as binary. An empty chunk is text.
pub fn is_likely_binary_content(chunk: &[u8]) -> bool {
    if chunk.is_empty() {
        return false;
    }
    let nulls = chunk.iter().filter(|&&byte| byte == 0).count();
    if nulls > chunk.len() / NULL_BYTE_RATIO {
        return true;
    }
    let non_text = chunk
        .iter()
        .filter(|&&byte| byte != 0 && !is_text_byte(byte))
        .count();
    non_text as f64 > chunk.len() as f64 * NON_TEXT_THRESHOLD
}

/// Decides whether a file should be treated as binary.
#[derive(Debug, Clone, Copy)]
pub struct BinaryClassifier {
    sniff_bytes: usize,
}

impl Default for BinaryClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_SNIFF_BYTES)
    }
}

impl BinaryClassifier {
    pub fn new(sniff_bytes: usize) -> Self {
        Self {
            sniff_bytes: sniff_bytes.max(1),
        }
    }

    pub fn sniff_bytes(&self) -> usize {
        self.sniff_bytes
    }

    pub fn is_binary(&self, path: &Path) -> bool {
        match classify_extension(path) {
            FileClass::KnownBinary => true,
            FileClass::KnownText => false,
            FileClass::Unknown => self.sniff(path),
        }
    }

    /// Reads the leading chunk of `path` and applies the content heuristic.
    /// Read failures count as text so the file stays a content candidate.
    pub fn sniff(&self, path: &Path) -> bool {
        let mut chunk = Vec::with_capacity(self.sniff_bytes);
        let read = File::open(path).and_then(|file| {
            file.take(self.sniff_bytes as u64).read_to_end(&mut chunk)
        });
        if let Err(e) = read {
            tracing::warn!("Could not read {} for binary check: {}", path.display(), e);
            return false;
        }
        let binary = is_likely_binary_content(&chunk);
        if binary {
            tracing::debug!("Detected binary content in {}", path.display());
        }
        binary
    }
}
