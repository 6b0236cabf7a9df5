use std::fs;
use std::path::Path;

use super::error::DecodeError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// The encoding a file's content was decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Latin1,
}

impl TextEncoding {
    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
            TextEncoding::Latin1 => "latin-1",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedContent {
    pub text: String,
    pub encoding: TextEncoding,
}

impl DecodedContent {
    /// Whether the terminal latin-1 fallback had to be used.
    pub fn used_fallback(&self) -> bool {
        self.encoding == TextEncoding::Latin1
    }
}

pub struct FileHandler;

impl FileHandler {
    /// Reads and decodes a whole file.
    ///
    /// Decoding never fails; only the read itself can.
    pub fn read_file_content(path: &Path) -> Result<DecodedContent, DecodeError> {
        let bytes = fs::read(path).map_err(|source| DecodeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let decoded = Self::decode_bytes(&bytes);
        if decoded.used_fallback() {
            tracing::info!(
                "{} is not valid UTF-8; decoded as {}",
                path.display(),
                decoded.encoding.label()
            );
        }
        Ok(decoded)
    }

    /// UTF-8 (BOM stripped), then UTF-16 when a BOM says so, then latin-1.
    pub fn decode_bytes(bytes: &[u8]) -> DecodedContent {
        let without_bom = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        if let Ok(text) = std::str::from_utf8(without_bom) {
            return DecodedContent {
                text: text.to_owned(),
                encoding: TextEncoding::Utf8,
            };
        }

        if let Some(body) = bytes.strip_prefix(UTF16_LE_BOM) {
            return DecodedContent {
                text: decode_utf16(body, u16::from_le_bytes),
                encoding: TextEncoding::Utf16Le,
            };
        }
        if let Some(body) = bytes.strip_prefix(UTF16_BE_BOM) {
            return DecodedContent {
                text: decode_utf16(body, u16::from_be_bytes),
                encoding: TextEncoding::Utf16Be,
            };
        }

        DecodedContent {
            text: bytes.iter().map(|&byte| char::from(byte)).collect(),
            encoding: TextEncoding::Latin1,
        }
    }
}

fn decode_utf16(body: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    let mut text = String::from_utf16_lossy(&units);
    if body.len() % 2 == 1 {
        text.push(char::REPLACEMENT_CHARACTER);
    }
    text
}
