//! Core data models used throughout scandex.
//!
//! These types describe the files flowing from the change source through the
//! ingestion pipeline and the documents held by the search store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Document kinds the OCR adapter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Pdf,
    Image,
}

impl FileKind {
    /// Classifies a path by its extension (case-insensitive).
    ///
    /// Only `pdf`, `jpg`, `jpeg` and `png` are supported; anything else is `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileKind::Pdf),
            "jpg" | "jpeg" | "png" => Some(FileKind::Image),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Pdf => write!(f, "pdf"),
            FileKind::Image => write!(f, "image"),
        }
    }
}

/// A path the change source believes references a supported document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePath {
    pub path: PathBuf,
    pub kind: FileKind,
}

impl CandidatePath {
    /// Returns a candidate only for existing regular files with a supported extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let kind = FileKind::from_path(path)?;
        if !path.is_file() {
            return None;
        }
        Some(Self {
            path: path.to_path_buf(),
            kind,
        })
    }

    /// The store key: the bare file name.
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// SHA-256 digest of a file's full byte content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(pub [u8; 32]);

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Result of OCR over one file, on its way to the store.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub filename: String,
    pub text: String,
}

/// Document as held by the search store, keyed by `filename`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub filename: String,
    pub content: String,
}

impl From<ExtractedDocument> for IndexedDocument {
    fn from(doc: ExtractedDocument) -> Self {
        Self {
            filename: doc.filename,
            content: doc.text,
        }
    }
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub filename: String,
    pub score: f64,
}

/// Entry in the document listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub filename: String,
}
