//! Content model for indexed documents.

use crate::slug::{canonicalize, prettify};
use std::path::{Path, PathBuf};

/// File extension of documents picked up by the index
pub const MARKDOWN_EXTENSION: &str = "md";

/// Reserved file name whose contents become the site stylesheet
pub const STYLESHEET_FILE_NAME: &str = "_root.css";

/// One markdown file known to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    /// Absolute path to the file on disk
    pub path: PathBuf,

    /// Canonical name used in URLs (e.g., "my_page")
    pub slug: String,

    /// Display title (e.g., "My Page")
    pub title: String,
}

impl DocumentRecord {
    /// Build a record from the title source found in metadata or the file name.
    pub fn from_title(path: impl Into<PathBuf>, title: &str) -> Self {
        Self {
            path: path.into(),
            slug: canonicalize(title),
            title: prettify(title),
        }
    }

    /// Whether this record lives at or below `prefix`
    pub fn is_under(&self, prefix: &Path) -> bool {
        self.path.starts_with(prefix)
    }
}

/// Whether a path names a markdown document
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == MARKDOWN_EXTENSION)
}

/// Whether a path names the reserved stylesheet file
pub fn is_stylesheet(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name == STYLESHEET_FILE_NAME)
}
