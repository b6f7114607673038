//! Page rendering: markdown file on disk → HTML bytes with the site
//! stylesheet appended.

use crate::frontmatter::{self, FrontmatterError};
use crate::index::ContentIndex;
use crate::markdown::{MarkdownProcessor, SlugResolver};
use crate::models::DocumentRecord;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to open {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse frontmatter in {path:?}: {source}")]
    Frontmatter {
        path: PathBuf,
        #[source]
        source: FrontmatterError,
    },

    #[error("Failed to render markdown in {path:?}: {source}")]
    Convert {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RenderError {
    /// The file the failure concerns
    pub fn path(&self) -> &PathBuf {
        match self {
            RenderError::Read { path, .. }
            | RenderError::Frontmatter { path, .. }
            | RenderError::Convert { path, .. } => path,
        }
    }
}

/// Renders indexed documents to HTML.
///
/// The file is read on every call, so edits show up on the next request even
/// before the watcher has re-scanned.
#[derive(Debug, Clone)]
pub struct Renderer {
    index: Arc<ContentIndex>,
    processor: Arc<MarkdownProcessor>,
}

impl Renderer {
    pub fn new(index: Arc<ContentIndex>) -> Self {
        Self {
            index,
            processor: Arc::new(MarkdownProcessor::new()),
        }
    }

    pub fn render(&self, record: &DocumentRecord) -> Result<Vec<u8>, RenderError> {
        let content = fs::read_to_string(&record.path).map_err(|source| RenderError::Read {
            path: record.path.clone(),
            source,
        })?;

        let (_metadata, body) =
            frontmatter::split(&content).map_err(|source| RenderError::Frontmatter {
                path: record.path.clone(),
                source,
            })?;

        let stylesheet = self.index.stylesheet();
        let mut html = Vec::with_capacity(body.len() * 3 / 2 + stylesheet.len() + 16);

        self.processor
            .render_into(body, &SlugResolver, &mut html)
            .and_then(|()| write!(html, "<style>{stylesheet}</style>"))
            .map_err(|source| RenderError::Convert {
                path: record.path.clone(),
                source,
            })?;

        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn indexed(files: &[(&str, &str)]) -> (TempDir, Arc<ContentIndex>) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        let index = Arc::new(ContentIndex::new());
        index.scan(dir.path()).unwrap();
        (dir, index)
    }

    #[test]
    fn test_render_appends_stylesheet() {
        let (_dir, index) = indexed(&[
            ("a.md", "---\ntitle: A\n---\n# Hello\n\nSee [[Other Page]]."),
            ("_root.css", "body{color:red}"),
        ]);
        let record = index.lookup("a").unwrap();

        let html = String::from_utf8(Renderer::new(index).render(&record).unwrap()).unwrap();

        assert!(html.contains("<h1 id=\"hello\">Hello"));
        assert!(html.contains("<a href=\"other_page\">Other Page</a>"));
        assert!(!html.contains("title: A"));
        assert!(html.ends_with("<style>body{color:red}</style>"));
    }

    #[test]
    fn test_render_without_stylesheet() {
        let (_dir, index) = indexed(&[("plain.md", "text")]);
        let record = index.lookup("plain").unwrap();

        let html = String::from_utf8(Renderer::new(index).render(&record).unwrap()).unwrap();
        assert_eq!(html, "<p>text</p>\n<style></style>");
    }

    #[test]
    fn test_render_missing_file() {
        let (dir, index) = indexed(&[("gone.md", "text")]);
        let record = index.lookup("gone").unwrap();
        fs::remove_file(dir.path().join("gone.md")).unwrap();

        let err = Renderer::new(index).render(&record).unwrap_err();
        assert!(matches!(err, RenderError::Read { .. }));
        assert_eq!(err.path(), &record.path);
    }

    #[test]
    fn test_render_bad_frontmatter() {
        let (dir, index) = indexed(&[("page.md", "---\ntitle: Page\n---\nbody")]);
        let record = index.lookup("page").unwrap();
        fs::write(dir.path().join("page.md"), "---\ntitle: [unclosed\n---\nbody").unwrap();

        let err = Renderer::new(index).render(&record).unwrap_err();
        assert!(matches!(err, RenderError::Frontmatter { .. }));
    }
}
