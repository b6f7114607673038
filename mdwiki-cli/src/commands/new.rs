//! New document command implementation.

use anyhow::{bail, Context, Result};
use mdwiki_core::canonicalize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Create `DIR/<slug>.md` for `title`, refusing to overwrite.
pub fn new_document(title: &str, dir: &Path) -> Result<PathBuf> {
    let title = title.trim();
    if title.is_empty() {
        bail!("Document title must not be empty");
    }
    let slug = canonicalize(title);
    if slug.contains(['/', '\\']) {
        bail!("Document title {:?} cannot contain path separators", title);
    }

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let path = dir.join(format!("{slug}.md"));

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    file.write_all(template(title).as_bytes())
        .with_context(|| format!("Failed to write {:?}", path))?;

    tracing::info!("Created {:?}", path);
    Ok(path)
}

fn template(title: &str) -> String {
    let quoted = title.replace('\\', "\\\\").replace('"', "\\\"");
    format!("---\ntitle: \"{quoted}\"\n---\n\n# {title}\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdwiki_core::ContentIndex;
    use tempfile::TempDir;

    #[test]
    fn test_new_document_is_indexable() {
        let dir = TempDir::new().unwrap();
        let path = new_document("Rust Notes", dir.path()).unwrap();
        assert_eq!(path, dir.path().join("rust_notes.md"));

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("---\ntitle: \"Rust Notes\"\n---\n"));
        assert!(content.contains("# Rust Notes"));

        let index = ContentIndex::new();
        index.scan(dir.path()).unwrap();
        let record = index.lookup("rust_notes").unwrap();
        assert_eq!(record.title, "Rust Notes");
    }

    #[test]
    fn test_quotes_in_title_survive() {
        let dir = TempDir::new().unwrap();
        new_document("Say \"hi\"", dir.path()).unwrap();

        let index = ContentIndex::new();
        index.scan(dir.path()).unwrap();
        assert!(index.lookup("say_\"hi\"").is_some());
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        new_document("Home", dir.path()).unwrap();
        fs::write(dir.path().join("home.md"), "edited").unwrap();

        assert!(new_document("home", dir.path()).is_err());
        assert_eq!(fs::read_to_string(dir.path().join("home.md")).unwrap(), "edited");
    }

    #[test]
    fn test_rejects_bad_titles() {
        let dir = TempDir::new().unwrap();
        assert!(new_document("   ", dir.path()).is_err());
        assert!(new_document("a/b", dir.path()).is_err());
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/notes");
        let path = new_document("Inbox", &target).unwrap();
        assert!(path.starts_with(&target));
        assert!(path.exists());
    }
}
