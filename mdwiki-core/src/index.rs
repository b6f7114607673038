//! In-memory content index: slug → document, kept in sync by scanning.
//!
//! The index is shared between the watcher (the only writer) and request
//! handlers (readers). A scan reads every file it needs before taking the
//! write lock, then applies all of its changes under a single guard, so a
//! reader sees either the state before a scan or the state after it.

use crate::exclude::ExcludeRules;
use crate::frontmatter::{self, FrontmatterError};
use crate::models::{is_markdown, is_stylesheet, DocumentRecord};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse frontmatter in {path:?}: {source}")]
    Frontmatter {
        path: PathBuf,
        #[source]
        source: FrontmatterError,
    },

    #[error("Not a directory: {0:?}")]
    NotADirectory(PathBuf),

    #[error("Failed to walk {path:?}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Counts describing what a scan changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upsert {
    Added,
    Updated,
    Unchanged,
}

#[derive(Debug)]
struct Stylesheet {
    source: Option<PathBuf>,
    text: Arc<str>,
}

impl Default for Stylesheet {
    fn default() -> Self {
        Self {
            source: None,
            text: Arc::from(""),
        }
    }
}

#[derive(Debug, Default)]
struct IndexState {
    records: BTreeMap<PathBuf, Arc<DocumentRecord>>,
    slugs: HashMap<String, PathBuf>,
    stylesheet: Stylesheet,
}

impl IndexState {
    fn upsert(&mut self, path: PathBuf, title: &str) -> Upsert {
        let record = DocumentRecord::from_title(path.clone(), title);

        let outcome = match self.records.get(&path) {
            Some(existing) if **existing == record => return Upsert::Unchanged,
            Some(existing) => {
                tracing::info!("Updating document {:?} (title: {})", path, record.title);
                let old_slug = existing.slug.clone();
                self.records.insert(path.clone(), Arc::new(record.clone()));
                self.release_slug(&old_slug, &path);
                Upsert::Updated
            }
            None => {
                tracing::info!("Adding document {:?} (title: {})", path, record.title);
                self.records.insert(path.clone(), Arc::new(record.clone()));
                Upsert::Added
            }
        };

        if let Some(previous) = self.slugs.insert(record.slug.clone(), path.clone()) {
            if previous != path {
                tracing::warn!(
                    "Slug '{}' now points at {:?}, shadowing {:?}",
                    record.slug,
                    path,
                    previous
                );
            }
        }

        outcome
    }

    fn remove(&mut self, path: &Path) -> bool {
        match self.records.remove(path) {
            Some(record) => {
                tracing::info!("Removing document {:?}", path);
                self.release_slug(&record.slug, path);
                true
            }
            None => false,
        }
    }

    /// Drop `owner`'s claim on `slug`, handing it to another record with
    /// the same slug if one is still indexed.
    fn release_slug(&mut self, slug: &str, owner: &Path) {
        if self.slugs.get(slug).map(PathBuf::as_path) != Some(owner) {
            return;
        }
        self.slugs.remove(slug);

        let heir = self
            .records
            .values()
            .find(|r| r.slug == slug && r.path != owner)
            .map(|r| r.path.clone());
        if let Some(heir) = heir {
            self.slugs.insert(slug.to_string(), heir);
        }
    }

    fn set_stylesheet(&mut self, source: PathBuf, text: String) {
        tracing::info!("Loading stylesheet from {:?}", source);
        self.stylesheet = Stylesheet {
            source: Some(source),
            text: Arc::from(text),
        };
    }

    fn clear_stylesheet_under(&mut self, prefix: &Path) -> bool {
        let owned = self
            .stylesheet
            .source
            .as_deref()
            .is_some_and(|source| source.starts_with(prefix));
        if owned {
            tracing::info!("Stylesheet source {:?} removed", self.stylesheet.source);
            self.stylesheet = Stylesheet::default();
        }
        owned
    }
}

/// Everything a scan learned from disk, gathered before locking the index
#[derive(Debug, Default)]
struct Observation {
    documents: Vec<(PathBuf, String)>,
    /// Paths that exist but could not be indexed; their old records are kept
    unreadable: Vec<PathBuf>,
    stylesheet: Option<(PathBuf, String)>,
}

/// Mapping from slug to document record, rebuilt from disk on demand
#[derive(Debug, Default)]
pub struct ContentIndex {
    excludes: ExcludeRules,
    state: RwLock<IndexState>,
}

impl ContentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index whose scans skip excluded directories and files
    pub fn with_excludes(excludes: ExcludeRules) -> Self {
        Self {
            excludes,
            state: RwLock::default(),
        }
    }

    pub fn excludes(&self) -> &ExcludeRules {
        &self.excludes
    }

    /// Recursively scan `root`, updating the index to match disk.
    ///
    /// Files that cannot be read or whose frontmatter is malformed are logged
    /// and skipped. Records below `root` whose files were not seen are
    /// removed.
    pub fn scan(&self, root: &Path) -> Result<ScanSummary, ScanError> {
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let observation = self.observe(root)?;
        let mut summary = ScanSummary {
            skipped: observation.unreadable.len(),
            ..ScanSummary::default()
        };

        let mut seen: HashSet<&Path> = observation
            .documents
            .iter()
            .map(|(path, _)| path.as_path())
            .collect();
        seen.extend(observation.unreadable.iter().map(PathBuf::as_path));

        let mut state = self.state.write();

        for (path, title) in &observation.documents {
            match state.upsert(path.clone(), title) {
                Upsert::Added => summary.added += 1,
                Upsert::Updated => summary.updated += 1,
                Upsert::Unchanged => {}
            }
        }

        let stale: Vec<PathBuf> = state
            .records
            .keys()
            .filter(|path| path.starts_with(root) && !seen.contains(path.as_path()))
            .cloned()
            .collect();
        for path in stale {
            if state.remove(&path) {
                summary.removed += 1;
            }
        }

        if let Some((source, text)) = observation.stylesheet {
            state.set_stylesheet(source, text);
        }

        drop(state);

        tracing::debug!(
            "Scanned {:?}: {} added, {} updated, {} removed, {} skipped",
            root,
            summary.added,
            summary.updated,
            summary.removed,
            summary.skipped
        );
        Ok(summary)
    }

    fn observe(&self, root: &Path) -> Result<Observation, ScanError> {
        let mut observation = Observation::default();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.excludes.is_excluded(entry.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(ScanError::Walk {
                        path: root.to_path_buf(),
                        source: err,
                    })
                }
                Err(err) => {
                    tracing::warn!("Skipping unreadable entry under {:?}: {}", root, err);
                    continue;
                }
            };

            // Symlinked files are followed; symlinked directories are not.
            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if !is_file {
                continue;
            }
            let path = entry.path();

            if is_stylesheet(path) {
                match fs::read_to_string(path) {
                    Ok(text) => observation.stylesheet = Some((path.to_path_buf(), text)),
                    Err(err) => tracing::warn!("Failed to read stylesheet {:?}: {}", path, err),
                }
                continue;
            }

            if !is_markdown(path) {
                continue;
            }

            tracing::debug!("Loading markdown file {:?}", path);
            match read_title(path) {
                Ok(title) => observation.documents.push((path.to_path_buf(), title)),
                Err(err) => {
                    tracing::warn!("Skipping document: {}", err);
                    observation.unreadable.push(path.to_path_buf());
                }
            }
        }

        Ok(observation)
    }

    /// Remove every record at or below `path`, and the stylesheet if it came
    /// from there. Returns the number of records removed.
    pub fn remove_path(&self, path: &Path) -> usize {
        let mut state = self.state.write();
        let doomed: Vec<PathBuf> = state
            .records
            .keys()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();

        let removed = doomed.iter().filter(|p| state.remove(p)).count();
        state.clear_stylesheet_under(path);
        removed
    }

    /// Find the document currently owning `slug`
    pub fn lookup(&self, slug: &str) -> Option<Arc<DocumentRecord>> {
        let state = self.state.read();
        let path = state.slugs.get(slug)?;
        state.records.get(path).cloned()
    }

    /// Snapshot of all records, ordered by path
    pub fn records(&self) -> Vec<Arc<DocumentRecord>> {
        self.state.read().records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// Current site stylesheet text (empty when none has been loaded)
    pub fn stylesheet(&self) -> Arc<str> {
        self.state.read().stylesheet.text.clone()
    }
}

/// Determine the title source for a document: the frontmatter `title` if
/// present, otherwise the file stem.
fn read_title(path: &Path) -> Result<String, ScanError> {
    let content = fs::read_to_string(path).map_err(|source| ScanError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let (metadata, _body) =
        frontmatter::split(&content).map_err(|source| ScanError::Frontmatter {
            path: path.to_path_buf(),
            source,
        })?;

    let title = match frontmatter::title(&metadata) {
        Some(title) => title.to_string(),
        None => path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    Ok(title)
}
