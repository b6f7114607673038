//! Filesystem watcher keeping a [`ContentIndex`] in sync with disk.
//!
//! Every non-excluded directory under the include roots is registered with
//! the OS watcher individually. Notifications are funnelled through an
//! unbounded channel into a single task which coalesces whatever is queued,
//! purges paths that disappeared, registers new directories and re-scans
//! the affected parent directories on the blocking pool. That task is the
//! only writer of the index after start-up.

use crate::exclude::ExcludeRules;
use crate::index::{ContentIndex, ScanError};
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize file watcher: {0}")]
    Init(#[source] notify::Error),

    #[error("Failed to watch {path:?}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Invalid include root {path:?}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Handle to a running watcher.
///
/// Dropping the handle releases the OS subscription, which closes the
/// notification channel and lets the event loop finish on its own.
pub struct IndexWatcher {
    roots: Arc<[PathBuf]>,
    watcher: Option<Arc<Mutex<RecommendedWatcher>>>,
    task: Option<JoinHandle<()>>,
}

impl IndexWatcher {
    /// Register the include roots, scan each once, and start the event loop.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(
        index: Arc<ContentIndex>,
        include_roots: Vec<PathBuf>,
    ) -> Result<Self, WatchError> {
        let roots = include_roots
            .into_iter()
            .map(|root| {
                std::fs::canonicalize(&root).map_err(|source| WatchError::Root { path: root, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(WatchError::Init)?;

        let mut watched = HashSet::new();
        for root in &roots {
            let count = register_tree(&mut watcher, &mut watched, root, index.excludes())?;
            tracing::info!("Watching {:?} ({} directories)", root, count);
        }

        // Registered before scanning, so changes made during the scan are queued
        for root in &roots {
            let summary = tokio::task::spawn_blocking({
                let index = index.clone();
                let root = root.clone();
                move || index.scan(&root)
            })
            .await??;
            tracing::info!("Indexed {:?}: {} new documents", root, summary.added);
        }

        let roots: Arc<[PathBuf]> = roots.into();
        let shared = Arc::new(Mutex::new(watcher));
        let task = tokio::spawn(run_event_loop(
            index,
            roots.clone(),
            Arc::downgrade(&shared),
            watched,
            rx,
        ));

        Ok(Self {
            roots,
            watcher: Some(shared),
            task: Some(task),
        })
    }

    /// Canonical include roots being watched
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Release the OS subscription and wait for the event loop to drain.
    pub async fn shutdown(mut self) {
        self.watcher.take();

        let Some(mut task) = self.task.take() else {
            return;
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
            Ok(Ok(())) => tracing::debug!("Watcher stopped"),
            Ok(Err(err)) => tracing::error!("Watcher task failed: {}", err),
            Err(_) => {
                tracing::warn!("Watcher did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

impl Drop for IndexWatcher {
    fn drop(&mut self) {
        self.watcher.take();
    }
}

/// Register `dir` and every non-excluded directory below it that is not
/// already watched. `dir` itself is registered even when excluded.
fn register_tree(
    watcher: &mut RecommendedWatcher,
    watched: &mut HashSet<PathBuf>,
    dir: &Path,
    excludes: &ExcludeRules,
) -> Result<usize, WatchError> {
    let mut added = 0;
    let walker = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !excludes.is_excluded(entry.path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Not watching unreadable entry: {}", err);
                continue;
            }
        };
        if !entry.file_type().is_dir() || watched.contains(entry.path()) {
            continue;
        }

        watcher
            .watch(entry.path(), RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Watch {
                path: entry.path().to_path_buf(),
                source,
            })?;
        tracing::debug!("Watching directory {:?}", entry.path());
        watched.insert(entry.path().to_path_buf());
        added += 1;
    }

    Ok(added)
}

async fn run_event_loop(
    index: Arc<ContentIndex>,
    roots: Arc<[PathBuf]>,
    watcher: Weak<Mutex<RecommendedWatcher>>,
    mut watched: HashSet<PathBuf>,
    mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
) {
    while let Some(first) = rx.recv().await {
        let mut queued = vec![first];
        while let Ok(next) = rx.try_recv() {
            queued.push(next);
        }

        let mut batch = Batch::default();
        for result in queued {
            match result {
                Ok(event) if is_relevant(&event) => {
                    for path in event.paths {
                        batch.add(path, &roots, index.excludes());
                    }
                }
                Ok(_) => {}
                Err(err) => tracing::warn!("Watcher error: {}", err),
            }
        }
        if batch.is_empty() {
            continue;
        }

        // Directories that went away lose their OS watch; forget them so a
        // re-created directory is registered again.
        watched.retain(|dir| !batch.removed.iter().any(|gone| dir.starts_with(gone)));

        if let Some(shared) = watcher.upgrade() {
            let mut guard = shared.lock();
            for dir in &batch.new_dirs {
                if let Err(err) = register_tree(&mut guard, &mut watched, dir, index.excludes()) {
                    tracing::warn!("{}", err);
                }
            }
        }

        let result = tokio::task::spawn_blocking({
            let index = index.clone();
            move || batch.apply(&index)
        })
        .await;
        if let Err(err) = result {
            tracing::error!("Re-scan task failed: {}", err);
        }
    }

    tracing::debug!("Watcher channel closed");
}

/// Reads (including our own renders) are not changes
fn is_relevant(event: &Event) -> bool {
    match event.kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        EventKind::Access(_) => false,
        _ => true,
    }
}

/// Index work required by one coalesced group of notifications
#[derive(Debug, Default, PartialEq, Eq)]
struct Batch {
    removed: BTreeSet<PathBuf>,
    new_dirs: BTreeSet<PathBuf>,
    rescans: BTreeSet<PathBuf>,
}

impl Batch {
    fn add(&mut self, path: PathBuf, roots: &[PathBuf], excludes: &ExcludeRules) {
        let Some(root) = roots.iter().find(|root| path.starts_with(root)) else {
            return;
        };
        if let Some(pattern) = excludes.matching(&path) {
            tracing::debug!("Ignoring change to {:?} (excluded by '{}')", path, pattern);
            return;
        }

        if !path.exists() {
            self.removed.insert(path.clone());
        } else if path.is_dir() {
            self.new_dirs.insert(path.clone());
        }
        self.rescans.insert(rescan_dir(&path, root));
    }

    fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.new_dirs.is_empty() && self.rescans.is_empty()
    }

    /// Re-scan targets with any directory already covered by an ancestor
    /// dropped, since scans are recursive.
    fn rescan_targets(&self) -> Vec<&Path> {
        let mut targets: Vec<&Path> = Vec::new();
        for dir in &self.rescans {
            // BTreeSet order puts ancestors before their descendants
            if !targets.iter().any(|covered| dir.starts_with(covered)) {
                targets.push(dir);
            }
        }
        targets
    }

    fn apply(&self, index: &ContentIndex) {
        for path in &self.removed {
            let count = index.remove_path(path);
            if count > 0 {
                tracing::info!("Removed {} document(s) at {:?}", count, path);
            }
        }

        for dir in self.rescan_targets() {
            if !dir.is_dir() {
                continue;
            }
            match index.scan(dir) {
                Ok(summary) => tracing::info!(
                    "Re-scanned {:?}: {} added, {} updated, {} removed",
                    dir,
                    summary.added,
                    summary.updated,
                    summary.removed
                ),
                Err(err) => tracing::error!("Failed to re-scan {:?}: {}", dir, err),
            }
        }
    }
}

/// The directory to re-scan for a change at `path`: its parent, or the
/// nearest ancestor that still exists, never leaving `root`.
fn rescan_dir(path: &Path, root: &Path) -> PathBuf {
    let mut dir = if path == root {
        root
    } else {
        path.parent().unwrap_or(root)
    };
    while dir != root && !dir.is_dir() {
        dir = dir.parent().unwrap_or(root);
    }
    dir.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn page(title: &str) -> String {
        format!("---\ntitle: {title}\n---\nbody\n")
    }

    async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        check()
    }

    #[test]
    fn test_rescan_dir() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("sub")).unwrap();

        assert_eq!(rescan_dir(&root.join("sub/a.md"), root), root.join("sub"));
        assert_eq!(rescan_dir(&root.join("a.md"), root), root);
        assert_eq!(rescan_dir(root, root), root);
        // parent deleted along with the file
        assert_eq!(rescan_dir(&root.join("gone/deeper/a.md"), root), root);
    }

    #[test]
    fn test_batch_classifies_paths() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("new/inner")).unwrap();
        fs::create_dir(root.join("drafts")).unwrap();
        fs::write(root.join("new/inner/a.md"), "x").unwrap();

        let excludes = ExcludeRules::new(["drafts"]).unwrap();
        let roots = vec![root.clone()];
        let mut batch = Batch::default();
        batch.add(root.join("new"), &roots, &excludes);
        batch.add(root.join("new/inner/a.md"), &roots, &excludes);
        batch.add(root.join("deleted.md"), &roots, &excludes);
        batch.add(root.join("drafts/wip.md"), &roots, &excludes);
        batch.add(PathBuf::from("/elsewhere/x.md"), &roots, &excludes);

        assert_eq!(batch.new_dirs, BTreeSet::from([root.join("new")]));
        assert_eq!(batch.removed, BTreeSet::from([root.join("deleted.md")]));
        assert_eq!(
            batch.rescans,
            BTreeSet::from([root.clone(), root.join("new/inner")])
        );
        assert_eq!(batch.rescan_targets(), vec![root.as_path()]);
    }

    #[test]
    fn test_batch_apply_updates_index() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        fs::write(root.join("keep.md"), page("Keep")).unwrap();
        fs::write(root.join("drop.md"), page("Drop")).unwrap();

        let index = ContentIndex::new();
        index.scan(&root).unwrap();
        assert_eq!(index.len(), 2);

        fs::remove_file(root.join("drop.md")).unwrap();
        fs::write(root.join("fresh.md"), page("Fresh")).unwrap();

        let roots = vec![root.clone()];
        let mut batch = Batch::default();
        batch.add(root.join("drop.md"), &roots, index.excludes());
        batch.add(root.join("fresh.md"), &roots, index.excludes());
        batch.apply(&index);

        assert!(index.lookup("drop").is_none());
        assert!(index.lookup("fresh").is_some());
        assert!(index.lookup("keep").is_some());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_access_events_are_ignored() {
        let read = Event::new(EventKind::Access(AccessKind::Read));
        let closed = Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write)));
        let created = Event::new(EventKind::Create(notify::event::CreateKind::File));
        assert!(!is_relevant(&read));
        assert!(is_relevant(&closed));
        assert!(is_relevant(&created));
    }

    #[tokio::test]
    async fn test_start_scans_roots() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("home.md"), page("Home")).unwrap();

        let index = Arc::new(ContentIndex::new());
        let watcher = IndexWatcher::start(index.clone(), vec![dir.path().to_path_buf()])
            .await
            .unwrap();

        assert!(index.lookup("home").is_some());
        assert_eq!(watcher.roots().len(), 1);
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(ContentIndex::new());
        let result = IndexWatcher::start(index, vec![dir.path().join("missing")]).await;
        assert!(matches!(result, Err(WatchError::Root { .. })));
    }

    #[tokio::test]
    async fn test_created_and_removed_files_follow_disk() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(ContentIndex::new());
        let watcher = IndexWatcher::start(index.clone(), vec![dir.path().to_path_buf()])
            .await
            .unwrap();

        fs::write(dir.path().join("new_page.md"), page("New Page")).unwrap();
        assert!(wait_until(|| index.lookup("new_page").is_some()).await);

        fs::remove_file(dir.path().join("new_page.md")).unwrap();
        assert!(wait_until(|| index.lookup("new_page").is_none()).await);

        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_new_directories_are_watched() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(ContentIndex::new());
        let watcher = IndexWatcher::start(index.clone(), vec![dir.path().to_path_buf()])
            .await
            .unwrap();

        let sub = dir.path().join("topics");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("first.md"), page("First")).unwrap();
        assert!(wait_until(|| index.lookup("first").is_some()).await);

        // a file created after registration is seen through the new watch
        fs::write(sub.join("second.md"), page("Second")).unwrap();
        assert!(wait_until(|| index.lookup("second").is_some()).await);

        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_title_edit_moves_slug() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), page("A")).unwrap();
        fs::write(dir.path().join("other.md"), page("Other")).unwrap();

        let index = Arc::new(ContentIndex::new());
        let watcher = IndexWatcher::start(index.clone(), vec![dir.path().to_path_buf()])
            .await
            .unwrap();
        assert_eq!(index.len(), 2);

        fs::write(dir.path().join("a.md"), page("B")).unwrap();
        assert!(wait_until(|| index.lookup("b").is_some()).await);
        assert!(index.lookup("a").is_none());
        assert_eq!(index.len(), 2);

        let root = watcher.roots()[0].clone();
        assert_eq!(index.lookup("b").unwrap().path, root.join("a.md"));
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_renamed_files_and_directories_follow_disk() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "plain body\n").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/inner.md"), page("Inner")).unwrap();

        let index = Arc::new(ContentIndex::new());
        let watcher = IndexWatcher::start(index.clone(), vec![dir.path().to_path_buf()])
            .await
            .unwrap();
        let root = watcher.roots()[0].clone();
        assert!(index.lookup("a").is_some());

        fs::rename(root.join("a.md"), root.join("c.md")).unwrap();
        assert!(wait_until(|| index.lookup("c").is_some() && index.lookup("a").is_none()).await);
        assert_eq!(index.lookup("c").unwrap().path, root.join("c.md"));

        fs::rename(root.join("sub"), root.join("moved")).unwrap();
        let moved = root.join("moved/inner.md");
        assert!(wait_until(|| index.lookup("inner").is_some_and(|r| r.path == moved)).await);
        assert_eq!(index.len(), 2);

        fs::write(root.join("moved/later.md"), page("Later")).unwrap();
        assert!(wait_until(|| index.lookup("later").is_some()).await);

        watcher.shutdown().await;
    }
}
