//! Filesystem watcher for the two workspace files

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blockdiff_core::{Catalog, Document, Side};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Events emitted by the file watcher
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// File created or modified
    Changed(PathBuf),
    /// File removed or renamed away
    Removed(PathBuf),
}

/// Thin wrapper over a notify watcher that forwards events to a channel.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl FileWatcher {
    pub fn new() -> Result<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                debug!("File system event: {:?}", event);
                Self::handle_notify_event(event, &event_tx);
            }
            Err(e) => {
                error!("File system watch error: {}", e);
            }
        })?;
        Ok(Self { watcher, event_rx })
    }

    fn handle_notify_event(event: notify::Event, event_tx: &mpsc::UnboundedSender<WatchEvent>) {
        let make: fn(PathBuf) -> WatchEvent = match event.kind {
            notify::EventKind::Create(_) | notify::EventKind::Modify(_) => WatchEvent::Changed,
            notify::EventKind::Remove(_) => WatchEvent::Removed,
            _ => return,
        };
        for path in event.paths {
            if let Err(e) = event_tx.send(make(path)) {
                warn!("Failed to forward watch event: {}", e);
            }
        }
    }

    /// Watch a directory (not its subdirectories).
    pub fn watch_directory(&mut self, path: &Path) -> Result<()> {
        info!("Watching directory: {}", path.display());
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        self.event_rx.recv().await
    }
}

/// Reloads a side whenever its file changes on disk.
///
/// Editors often save by writing a new file and renaming it over the old
/// one, so the parent directories are watched rather than the files.
pub struct WatcherService {
    files: HashMap<PathBuf, Side>,
    catalog: Catalog,
    /// Content hash of the last successfully loaded version per side.
    loaded: HashMap<Side, u64>,
}

impl WatcherService {
    pub fn new(catalog: Catalog) -> Self {
        WatcherService {
            files: HashMap::new(),
            catalog,
            loaded: HashMap::new(),
        }
    }

    /// Track `path` as the file backing `side`. The file must exist.
    pub fn track(&mut self, side: Side, path: &Path) -> Result<()> {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("Cannot watch {}", path.display()))?;
        self.files.insert(canonical, side);
        Ok(())
    }

    pub fn side_for(&self, path: &Path) -> Option<Side> {
        let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.files.get(&resolved).copied()
    }

    /// Remember the content a side was loaded with so an identical rewrite
    /// does not trigger a reload.
    pub fn mark_loaded(&mut self, side: Side, content: &str) {
        self.loaded.insert(side, content_hash(content));
    }

    /// Re-read a changed file. Returns the side and its new document, or
    /// `None` if the file is untracked, unchanged, or does not parse.
    pub fn reload(&mut self, path: &Path) -> Option<(Side, Document)> {
        let side = self.side_for(path)?;
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };
        let hash = content_hash(&content);
        if self.loaded.get(&side) == Some(&hash) {
            debug!("{} unchanged, skipping reload", path.display());
            return None;
        }
        match Document::parse(&content, &self.catalog) {
            Ok(document) => {
                info!("Reloaded {} workspace from {}", side, path.display());
                self.loaded.insert(side, hash);
                Some((side, document))
            }
            Err(e) => {
                error!("Failed to parse {}: {}; keeping the previous {} workspace", path.display(), e, side);
                None
            }
        }
    }

    /// Watch every tracked file and call `on_reload` for each successful
    /// reload. Runs until the underlying watcher stops.
    pub async fn run<F, Fut>(mut self, mut on_reload: F) -> Result<()>
    where
        F: FnMut(Side, Document) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut watcher = FileWatcher::new()?;
        let mut directories: Vec<PathBuf> = self
            .files
            .keys()
            .filter_map(|p| p.parent().map(Path::to_path_buf))
            .collect();
        directories.sort();
        directories.dedup();
        for dir in &directories {
            watcher.watch_directory(dir)?;
        }

        while let Some(event) = watcher.next_event().await {
            match event {
                WatchEvent::Changed(path) => {
                    if let Some((side, document)) = self.reload(&path) {
                        on_reload(side, document).await;
                    }
                }
                WatchEvent::Removed(path) => {
                    if let Some(side) = self.side_for(&path) {
                        warn!("{} workspace file {} was removed", side, path.display());
                    }
                }
            }
        }
        Ok(())
    }
}

fn content_hash(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}
