//! File watching: map source changes to the tasks that rebuild them.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use runnel_pipeline::{glob_base, GlobMatcher};
use tokio::sync::mpsc as async_mpsc;

use crate::server::ServerError;

/// Patterns whose matches retrigger a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchBinding {
    pub patterns: Vec<String>,
    pub task: String,
}

impl WatchBinding {
    pub fn new(patterns: &[String], task: impl Into<String>) -> Self {
        Self {
            patterns: patterns.to_vec(),
            task: task.into(),
        }
    }
}

/// Compiled bindings under one project root.
#[derive(Debug, Clone)]
pub struct WatchSet {
    root: PathBuf,
    bindings: Vec<(GlobMatcher, String)>,
    ignore: Vec<PathBuf>,
}

impl WatchSet {
    /// Compile `bindings`. Changes under any `ignore` directory (relative to
    /// `root`), such as the build output, never trigger anything.
    pub fn new(
        root: impl Into<PathBuf>,
        bindings: &[WatchBinding],
        ignore: &[PathBuf],
    ) -> Result<Self, ServerError> {
        let root = root.into();
        let compiled = bindings
            .iter()
            .map(|b| {
                GlobMatcher::new(&b.patterns)
                    .map(|matcher| (matcher, b.task.clone()))
                    .map_err(|e| ServerError::Watch(e.to_string()))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            ignore: ignore.iter().map(|dir| root.join(dir)).collect(),
            root,
            bindings: compiled,
        })
    }

    /// Directories to watch: each pattern's glob base, without ones nested
    /// inside another.
    pub fn directories(&self, bindings: &[WatchBinding]) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = bindings
            .iter()
            .flat_map(|b| &b.patterns)
            .filter(|p| !p.starts_with('!'))
            .map(|p| self.root.join(glob_base(p)))
            .collect();
        dirs.sort();
        dirs.dedup();

        let mut roots: Vec<PathBuf> = Vec::new();
        for dir in dirs {
            if !roots.iter().any(|r| dir.starts_with(r)) {
                roots.push(dir);
            }
        }
        roots
    }

    /// Tasks triggered by changes to `paths`, each once, in binding order.
    pub fn tasks_for_paths(&self, paths: &[PathBuf]) -> Vec<String> {
        let relative: Vec<String> = paths
            .iter()
            .filter(|p| !self.ignore.iter().any(|dir| p.starts_with(dir)))
            .filter_map(|p| p.strip_prefix(&self.root).ok())
            .map(slash_path)
            .collect();

        let mut tasks: Vec<String> = Vec::new();
        for (matcher, task) in &self.bindings {
            if tasks.contains(task) {
                continue;
            }
            if relative.iter().any(|path| matcher.is_match(path)) {
                tasks.push(task.clone());
            }
        }
        tasks
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// File watcher for triggering tasks.
///
/// Events are coalesced: a batch is emitted once no further event arrived
/// for the debounce window.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `root` for changes matching `bindings`.
    ///
    /// Returns the watcher and a channel of task batches. Dropping the
    /// watcher stops it and closes the channel.
    pub fn new(
        root: &Path,
        bindings: &[WatchBinding],
        ignore: &[PathBuf],
        debounce: Duration,
    ) -> Result<(Self, async_mpsc::Receiver<Vec<String>>), ServerError> {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let set = WatchSet::new(&root, bindings, ignore)?;

        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(16);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) if !matches!(event.kind, EventKind::Access(_)) => {
                    let _ = sync_tx.send(event.paths);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Watch error: {}", e),
            }
        })
        .map_err(|e| ServerError::Watch(e.to_string()))?;

        for dir in set.directories(bindings) {
            if dir.exists() {
                tracing::debug!("Watching {}", dir.display());
                watcher
                    .watch(&dir, RecursiveMode::Recursive)
                    .map_err(|e| ServerError::Watch(format!("{}: {}", dir.display(), e)))?;
            } else {
                tracing::warn!("Not watching {}: directory does not exist", dir.display());
            }
        }

        std::thread::spawn(move || {
            while let Ok(mut paths) = sync_rx.recv() {
                loop {
                    match sync_rx.recv_timeout(debounce) {
                        Ok(more) => paths.extend(more),
                        Err(mpsc::RecvTimeoutError::Timeout) => break,
                        Err(mpsc::RecvTimeoutError::Disconnected) => return,
                    }
                }

                let tasks = set.tasks_for_paths(&paths);
                if !tasks.is_empty() && async_tx.blocking_send(tasks).is_err() {
                    return;
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}
