// Cross-platform file watcher (spec §4.4). `FileSystemWatcher` wraps
// `notify` + `notify-debouncer-full` the way the teacher wraps ffmpeg-sidecar:
// a thin adapter that turns a callback-driven external API into owned,
// typed events delivered over a channel.

use crate::constants::{VIDEO_EXTENSIONS, WATCHER_DEBOUNCE_MS};
use crate::error::{FindItError, Result};
use crate::watcher::events::{deduplicate_events, ChangeKind, FileChangeEvent};
use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, FileIdMap};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub(crate) fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Thin wrapper exposing `watch`/`unwatch`/`stop_all` and a coalesced batch
/// of `FileChangeEvent` per folder after the debounce window.
pub struct FileSystemWatcher {
    debouncer: Mutex<Debouncer<notify::RecommendedWatcher, FileIdMap>>,
    folder_of: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl FileSystemWatcher {
    pub fn new(tx: mpsc::UnboundedSender<Vec<FileChangeEvent>>) -> Result<Self> {
        let folder_of: Arc<Mutex<HashMap<PathBuf, String>>> = Arc::new(Mutex::new(HashMap::new()));
        let folder_of_cb = Arc::clone(&folder_of);

        let debouncer = new_debouncer(
            Duration::from_millis(WATCHER_DEBOUNCE_MS),
            None,
            move |result: DebounceEventResult| {
                let events = match result {
                    Ok(events) => events,
                    Err(_) => return,
                };
                let folders = folder_of_cb.lock().expect("watcher folder map poisoned");
                let mut out = Vec::new();
                for event in events {
                    for path in &event.event.paths {
                        let Some(folder_path) = folder_for_path(&folders, path) else {
                            continue;
                        };
                        let kind = classify(&event.event.kind, path);
                        if kind == ChangeKind::RescanNeeded || is_video_path(path) {
                            out.push(FileChangeEvent {
                                path: path.clone(),
                                folder_path,
                                kind,
                            });
                        }
                    }
                }
                if !out.is_empty() {
                    let _ = tx.send(deduplicate_events(out));
                }
            },
        )
        .map_err(|e| FindItError::Other(format!("failed to start file watcher: {e}")))?;

        Ok(Self {
            debouncer: Mutex::new(debouncer),
            folder_of,
        })
    }

    pub fn watch(&self, folder_path: &str) -> Result<()> {
        let path = PathBuf::from(folder_path);
        self.debouncer
            .lock()
            .expect("watcher poisoned")
            .watch(&path, RecursiveMode::Recursive)
            .map_err(|e| FindItError::Other(format!("failed to watch {folder_path}: {e}")))?;
        self.folder_of
            .lock()
            .expect("watcher folder map poisoned")
            .insert(path, folder_path.to_string());
        Ok(())
    }

    pub fn unwatch(&self, folder_path: &str) -> Result<()> {
        let path = PathBuf::from(folder_path);
        let _ = self.debouncer.lock().expect("watcher poisoned").unwatch(&path);
        self.folder_of.lock().expect("watcher folder map poisoned").remove(&path);
        Ok(())
    }

    pub fn stop_all(&self) {
        let paths: Vec<PathBuf> = self
            .folder_of
            .lock()
            .expect("watcher folder map poisoned")
            .keys()
            .cloned()
            .collect();
        let mut debouncer = self.debouncer.lock().expect("watcher poisoned");
        for path in paths {
            let _ = debouncer.unwatch(&path);
        }
        self.folder_of.lock().expect("watcher folder map poisoned").clear();
    }
}

fn folder_for_path(folders: &HashMap<PathBuf, String>, path: &Path) -> Option<String> {
    folders
        .iter()
        .filter(|(root, _)| path.starts_with(root))
        .max_by_key(|(root, _)| root.as_os_str().len())
        .map(|(_, folder)| folder.clone())
}

fn classify(kind: &notify::EventKind, path: &Path) -> ChangeKind {
    use notify::EventKind;
    match kind {
        EventKind::Create(_) => ChangeKind::Added,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Other | EventKind::Any => {
            if path.exists() {
                ChangeKind::RescanNeeded
            } else {
                ChangeKind::Removed
            }
        }
        _ => ChangeKind::Modified,
    }
}

/// What the manager tells the caller to do with a drained, routed batch.
pub enum WatcherAction {
    QueueVideos { folder_path: String, paths: Vec<PathBuf> },
    SoftDelete { folder_path: String, paths: Vec<PathBuf> },
    RescanFolder { folder_path: String },
}

/// Serializes batches through a single drain loop so ordering is preserved
/// across suspension points, deferring events for folders mid-reindex and
/// replaying them once that folder's indexing completes.
pub struct FileWatcherManager {
    deferred: Mutex<HashMap<String, VecDeque<FileChangeEvent>>>,
    reindexing: Mutex<std::collections::HashSet<String>>,
}

impl FileWatcherManager {
    pub fn new() -> Self {
        Self {
            deferred: Mutex::new(HashMap::new()),
            reindexing: Mutex::new(std::collections::HashSet::new()),
        }
    }

    pub fn mark_reindexing(&self, folder_path: &str) {
        self.reindexing
            .lock()
            .expect("reindexing set poisoned")
            .insert(folder_path.to_string());
    }

    /// Call when a folder finishes a full reindex; returns any events that
    /// were buffered while it was busy, to be routed immediately.
    pub fn finish_reindexing(&self, folder_path: &str) -> Vec<FileChangeEvent> {
        self.reindexing.lock().expect("reindexing set poisoned").remove(folder_path);
        self.deferred
            .lock()
            .expect("deferred map poisoned")
            .remove(folder_path)
            .map(|q| q.into_iter().collect())
            .unwrap_or_default()
    }

    /// Routes one debounced batch (already deduplicated) into actions,
    /// per spec §4.4: rescan_needed short-circuits the whole folder; a
    /// folder under active reindex gets its events buffered instead.
    pub fn route(&self, batch: Vec<FileChangeEvent>) -> Vec<WatcherAction> {
        let mut by_folder: HashMap<String, Vec<FileChangeEvent>> = HashMap::new();
        for event in batch {
            by_folder.entry(event.folder_path.clone()).or_default().push(event);
        }

        let mut actions = Vec::new();
        let reindexing = self.reindexing.lock().expect("reindexing set poisoned");

        for (folder_path, events) in by_folder {
            if reindexing.contains(&folder_path) {
                let mut deferred = self.deferred.lock().expect("deferred map poisoned");
                deferred.entry(folder_path).or_default().extend(events);
                continue;
            }

            if events.iter().any(|e| e.kind == ChangeKind::RescanNeeded) {
                actions.push(WatcherAction::RescanFolder { folder_path });
                continue;
            }

            let mut added_or_modified = Vec::new();
            let mut removed = Vec::new();
            for event in events {
                match event.kind {
                    ChangeKind::Added | ChangeKind::Modified => added_or_modified.push(event.path),
                    ChangeKind::Removed => removed.push(event.path),
                    ChangeKind::RescanNeeded => unreachable!(),
                }
            }
            if !added_or_modified.is_empty() {
                actions.push(WatcherAction::QueueVideos {
                    folder_path: folder_path.clone(),
                    paths: added_or_modified,
                });
            }
            if !removed.is_empty() {
                actions.push(WatcherAction::SoftDelete { folder_path, paths: removed });
            }
        }

        actions
    }
}

impl Default for FileWatcherManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(folder: &str, path: &str, kind: ChangeKind) -> FileChangeEvent {
        FileChangeEvent {
            path: PathBuf::from(path),
            folder_path: folder.to_string(),
            kind,
        }
    }

    #[test]
    fn events_for_reindexing_folder_are_deferred() {
        let manager = FileWatcherManager::new();
        manager.mark_reindexing("/f");
        let actions = manager.route(vec![ev("/f", "/f/a.mp4", ChangeKind::Added)]);
        assert!(actions.is_empty());
        let replayed = manager.finish_reindexing("/f");
        assert_eq!(replayed.len(), 1);
    }

    #[test]
    fn rescan_needed_discards_other_events_for_that_folder() {
        let manager = FileWatcherManager::new();
        let actions = manager.route(vec![
            ev("/f", "/f/a.mp4", ChangeKind::Added),
            ev("/f", "/f/b.mp4", ChangeKind::RescanNeeded),
        ]);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], WatcherAction::RescanFolder { .. }));
    }

    #[test]
    fn added_and_removed_route_separately() {
        let manager = FileWatcherManager::new();
        let actions = manager.route(vec![
            ev("/f", "/f/a.mp4", ChangeKind::Added),
            ev("/f", "/f/b.mp4", ChangeKind::Removed),
        ]);
        assert_eq!(actions.len(), 2);
    }
}
