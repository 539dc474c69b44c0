// Shared indexing state (spec §9 design notes): a thin handle around the
// watcher's reindexing/deferred-event bookkeeping, so the scheduler can
// mark a folder busy and replay what the watcher buffered without holding
// a dependency on the scheduler from the watcher module (or vice versa).

use crate::watcher::events::FileChangeEvent;
use crate::watcher::manager::FileWatcherManager;
use std::sync::Arc;

pub struct SharedIndexingState {
    watcher: Arc<FileWatcherManager>,
}

impl SharedIndexingState {
    pub fn new(watcher: Arc<FileWatcherManager>) -> Self {
        Self { watcher }
    }

    /// Marks `folder_path` busy: the watcher buffers further events for it
    /// instead of routing them while a full reindex is in flight.
    pub fn begin_folder(&self, folder_path: &str) {
        self.watcher.mark_reindexing(folder_path);
    }

    /// Marks `folder_path` free again and returns whatever events were
    /// deferred while it was busy, for the caller to route immediately.
    pub fn finish_folder(&self, folder_path: &str) -> Vec<FileChangeEvent> {
        self.watcher.finish_reindexing(folder_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_folder_returns_events_deferred_during_begin() {
        let watcher = Arc::new(FileWatcherManager::new());
        let state = SharedIndexingState::new(watcher.clone());

        state.begin_folder("/videos");
        let actions = watcher.route(vec![crate::watcher::events::FileChangeEvent {
            folder_path: "/videos".to_string(),
            path: "/videos/a.mp4".into(),
            kind: crate::watcher::events::ChangeKind::Added,
        }]);
        assert!(actions.is_empty(), "events for a reindexing folder should be buffered, not routed");

        let replayed = state.finish_folder("/videos");
        assert_eq!(replayed.len(), 1);
    }
}
