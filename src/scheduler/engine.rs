// IndexingScheduler (spec §4.8): the driver loop that turns folder/video
// work items into bounded-concurrency `process_video` calls, fed by the
// fair semaphore (§4.6) and adjusted live by the resource monitor.

use crate::concurrency::resource_monitor::{sample_system_state, ResourceMonitor};
use crate::concurrency::semaphore::AsyncSemaphore;
use crate::config::PerformanceMode;
use crate::constants::VIDEO_EXTENSIONS;
use crate::db::pool::DbPool;
use crate::error::{FindItError, Result};
use crate::pipeline::process::{process_video, ProcessOptions, ProcessProviders, ProcessResult};
use crate::scheduler::state::SharedIndexingState;
use crate::watcher::events::FileChangeEvent;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn discover_video_files(folder_path: &str) -> Vec<PathBuf> {
    discover_video_files_excluding(folder_path, &[])
}

/// Walks `folder_path` for video files, skipping any subtree that falls
/// under one of `excluding` (used when a folder is added as the new parent
/// of already-registered children, per the hierarchy resolution).
pub fn discover_video_files_excluding(folder_path: &str, excluding: &[String]) -> Vec<PathBuf> {
    let excluded_prefixes: Vec<PathBuf> = excluding.iter().map(PathBuf::from).collect();
    walkdir::WalkDir::new(folder_path)
        .into_iter()
        .filter_entry(|entry| !excluded_prefixes.iter().any(|prefix| entry.path() == prefix))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_video_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

/// Result of a `process_folder`/`process_specific_videos` run: the
/// per-video outcomes, plus whatever watcher events were buffered while
/// the folder was marked busy.
pub struct ProcessFolderOutcome {
    pub results: Vec<ProcessResult>,
    pub deferred_events: Vec<FileChangeEvent>,
}

pub struct IndexingScheduler {
    semaphore: Arc<AsyncSemaphore>,
    cancelled: Arc<AtomicBool>,
    indexing_state: Arc<SharedIndexingState>,
    resource_monitor: ResourceMonitor,
}

impl IndexingScheduler {
    pub fn new(initial_permits: usize, indexing_state: Arc<SharedIndexingState>) -> Self {
        Self {
            semaphore: AsyncSemaphore::new(initial_permits),
            cancelled: Arc::new(AtomicBool::new(false)),
            indexing_state,
            resource_monitor: ResourceMonitor::new(),
        }
    }

    /// Starts the ~5s resource sampling loop feeding `set_max_permits`.
    /// The handle's lifetime is the caller's to manage; `stop()` on the
    /// scheduler's resource monitor halts sampling without aborting it.
    pub fn start_resource_monitoring(&self, mode: PerformanceMode) -> tokio::task::JoinHandle<()> {
        let semaphore = self.semaphore.clone();
        self.resource_monitor.spawn(mode, sample_system_state, move |permits| {
            let semaphore = semaphore.clone();
            tokio::spawn(async move { semaphore.set_max_permits(permits).await });
        })
    }

    pub fn stop_resource_monitoring(&self) {
        self.resource_monitor.stop();
    }

    /// Cancels all in-flight and queued work: releases every semaphore
    /// waiter so they observe the flag at their next suspension point.
    /// Work already committed to a database stays committed.
    pub async fn cancel_indexing(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.semaphore.release_all().await;
    }

    /// Re-arms the scheduler for the next run after a cancellation.
    pub fn reset_cancellation(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Full folder rescan: walks the folder for video files and processes
    /// each one under the semaphore, marking the folder busy so the
    /// watcher defers events for it until this returns.
    pub async fn process_folder(
        &self,
        folder_path: &str,
        folder_pool: Arc<DbPool>,
        global_pool: Option<Arc<DbPool>>,
        providers: ProcessProviders,
    ) -> Result<ProcessFolderOutcome> {
        let video_paths = discover_video_files(folder_path);
        let outcome = self
            .process_paths(folder_path, &video_paths, folder_pool, global_pool, providers)
            .await?;
        Ok(outcome)
    }

    /// Targeted reindex of specific paths (spec §4.4: `QueueVideos` action
    /// from the watcher), under the same busy/defer guard as a full scan.
    pub async fn process_specific_videos(
        &self,
        folder_path: &str,
        video_paths: &[PathBuf],
        folder_pool: Arc<DbPool>,
        global_pool: Option<Arc<DbPool>>,
        providers: ProcessProviders,
    ) -> Result<ProcessFolderOutcome> {
        self.process_paths(folder_path, video_paths, folder_pool, global_pool, providers).await
    }

    async fn process_paths(
        &self,
        folder_path: &str,
        video_paths: &[PathBuf],
        folder_pool: Arc<DbPool>,
        global_pool: Option<Arc<DbPool>>,
        providers: ProcessProviders,
    ) -> Result<ProcessFolderOutcome> {
        self.indexing_state.begin_folder(folder_path);

        let mut tasks = Vec::with_capacity(video_paths.len());
        for video_path in video_paths {
            if self.is_cancelled() {
                break;
            }
            let semaphore = self.semaphore.clone();
            let cancelled = self.cancelled.clone();
            let folder_pool = folder_pool.clone();
            let global_pool = global_pool.clone();
            let providers = providers.clone();
            let folder_path = folder_path.to_string();
            let video_path = video_path.clone();

            tasks.push(tokio::spawn(async move {
                let permit = semaphore.acquire().await;
                if cancelled.load(Ordering::SeqCst) {
                    drop(permit);
                    return Err(FindItError::Cancelled);
                }
                let local_cancelled = AtomicBool::new(false);
                let opts = ProcessOptions {
                    video_path: &video_path,
                    folder_path: &folder_path,
                    skip_stt: false,
                    skip_sync: global_pool.is_none(),
                    providers: &providers,
                    cancelled: &local_cancelled,
                    on_progress: &|_stage| {},
                };
                let result = process_video(opts, &folder_pool, global_pool.as_deref()).await;
                drop(permit);
                result
            }));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(FindItError::Cancelled)) => {
                    info!(folder = folder_path, "indexing cancelled mid-folder");
                }
                Ok(Err(err)) => warn!(folder = folder_path, error = %err, "video processing failed"),
                Err(join_err) => warn!(folder = folder_path, error = %join_err, "video processing task panicked"),
            }
        }

        let deferred_events = self.indexing_state.finish_folder(folder_path);
        Ok(ProcessFolderOutcome { results, deferred_events })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_folder_migrations;
    use crate::watcher::manager::FileWatcherManager;

    #[tokio::test]
    async fn process_specific_videos_indexes_each_path() {
        let dir = tempfile::tempdir().unwrap();
        let video_path = dir.path().join("a.mp4");
        std::fs::write(&video_path, b"fake video bytes").unwrap();

        let folder_pool = Arc::new(DbPool::open_in_memory(run_folder_migrations).unwrap());
        let indexing_state = Arc::new(SharedIndexingState::new(Arc::new(FileWatcherManager::new())));
        let scheduler = IndexingScheduler::new(2, indexing_state);

        let outcome = scheduler
            .process_specific_videos(
                dir.path().to_str().unwrap(),
                &[video_path],
                folder_pool,
                None,
                ProcessProviders::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.deferred_events.is_empty());
    }

    #[tokio::test]
    async fn cancel_indexing_stops_enqueueing_new_work() {
        let indexing_state = Arc::new(SharedIndexingState::new(Arc::new(FileWatcherManager::new())));
        let scheduler = IndexingScheduler::new(1, indexing_state);
        scheduler.cancel_indexing().await;
        assert!(scheduler.is_cancelled());

        let folder_pool = Arc::new(DbPool::open_in_memory(run_folder_migrations).unwrap());
        let outcome = scheduler
            .process_specific_videos("/f", &[PathBuf::from("/f/a.mp4")], folder_pool, None, ProcessProviders::default())
            .await
            .unwrap();
        assert!(outcome.results.is_empty());
    }
}
