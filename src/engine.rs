// Engine (spec §6): the public API surface wiring every other module
// together. Mirrors the teacher's top-level service struct — one long-lived
// handle the host application holds, constructed once via `init_engine`.

use crate::config::{EngineConfig, ProviderKind};
use crate::db::{self, folder_schema};
use crate::db::pool::DbPool;
use crate::error::{FindItError, Result};
use crate::hierarchy::{AdditionResolution, FolderHierarchy};
use crate::model::{FailureRecord, SearchResult, WatchedFolder};
use crate::pipeline::process::{ProcessOutcome, ProcessProviders};
use crate::providers::clip_embed::{CloudCLIPEmbeddingProvider, OfflineCLIPEmbeddingProvider};
use crate::providers::embedding::{CloudEmbeddingProvider, OfflineEmbeddingProvider};
use crate::providers::rate_limit::RateLimiter;
use crate::providers::stt::{CloudSTTProvider, OfflineSTTProvider};
use crate::providers::vision::{CloudVisionCaptionProvider, OfflineVisionCaptionProvider};
use crate::providers::{CLIPEmbeddingProvider, EmbeddingProvider};
use crate::query::{Dictionary, HybridSearchProviders, QueryPipeline, SearchEngine, SearchFilter};
use crate::scheduler::{IndexingScheduler, SharedIndexingState};
use crate::sync::SyncEngine;
use crate::vector::{VectorIndexManager, VectorStore};
use crate::volume::monitor::{set_folder_availability, TrackedFolder, VolumeMonitor};
use crate::volume::resolver::VolumeResolver;
use crate::watcher::manager::{FileSystemWatcher, FileWatcherManager, WatcherAction};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Synchronous FTS-only lookup, for the keystroke-by-keystroke path.
    Fts,
    /// Full three-way hybrid fusion, for the debounced path.
    Auto,
}

#[derive(Debug, Clone)]
pub enum IndexingProgress {
    FolderStarted { folder_path: String },
    VideoStage { folder_path: String, video_path: String, stage: String },
    FolderFinished { folder_path: String, outcome: IndexingOutcome },
}

#[derive(Debug, Clone, Default)]
pub struct IndexingOutcome {
    pub folder_path: String,
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct FolderAvailabilityChanged {
    pub folder_path: String,
    pub is_available: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct VectorStoreInvalidated;

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Indexing(IndexingProgress),
    FolderAvailability(FolderAvailabilityChanged),
    VectorStoreInvalidated(VectorStoreInvalidated),
}

/// Persisted alongside `global.sqlite`: which top-level folders are
/// independently indexed, and which paths are UI-only bookmarks under one
/// of them (spec: "a subfolder addition under an existing parent records
/// only a UI bookmark, no separate index").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FolderRegistry {
    folders: Vec<String>,
    bookmarks: HashMap<String, String>,
}

impl FolderRegistry {
    fn load(data_dir: &Path) -> Result<Self> {
        let path = registry_path(data_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&self, data_dir: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(registry_path(data_dir), text)?;
        Ok(())
    }
}

fn registry_path(data_dir: &Path) -> PathBuf {
    data_dir.join("folders.json")
}

fn build_providers(config: &EngineConfig) -> (ProcessProviders, HybridSearchProviders) {
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_rpm));

    let (vision, stt, text_embedding, clip_embedding): (
        Option<Arc<dyn crate::providers::vision::VisionCaptionProvider>>,
        Option<Arc<dyn crate::providers::stt::STTProvider>>,
        Option<Arc<dyn EmbeddingProvider>>,
        Option<Arc<dyn CLIPEmbeddingProvider>>,
    ) = match config.provider {
        ProviderKind::Cloud => (
            Some(Arc::new(CloudVisionCaptionProvider::new(
                format!("{}/vision", config.cloud_api_base),
                config.cloud_api_key.clone(),
            ))),
            Some(Arc::new(CloudSTTProvider::new(
                format!("{}/stt", config.cloud_api_base),
                config.cloud_api_key.clone(),
            ))),
            Some(Arc::new(CloudEmbeddingProvider::new(
                format!("{}/embeddings", config.cloud_api_base),
                config.cloud_api_key.clone(),
                config.embedding_dimensions,
                rate_limiter.clone(),
            ))),
            Some(Arc::new(CloudCLIPEmbeddingProvider::new(
                format!("{}/clip", config.cloud_api_base),
                config.cloud_api_key.clone(),
            ))),
        ),
        ProviderKind::Offline => (
            Some(Arc::new(OfflineVisionCaptionProvider::new(config.model_dir.join(&config.vision_model)))),
            Some(Arc::new(OfflineSTTProvider::new(config.model_dir.join("whisper")))),
            Some(Arc::new(OfflineEmbeddingProvider::new(
                config.model_dir.join(&config.embedding_model),
                config.embedding_dimensions,
            ))),
            Some(Arc::new(OfflineCLIPEmbeddingProvider::new(config.model_dir.join(&config.clip_model)))),
        ),
    };

    let process_providers = ProcessProviders {
        vision: if config.skip_vision { None } else { vision },
        stt: if config.skip_stt { None } else { stt },
        text_embedding: if config.skip_embedding { None } else { text_embedding.clone() },
        clip_embedding: clip_embedding.clone(),
        rate_limiter: Some(rate_limiter),
    };
    let hybrid_providers = HybridSearchProviders { clip_embedding, text_embedding };
    (process_providers, hybrid_providers)
}

pub struct Engine {
    data_dir: PathBuf,
    config: EngineConfig,
    global_pool: Arc<DbPool>,
    folder_pools: Arc<Mutex<HashMap<String, Arc<DbPool>>>>,
    registry: Mutex<FolderRegistry>,
    watcher: Arc<FileWatcherManager>,
    fs_watcher: FileSystemWatcher,
    scheduler: Arc<IndexingScheduler>,
    volume_monitor: VolumeMonitor,
    volume_resolver: VolumeResolver,
    vector_manager: Arc<VectorIndexManager>,
    search_engine: Arc<SearchEngine>,
    process_providers: ProcessProviders,
    hybrid_providers: HybridSearchProviders,
    events: broadcast::Sender<EngineEvent>,
    watcher_events_rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<crate::watcher::events::FileChangeEvent>>>>,
    failures: Mutex<HashMap<String, VecDeque<FailureRecord>>>,
}

/// Construct the engine from a data directory and its config (spec §6:
/// `init_engine(data_dir, config) -> Engine`).
pub async fn init_engine(data_dir: impl Into<PathBuf>, config: EngineConfig) -> Result<Engine> {
    let data_dir = data_dir.into();
    std::fs::create_dir_all(&data_dir)?;
    crate::config::init_tracing();

    let global_pool = Arc::new(db::open_global_pool(&data_dir, 4)?);
    let registry = FolderRegistry::load(&data_dir)?;
    let folder_pools: Arc<Mutex<HashMap<String, Arc<DbPool>>>> = Arc::new(Mutex::new(HashMap::new()));

    for folder_path in &registry.folders {
        match db::open_folder_pool(Path::new(folder_path), 4) {
            Ok(pool) => {
                folder_pools.lock().expect("folder pool map poisoned").insert(folder_path.clone(), Arc::new(pool));
            }
            Err(err) => warn!(folder = folder_path, error = %err, "failed to open folder db at startup"),
        }
    }

    let (watcher_tx, watcher_events_rx) = mpsc::unbounded_channel();
    let fs_watcher = FileSystemWatcher::new(watcher_tx)?;
    let watcher = Arc::new(FileWatcherManager::new());
    for folder_path in &registry.folders {
        if let Err(err) = fs_watcher.watch(folder_path) {
            warn!(folder = folder_path, error = %err, "failed to (re)watch folder at startup");
        }
    }

    let indexing_state = Arc::new(SharedIndexingState::new(watcher.clone()));
    let scheduler = Arc::new(IndexingScheduler::new(num_cpus(), indexing_state));
    scheduler.start_resource_monitoring(config.performance_mode);

    let volume_monitor = VolumeMonitor::new(folder_pools.clone());
    let volume_resolver = VolumeResolver::new();

    let vector_manager = Arc::new(VectorIndexManager::new(data_dir.as_path(), config.clip_dimensions, config.embedding_dimensions));
    let text_vector_store = Arc::new(VectorStore::new(config.embedding_dimensions, config.embedding_model.clone()));

    let neural_translator = if matches!(config.provider, ProviderKind::Offline) {
        Some(Arc::new(crate::query::translate::OfflineNeuralTranslator::new(config.model_dir.join("translator")))
            as Arc<dyn crate::query::translate::NeuralTranslator>)
    } else {
        None
    };
    let query_pipeline = Arc::new(QueryPipeline::new(Dictionary::default(), neural_translator));

    let search_engine = Arc::new(SearchEngine::new(
        global_pool.clone(),
        query_pipeline,
        vector_manager.clone(),
        text_vector_store,
        config.clip_model.clone(),
        config.embedding_model.clone(),
    ));

    let (process_providers, hybrid_providers) = build_providers(&config);
    let (events, _) = broadcast::channel(256);

    let tracked: Vec<TrackedFolder> = registry
        .folders
        .iter()
        .map(|folder_path| {
            let is_available = Path::new(folder_path).exists();
            let volume_uuid = folder_pools
                .lock()
                .expect("folder pool map poisoned")
                .get(folder_path)
                .and_then(|pool| pool.with_reader(folder_schema::get_watched_folder).ok().flatten())
                .and_then(|f| f.volume_uuid);
            TrackedFolder { folder_path: folder_path.clone(), volume_uuid, is_available }
        })
        .collect();
    if let Ok(outcome) = volume_monitor.reconcile_at_startup(&tracked, &global_pool) {
        for (old_path, new_path) in outcome.rebased_folders {
            info!(old_path, new_path, "folder rebased to new mount point at startup");
        }
    }

    // Startup sync reconciliation (spec §9 open question: the per-folder DB
    // may trail `sync()` if the process died between pipeline completion and
    // the end-of-video sync). Running a sync for every available folder here
    // closes that gap before the engine starts accepting queries.
    {
        let pools = folder_pools.lock().expect("folder pool map poisoned").clone();
        for (folder_path, pool) in pools {
            if !Path::new(&folder_path).exists() {
                continue;
            }
            match SyncEngine::sync(&folder_path, &pool, &global_pool, false) {
                Ok(result) => {
                    if result.synced_videos > 0 || result.synced_clips > 0 {
                        info!(
                            folder = folder_path,
                            synced_videos = result.synced_videos,
                            synced_clips = result.synced_clips,
                            "startup sync reconciliation caught up the global projection"
                        );
                    }
                }
                Err(err) => warn!(folder = folder_path, error = %err, "startup sync reconciliation failed"),
            }
        }
    }

    Ok(Engine {
        data_dir,
        config,
        global_pool,
        folder_pools,
        registry: Mutex::new(registry),
        watcher,
        fs_watcher,
        scheduler,
        volume_monitor,
        volume_resolver,
        vector_manager,
        search_engine,
        process_providers,
        hybrid_providers,
        events,
        watcher_events_rx: Mutex::new(Some(watcher_events_rx)),
        failures: Mutex::new(HashMap::new()),
    })
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl Engine {
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// Drains one batch of coalesced filesystem events and returns the
    /// actions the caller should act on. Intended to be driven by the host
    /// application's event loop (`while let Some(batch) = engine.next_watcher_batch().await`).
    pub async fn next_watcher_batch(&self) -> Option<Vec<WatcherAction>> {
        let mut guard = self.watcher_events_rx.lock().expect("watcher rx poisoned");
        let rx = guard.as_mut()?;
        let batch = rx.recv().await?;
        Some(self.watcher.route(batch))
    }

    fn folder_pool(&self, folder_path: &str) -> Option<Arc<DbPool>> {
        self.folder_pools.lock().expect("folder pool map poisoned").get(folder_path).cloned()
    }

    /// Registers a new folder for indexing, resolving its relationship to
    /// already-registered folders first (spec §6: `FolderHierarchy.resolve_addition`).
    pub async fn add_folder(&self, folder_path: &str) -> Result<()> {
        let folder_path = folder_path.trim_end_matches('/').to_string();
        if !Path::new(&folder_path).is_dir() {
            return Err(FindItError::InvalidPath(folder_path));
        }

        let existing = self.registry.lock().expect("registry poisoned").folders.clone();
        let resolution = FolderHierarchy::resolve_addition(&folder_path, &existing);

        match resolution {
            AdditionResolution::Duplicate => Err(FindItError::InvalidPath(format!("already registered: {folder_path}"))),
            AdditionResolution::AddAsSubfolderBookmark { parent } => {
                let mut registry = self.registry.lock().expect("registry poisoned");
                registry.bookmarks.insert(folder_path.clone(), parent);
                registry.save(&self.data_dir)?;
                info!(folder = folder_path, "registered as subfolder bookmark, no separate index created");
                Ok(())
            }
            AdditionResolution::AddNormally => {
                self.register_and_scan(&folder_path, &[]).await?;
                let mut registry = self.registry.lock().expect("registry poisoned");
                registry.folders.push(folder_path);
                registry.save(&self.data_dir)?;
                Ok(())
            }
            AdditionResolution::AddAsParent { children } => {
                self.register_and_scan(&folder_path, &children).await?;
                let mut registry = self.registry.lock().expect("registry poisoned");
                registry.folders.push(folder_path);
                registry.save(&self.data_dir)?;
                Ok(())
            }
        }
    }

    async fn register_and_scan(&self, folder_path: &str, excluding: &[String]) -> Result<()> {
        let pool = Arc::new(db::open_folder_pool(Path::new(folder_path), 4)?);
        let (volume_name, volume_uuid) = self.volume_resolver.resolve(Path::new(folder_path));
        pool.with_writer(|conn| {
            folder_schema::upsert_watched_folder(
                conn,
                &WatchedFolder {
                    folder_path: folder_path.to_string(),
                    volume_name,
                    volume_uuid,
                    is_available: true,
                    last_seen_at: Some(chrono::Utc::now().to_rfc3339()),
                },
            )
        })?;

        self.folder_pools.lock().expect("folder pool map poisoned").insert(folder_path.to_string(), pool);
        self.fs_watcher.watch(folder_path)?;

        self.queue_folder(folder_path, excluding).await?;
        Ok(())
    }

    /// Unregisters a folder: stops watching it, drops global rows sourced
    /// from it, and removes any bookmarks that pointed at it as a parent.
    /// The per-folder `.findit` database is left on disk untouched.
    pub fn remove_folder(&self, folder_path: &str) -> Result<()> {
        let folder_path = folder_path.trim_end_matches('/');
        self.fs_watcher.unwatch(folder_path)?;
        self.folder_pools.lock().expect("folder pool map poisoned").remove(folder_path);
        SyncEngine::remove_folder_data(folder_path, &self.global_pool)?;

        let mut registry = self.registry.lock().expect("registry poisoned");
        registry.folders.retain(|f| f != folder_path);
        registry.bookmarks.retain(|_, parent| parent != folder_path);
        registry.save(&self.data_dir)?;

        self.search_engine.invalidate_filter_cache();
        self.emit(EngineEvent::VectorStoreInvalidated(VectorStoreInvalidated));
        Ok(())
    }

    /// All registered folders, independently-indexed roots first, bookmarks
    /// reported with the parent's availability.
    pub fn folders(&self) -> Vec<WatchedFolder> {
        let registry = self.registry.lock().expect("registry poisoned");
        let mut out = Vec::new();
        for folder_path in &registry.folders {
            if let Some(pool) = self.folder_pool(folder_path) {
                if let Ok(Some(watched)) = pool.with_reader(folder_schema::get_watched_folder) {
                    out.push(watched);
                    continue;
                }
            }
            out.push(WatchedFolder {
                folder_path: folder_path.clone(),
                volume_name: None,
                volume_uuid: None,
                is_available: Path::new(folder_path).exists(),
                last_seen_at: None,
            });
        }
        for (bookmark, parent) in &registry.bookmarks {
            let is_available = Path::new(bookmark).exists() && Path::new(parent).exists();
            out.push(WatchedFolder {
                folder_path: bookmark.clone(),
                volume_name: None,
                volume_uuid: None,
                is_available,
                last_seen_at: None,
            });
        }
        out
    }

    /// Debounced (spec §4.5: ~30s) pass over every registered folder's
    /// availability; emits `FolderAvailabilityChanged` for anything that flipped.
    pub fn folder_health_check(&self) -> Result<Vec<FolderAvailabilityChanged>> {
        let folders = self.registry.lock().expect("registry poisoned").folders.clone();
        let mut changed = Vec::new();
        for folder_path in &folders {
            let is_available = Path::new(folder_path).exists();
            let Some(pool) = self.folder_pool(folder_path) else { continue };
            let previously_available = pool
                .with_reader(folder_schema::get_watched_folder)
                .ok()
                .flatten()
                .map(|f| f.is_available)
                .unwrap_or(true);
            if previously_available != is_available {
                set_folder_availability(&pool, &self.global_pool, folder_path, is_available)?;
                let event = FolderAvailabilityChanged { folder_path: folder_path.clone(), is_available };
                self.emit(EngineEvent::FolderAvailability(event.clone()));
                changed.push(event);
            }
        }
        Ok(changed)
    }

    /// Full rescan of a registered folder, optionally excluding subtree
    /// prefixes already covered by another registered folder (used when a
    /// folder is added as a new parent of existing children).
    pub async fn queue_folder(&self, folder_path: &str, excluding: &[String]) -> Result<IndexingOutcome> {
        let pool = self.folder_pool(folder_path).ok_or_else(|| FindItError::FolderNotFound(folder_path.to_string()))?;
        self.emit(EngineEvent::Indexing(IndexingProgress::FolderStarted { folder_path: folder_path.to_string() }));

        let discovered = crate::scheduler::discover_video_files_excluding(folder_path, excluding);
        let outcome = self
            .scheduler
            .process_specific_videos(folder_path, &discovered, pool.clone(), Some(self.global_pool.clone()), self.process_providers.clone())
            .await?;

        let sync_result = SyncEngine::sync(folder_path, &pool, &self.global_pool, false)?;
        self.search_engine.invalidate_filter_cache();
        self.emit(EngineEvent::VectorStoreInvalidated(VectorStoreInvalidated));

        let indexing_outcome = summarize(folder_path, &outcome.results);
        self.record_failures(folder_path, &outcome.results);
        self.emit(EngineEvent::Indexing(IndexingProgress::FolderFinished {
            folder_path: folder_path.to_string(),
            outcome: indexing_outcome.clone(),
        }));
        info!(folder = folder_path, synced_videos = sync_result.synced_videos, synced_clips = sync_result.synced_clips, "folder sync complete");

        self.route_deferred(outcome.deferred_events).await;
        Ok(indexing_outcome)
    }

    /// Targeted reindex of specific paths, as requested by the watcher
    /// bridge or an explicit caller.
    pub async fn queue_videos(&self, folder_path: &str, paths: &[PathBuf]) -> Result<IndexingOutcome> {
        let pool = self.folder_pool(folder_path).ok_or_else(|| FindItError::FolderNotFound(folder_path.to_string()))?;
        let outcome = self
            .scheduler
            .process_specific_videos(folder_path, paths, pool.clone(), Some(self.global_pool.clone()), self.process_providers.clone())
            .await?;

        SyncEngine::sync(folder_path, &pool, &self.global_pool, false)?;
        self.search_engine.invalidate_filter_cache();
        self.emit(EngineEvent::VectorStoreInvalidated(VectorStoreInvalidated));

        let indexing_outcome = summarize(folder_path, &outcome.results);
        self.record_failures(folder_path, &outcome.results);
        self.route_deferred(outcome.deferred_events).await;
        Ok(indexing_outcome)
    }

    /// Appends any `Failed` outcomes to the folder's bounded failure list
    /// (spec §7 "user-visible failure behavior"), dropping the oldest entry
    /// once the cap is reached.
    fn record_failures(&self, folder_path: &str, results: &[crate::pipeline::process::ProcessResult]) {
        let new_failures: Vec<FailureRecord> = results
            .iter()
            .filter(|r| r.outcome == ProcessOutcome::Failed)
            .map(|r| FailureRecord {
                path: r.video_path.to_string_lossy().to_string(),
                message: r.error_message.clone().unwrap_or_else(|| "unknown error".to_string()),
                timestamp: chrono::Utc::now().to_rfc3339(),
            })
            .collect();
        if new_failures.is_empty() {
            return;
        }
        let mut failures = self.failures.lock().expect("failures map poisoned");
        let entry = failures.entry(folder_path.to_string()).or_default();
        for failure in new_failures {
            if entry.len() >= crate::constants::MAX_FAILURES_PER_FOLDER {
                entry.pop_front();
            }
            entry.push_back(failure);
        }
    }

    /// The bounded list of recent (path, message) failures for a folder,
    /// oldest first, as exposed through the event stream (spec §7).
    pub fn folder_failures(&self, folder_path: &str) -> Vec<FailureRecord> {
        self.failures
            .lock()
            .expect("failures map poisoned")
            .get(folder_path)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn route_deferred(&self, deferred: Vec<crate::watcher::events::FileChangeEvent>) {
        if deferred.is_empty() {
            return;
        }
        for action in self.watcher.route(deferred) {
            match action {
                WatcherAction::QueueVideos { folder_path, paths } => {
                    if let Err(err) = self.queue_videos(&folder_path, &paths).await {
                        warn!(folder = folder_path, error = %err, "deferred reindex failed");
                    }
                }
                WatcherAction::SoftDelete { folder_path, paths } => {
                    if let Some(pool) = self.folder_pool(&folder_path) {
                        for path in &paths {
                            let path_str = path.to_string_lossy().to_string();
                            if let Ok(Some(video)) = pool.with_reader(|conn| folder_schema::find_video_by_path(conn, &path_str)) {
                                let _ = pool.with_writer(|conn| folder_schema::mark_video_orphaned(conn, video.video_id));
                            }
                        }
                    }
                }
                WatcherAction::RescanFolder { folder_path } => {
                    let Some(pool) = self.folder_pool(&folder_path) else { continue };
                    let result = self
                        .scheduler
                        .process_folder(&folder_path, pool.clone(), Some(self.global_pool.clone()), self.process_providers.clone())
                        .await
                        .and_then(|outcome| {
                            SyncEngine::sync(&folder_path, &pool, &self.global_pool, true)?;
                            Ok(outcome)
                        });
                    match result {
                        Ok(outcome) => {
                            self.record_failures(&folder_path, &outcome.results);
                            self.search_engine.invalidate_filter_cache();
                            self.emit(EngineEvent::VectorStoreInvalidated(VectorStoreInvalidated));
                        }
                        Err(err) => warn!(folder = folder_path, error = %err, "deferred rescan failed"),
                    }
                }
            }
        }
    }

    /// Cancels all in-flight and queued indexing work.
    pub async fn cancel_indexing(&self) {
        self.scheduler.cancel_indexing().await;
    }

    pub fn reset_cancellation(&self) {
        self.scheduler.reset_cancellation();
    }

    /// Runs a search in either mode: `Fts` for the immediate keystroke path,
    /// `Auto` for the debounced three-way hybrid fusion.
    pub async fn search(&self, query: &str, filter: &SearchFilter, mode: SearchMode) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.global_pool.with_writer(|conn| folder_schema::record_search(conn, query, 0)).ok();
        match mode {
            SearchMode::Fts => self.search_engine.fts_search(query, filter),
            SearchMode::Auto => self.search_engine.hybrid_search(query, filter, &self.hybrid_providers).await,
        }
    }

    /// Drops cached vector indexes and the filter cache, forcing a rebuild
    /// from the global DB on next search (spec §6).
    pub fn invalidate_vector_store(&self) {
        self.vector_manager.invalidate_clip_index();
        self.vector_manager.invalidate_text_index();
        self.search_engine.invalidate_filter_cache();
        self.emit(EngineEvent::VectorStoreInvalidated(VectorStoreInvalidated));
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn shutdown(&self) {
        self.scheduler.stop_resource_monitoring();
        self.fs_watcher.stop_all();
    }
}

fn summarize(folder_path: &str, results: &[crate::pipeline::process::ProcessResult]) -> IndexingOutcome {
    let mut outcome = IndexingOutcome { folder_path: folder_path.to_string(), ..Default::default() };
    for result in results {
        match result.outcome {
            ProcessOutcome::Indexed => outcome.indexed += 1,
            ProcessOutcome::Skipped => outcome.skipped += 1,
            ProcessOutcome::Failed => outcome.failed += 1,
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_registry_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = FolderRegistry::default();
        registry.folders.push("/videos/family".to_string());
        registry.bookmarks.insert("/videos/family/2020".to_string(), "/videos/family".to_string());
        registry.save(dir.path()).unwrap();

        let loaded = FolderRegistry::load(dir.path()).unwrap();
        assert_eq!(loaded.folders, registry.folders);
        assert_eq!(loaded.bookmarks, registry.bookmarks);
    }

    #[test]
    fn missing_registry_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = FolderRegistry::load(dir.path()).unwrap();
        assert!(loaded.folders.is_empty());
        assert!(loaded.bookmarks.is_empty());
    }
}
