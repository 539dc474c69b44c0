// FindIt engine: a local filesystem-backed semantic search library for a
// personal video collection. See `engine::init_engine` for the entry point.

pub mod concurrency;
pub mod config;
pub mod constants;
pub mod db;
pub mod engine;
pub mod error;
pub mod hash;
pub mod hierarchy;
pub mod model;
pub mod pipeline;
pub mod providers;
pub mod query;
pub mod scheduler;
pub mod sync;
pub mod vector;
pub mod volume;
pub mod watcher;

pub use config::EngineConfig;
pub use engine::{
    init_engine, Engine, EngineEvent, FolderAvailabilityChanged, IndexingOutcome, IndexingProgress, SearchMode,
    VectorStoreInvalidated,
};
pub use error::{FindItError, Result};
pub use model::{Clip, FailureRecord, SearchResult, Video, VideoState, WatchedFolder};
pub use query::SearchFilter;
