// FindIt engine constants.
// These values come from the engine contract (SPEC_FULL.md). Do not change
// without checking the invariants that reference them.

pub const ENGINE_VERSION: u32 = 1;

// Hashing (spec §4.7 stage 2: xxhash64 of first + last 1MB + file size)
pub const HASH_ALGORITHM: &str = "xxh64";
pub const HASH_CHUNK_SIZE: u64 = 1_048_576; // 1MB

// Paths (spec §6 persisted state layout)
pub const FINDIT_FOLDER: &str = ".findit";
pub const FOLDER_DB_FILENAME: &str = "folder.sqlite";
pub const GLOBAL_DB_FILENAME: &str = "global.sqlite";
pub const THUMBNAILS_FOLDER: &str = "thumbnails";
pub const CLIP_HNSW_FILENAME: &str = "clip.usearch";
pub const TEXT_HNSW_FILENAME: &str = "text.usearch";

// SQLite pragmas (spec §6)
pub const SQLITE_BUSY_TIMEOUT_MS: u32 = 5_000;

// Concurrency defaults (spec §4.6)
pub const RESOURCE_SAMPLE_INTERVAL_SECS: u64 = 5;
pub const HEALTH_CHECK_DEBOUNCE_SECS: u64 = 30;
pub const WATCHER_DEBOUNCE_MS: u64 = 1_500;
pub const VECTOR_SEARCH_DEBOUNCE_MS: u64 = 300;

// Provider defaults (spec §6 env/config keys)
pub const DEFAULT_VISION_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RATE_LIMIT_RPM: u32 = 60;
pub const DEFAULT_VISION_MAX_IMAGES_PER_REQUEST: usize = 8;
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;
pub const CLIP_EMBEDDING_DIMENSIONS: usize = 768;

// Orphan retention
pub const DEFAULT_ORPHANED_RETENTION_DAYS: i64 = 30;

// Per-folder bounded failure list (spec §7 "user-visible failure behavior")
pub const MAX_FAILURES_PER_FOLDER: usize = 50;

// HNSW growth (spec §4.11)
pub const HNSW_INITIAL_CAPACITY: usize = 1_024;
pub const HNSW_GROWTH_FACTOR: usize = 2;
pub const VECTOR_REBUILD_BATCH_SIZE: i64 = 5_000;

// Search fan-out (spec §4.12)
pub const FTS_SEARCH_LIMIT: i64 = 50;
pub const HYBRID_CHANNEL_LIMIT: i64 = 100;
pub const HYBRID_RESULT_LIMIT: usize = 50;

// Video extensions recognized by the folder scanner
pub const VIDEO_EXTENSIONS: [&str; 20] = [
    "mp4", "mov", "avi", "mkv", "mts", "m2ts", "mxf", "mpg", "mpeg", "wmv", "flv", "webm", "3gp",
    "m4v", "ts", "vob", "mod", "tod", "dv", "ogv",
];
