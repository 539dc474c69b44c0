// FindIt engine error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FindItError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("migration error: {0}")]
    MigrationError(String),

    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("video not found: {0}")]
    VideoNotFound(i64),

    #[error("clip not found: {0}")]
    ClipNotFound(i64),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("transient io error: {0}")]
    TransientIo(String),

    #[error("permanent io error: {0}")]
    PermanentIo(String),

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("index is read-only")]
    ReadOnly,

    #[error("provider api error: status {status}, {message}")]
    ApiError { status: u16, message: String },

    #[error("provider network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for FindItError {
    fn from(err: anyhow::Error) -> Self {
        FindItError::Other(err.to_string())
    }
}

impl FindItError {
    /// True for errors the spec's TransientIO kind covers: worth a retry with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FindItError::TransientIo(_) | FindItError::Network(_)
        ) || matches!(self, FindItError::Database(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::DatabaseBusy)
            || matches!(self, FindItError::ApiError { status, .. } if matches!(status, 429 | 500 | 502 | 503))
    }
}

pub type Result<T> = std::result::Result<T, FindItError>;
