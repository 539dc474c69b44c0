// Engine configuration: loaded at `init_engine`, overridable via FINDIT_* env vars.
// Mirrors the teacher's seed-defaults-on-fresh-install pattern but as a typed
// struct instead of a settings KV table, since there is no settings UI here.

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Cloud,
    Offline,
}

impl Default for ProviderKind {
    fn default() -> Self {
        ProviderKind::Offline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMode {
    FullSpeed,
    Balanced,
    Background,
}

impl Default for PerformanceMode {
    fn default() -> Self {
        PerformanceMode::Balanced
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub provider: ProviderKind,
    pub vision_model: String,
    pub embedding_model: String,
    pub clip_model: String,
    pub embedding_dimensions: usize,
    pub clip_dimensions: usize,
    pub vision_max_images_per_request: usize,
    pub vision_timeout_s: u64,
    pub vision_max_retries: u32,
    pub rate_limit_rpm: u32,
    pub performance_mode: PerformanceMode,
    pub skip_stt: bool,
    pub skip_vision: bool,
    pub skip_embedding: bool,
    pub orphaned_retention_days: i64,
    /// Base URL for the cloud vision/embedding/STT APIs. Ignored in offline mode.
    pub cloud_api_base: String,
    /// Bearer token for the cloud APIs, read from `FINDIT_API_KEY` in practice.
    pub cloud_api_key: Option<String>,
    /// Directory holding local model files for offline providers.
    pub model_dir: std::path::PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            vision_model: "local-vlm".to_string(),
            embedding_model: "local-text-embed".to_string(),
            clip_model: "local-clip".to_string(),
            embedding_dimensions: crate::constants::DEFAULT_EMBEDDING_DIMENSIONS,
            clip_dimensions: crate::constants::CLIP_EMBEDDING_DIMENSIONS,
            vision_max_images_per_request: crate::constants::DEFAULT_VISION_MAX_IMAGES_PER_REQUEST,
            vision_timeout_s: crate::constants::DEFAULT_VISION_TIMEOUT_SECS,
            vision_max_retries: crate::constants::DEFAULT_MAX_RETRIES,
            rate_limit_rpm: crate::constants::DEFAULT_RATE_LIMIT_RPM,
            performance_mode: PerformanceMode::default(),
            skip_stt: false,
            skip_vision: false,
            skip_embedding: false,
            orphaned_retention_days: crate::constants::DEFAULT_ORPHANED_RETENTION_DAYS,
            cloud_api_base: "https://api.findit.example/v1".to_string(),
            cloud_api_key: None,
            model_dir: std::path::PathBuf::from("models"),
        }
    }
}

impl EngineConfig {
    /// Load from `<data_dir>/config.toml` if present, then apply `FINDIT_*` env
    /// overrides. A missing file is not an error.
    pub fn load(data_dir: &std::path::Path) -> crate::error::Result<Self> {
        let path = data_dir.join("config.toml");
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            toml::from_str(&text)?
        } else {
            EngineConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("FINDIT_PROVIDER") {
            self.provider = match v.as_str() {
                "cloud" => ProviderKind::Cloud,
                _ => ProviderKind::Offline,
            };
        }
        if let Ok(v) = env::var("FINDIT_PERFORMANCE_MODE") {
            self.performance_mode = match v.as_str() {
                "full_speed" => PerformanceMode::FullSpeed,
                "background" => PerformanceMode::Background,
                _ => PerformanceMode::Balanced,
            };
        }
        if let Ok(v) = env::var("FINDIT_SKIP_STT") {
            self.skip_stt = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = env::var("FINDIT_SKIP_VISION") {
            self.skip_vision = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = env::var("FINDIT_SKIP_EMBEDDING") {
            self.skip_embedding = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = env::var("FINDIT_RATE_LIMIT_RPM") {
            if let Ok(n) = v.parse() {
                self.rate_limit_rpm = n;
            }
        }
        if let Ok(v) = env::var("FINDIT_API_KEY") {
            self.cloud_api_key = Some(v);
        }
        if let Ok(v) = env::var("FINDIT_CLOUD_API_BASE") {
            self.cloud_api_base = v;
        }
        if let Ok(v) = env::var("FINDIT_MODEL_DIR") {
            self.model_dir = std::path::PathBuf::from(v);
        }
    }
}

/// Install the process-wide tracing subscriber. Safe to call once per process;
/// the engine calls this from `init_engine` unless a subscriber is already set.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("FINDIT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
