// Data model (spec §3). These structs are shared between the per-folder and
// global schemas; the global rows additionally carry `source_folder` and
// `source_clip_id`/`source_video_id`, modeled here as `GlobalVideo`/`GlobalClip`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoState {
    Pending,
    Indexed,
    Failed,
    Orphaned,
}

impl VideoState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoState::Pending => "pending",
            VideoState::Indexed => "indexed",
            VideoState::Failed => "failed",
            VideoState::Orphaned => "orphaned",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "indexed" => VideoState::Indexed,
            "failed" => VideoState::Failed,
            "orphaned" => VideoState::Orphaned,
            _ => VideoState::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedFolder {
    pub folder_path: String,
    pub volume_name: Option<String>,
    pub volume_uuid: Option<String>,
    pub is_available: bool,
    pub last_seen_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub video_id: i64,
    pub file_path: String,
    pub size: i64,
    pub mtime: i64,
    pub content_hash: Option<String>,
    pub duration_seconds: Option<f64>,
    pub has_audio: Option<bool>,
    pub srt_path: Option<String>,
    pub state: VideoState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Clip {
    pub clip_id: i64,
    pub video_id: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub thumbnail_path: Option<String>,
    pub scene: Option<String>,
    pub description: Option<String>,
    pub subjects: Option<String>,
    pub actions: Option<String>,
    pub objects: Option<String>,
    pub mood: Option<String>,
    pub shot_type: Option<String>,
    pub lighting: Option<String>,
    pub colors: Option<String>,
    pub transcript: Option<String>,
    pub tags: Vec<String>,
    pub rating: i32,
    pub color_label: Option<String>,
    pub embedding: Option<Vec<u8>>,
    pub embedding_model: Option<String>,
    pub embedding_dimensions: Option<usize>,
}

impl Clip {
    /// Composed text used by the text-embedding stage and the FTS shadow table.
    pub fn composed_text(&self) -> String {
        let parts = [
            self.scene.as_deref().unwrap_or(""),
            self.description.as_deref().unwrap_or(""),
            self.subjects.as_deref().unwrap_or(""),
            self.actions.as_deref().unwrap_or(""),
            self.objects.as_deref().unwrap_or(""),
            self.transcript.as_deref().unwrap_or(""),
        ];
        let mut text = parts
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        if !self.tags.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&self.tags.join(" "));
        }
        text
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipVector {
    pub clip_id: i64,
    pub model_name: String,
    pub vector: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCursor {
    pub folder_path: String,
    pub table_name: String,
    pub cursor: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRecord {
    pub query: String,
    pub result_count: i64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalVideo {
    pub source_folder: String,
    pub source_video_id: i64,
    pub file_path: String,
    pub size: i64,
    pub mtime: i64,
    pub content_hash: Option<String>,
    pub duration_seconds: Option<f64>,
    pub has_audio: Option<bool>,
    pub srt_path: Option<String>,
    pub state: VideoState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalClip {
    pub source_folder: String,
    pub source_clip_id: i64,
    pub source_video_id: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub thumbnail_path: Option<String>,
    pub scene: Option<String>,
    pub description: Option<String>,
    pub subjects: Option<String>,
    pub actions: Option<String>,
    pub objects: Option<String>,
    pub mood: Option<String>,
    pub shot_type: Option<String>,
    pub lighting: Option<String>,
    pub colors: Option<String>,
    pub transcript: Option<String>,
    pub tags: Vec<String>,
    pub rating: i32,
    pub color_label: Option<String>,
    pub embedding: Option<Vec<u8>>,
    pub embedding_model: Option<String>,
    pub embedding_dimensions: Option<usize>,
    pub file_path: String,
}

/// A ranked result returned from `SearchEngine`, hydrated from the global DB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub source_folder: String,
    pub source_clip_id: i64,
    pub file_path: String,
    pub start_time: f64,
    pub end_time: f64,
    pub thumbnail_path: Option<String>,
    pub description: Option<String>,
    pub score: f32,
}

/// One of a folder's bounded list of (path, message) failures (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub path: String,
    pub message: String,
    pub timestamp: String,
}
