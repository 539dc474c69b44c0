// Pipeline stage implementations (spec §4.7). Each stage is a free function
// so `process_video` can sequence them, check cancellation between them, and
// report progress with a short stage label.

use crate::db::folder_schema;
use crate::error::Result;
use crate::hash::compute_content_hash;
use crate::model::Clip;
use crate::pipeline::tools::{ffmpeg_path, ffprobe_path};
use crate::providers::stt::STTProvider;
use crate::providers::vision::VisionCaptionProvider;
use crate::providers::{CLIPEmbeddingProvider, EmbeddingProvider};
use rusqlite::Connection;
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

pub const STAGE_FINGERPRINT: &str = "fingerprint";
pub const STAGE_CONTENT_HASH: &str = "content_hash";
pub const STAGE_SEGMENTATION: &str = "segmentation";
pub const STAGE_VISION: &str = "vision_caption";
pub const STAGE_STT: &str = "speech_to_text";
pub const STAGE_TEXT_EMBED: &str = "text_embedding";
pub const STAGE_VISION_EMBED: &str = "vision_embedding";
pub const STAGE_SYNC: &str = "sync";

pub struct Segment {
    pub start_time: f64,
    pub end_time: f64,
}

/// Uses `scdet` when available; falls back to a fixed grid of
/// `FIXED_GRID_SECONDS`-second segments when ffprobe is unavailable or the
/// filter reports nothing (near-static footage, or an unreadable container).
const FIXED_GRID_SECONDS: f64 = 10.0;

#[derive(Debug, Deserialize)]
struct FFprobeFrames {
    frames: Option<Vec<FrameEntry>>,
}

#[derive(Debug, Deserialize)]
struct FrameEntry {
    #[serde(rename = "best_effort_timestamp_time")]
    timestamp: Option<String>,
    tags: Option<FrameTags>,
}

#[derive(Debug, Deserialize)]
struct FrameTags {
    #[serde(rename = "lavfi.scd.score")]
    scd_score: Option<String>,
}

pub fn probe_duration_seconds(video_path: &Path) -> Option<f64> {
    let output = Command::new(ffprobe_path())
        .args(["-v", "quiet", "-show_entries", "format=duration", "-of", "csv=p=0"])
        .arg(video_path)
        .output()
        .ok()?;
    String::from_utf8_lossy(&output.stdout).trim().parse::<f64>().ok()
}

pub fn probe_has_audio(video_path: &Path) -> bool {
    Command::new(ffprobe_path())
        .args(["-v", "quiet", "-select_streams", "a", "-show_entries", "stream=index", "-of", "csv=p=0"])
        .arg(video_path)
        .output()
        .map(|o| !o.stdout.is_empty())
        .unwrap_or(false)
}

/// Scene-change boundaries via ffprobe's `scdet` filter, falling back to a
/// fixed grid when the filter yields nothing or the tool is unreachable.
pub fn segment_video(video_path: &Path, duration_seconds: f64) -> Vec<Segment> {
    if duration_seconds <= 0.0 {
        return Vec::new();
    }

    if let Some(boundaries) = scene_change_boundaries(video_path) {
        if boundaries.len() >= 2 {
            return boundaries
                .windows(2)
                .map(|w| Segment { start_time: w[0], end_time: w[1] })
                .collect();
        }
    }

    fixed_grid_segments(duration_seconds)
}

fn fixed_grid_segments(duration_seconds: f64) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut start = 0.0;
    while start < duration_seconds {
        let end = (start + FIXED_GRID_SECONDS).min(duration_seconds);
        segments.push(Segment { start_time: start, end_time: end });
        start = end;
    }
    segments
}

fn scene_change_boundaries(video_path: &Path) -> Option<Vec<f64>> {
    let filter = format!(
        "movie={},scdet=t=10",
        video_path.to_string_lossy().replace('\'', "'\\''")
    );
    let output = Command::new(ffprobe_path())
        .args(["-f", "lavfi", "-i", &filter, "-show_entries", "frame=best_effort_timestamp_time:frame_tags=lavfi.scd.score", "-of", "json", "-v", "quiet"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let parsed: FFprobeFrames = serde_json::from_slice(&output.stdout).ok()?;
    let mut boundaries: Vec<f64> = vec![0.0];
    for frame in parsed.frames.unwrap_or_default() {
        let has_change = frame
            .tags
            .as_ref()
            .and_then(|t| t.scd_score.as_ref())
            .and_then(|s| s.parse::<f64>().ok())
            .map(|score| score > 0.0)
            .unwrap_or(false);
        if has_change {
            if let Some(ts) = frame.timestamp.and_then(|t| t.parse::<f64>().ok()) {
                boundaries.push(ts);
            }
        }
    }
    if boundaries.len() < 2 {
        None
    } else {
        Some(boundaries)
    }
}

pub fn extract_thumbnail(video_path: &Path, at_seconds: f64, out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let status = Command::new(ffmpeg_path())
        .args(["-y", "-ss"])
        .arg(format!("{:.3}", at_seconds))
        .arg("-i")
        .arg(video_path)
        .args(["-frames:v", "1", "-q:v", "4"])
        .arg(out_path)
        .status()?;
    if !status.success() {
        return Err(crate::error::FindItError::PermanentIo(format!(
            "ffmpeg thumbnail extraction failed for {}",
            video_path.display()
        )));
    }
    Ok(())
}

pub fn extract_audio(video_path: &Path, out_path: &Path) -> Result<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let status = Command::new(ffmpeg_path())
        .args(["-y", "-i"])
        .arg(video_path)
        .args(["-vn", "-ar", "16000", "-ac", "1"])
        .arg(out_path)
        .status()?;
    if !status.success() {
        return Err(crate::error::FindItError::PermanentIo(format!(
            "ffmpeg audio extraction failed for {}",
            video_path.display()
        )));
    }
    Ok(())
}

pub fn insert_content_hash(conn: &Connection, video_id: i64, video_path: &Path) -> Result<String> {
    let hash = compute_content_hash(video_path)?;
    folder_schema::update_video_content_hash(conn, video_id, &hash)?;
    Ok(hash)
}

/// A caption computed for one clip, ready to persist. Split from the DB
/// write so the provider call (async, suspends on I/O) never has to hold a
/// `&Connection` across an `.await` — `DbPool` only hands connections out to
/// synchronous closures.
pub struct PendingCaption {
    pub clip_id: i64,
    pub caption: crate::providers::vision::VisionCaption,
}

/// Reads which clips still need captioning, then calls the provider. Persist
/// the result with [`persist_captions`] inside a `with_writer` closure.
pub async fn run_vision_captioning(
    clips: Vec<Clip>,
    provider: &Arc<dyn VisionCaptionProvider>,
) -> Result<Vec<PendingCaption>> {
    if clips.is_empty() || !provider.is_available() {
        return Ok(Vec::new());
    }
    let mut pending = Vec::new();
    for batch in clips.chunks(provider.max_images_per_request()) {
        let frame_paths: Vec<std::path::PathBuf> = batch
            .iter()
            .filter_map(|c| c.thumbnail_path.as_ref().map(std::path::PathBuf::from))
            .collect();
        let captions = provider.caption(&frame_paths).await?;
        for (clip, caption) in batch.iter().zip(captions.into_iter()) {
            pending.push(PendingCaption { clip_id: clip.clip_id, caption });
        }
    }
    Ok(pending)
}

pub fn persist_captions(conn: &Connection, pending: &[PendingCaption]) -> Result<usize> {
    for item in pending {
        folder_schema::update_clip_caption(conn, item.clip_id, &item.caption)?;
    }
    Ok(pending.len())
}

pub async fn run_speech_to_text(
    video: &crate::model::Video,
    provider: &Arc<dyn STTProvider>,
    audio_path: &Path,
) -> Result<Option<crate::providers::stt::Transcript>> {
    if !video.has_audio.unwrap_or(false) || !provider.is_available() {
        return Ok(None);
    }
    Ok(Some(provider.transcribe(audio_path).await?))
}

pub fn persist_transcript(
    conn: &Connection,
    video_id: i64,
    clips: &[Clip],
    transcript: &crate::providers::stt::Transcript,
    srt_path: &Path,
) -> Result<()> {
    for clip in clips {
        folder_schema::update_clip_transcript(conn, clip.clip_id, &transcript.text)?;
    }
    std::fs::write(srt_path, &transcript.srt)?;
    conn.execute(
        "UPDATE videos SET srt_path = ?1, updated_at = datetime('now') WHERE id = ?2",
        rusqlite::params![srt_path.to_string_lossy(), video_id],
    )?;
    Ok(())
}

pub struct PendingTextEmbedding {
    pub clip_id: i64,
    pub raw: Vec<u8>,
}

pub async fn run_text_embedding(clips: Vec<Clip>, provider: &Arc<dyn EmbeddingProvider>) -> Result<Vec<PendingTextEmbedding>> {
    if !provider.is_available() {
        return Ok(Vec::new());
    }
    let mut pending = Vec::new();
    for clip in clips {
        if clip.embedding_model.as_deref() == Some(provider.name()) {
            continue;
        }
        let text = clip.composed_text();
        if text.is_empty() {
            continue;
        }
        let vector = provider.embed(&text).await?;
        pending.push(PendingTextEmbedding { clip_id: clip.clip_id, raw: vector_to_bytes(&vector) });
    }
    Ok(pending)
}

pub fn persist_text_embeddings(conn: &Connection, provider: &Arc<dyn EmbeddingProvider>, pending: &[PendingTextEmbedding]) -> Result<usize> {
    for item in pending {
        folder_schema::set_clip_text_embedding(conn, item.clip_id, provider.name(), provider.dimensions(), &item.raw)?;
    }
    Ok(pending.len())
}

pub struct PendingVisionEmbedding {
    pub clip_id: i64,
    pub raw: Vec<u8>,
}

/// `already_embedded` is the set of clip ids that already have a vector for
/// this provider, computed by the caller via `get_clip_vector` before the
/// async call so this function never needs a `Connection`.
pub async fn run_vision_embedding(
    clips: Vec<Clip>,
    already_embedded: &std::collections::HashSet<i64>,
    provider: &Arc<dyn CLIPEmbeddingProvider>,
) -> Result<Vec<PendingVisionEmbedding>> {
    if !provider.is_available() {
        return Ok(Vec::new());
    }
    let mut pending = Vec::new();
    for clip in clips {
        let Some(thumbnail) = clip.thumbnail_path.as_ref() else { continue };
        if already_embedded.contains(&clip.clip_id) {
            continue;
        }
        let vector = provider.encode_image(Path::new(thumbnail)).await?;
        pending.push(PendingVisionEmbedding { clip_id: clip.clip_id, raw: vector_to_bytes(&vector) });
    }
    Ok(pending)
}

pub fn persist_vision_embeddings(conn: &Connection, provider: &Arc<dyn CLIPEmbeddingProvider>, pending: &[PendingVisionEmbedding]) -> Result<usize> {
    for item in pending {
        folder_schema::upsert_clip_vector(conn, item.clip_id, provider.name(), &item.raw)?;
    }
    Ok(pending.len())
}

pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_grid_covers_full_duration() {
        let segments = fixed_grid_segments(25.0);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments.last().unwrap().end_time, 25.0);
    }

    #[test]
    fn vector_byte_roundtrip_preserves_values() {
        let original = vec![0.5f32, -1.25, 3.0];
        let bytes = vector_to_bytes(&original);
        let restored = bytes_to_vector(&bytes);
        assert_eq!(original, restored);
    }
}
