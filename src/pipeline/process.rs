// process_video (spec §4.7): the pipeline's unit of work. Stages run in
// order 1..8; cancellation is polled at each boundary; errors in stages 1-3
// fail the whole video, errors in 4-7 are logged and skipped.

use crate::db::folder_schema;
use crate::db::pool::DbPool;
use crate::error::Result;
use crate::model::VideoState;
use crate::pipeline::stages::{self, Segment};
use crate::providers::rate_limit::RateLimiter;
use crate::providers::{CLIPEmbeddingProvider, EmbeddingProvider};
use crate::providers::stt::STTProvider;
use crate::providers::vision::VisionCaptionProvider;
use crate::sync::SyncEngine;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Skipped,
    Indexed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub video_id: i64,
    pub video_path: PathBuf,
    pub outcome: ProcessOutcome,
    pub stt_skipped_no_audio: bool,
    pub error_message: Option<String>,
}

/// Optional provider handles + rate limiter a caller can supply; any of them
/// missing simply skips its stage (spec: "ProviderUnavailable ... the
/// enclosing optional stage is skipped").
#[derive(Clone, Default)]
pub struct ProcessProviders {
    pub vision: Option<Arc<dyn VisionCaptionProvider>>,
    pub stt: Option<Arc<dyn STTProvider>>,
    pub text_embedding: Option<Arc<dyn EmbeddingProvider>>,
    pub clip_embedding: Option<Arc<dyn CLIPEmbeddingProvider>>,
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

pub struct ProcessOptions<'a> {
    pub video_path: &'a Path,
    pub folder_path: &'a str,
    pub skip_stt: bool,
    pub skip_sync: bool,
    pub providers: &'a ProcessProviders,
    pub cancelled: &'a AtomicBool,
    pub on_progress: &'a (dyn Fn(&str) + Sync),
}

pub async fn process_video(
    opts: ProcessOptions<'_>,
    folder_pool: &DbPool,
    global_pool: Option<&DbPool>,
) -> Result<ProcessResult> {
    let path = opts.video_path;
    let metadata = std::fs::metadata(path)?;
    let size = metadata.len() as i64;
    let mtime = metadata
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    (opts.on_progress)(stages::STAGE_FINGERPRINT);
    let path_str = path.to_string_lossy().to_string();

    let existing = folder_pool.with_reader(|conn| folder_schema::find_video_by_path(conn, &path_str))?;

    if let Some(video) = &existing {
        if video.size == size && video.mtime == mtime && video.state == VideoState::Indexed {
            return Ok(ProcessResult {
                video_id: video.video_id,
                video_path: path.to_path_buf(),
                outcome: ProcessOutcome::Skipped,
                stt_skipped_no_audio: false,
                error_message: None,
            });
        }
    }

    let video_id = match existing {
        Some(video) => {
            folder_pool.with_writer(|conn| folder_schema::update_video_fingerprint(conn, video.video_id, size, mtime))?;
            video.video_id
        }
        None => folder_pool.with_writer(|conn| folder_schema::insert_video(conn, &path_str, size, mtime))?,
    };

    if is_cancelled(opts.cancelled) {
        return Err(crate::error::FindItError::Cancelled);
    }

    (opts.on_progress)(stages::STAGE_CONTENT_HASH);
    let hash_result = folder_pool.with_writer(|conn| stages::insert_content_hash(conn, video_id, path));
    let hash = match hash_result {
        Ok(h) => h,
        Err(e) => {
            folder_pool.with_writer(|conn| {
                folder_schema::update_video_state(conn, video_id, VideoState::Failed, Some(&e.to_string()))
            })?;
            return Ok(ProcessResult {
                video_id,
                video_path: path.to_path_buf(),
                outcome: ProcessOutcome::Failed,
                stt_skipped_no_audio: false,
                error_message: Some(e.to_string()),
            });
        }
    };

    if let Some(renamed) = folder_pool.with_reader(|conn| folder_schema::find_video_by_content_hash(conn, &hash))? {
        if renamed.video_id != video_id && renamed.file_path != path_str {
            folder_pool.with_writer(|conn| folder_schema::update_video_path(conn, renamed.video_id, &path_str))?;
            return Ok(ProcessResult {
                video_id: renamed.video_id,
                video_path: path.to_path_buf(),
                outcome: ProcessOutcome::Indexed,
                stt_skipped_no_audio: false,
                error_message: None,
            });
        }
    }

    if is_cancelled(opts.cancelled) {
        return Err(crate::error::FindItError::Cancelled);
    }

    (opts.on_progress)(stages::STAGE_SEGMENTATION);
    let duration = stages::probe_duration_seconds(path);
    let has_audio = stages::probe_has_audio(path);
    let segments = duration.map(|d| stages::segment_video(path, d)).unwrap_or_default();

    if duration.is_none() || segments.is_empty() {
        let message = "segmentation failed: unreadable container or zero-length video".to_string();
        folder_pool.with_writer(|conn| folder_schema::update_video_state(conn, video_id, VideoState::Failed, Some(&message)))?;
        return Ok(ProcessResult {
            video_id,
            video_path: path.to_path_buf(),
            outcome: ProcessOutcome::Failed,
            stt_skipped_no_audio: false,
            error_message: Some(message),
        });
    }

    let thumbnails_dir = thumbnails_dir_for(opts.folder_path);
    folder_pool.with_writer(|conn| -> Result<()> {
        for segment in &segments {
            write_clip_segment(conn, video_id, segment, &thumbnails_dir, path)?;
        }
        conn.execute(
            "UPDATE videos SET duration_seconds = ?1, has_audio = ?2 WHERE id = ?3",
            rusqlite::params![duration, has_audio as i64, video_id],
        )?;
        Ok(())
    })?;

    if is_cancelled(opts.cancelled) {
        return Err(crate::error::FindItError::Cancelled);
    }

    (opts.on_progress)(stages::STAGE_VISION);
    if let Some(vision) = &opts.providers.vision {
        if let Some(limiter) = &opts.providers.rate_limiter {
            limiter.acquire().await;
        }
        let clips_missing = folder_pool.with_reader(|conn| folder_schema::clips_missing_description(conn, video_id))?;
        match stages::run_vision_captioning(clips_missing, vision).await {
            Ok(pending) => {
                folder_pool.with_writer(|conn| stages::persist_captions(conn, &pending))?;
            }
            Err(e) => tracing::warn!(video_id, error = %e, "vision captioning stage failed; keeping prior work"),
        }
    }

    let mut stt_skipped_no_audio = false;
    (opts.on_progress)(stages::STAGE_STT);
    if !opts.skip_stt {
        if let Some(stt) = &opts.providers.stt {
            if has_audio {
                let audio_path = thumbnails_dir.join(format!("{video_id}.wav"));
                if let Err(e) = stages::extract_audio(path, &audio_path) {
                    tracing::warn!(video_id, error = %e, "audio extraction failed; skipping transcription");
                } else {
                    let video = folder_pool.with_reader(|conn| folder_schema::get_video(conn, video_id))?;
                    if let Some(video) = video {
                        match stages::run_speech_to_text(&video, stt, &audio_path).await {
                            Ok(Some(transcript)) => {
                                let srt_path = audio_path.with_extension("srt");
                                let result = folder_pool.with_writer(|conn| {
                                    let clips = folder_schema::clips_for_video(conn, video_id)?;
                                    stages::persist_transcript(conn, video_id, &clips, &transcript, &srt_path)
                                });
                                if let Err(e) = result {
                                    tracing::warn!(video_id, error = %e, "persisting transcript failed");
                                }
                            }
                            Ok(None) => {}
                            Err(e) => tracing::warn!(video_id, error = %e, "speech-to-text stage failed; keeping prior work"),
                        }
                    }
                }
            } else {
                stt_skipped_no_audio = true;
            }
        }
    }

    (opts.on_progress)(stages::STAGE_TEXT_EMBED);
    if let Some(embedder) = &opts.providers.text_embedding {
        let clips = folder_pool.with_reader(|conn| folder_schema::clips_for_video(conn, video_id))?;
        match stages::run_text_embedding(clips, embedder).await {
            Ok(pending) => {
                folder_pool.with_writer(|conn| stages::persist_text_embeddings(conn, embedder, &pending))?;
            }
            Err(e) => tracing::warn!(video_id, error = %e, "text embedding stage failed; keeping prior work"),
        }
    }

    (opts.on_progress)(stages::STAGE_VISION_EMBED);
    if let Some(clip_provider) = &opts.providers.clip_embedding {
        let clips = folder_pool.with_reader(|conn| folder_schema::clips_for_video(conn, video_id))?;
        let already_embedded: std::collections::HashSet<i64> = folder_pool.with_reader(|conn| {
            let mut have = std::collections::HashSet::new();
            for clip in &clips {
                if folder_schema::get_clip_vector(conn, clip.clip_id, clip_provider.name())?.is_some() {
                    have.insert(clip.clip_id);
                }
            }
            Ok(have)
        })?;
        match stages::run_vision_embedding(clips, &already_embedded, clip_provider).await {
            Ok(pending) => {
                folder_pool.with_writer(|conn| stages::persist_vision_embeddings(conn, clip_provider, &pending))?;
            }
            Err(e) => tracing::warn!(video_id, error = %e, "vision embedding stage failed; keeping prior work"),
        }
    }

    folder_pool.with_writer(|conn| folder_schema::update_video_state(conn, video_id, VideoState::Indexed, None))?;

    (opts.on_progress)(stages::STAGE_SYNC);
    if !opts.skip_sync {
        if let Some(global_pool) = global_pool {
            SyncEngine::sync(opts.folder_path, folder_pool, global_pool, false)?;
        }
    }

    Ok(ProcessResult {
        video_id,
        video_path: path.to_path_buf(),
        outcome: ProcessOutcome::Indexed,
        stt_skipped_no_audio,
        error_message: None,
    })
}

fn write_clip_segment(
    conn: &rusqlite::Connection,
    video_id: i64,
    segment: &Segment,
    thumbnails_dir: &Path,
    video_path: &Path,
) -> Result<()> {
    let thumbnail_path = thumbnails_dir.join(format!("{video_id}_{:.3}.jpg", segment.start_time));
    if let Err(e) = stages::extract_thumbnail(video_path, segment.start_time, &thumbnail_path) {
        tracing::warn!(video_id, error = %e, "thumbnail extraction failed for segment, continuing without one");
        folder_schema::upsert_clip_segment(conn, video_id, segment.start_time, segment.end_time, None)?;
    } else {
        folder_schema::upsert_clip_segment(
            conn,
            video_id,
            segment.start_time,
            segment.end_time,
            Some(&thumbnail_path.to_string_lossy()),
        )?;
    }
    Ok(())
}

fn thumbnails_dir_for(folder_path: &str) -> PathBuf {
    crate::db::thumbnails_dir(Path::new(folder_path))
}

fn is_cancelled(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_folder_migrations;

    #[tokio::test]
    async fn unchanged_video_is_skipped_without_hashing() {
        let folder_pool = DbPool::open_in_memory(run_folder_migrations).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let video_path = dir.path().join("a.mp4");
        std::fs::write(&video_path, b"fake video bytes").unwrap();
        let metadata = std::fs::metadata(&video_path).unwrap();
        let mtime = metadata
            .modified()
            .unwrap()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;

        let video_id = folder_pool
            .with_writer(|conn| folder_schema::insert_video(conn, &video_path.to_string_lossy(), metadata.len() as i64, mtime))
            .unwrap();
        folder_pool
            .with_writer(|conn| folder_schema::update_video_state(conn, video_id, VideoState::Indexed, None))
            .unwrap();

        let providers = ProcessProviders::default();
        let cancelled = AtomicBool::new(false);
        let opts = ProcessOptions {
            video_path: &video_path,
            folder_path: dir.path().to_str().unwrap(),
            skip_stt: true,
            skip_sync: true,
            providers: &providers,
            cancelled: &cancelled,
            on_progress: &|_stage| {},
        };

        let result = process_video(opts, &folder_pool, None).await.unwrap();
        assert_eq!(result.outcome, ProcessOutcome::Skipped);
    }
}
