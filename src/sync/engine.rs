// Sync engine (spec §4.3): incremental per-folder -> global projection with
// cursors and idempotent upserts. Any failure rolls back the whole sync and
// leaves the cursor unchanged — partial progress is never visible (P1).

use crate::db::pool::DbPool;
use crate::db::{folder_schema, global_schema};
use crate::error::Result;
use crate::model::{GlobalClip, GlobalVideo};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub synced_videos: usize,
    pub synced_clips: usize,
}

pub struct SyncEngine;

impl SyncEngine {
    /// Reads rows whose `rowid > cursor` (or all rows when `force`) from the
    /// folder DB and upserts them into the global DB.
    pub fn sync(folder_path: &str, folder_pool: &DbPool, global_pool: &DbPool, force: bool) -> Result<SyncResult> {
        let (videos, clips, video_cursor, clip_cursor) = folder_pool.with_reader(|conn| {
            let video_cursor = if force { 0 } else { folder_schema::get_sync_cursor(conn, "videos")? };
            let clip_cursor = if force { 0 } else { folder_schema::get_sync_cursor(conn, "clips")? };
            let videos = if force {
                folder_schema::all_videos(conn)?
            } else {
                folder_schema::videos_since_cursor(conn, video_cursor)?
            };
            let clips = if force {
                folder_schema::all_clips(conn)?
            } else {
                folder_schema::clips_since_cursor(conn, clip_cursor)?
            };
            Ok((videos, clips, video_cursor, clip_cursor))
        })?;

        if videos.is_empty() && clips.is_empty() && !force {
            return Ok(SyncResult::default());
        }

        let max_video_id = videos.iter().map(|v| v.video_id).max().unwrap_or(video_cursor);
        let max_clip_id = clips.iter().map(|c| c.clip_id).max().unwrap_or(clip_cursor);

        let synced_videos = videos.len();
        let synced_clips = clips.len();

        // Clips carry only their folder-local `video_id`; resolve each to its
        // `file_path` from the *folder* DB, not the global one — the global
        // `videos.id` is an unrelated AUTOINCREMENT surrogate key that only
        // happens to collide with folder-local ids for a single folder's
        // first sync. Most clips' videos are already in `videos` above; the
        // rest (clips synced without their video in this batch) are looked
        // up by id against the folder connection.
        let video_path_by_id: std::collections::HashMap<i64, String> = {
            let mut map: std::collections::HashMap<i64, String> =
                videos.iter().map(|v| (v.video_id, v.file_path.clone())).collect();
            let missing: Vec<i64> = clips.iter().map(|c| c.video_id).filter(|id| !map.contains_key(id)).collect();
            if !missing.is_empty() {
                folder_pool.with_reader(|conn| {
                    for video_id in &missing {
                        if let Some(v) = folder_schema::get_video(conn, *video_id)? {
                            map.insert(*video_id, v.file_path);
                        }
                    }
                    Ok(())
                })?;
            }
            map
        };

        global_pool.with_writer(|conn| {
            let tx = conn.unchecked_transaction()?;
            for v in &videos {
                let g = GlobalVideo {
                    source_folder: folder_path.to_string(),
                    source_video_id: v.video_id,
                    file_path: v.file_path.clone(),
                    size: v.size,
                    mtime: v.mtime,
                    content_hash: v.content_hash.clone(),
                    duration_seconds: v.duration_seconds,
                    has_audio: v.has_audio,
                    srt_path: v.srt_path.clone(),
                    state: v.state.clone(),
                };
                global_schema::upsert_video(&tx, &g)?;
            }
            for c in &clips {
                let file_path = video_path_by_id.get(&c.video_id).cloned().unwrap_or_default();
                let g = GlobalClip {
                    source_folder: folder_path.to_string(),
                    source_clip_id: c.clip_id,
                    source_video_id: c.video_id,
                    start_time: c.start_time,
                    end_time: c.end_time,
                    thumbnail_path: c.thumbnail_path.clone(),
                    scene: c.scene.clone(),
                    description: c.description.clone(),
                    subjects: c.subjects.clone(),
                    actions: c.actions.clone(),
                    objects: c.objects.clone(),
                    mood: c.mood.clone(),
                    shot_type: c.shot_type.clone(),
                    lighting: c.lighting.clone(),
                    colors: c.colors.clone(),
                    transcript: c.transcript.clone(),
                    tags: c.tags.clone(),
                    rating: c.rating,
                    color_label: c.color_label.clone(),
                    embedding: c.embedding.clone(),
                    embedding_model: c.embedding_model.clone(),
                    embedding_dimensions: c.embedding_dimensions,
                    file_path,
                };
                global_schema::upsert_clip(&tx, &g)?;
            }
            global_schema::set_sync_cursor(&tx, folder_path, "videos", max_video_id)?;
            global_schema::set_sync_cursor(&tx, folder_path, "clips", max_clip_id)?;
            tx.commit()?;
            Ok(())
        })?;

        folder_pool.with_writer(|conn| {
            folder_schema::set_sync_cursor(conn, "videos", max_video_id)?;
            folder_schema::set_sync_cursor(conn, "clips", max_clip_id)?;
            Ok(())
        })?;

        tracing::info!(
            folder = folder_path,
            synced_videos,
            synced_clips,
            "folder synced to global projection"
        );

        Ok(SyncResult { synced_videos, synced_clips })
    }

    /// Deletes all rows for `folder_path` and the matching `sync_meta` entry
    /// inside a single transaction. Per-folder DB file is left on disk.
    pub fn remove_folder_data(folder_path: &str, global_pool: &DbPool) -> Result<()> {
        global_pool.with_writer(|conn| global_schema::remove_folder_data(conn, folder_path))
    }
}

#[cfg(test)]
mod scenarios;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::{run_folder_migrations, run_global_migrations};

    fn setup() -> (DbPool, DbPool) {
        (
            DbPool::open_in_memory(run_folder_migrations).unwrap(),
            DbPool::open_in_memory(run_global_migrations).unwrap(),
        )
    }

    #[test]
    fn unchanged_rescan_syncs_nothing_twice() {
        let (folder_pool, global_pool) = setup();
        folder_pool
            .with_writer(|conn| {
                let vid = folder_schema::insert_video(conn, "/f/a.mp4", 100, 1000)?;
                folder_schema::upsert_clip_segment(conn, vid, 0.0, 5.0, None)?;
                Ok(())
            })
            .unwrap();

        let first = SyncEngine::sync("/f", &folder_pool, &global_pool, false).unwrap();
        assert_eq!(first.synced_videos, 1);
        assert_eq!(first.synced_clips, 1);

        let second = SyncEngine::sync("/f", &folder_pool, &global_pool, false).unwrap();
        assert_eq!(second, SyncResult::default());
    }

    #[test]
    fn remove_folder_data_clears_global_rows_but_keeps_folder_db() {
        let (folder_pool, global_pool) = setup();
        folder_pool
            .with_writer(|conn| {
                let vid = folder_schema::insert_video(conn, "/f/a.mp4", 100, 1000)?;
                folder_schema::upsert_clip_segment(conn, vid, 0.0, 5.0, None)?;
                Ok(())
            })
            .unwrap();
        SyncEngine::sync("/f", &folder_pool, &global_pool, false).unwrap();

        SyncEngine::remove_folder_data("/f", &global_pool).unwrap();
        let remaining = global_pool
            .with_reader(|conn| Ok(crate::db::global_schema::clip_ids_in_folders(conn, &[])?))
            .unwrap();
        assert!(remaining.is_empty());

        // Folder DB itself is untouched: its rows are still there.
        let folder_clip_count: i64 = folder_pool
            .with_reader(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM clips", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(folder_clip_count, 1);
    }
}
