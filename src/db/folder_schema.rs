// Per-folder schema row types and queries (spec §3, §4.1).

use crate::error::Result;
use crate::model::{Clip, ClipVector, SearchRecord, Video, VideoState, WatchedFolder};
use rusqlite::{params, Connection, OptionalExtension, Row};

fn video_from_row(row: &Row) -> rusqlite::Result<Video> {
    Ok(Video {
        video_id: row.get("id")?,
        file_path: row.get("file_path")?,
        size: row.get("size")?,
        mtime: row.get("mtime")?,
        content_hash: row.get("content_hash")?,
        duration_seconds: row.get("duration_seconds")?,
        has_audio: row.get::<_, Option<i64>>("has_audio")?.map(|v| v != 0),
        srt_path: row.get("srt_path")?,
        state: VideoState::from_str(&row.get::<_, String>("state")?),
    })
}

fn clip_from_row(row: &Row) -> rusqlite::Result<Clip> {
    let tags_json: String = row.get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    Ok(Clip {
        clip_id: row.get("id")?,
        video_id: row.get("video_id")?,
        start_time: row.get("start_time")?,
        end_time: row.get("end_time")?,
        thumbnail_path: row.get("thumbnail_path")?,
        scene: row.get("scene")?,
        description: row.get("description")?,
        subjects: row.get("subjects")?,
        actions: row.get("actions")?,
        objects: row.get("objects")?,
        mood: row.get("mood")?,
        shot_type: row.get("shot_type")?,
        lighting: row.get("lighting")?,
        colors: row.get("colors")?,
        transcript: row.get("transcript")?,
        tags,
        rating: row.get("rating")?,
        color_label: row.get("color_label")?,
        embedding: row.get("embedding")?,
        embedding_model: row.get("embedding_model")?,
        embedding_dimensions: row
            .get::<_, Option<i64>>("embedding_dimensions")?
            .map(|v| v as usize),
    })
}

pub fn upsert_watched_folder(conn: &Connection, folder: &WatchedFolder) -> Result<()> {
    conn.execute(
        "INSERT INTO watched_folder (id, folder_path, volume_name, volume_uuid, is_available, last_seen_at)
         VALUES (1, ?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            folder_path = excluded.folder_path,
            volume_name = excluded.volume_name,
            volume_uuid = excluded.volume_uuid,
            is_available = excluded.is_available,
            last_seen_at = excluded.last_seen_at",
        params![
            folder.folder_path,
            folder.volume_name,
            folder.volume_uuid,
            folder.is_available as i64,
            folder.last_seen_at,
        ],
    )?;
    Ok(())
}

pub fn get_watched_folder(conn: &Connection) -> Result<Option<WatchedFolder>> {
    conn.query_row(
        "SELECT folder_path, volume_name, volume_uuid, is_available, last_seen_at FROM watched_folder WHERE id = 1",
        [],
        |row| {
            Ok(WatchedFolder {
                folder_path: row.get(0)?,
                volume_name: row.get(1)?,
                volume_uuid: row.get(2)?,
                is_available: row.get::<_, i64>(3)? != 0,
                last_seen_at: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

pub fn find_video_by_fingerprint(conn: &Connection, size: i64, mtime: i64) -> Result<Option<Video>> {
    conn.query_row(
        "SELECT * FROM videos WHERE size = ?1 AND mtime = ?2",
        params![size, mtime],
        video_from_row,
    )
    .optional()
    .map_err(Into::into)
}

pub fn find_video_by_content_hash(conn: &Connection, hash: &str) -> Result<Option<Video>> {
    conn.query_row(
        "SELECT * FROM videos WHERE content_hash = ?1",
        params![hash],
        video_from_row,
    )
    .optional()
    .map_err(Into::into)
}

pub fn find_video_by_path(conn: &Connection, path: &str) -> Result<Option<Video>> {
    conn.query_row(
        "SELECT * FROM videos WHERE file_path = ?1",
        params![path],
        video_from_row,
    )
    .optional()
    .map_err(Into::into)
}

pub fn get_video(conn: &Connection, video_id: i64) -> Result<Option<Video>> {
    conn.query_row("SELECT * FROM videos WHERE id = ?1", params![video_id], video_from_row)
        .optional()
        .map_err(Into::into)
}

pub fn insert_video(conn: &Connection, file_path: &str, size: i64, mtime: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO videos (file_path, size, mtime, state) VALUES (?1, ?2, ?3, 'pending')",
        params![file_path, size, mtime],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_video_path(conn: &Connection, video_id: i64, new_path: &str) -> Result<()> {
    conn.execute(
        "UPDATE videos SET file_path = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![new_path, video_id],
    )?;
    Ok(())
}

pub fn update_video_fingerprint(conn: &Connection, video_id: i64, size: i64, mtime: i64) -> Result<()> {
    conn.execute(
        "UPDATE videos SET size = ?1, mtime = ?2, updated_at = datetime('now') WHERE id = ?3",
        params![size, mtime, video_id],
    )?;
    Ok(())
}

pub fn update_video_content_hash(conn: &Connection, video_id: i64, hash: &str) -> Result<()> {
    conn.execute(
        "UPDATE videos SET content_hash = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![hash, video_id],
    )?;
    Ok(())
}

pub fn update_video_state(conn: &Connection, video_id: i64, state: VideoState, error_message: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE videos SET state = ?1, error_message = ?2, updated_at = datetime('now') WHERE id = ?3",
        params![state.as_str(), error_message, video_id],
    )?;
    Ok(())
}

pub fn mark_video_orphaned(conn: &Connection, video_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE videos SET state = 'orphaned', orphaned_at = datetime('now') WHERE id = ?1",
        params![video_id],
    )?;
    Ok(())
}

pub fn videos_orphaned_before(conn: &Connection, cutoff_rfc3339: &str) -> Result<Vec<Video>> {
    let mut stmt = conn.prepare("SELECT * FROM videos WHERE state = 'orphaned' AND orphaned_at < ?1")?;
    let rows = stmt.query_map(params![cutoff_rfc3339], video_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn hard_delete_video(conn: &Connection, video_id: i64) -> Result<()> {
    let clip_ids: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT id FROM clips WHERE video_id = ?1")?;
        let rows = stmt.query_map(params![video_id], |r| r.get(0))?;
        rows.filter_map(|r| r.ok()).collect()
    };
    for clip_id in clip_ids {
        conn.execute("DELETE FROM clip_vectors WHERE clip_id = ?1", params![clip_id])?;
        conn.execute("DELETE FROM clips WHERE id = ?1", params![clip_id])?;
    }
    conn.execute("DELETE FROM videos WHERE id = ?1", params![video_id])?;
    Ok(())
}

/// Idempotent by (video_id, start_time): returns the existing clip id if present.
pub fn upsert_clip_segment(conn: &Connection, video_id: i64, start_time: f64, end_time: f64, thumbnail_path: Option<&str>) -> Result<i64> {
    conn.execute(
        "INSERT INTO clips (video_id, start_time, end_time, thumbnail_path)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(video_id, start_time) DO UPDATE SET
            end_time = excluded.end_time,
            thumbnail_path = COALESCE(excluded.thumbnail_path, clips.thumbnail_path),
            updated_at = datetime('now')",
        params![video_id, start_time, end_time, thumbnail_path],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM clips WHERE video_id = ?1 AND start_time = ?2",
        params![video_id, start_time],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub fn get_clip(conn: &Connection, clip_id: i64) -> Result<Option<Clip>> {
    conn.query_row("SELECT * FROM clips WHERE id = ?1", params![clip_id], clip_from_row)
        .optional()
        .map_err(Into::into)
}

pub fn clips_for_video(conn: &Connection, video_id: i64) -> Result<Vec<Clip>> {
    let mut stmt = conn.prepare("SELECT * FROM clips WHERE video_id = ?1 ORDER BY start_time")?;
    let rows = stmt.query_map(params![video_id], clip_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn clips_missing_description(conn: &Connection, video_id: i64) -> Result<Vec<Clip>> {
    let mut stmt = conn.prepare("SELECT * FROM clips WHERE video_id = ?1 AND description IS NULL")?;
    let rows = stmt.query_map(params![video_id], clip_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn update_clip_caption(conn: &Connection, clip_id: i64, caption: &crate::providers::vision::VisionCaption) -> Result<()> {
    conn.execute(
        "UPDATE clips SET scene = ?1, subjects = ?2, actions = ?3, objects = ?4, mood = ?5,
                           shot_type = ?6, lighting = ?7, colors = ?8, description = ?9,
                           updated_at = datetime('now')
         WHERE id = ?10",
        params![
            caption.scene,
            caption.subjects,
            caption.actions,
            caption.objects,
            caption.mood,
            caption.shot_type,
            caption.lighting,
            caption.colors,
            caption.description,
            clip_id,
        ],
    )?;
    Ok(())
}

pub fn update_clip_transcript(conn: &Connection, clip_id: i64, transcript: &str) -> Result<()> {
    conn.execute(
        "UPDATE clips SET transcript = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![transcript, clip_id],
    )?;
    Ok(())
}

pub fn set_clip_text_embedding(conn: &Connection, clip_id: i64, model_name: &str, dimensions: usize, raw: &[u8]) -> Result<()> {
    conn.execute(
        "UPDATE clips SET embedding = ?1, embedding_model = ?2, embedding_dimensions = ?3, updated_at = datetime('now')
         WHERE id = ?4",
        params![raw, model_name, dimensions as i64, clip_id],
    )?;
    Ok(())
}

pub fn upsert_clip_vector(conn: &Connection, clip_id: i64, model_name: &str, raw: &[u8]) -> Result<()> {
    conn.execute(
        "INSERT INTO clip_vectors (clip_id, model_name, vector) VALUES (?1, ?2, ?3)
         ON CONFLICT(clip_id, model_name) DO UPDATE SET vector = excluded.vector",
        params![clip_id, model_name, raw],
    )?;
    Ok(())
}

pub fn get_clip_vector(conn: &Connection, clip_id: i64, model_name: &str) -> Result<Option<ClipVector>> {
    conn.query_row(
        "SELECT clip_id, model_name, vector FROM clip_vectors WHERE clip_id = ?1 AND model_name = ?2",
        params![clip_id, model_name],
        |row| {
            Ok(ClipVector {
                clip_id: row.get(0)?,
                model_name: row.get(1)?,
                vector: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

pub fn clips_needing_vector(conn: &Connection, video_id: i64, model_name: &str) -> Result<Vec<Clip>> {
    let mut stmt = conn.prepare(
        "SELECT c.* FROM clips c
         LEFT JOIN clip_vectors v ON v.clip_id = c.id AND v.model_name = ?2
         WHERE c.video_id = ?1 AND v.clip_id IS NULL",
    )?;
    let rows = stmt.query_map(params![video_id, model_name], clip_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn set_clip_tags(conn: &Connection, clip_id: i64, tags: &[String]) -> Result<()> {
    let json = serde_json::to_string(tags)?;
    conn.execute(
        "UPDATE clips SET tags = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![json, clip_id],
    )?;
    Ok(())
}

pub fn set_clip_rating(conn: &Connection, clip_id: i64, rating: i32) -> Result<()> {
    conn.execute(
        "UPDATE clips SET rating = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![rating, clip_id],
    )?;
    Ok(())
}

pub fn set_clip_color_label(conn: &Connection, clip_id: i64, color_label: Option<&str>) -> Result<()> {
    conn.execute(
        "UPDATE clips SET color_label = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![color_label, clip_id],
    )?;
    Ok(())
}

pub fn get_sync_cursor(conn: &Connection, table_name: &str) -> Result<i64> {
    let cursor: Option<i64> = conn
        .query_row("SELECT cursor FROM sync_meta WHERE table_name = ?1", params![table_name], |r| r.get(0))
        .optional()?;
    Ok(cursor.unwrap_or(0))
}

pub fn set_sync_cursor(conn: &Connection, table_name: &str, cursor: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_meta (table_name, cursor) VALUES (?1, ?2)
         ON CONFLICT(table_name) DO UPDATE SET cursor = excluded.cursor",
        params![table_name, cursor],
    )?;
    Ok(())
}

pub fn videos_since_cursor(conn: &Connection, cursor: i64) -> Result<Vec<Video>> {
    let mut stmt = conn.prepare("SELECT * FROM videos WHERE id > ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![cursor], video_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn clips_since_cursor(conn: &Connection, cursor: i64) -> Result<Vec<Clip>> {
    let mut stmt = conn.prepare("SELECT * FROM clips WHERE id > ?1 ORDER BY id")?;
    let rows = stmt.query_map(params![cursor], clip_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn all_videos(conn: &Connection) -> Result<Vec<Video>> {
    let mut stmt = conn.prepare("SELECT * FROM videos ORDER BY id")?;
    let rows = stmt.query_map([], video_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn all_clips(conn: &Connection) -> Result<Vec<Clip>> {
    let mut stmt = conn.prepare("SELECT * FROM clips ORDER BY id")?;
    let rows = stmt.query_map([], clip_from_row)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn max_video_id(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COALESCE(MAX(id), 0) FROM videos", [], |r| r.get(0))?)
}

pub fn max_clip_id(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COALESCE(MAX(id), 0) FROM clips", [], |r| r.get(0))?)
}

pub fn record_search(conn: &Connection, query: &str, result_count: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO search_history (query, result_count) VALUES (?1, ?2)",
        params![query, result_count],
    )?;
    Ok(())
}

pub fn recent_searches(conn: &Connection, limit: i64) -> Result<Vec<SearchRecord>> {
    let mut stmt = conn.prepare("SELECT query, result_count, timestamp FROM search_history ORDER BY id DESC LIMIT ?1")?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(SearchRecord {
            query: row.get(0)?,
            result_count: row.get(1)?,
            timestamp: row.get(2)?,
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Rewrite `file_path`/`srt_path`/`thumbnail_path` columns whose value starts
/// with `old_prefix + "/"` to start with `new_prefix` instead (spec §4.2 P4).
pub fn rebase_paths(conn: &Connection, old_prefix: &str, new_prefix: &str) -> Result<usize> {
    let like_pattern = format!("{}/%", old_prefix);
    // substr's start position here is old_prefix.len() + 1: the separator
    // slash itself, so it survives in the remainder and new_prefix (which
    // carries no trailing slash) can be concatenated directly in front of it.
    let old_len = old_prefix.len() as i64 + 1;
    let mut total = 0usize;

    total += conn.execute(
        "UPDATE videos SET file_path = ?1 || substr(file_path, ?2)
         WHERE file_path LIKE ?3 ESCAPE '\\'",
        params![new_prefix, old_len, like_pattern],
    )?;
    total += conn.execute(
        "UPDATE videos SET srt_path = ?1 || substr(srt_path, ?2)
         WHERE srt_path LIKE ?3 ESCAPE '\\'",
        params![new_prefix, old_len, like_pattern],
    )?;
    total += conn.execute(
        "UPDATE clips SET thumbnail_path = ?1 || substr(thumbnail_path, ?2)
         WHERE thumbnail_path LIKE ?3 ESCAPE '\\'",
        params![new_prefix, old_len, like_pattern],
    )?;

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_folder_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_folder_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn fingerprint_roundtrip() {
        let conn = setup();
        let id = insert_video(&conn, "/a/b.mp4", 100, 1000).unwrap();
        let found = find_video_by_fingerprint(&conn, 100, 1000).unwrap().unwrap();
        assert_eq!(found.video_id, id);
    }

    #[test]
    fn rename_updates_path_not_row_count() {
        let conn = setup();
        let id = insert_video(&conn, "/a/old.mp4", 100, 1000).unwrap();
        update_video_content_hash(&conn, id, "xxh64:abc").unwrap();
        update_video_path(&conn, id, "/a/new.mp4").unwrap();
        assert_eq!(all_videos(&conn).unwrap().len(), 1);
        let found = find_video_by_content_hash(&conn, "xxh64:abc").unwrap().unwrap();
        assert_eq!(found.file_path, "/a/new.mp4");
    }

    #[test]
    fn clip_segment_upsert_is_idempotent() {
        let conn = setup();
        let vid = insert_video(&conn, "/a/b.mp4", 100, 1000).unwrap();
        let c1 = upsert_clip_segment(&conn, vid, 0.0, 5.0, None).unwrap();
        let c2 = upsert_clip_segment(&conn, vid, 0.0, 5.5, None).unwrap();
        assert_eq!(c1, c2);
        assert_eq!(clips_for_video(&conn, vid).unwrap().len(), 1);
    }

    #[test]
    fn rebase_rewrites_matching_prefix_only() {
        let conn = setup();
        let vid = insert_video(&conn, "/Volumes/DriveA/clips/a.mp4", 100, 1000).unwrap();
        let other = insert_video(&conn, "/elsewhere/b.mp4", 50, 500).unwrap();
        rebase_paths(&conn, "/Volumes/DriveA/clips", "/Volumes/DriveA 1/clips").unwrap();
        let a = get_video(&conn, vid).unwrap().unwrap();
        let b = get_video(&conn, other).unwrap().unwrap();
        assert_eq!(a.file_path, "/Volumes/DriveA 1/clips/a.mp4");
        assert_eq!(b.file_path, "/elsewhere/b.mp4");
    }
}
