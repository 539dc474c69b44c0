// Global schema row types and queries: the denormalized cross-folder
// projection (spec §3, §4.1, §4.3).

use crate::error::Result;
use crate::model::{GlobalClip, GlobalVideo, SearchResult, VideoState};
use rusqlite::{params, Connection, OptionalExtension, Row};

fn global_clip_from_row(row: &Row) -> rusqlite::Result<GlobalClip> {
    let tags_json: String = row.get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    Ok(GlobalClip {
        source_folder: row.get("source_folder")?,
        source_clip_id: row.get("source_clip_id")?,
        source_video_id: row.get("source_video_id")?,
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
        file_path: row.get("file_path")?,
    })
}

pub fn upsert_video(conn: &Connection, v: &GlobalVideo) -> Result<()> {
    conn.execute(
        "INSERT INTO videos (source_folder, source_video_id, file_path, size, mtime, content_hash,
                              duration_seconds, has_audio, srt_path, state)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(source_folder, source_video_id) DO UPDATE SET
            file_path = excluded.file_path,
            size = excluded.size,
            mtime = excluded.mtime,
            content_hash = excluded.content_hash,
            duration_seconds = excluded.duration_seconds,
            has_audio = excluded.has_audio,
            srt_path = excluded.srt_path,
            state = excluded.state",
        params![
            v.source_folder,
            v.source_video_id,
            v.file_path,
            v.size,
            v.mtime,
            v.content_hash,
            v.duration_seconds,
            v.has_audio.map(|b| b as i64),
            v.srt_path,
            v.state.as_str(),
        ],
    )?;
    Ok(())
}

pub fn upsert_clip(conn: &Connection, c: &GlobalClip) -> Result<()> {
    let tags_json = serde_json::to_string(&c.tags)?;
    conn.execute(
        "INSERT INTO clips (source_folder, source_clip_id, source_video_id, start_time, end_time,
                             thumbnail_path, scene, description, subjects, actions, objects, mood,
                             shot_type, lighting, colors, transcript, tags, rating, color_label,
                             embedding, embedding_model, embedding_dimensions, file_path)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23)
         ON CONFLICT(source_folder, source_clip_id) DO UPDATE SET
            source_video_id = excluded.source_video_id,
            start_time = excluded.start_time,
            end_time = excluded.end_time,
            thumbnail_path = excluded.thumbnail_path,
            scene = excluded.scene,
            description = excluded.description,
            subjects = excluded.subjects,
            actions = excluded.actions,
            objects = excluded.objects,
            mood = excluded.mood,
            shot_type = excluded.shot_type,
            lighting = excluded.lighting,
            colors = excluded.colors,
            transcript = excluded.transcript,
            tags = excluded.tags,
            rating = excluded.rating,
            color_label = excluded.color_label,
            embedding = excluded.embedding,
            embedding_model = excluded.embedding_model,
            embedding_dimensions = excluded.embedding_dimensions,
            file_path = excluded.file_path",
        params![
            c.source_folder,
            c.source_clip_id,
            c.source_video_id,
            c.start_time,
            c.end_time,
            c.thumbnail_path,
            c.scene,
            c.description,
            c.subjects,
            c.actions,
            c.objects,
            c.mood,
            c.shot_type,
            c.lighting,
            c.colors,
            c.transcript,
            tags_json,
            c.rating,
            c.color_label,
            c.embedding,
            c.embedding_model,
            c.embedding_dimensions.map(|d| d as i64),
            c.file_path,
        ],
    )?;
    Ok(())
}

pub fn get_sync_cursor(conn: &Connection, folder_path: &str, table_name: &str) -> Result<i64> {
    let cursor: Option<i64> = conn
        .query_row(
            "SELECT cursor FROM sync_meta WHERE folder_path = ?1 AND table_name = ?2",
            params![folder_path, table_name],
            |r| r.get(0),
        )
        .optional()?;
    Ok(cursor.unwrap_or(0))
}

pub fn set_sync_cursor(conn: &Connection, folder_path: &str, table_name: &str, cursor: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_meta (folder_path, table_name, cursor) VALUES (?1, ?2, ?3)
         ON CONFLICT(folder_path, table_name) DO UPDATE SET cursor = excluded.cursor",
        params![folder_path, table_name, cursor],
    )?;
    Ok(())
}

/// Delete all rows for `folder_path` and its sync_meta entries in one transaction.
pub fn remove_folder_data(conn: &Connection, folder_path: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM clips WHERE source_folder = ?1", params![folder_path])?;
    tx.execute("DELETE FROM videos WHERE source_folder = ?1", params![folder_path])?;
    tx.execute("DELETE FROM sync_meta WHERE folder_path = ?1", params![folder_path])?;
    tx.execute("DELETE FROM watched_folders WHERE folder_path = ?1", params![folder_path])?;
    tx.commit()?;
    Ok(())
}

/// Rewrite the `source_folder`/`file_path` prefix after a volume rebase (spec §4.5).
pub fn rebase_folder(conn: &Connection, old_prefix: &str, new_prefix: &str) -> Result<()> {
    // substr's start position is old_prefix.len() + 1: the separator slash
    // itself, kept in the remainder since new_prefix has no trailing slash.
    let old_len = old_prefix.len() as i64 + 1;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE videos SET file_path = ?1 || substr(file_path, ?2) WHERE source_folder = ?3",
        params![new_prefix, old_len, old_prefix],
    )?;
    tx.execute(
        "UPDATE clips SET file_path = ?1 || substr(file_path, ?2) WHERE source_folder = ?3",
        params![new_prefix, old_len, old_prefix],
    )?;
    tx.execute(
        "UPDATE videos SET source_folder = ?1 WHERE source_folder = ?2",
        params![new_prefix, old_prefix],
    )?;
    tx.execute(
        "UPDATE clips SET source_folder = ?1 WHERE source_folder = ?2",
        params![new_prefix, old_prefix],
    )?;
    tx.execute(
        "UPDATE sync_meta SET folder_path = ?1 WHERE folder_path = ?2",
        params![new_prefix, old_prefix],
    )?;
    tx.execute(
        "UPDATE watched_folders SET folder_path = ?1 WHERE folder_path = ?2",
        params![new_prefix, old_prefix],
    )?;
    tx.commit()?;
    Ok(())
}

pub fn clip_ids_in_folders(conn: &Connection, folder_paths: &[String]) -> Result<Vec<i64>> {
    if folder_paths.is_empty() {
        let mut stmt = conn.prepare("SELECT id FROM clips")?;
        let rows = stmt.query_map([], |r| r.get(0))?;
        return Ok(rows.filter_map(|r| r.ok()).collect());
    }
    let placeholders = folder_paths.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("SELECT id FROM clips WHERE source_folder IN ({})", placeholders);
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = folder_paths.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
    let rows = stmt.query_map(params.as_slice(), |r| r.get(0))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn clip_ids_under_prefix(conn: &Connection, prefix: &str) -> Result<Vec<i64>> {
    let like_pattern = format!("{}/%", prefix);
    let mut stmt = conn.prepare("SELECT id FROM clips WHERE file_path LIKE ?1")?;
    let rows = stmt.query_map(params![like_pattern], |r| r.get(0))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Hydrates `clip_ids` into full rows, returned in the same order as the
/// input (callers rely on this to re-attach fused ranking scores).
pub fn hydrate_clips(conn: &Connection, clip_ids: &[i64]) -> Result<Vec<(i64, GlobalClip)>> {
    if clip_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = clip_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("SELECT * FROM clips WHERE id IN ({})", placeholders);
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = clip_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    let rows = stmt.query_map(params.as_slice(), |row| {
        let id: i64 = row.get("id")?;
        Ok((id, global_clip_from_row(row)?))
    })?;
    let mut by_id: std::collections::HashMap<i64, GlobalClip> = rows.filter_map(|r| r.ok()).collect();
    Ok(clip_ids.iter().filter_map(|id| by_id.remove(id).map(|c| (*id, c))).collect())
}

pub fn all_embeddings(conn: &Connection, model_names: &[String]) -> Result<Vec<(i64, Vec<u8>)>> {
    let placeholders = model_names.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT id, embedding FROM clips WHERE embedding IS NOT NULL AND embedding_model IN ({})",
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = model_names.iter().map(|m| m as &dyn rusqlite::ToSql).collect();
    let rows = stmt.query_map(params.as_slice(), |row| {
        let id: i64 = row.get(0)?;
        let bytes: Vec<u8> = row.get(1)?;
        Ok((id, bytes))
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn clip_vectors_for_model(conn: &Connection, model_name: &str) -> Result<Vec<(i64, Vec<u8>)>> {
    let mut stmt = conn.prepare(
        "SELECT id, embedding FROM clips WHERE embedding_model = ?1 AND embedding IS NOT NULL ORDER BY id",
    )?;
    let rows = stmt.query_map(params![model_name], |row| {
        let id: i64 = row.get(0)?;
        let bytes: Vec<u8> = row.get(1)?;
        Ok((id, bytes))
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn count_clip_vectors_for_model(conn: &Connection, model_name: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM clips WHERE embedding_model = ?1 AND embedding IS NOT NULL",
        params![model_name],
        |r| r.get(0),
    )?)
}

/// FTS search against `clips_fts MATCH ?`, optionally constrained by folder
/// membership and/or a path-prefix filter, ordered by FTS rank.
pub fn fts_search(
    conn: &Connection,
    fts_query: &str,
    folder_paths: Option<&[String]>,
    path_prefix: Option<&str>,
    limit: i64,
) -> Result<Vec<(i64, f64)>> {
    let mut sql = String::from(
        "SELECT c.id, bm25(clips_fts) AS rank
         FROM clips c JOIN clips_fts ON clips_fts.rowid = c.id
         WHERE clips_fts MATCH ?1",
    );
    let mut owned_params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(fts_query.to_string())];

    if let Some(folders) = folder_paths {
        if !folders.is_empty() {
            let placeholders = folders.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            sql.push_str(&format!(" AND c.source_folder IN ({})", placeholders));
            for f in folders {
                owned_params.push(Box::new(f.clone()));
            }
        }
    }
    if let Some(prefix) = path_prefix {
        sql.push_str(" AND c.file_path LIKE ?");
        owned_params.push(Box::new(format!("{}/%", prefix)));
    }
    sql.push_str(" ORDER BY rank LIMIT ?");
    owned_params.push(Box::new(limit));

    let mut stmt = conn.prepare(&sql)?;
    let params_ref: Vec<&dyn rusqlite::ToSql> = owned_params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_ref.as_slice(), |row| {
        let id: i64 = row.get(0)?;
        let rank: f64 = row.get(1)?;
        Ok((id, rank))
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn to_search_result(c: &GlobalClip, score: f32) -> SearchResult {
    SearchResult {
        source_folder: c.source_folder.clone(),
        source_clip_id: c.source_clip_id,
        file_path: c.file_path.clone(),
        start_time: c.start_time,
        end_time: c.end_time,
        thumbnail_path: c.thumbnail_path.clone(),
        description: c.description.clone(),
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_global_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_global_migrations(&conn).unwrap();
        conn
    }

    fn sample_video(folder: &str, id: i64) -> GlobalVideo {
        GlobalVideo {
            source_folder: folder.to_string(),
            source_video_id: id,
            file_path: format!("{}/v{}.mp4", folder, id),
            size: 100,
            mtime: 1000,
            content_hash: None,
            duration_seconds: Some(10.0),
            has_audio: Some(true),
            srt_path: None,
            state: VideoState::Indexed,
        }
    }

    fn sample_clip(folder: &str, video_id: i64, clip_id: i64) -> GlobalClip {
        GlobalClip {
            source_folder: folder.to_string(),
            source_clip_id: clip_id,
            source_video_id: video_id,
            start_time: 0.0,
            end_time: 5.0,
            thumbnail_path: None,
            scene: None,
            description: Some("a sunny beach".to_string()),
            subjects: None,
            actions: None,
            objects: None,
            mood: None,
            shot_type: None,
            lighting: None,
            colors: None,
            transcript: None,
            tags: vec![],
            rating: 0,
            color_label: None,
            embedding: None,
            embedding_model: None,
            embedding_dimensions: None,
            file_path: format!("{}/v{}.mp4", folder, video_id),
        }
    }

    #[test]
    fn remove_folder_data_is_scoped() {
        let conn = setup();
        upsert_video(&conn, &sample_video("/a", 1)).unwrap();
        upsert_clip(&conn, &sample_clip("/a", 1, 1)).unwrap();
        upsert_video(&conn, &sample_video("/b", 1)).unwrap();
        upsert_clip(&conn, &sample_clip("/b", 1, 1)).unwrap();
        set_sync_cursor(&conn, "/a", "videos", 1).unwrap();

        remove_folder_data(&conn, "/a").unwrap();

        let remaining = clip_ids_in_folders(&conn, &[]).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(get_sync_cursor(&conn, "/a", "videos").unwrap(), 0);
    }

    #[test]
    fn fts_search_finds_description() {
        let conn = setup();
        upsert_video(&conn, &sample_video("/a", 1)).unwrap();
        upsert_clip(&conn, &sample_clip("/a", 1, 1)).unwrap();
        let hits = fts_search(&conn, "beach", None, None, 50).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn fts_search_folder_filter_excludes_other_folders() {
        let conn = setup();
        upsert_video(&conn, &sample_video("/a", 1)).unwrap();
        upsert_clip(&conn, &sample_clip("/a", 1, 1)).unwrap();
        upsert_video(&conn, &sample_video("/b", 1)).unwrap();
        upsert_clip(&conn, &sample_clip("/b", 1, 2)).unwrap();

        let unfiltered = fts_search(&conn, "beach", None, None, 50).unwrap();
        assert_eq!(unfiltered.len(), 2);

        let scoped = fts_search(&conn, "beach", Some(&["/a".to_string()]), None, 50).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].0, 1);
    }

    #[test]
    fn fts_search_path_prefix_filter_requires_separator() {
        let conn = setup();
        // "/a" and "/a2" share a string prefix but not a path prefix; only
        // clips actually under "/a/" should match a "/a" prefix filter.
        upsert_video(&conn, &sample_video("/a", 1)).unwrap();
        upsert_clip(&conn, &sample_clip("/a", 1, 1)).unwrap();
        upsert_video(&conn, &sample_video("/a2", 1)).unwrap();
        upsert_clip(&conn, &sample_clip("/a2", 1, 2)).unwrap();

        let scoped = fts_search(&conn, "beach", None, Some("/a"), 50).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].0, 1);
    }

    #[test]
    fn clip_ids_under_prefix_requires_separator_boundary() {
        let conn = setup();
        upsert_video(&conn, &sample_video("/a", 1)).unwrap();
        upsert_clip(&conn, &sample_clip("/a", 1, 1)).unwrap();
        upsert_video(&conn, &sample_video("/a2", 1)).unwrap();
        upsert_clip(&conn, &sample_clip("/a2", 1, 2)).unwrap();

        let ids = clip_ids_under_prefix(&conn, "/a").unwrap();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn clip_ids_in_folders_scopes_to_the_requested_set() {
        let conn = setup();
        upsert_video(&conn, &sample_video("/a", 1)).unwrap();
        upsert_clip(&conn, &sample_clip("/a", 1, 1)).unwrap();
        upsert_video(&conn, &sample_video("/b", 1)).unwrap();
        upsert_clip(&conn, &sample_clip("/b", 1, 2)).unwrap();
        upsert_video(&conn, &sample_video("/c", 1)).unwrap();
        upsert_clip(&conn, &sample_clip("/c", 1, 3)).unwrap();

        let mut ids = clip_ids_in_folders(&conn, &["/a".to_string(), "/c".to_string()]).unwrap();
        ids.sort();
        assert_eq!(ids, vec![1, 3]);
    }
}
