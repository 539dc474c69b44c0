// VectorIndexRebuilder (spec §4.11): rebuilds an HNSW index from the SQL
// table in batches, used whenever `needs_rebuild` says the on-disk snapshot
// is missing or stale relative to the DB's row count for a model.

use crate::constants::VECTOR_REBUILD_BATCH_SIZE;
use crate::db::pool::DbPool;
use crate::error::Result;
use crate::pipeline::stages::bytes_to_vector;
use crate::vector::hnsw::VectorIndexEngine;
use rusqlite::params;
use std::path::Path;

pub struct VectorIndexRebuilder;

impl VectorIndexRebuilder {
    /// Rebuilds `model_name`'s index from `global_pool`'s `clips` table into
    /// a fresh writable index, in batches of ~5000 rows.
    pub fn rebuild(global_pool: &DbPool, model_name: &str, dimensions: usize) -> Result<VectorIndexEngine> {
        let row_count = global_pool.with_reader(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM clips WHERE embedding_model = ?1 AND embedding IS NOT NULL",
                params![model_name],
                |r| r.get::<_, i64>(0),
            )?)
        })?;

        let index = VectorIndexEngine::new(dimensions)?;
        if row_count == 0 {
            return Ok(index);
        }

        let mut offset: i64 = 0;
        loop {
            let batch = global_pool.with_reader(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, embedding FROM clips
                     WHERE embedding_model = ?1 AND embedding IS NOT NULL
                     ORDER BY id LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt.query_map(params![model_name, VECTOR_REBUILD_BATCH_SIZE, offset], |row| {
                    let clip_id: i64 = row.get(0)?;
                    let raw: Vec<u8> = row.get(1)?;
                    Ok((clip_id, raw))
                })?;
                Ok(rows.filter_map(|r| r.ok()).collect::<Vec<_>>())
            })?;

            if batch.is_empty() {
                break;
            }

            let decoded: Vec<(i64, Vec<f32>)> = batch
                .into_iter()
                .map(|(clip_id, raw)| (clip_id, bytes_to_vector(&raw)))
                .filter(|(_, v)| v.len() == dimensions)
                .collect();
            index.add_batch(&decoded)?;

            offset += VECTOR_REBUILD_BATCH_SIZE;
            if offset >= row_count {
                break;
            }
        }

        Ok(index)
    }

    /// `!exists(path) OR count(path) != count(db where model_name=?)`.
    pub fn needs_rebuild(path: &Path, global_pool: &DbPool, model_name: &str) -> Result<bool> {
        if !path.exists() {
            return Ok(true);
        }
        let db_count = global_pool.with_reader(|conn| {
            crate::db::global_schema::count_clip_vectors_for_model(conn, model_name)
        })?;
        // A missing/corrupt sidecar is treated the same as "not built yet":
        // reading its count is best-effort via a view, falling back to force rebuild.
        let dims_guess = global_pool.with_reader(|conn| {
            Ok(conn
                .query_row(
                    "SELECT embedding_dimensions FROM clips WHERE embedding_model = ?1 AND embedding_dimensions IS NOT NULL LIMIT 1",
                    params![model_name],
                    |r| r.get::<_, i64>(0),
                )
                .optional()?)
        })?;
        let Some(dims) = dims_guess else {
            return Ok(db_count == 0);
        };
        match VectorIndexEngine::view(path, dims as usize) {
            Ok(index) => Ok(index.count() as i64 != db_count),
            Err(_) => Ok(true),
        }
    }
}

use rusqlite::OptionalExtension;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_global_migrations;
    use crate::model::{GlobalClip, GlobalVideo, VideoState};
    use crate::pipeline::stages::vector_to_bytes;

    fn setup() -> DbPool {
        DbPool::open_in_memory(run_global_migrations).unwrap()
    }

    fn insert_clip_with_vector(pool: &DbPool, id: i64, model: &str, vector: &[f32]) {
        pool.with_writer(|conn| {
            crate::db::global_schema::upsert_video(
                conn,
                &GlobalVideo {
                    source_folder: "/f".to_string(),
                    source_video_id: id,
                    file_path: format!("/f/v{id}.mp4"),
                    size: 10,
                    mtime: 10,
                    content_hash: None,
                    duration_seconds: Some(5.0),
                    has_audio: Some(false),
                    srt_path: None,
                    state: VideoState::Indexed,
                },
            )?;
            crate::db::global_schema::upsert_clip(
                conn,
                &GlobalClip {
                    source_folder: "/f".to_string(),
                    source_clip_id: id,
                    source_video_id: id,
                    start_time: 0.0,
                    end_time: 5.0,
                    thumbnail_path: None,
                    scene: None,
                    description: None,
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
                    embedding: Some(vector_to_bytes(vector)),
                    embedding_model: Some(model.to_string()),
                    embedding_dimensions: Some(vector.len()),
                    file_path: format!("/f/v{id}.mp4"),
                },
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn rebuild_adds_every_db_row_to_the_index() {
        let pool = setup();
        insert_clip_with_vector(&pool, 1, "clip-model", &[1.0, 0.0, 0.0, 0.0]);
        insert_clip_with_vector(&pool, 2, "clip-model", &[0.0, 1.0, 0.0, 0.0]);

        let index = VectorIndexRebuilder::rebuild(&pool, "clip-model", 4).unwrap();
        assert_eq!(index.count(), 2);
        assert!(index.contains(1));
        assert!(index.contains(2));
    }

    #[test]
    fn needs_rebuild_true_when_file_missing() {
        let pool = setup();
        let missing = std::path::Path::new("/nonexistent/clip.usearch");
        assert!(VectorIndexRebuilder::needs_rebuild(missing, &pool, "clip-model").unwrap());
    }
}
