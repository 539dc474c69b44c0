// VectorIndexManager (spec §4.11): owns at most one CLIP index and one text
// index in memory at a time, lazily built. A `get_*_index` call tries, in
// order: the cached handle, a fresh `view` of the on-disk snapshot (if it's
// still fresh), or a full rebuild from the global DB — matching the
// cached/view/rebuild fallback chain the spec calls out for P5.

use crate::constants::{CLIP_HNSW_FILENAME, TEXT_HNSW_FILENAME};
use crate::db::pool::DbPool;
use crate::error::Result;
use crate::vector::hnsw::VectorIndexEngine;
use crate::vector::rebuild::VectorIndexRebuilder;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

struct Cached {
    index: Arc<VectorIndexEngine>,
    model_name: String,
}

pub struct VectorIndexManager {
    data_dir: PathBuf,
    clip_dimensions: usize,
    text_dimensions: usize,
    clip: Mutex<Option<Cached>>,
    text: Mutex<Option<Cached>>,
}

impl VectorIndexManager {
    pub fn new(data_dir: impl Into<PathBuf>, clip_dimensions: usize, text_dimensions: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            clip_dimensions,
            text_dimensions,
            clip: Mutex::new(None),
            text: Mutex::new(None),
        }
    }

    fn clip_path(&self) -> PathBuf {
        self.data_dir.join(CLIP_HNSW_FILENAME)
    }

    fn text_path(&self) -> PathBuf {
        self.data_dir.join(TEXT_HNSW_FILENAME)
    }

    pub fn get_clip_index(&self, global_pool: &DbPool, model_name: &str) -> Result<Arc<VectorIndexEngine>> {
        Self::get_index(&self.clip, &self.clip_path(), self.clip_dimensions, global_pool, model_name)
    }

    pub fn get_text_index(&self, global_pool: &DbPool, model_name: &str) -> Result<Arc<VectorIndexEngine>> {
        Self::get_index(&self.text, &self.text_path(), self.text_dimensions, global_pool, model_name)
    }

    fn get_index(
        slot: &Mutex<Option<Cached>>,
        path: &Path,
        dimensions: usize,
        global_pool: &DbPool,
        model_name: &str,
    ) -> Result<Arc<VectorIndexEngine>> {
        let mut guard = slot.lock().expect("vector index manager poisoned");

        if let Some(cached) = guard.as_ref() {
            if cached.model_name == model_name {
                return Ok(cached.index.clone());
            }
        }

        let stale = VectorIndexRebuilder::needs_rebuild(path, global_pool, model_name)?;
        let index = if stale {
            debug!(path = %path.display(), model = model_name, "rebuilding vector index");
            let rebuilt = VectorIndexRebuilder::rebuild(global_pool, model_name, dimensions)?;
            if let Err(err) = rebuilt.save(path) {
                warn!(error = %err, path = %path.display(), "failed to persist rebuilt vector index");
            }
            rebuilt
        } else {
            match VectorIndexEngine::view(path, dimensions) {
                Ok(index) => index,
                Err(err) => {
                    warn!(error = %err, path = %path.display(), "failed to view vector index, rebuilding");
                    VectorIndexRebuilder::rebuild(global_pool, model_name, dimensions)?
                }
            }
        };

        let index = Arc::new(index);
        *guard = Some(Cached {
            index: index.clone(),
            model_name: model_name.to_string(),
        });
        Ok(index)
    }

    pub fn invalidate_clip_index(&self) {
        *self.clip.lock().expect("vector index manager poisoned") = None;
    }

    pub fn invalidate_text_index(&self) {
        *self.text.lock().expect("vector index manager poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_global_migrations;
    use crate::model::{GlobalClip, GlobalVideo, VideoState};
    use crate::pipeline::stages::vector_to_bytes;
    use tempfile::tempdir;

    fn setup() -> DbPool {
        DbPool::open_in_memory(run_global_migrations).unwrap()
    }

    fn insert_clip(pool: &DbPool, id: i64, model: &str, vector: &[f32]) {
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
    fn get_clip_index_builds_then_caches_until_invalidated() {
        let dir = tempdir().unwrap();
        let pool = setup();
        insert_clip(&pool, 1, "clip-model", &[1.0, 0.0, 0.0, 0.0]);

        let manager = VectorIndexManager::new(dir.path(), 4, 4);
        let index1 = manager.get_clip_index(&pool, "clip-model").unwrap();
        assert_eq!(index1.count(), 1);

        insert_clip(&pool, 2, "clip-model", &[0.0, 1.0, 0.0, 0.0]);
        let index2 = manager.get_clip_index(&pool, "clip-model").unwrap();
        assert_eq!(index2.count(), 1, "cached handle should not see new rows until invalidated");

        manager.invalidate_clip_index();
        let index3 = manager.get_clip_index(&pool, "clip-model").unwrap();
        assert_eq!(index3.count(), 2);
    }

    #[test]
    fn switching_model_name_triggers_fresh_build() {
        let dir = tempdir().unwrap();
        let pool = setup();
        insert_clip(&pool, 1, "model-a", &[1.0, 0.0, 0.0, 0.0]);
        insert_clip(&pool, 2, "model-b", &[0.0, 1.0, 0.0, 0.0]);

        let manager = VectorIndexManager::new(dir.path(), 4, 4);
        let a = manager.get_clip_index(&pool, "model-a").unwrap();
        assert_eq!(a.count(), 1);
        assert!(a.contains(1));

        let b = manager.get_clip_index(&pool, "model-b").unwrap();
        assert_eq!(b.count(), 1);
        assert!(b.contains(2));
    }
}
