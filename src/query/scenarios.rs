// Scenarios 5 and 6 from the concrete-scenarios list: end-to-end hybrid
// ranking across all three channels, and CJK query expansion feeding FTS.

use super::*;
use crate::db::global_schema::{upsert_clip, upsert_video};
use crate::db::migrations::run_global_migrations;
use crate::model::{GlobalClip, GlobalVideo, VideoState};
use crate::pipeline::stages::vector_to_bytes;
use crate::providers::clip_embed::CLIPEmbeddingProvider;
use crate::providers::embedding::EmbeddingProvider;
use crate::query::translate::Dictionary;
use crate::vector::manager::VectorIndexManager;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const DIMS: usize = 4;

/// Ignores its input and always returns the same fixed vector, so a test can
/// control similarity purely through which clips' stored embeddings are
/// close to it.
struct FixedTextEmbedding(Vec<f32>);

#[async_trait]
impl EmbeddingProvider for FixedTextEmbedding {
    fn name(&self) -> &str {
        "fixed-text"
    }
    fn dimensions(&self) -> usize {
        DIMS
    }
    fn is_available(&self) -> bool {
        true
    }
    async fn embed(&self, _text: &str) -> crate::error::Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

struct FixedClipEmbedding(Vec<f32>);

#[async_trait]
impl CLIPEmbeddingProvider for FixedClipEmbedding {
    fn name(&self) -> &str {
        "fixed-clip"
    }
    fn dimensions(&self) -> usize {
        DIMS
    }
    fn is_available(&self) -> bool {
        true
    }
    async fn encode_text(&self, _text: &str) -> crate::error::Result<Vec<f32>> {
        Ok(self.0.clone())
    }
    async fn encode_image(&self, _image_path: &Path) -> crate::error::Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

fn blank_clip(id: i64) -> GlobalClip {
    GlobalClip {
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
        embedding: None,
        embedding_model: None,
        embedding_dimensions: None,
        file_path: format!("/f/v{id}.mp4"),
    }
}

fn blank_video(id: i64) -> GlobalVideo {
    GlobalVideo {
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
    }
}

// 5. Hybrid ranking: a short keyword query should surface the clip whose
// description and text-embedding both match, even though it has no CLIP
// embedding at all; a query dense with visual-hint words should flip the
// winner to the clip that only has a CLIP embedding.
#[tokio::test]
async fn scenario_hybrid_ranking_flips_with_query_shape() {
    let dir = tempdir().unwrap();
    let pool = Arc::new(DbPool::open_in_memory(run_global_migrations).unwrap());

    pool.with_writer(|conn| {
        upsert_video(conn, &blank_video(1))?;
        upsert_clip(
            conn,
            &GlobalClip {
                description: Some("sunset over a beach".to_string()),
                embedding: Some(vector_to_bytes(&[1.0, 0.0, 0.0, 0.0])),
                embedding_model: Some("fixed-text".to_string()),
                embedding_dimensions: Some(DIMS),
                ..blank_clip(1)
            },
        )?;

        upsert_video(conn, &blank_video(2))?;
        upsert_clip(
            conn,
            &GlobalClip {
                description: Some("a person walking".to_string()),
                embedding: Some(vector_to_bytes(&[0.0, 1.0, 0.0, 0.0])),
                embedding_model: Some("fixed-clip".to_string()),
                embedding_dimensions: Some(DIMS),
                ..blank_clip(2)
            },
        )?;
        Ok(())
    })
    .unwrap();

    let vector_manager = Arc::new(VectorIndexManager::new(dir.path(), DIMS, DIMS));
    let text_store = Arc::new(VectorStore::new(DIMS, "fixed-text"));
    let pipeline = Arc::new(QueryPipeline::new(Dictionary::default(), None));
    let engine = SearchEngine::new(pool, pipeline, vector_manager, text_store, "fixed-clip", "fixed-text");
    let providers = HybridSearchProviders {
        clip_embedding: Some(Arc::new(FixedClipEmbedding(vec![0.0, 1.0, 0.0, 0.0]))),
        text_embedding: Some(Arc::new(FixedTextEmbedding(vec![1.0, 0.0, 0.0, 0.0]))),
    };

    // Short keyword query: word count <= 2 biases FTS, which only clip 1
    // matches ("beach" appears only in its description); clip 1's
    // text-embedding is also the one close to the query vector.
    let keyword_results = engine.hybrid_search("beach", &SearchFilter::default(), &providers).await.unwrap();
    assert_eq!(
        keyword_results[0].source_clip_id, 1,
        "keyword query should rank the FTS+text-embed match first"
    );

    // Visual-hint-laden query: neither description contains all three
    // words, so FTS contributes nothing; the CLIP channel, which only clip
    // 2 has an entry in, decides the winner.
    let visual_results = engine
        .hybrid_search("bright sunset light", &SearchFilter::default(), &providers)
        .await
        .unwrap();
    assert_eq!(visual_results[0].source_clip_id, 2, "visual query should rank the CLIP match first");

    // Fusion weights sum to 1.0 on every branch, so every normalized,
    // weighted-summed score must land in [0, 1].
    for result in keyword_results.iter().chain(visual_results.iter()) {
        assert!(result.score >= 0.0 && result.score <= 1.0, "fused score {} out of bounds", result.score);
    }
}

// 6. Language expansion: a CJK query expands through the dictionary before
// hitting FTS, so an English-only description still matches, an
// untranslated Chinese-only tag still matches directly, and a trailing
// negated CJK term still excludes.
#[test]
fn scenario_cjk_query_matches_english_description_via_expansion() {
    let pool = DbPool::open_in_memory(run_global_migrations).unwrap();
    pool.with_writer(|conn| {
        upsert_video(conn, &blank_video(1))?;
        upsert_clip(
            conn,
            &GlobalClip { description: Some("beach sunset over the water".to_string()), ..blank_clip(1) },
        )?;

        upsert_video(conn, &blank_video(2))?;
        upsert_clip(conn, &GlobalClip { tags: vec!["海滩".to_string()], ..blank_clip(2) })?;

        upsert_video(conn, &blank_video(3))?;
        upsert_clip(
            conn,
            &GlobalClip { description: Some("beach sunset with rainy clouds".to_string()), ..blank_clip(3) },
        )?;
        Ok(())
    })
    .unwrap();

    let vector_manager = Arc::new(VectorIndexManager::new(tempdir().unwrap().path(), DIMS, DIMS));
    let text_store = Arc::new(VectorStore::new(DIMS, "fixed-text"));
    let pipeline = Arc::new(QueryPipeline::new(Dictionary::default(), None));
    let engine = SearchEngine::new(Arc::new(pool), pipeline, vector_manager, text_store, "fixed-clip", "fixed-text");

    let results = engine.fts_search("海滩 日落 -雨天", &SearchFilter::default()).unwrap();
    let ids: Vec<i64> = results.iter().map(|r| r.source_clip_id).collect();
    assert!(ids.contains(&1), "English-only description must match through the translated FTS query");
    assert!(ids.contains(&2), "Chinese-only tag must still match the untranslated original query");
    assert!(!ids.contains(&3), "negated CJK term must exclude the rainy clip after translation");
}
