// Hybrid search engine (spec §4.12): FTS keyword search plus a three-way
// fusion across FTS, a brute-force dense text-embedding scan, and an HNSW
// CLIP scan, with a cached `allowed_clip_ids` resolved from the folder
// filter the same way `VolumeMonitor`/`SyncEngine` scope their per-folder
// work.

use crate::constants::{FTS_SEARCH_LIMIT, HYBRID_CHANNEL_LIMIT, HYBRID_RESULT_LIMIT};
use crate::db::global_schema;
use crate::db::pool::DbPool;
use crate::error::Result;
use crate::model::SearchResult;
use crate::providers::{CLIPEmbeddingProvider, EmbeddingProvider};
use crate::query::expand::QueryPipeline;
use crate::query::parser::QueryParser;
use crate::vector::manager::VectorIndexManager;
use crate::vector::store::VectorStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SearchFilter {
    pub folder_paths: Option<Vec<String>>,
    pub path_prefix: Option<String>,
}

impl SearchFilter {
    pub fn is_unrestricted(&self) -> bool {
        self.folder_paths.is_none() && self.path_prefix.is_none()
    }
}

/// Providers used by the three-way hybrid path; either may be absent
/// (offline-only deployments fall back to FTS + text-embed, or FTS alone).
pub struct HybridSearchProviders {
    pub clip_embedding: Option<Arc<dyn CLIPEmbeddingProvider>>,
    pub text_embedding: Option<Arc<dyn EmbeddingProvider>>,
}

fn min_max_normalize(scores: &[(i64, f32)]) -> HashMap<i64, f32> {
    if scores.is_empty() {
        return HashMap::new();
    }
    let min = scores.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let max = scores.iter().map(|(_, s)| *s).fold(f32::NEG_INFINITY, f32::max);
    if (max - min).abs() < f32::EPSILON {
        return scores.iter().map(|(id, _)| (*id, 1.0)).collect();
    }
    scores.iter().map(|(id, s)| (*id, (s - min) / (max - min))).collect()
}

/// A short static list used to nudge fusion weights toward the CLIP channel
/// for queries that read as a visual description rather than a keyword or
/// a long natural-language sentence.
const VISUAL_HINTS: &[&str] = &[
    "color", "colour", "red", "blue", "green", "yellow", "sunset", "sunrise", "sky", "beach",
    "night", "light", "dark", "bright", "shot", "scene", "view", "background",
];

fn looks_visual(text: &str) -> bool {
    let lower = text.to_lowercase();
    VISUAL_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Query-dependent fusion weights `(w_fts, w_text, w_clip)`: short queries
/// bias FTS, visual-sounding queries bias CLIP, long natural language
/// biases the dense text-embed channel.
fn fusion_weights(positive_text: &str) -> (f32, f32, f32) {
    let word_count = positive_text.split_whitespace().count();
    if word_count <= 2 {
        (0.6, 0.2, 0.2)
    } else if looks_visual(positive_text) {
        (0.2, 0.2, 0.6)
    } else if word_count >= 6 {
        (0.15, 0.6, 0.25)
    } else {
        (0.34, 0.33, 0.33)
    }
}

pub struct SearchEngine {
    global_pool: Arc<DbPool>,
    query_pipeline: Arc<QueryPipeline>,
    vector_manager: Arc<VectorIndexManager>,
    text_vector_store: Arc<VectorStore>,
    clip_model_name: String,
    text_model_name: String,
    allowed_cache: Mutex<Option<(SearchFilter, Arc<HashSet<i64>>)>>,
}

impl SearchEngine {
    pub fn new(
        global_pool: Arc<DbPool>,
        query_pipeline: Arc<QueryPipeline>,
        vector_manager: Arc<VectorIndexManager>,
        text_vector_store: Arc<VectorStore>,
        clip_model_name: impl Into<String>,
        text_model_name: impl Into<String>,
    ) -> Self {
        Self {
            global_pool,
            query_pipeline,
            vector_manager,
            text_vector_store,
            clip_model_name: clip_model_name.into(),
            text_model_name: text_model_name.into(),
            allowed_cache: Mutex::new(None),
        }
    }

    /// Clears the cached `allowed_clip_ids`. Must be called whenever the
    /// folder/prefix filter key changes meaning, or the sync cursor
    /// advances for any registered folder.
    pub fn invalidate_filter_cache(&self) {
        *self.allowed_cache.lock().expect("search engine poisoned") = None;
    }

    fn resolve_allowed(&self, filter: &SearchFilter) -> Result<Option<Arc<HashSet<i64>>>> {
        if filter.is_unrestricted() {
            return Ok(None);
        }

        {
            let cache = self.allowed_cache.lock().expect("search engine poisoned");
            if let Some((cached_filter, ids)) = cache.as_ref() {
                if cached_filter == filter {
                    return Ok(Some(ids.clone()));
                }
            }
        }

        let mut allowed: Option<HashSet<i64>> = None;
        if let Some(folders) = &filter.folder_paths {
            let ids = self.global_pool.with_reader(|conn| global_schema::clip_ids_in_folders(conn, folders))?;
            allowed = Some(ids.into_iter().collect());
        }
        if let Some(prefix) = &filter.path_prefix {
            let ids = self.global_pool.with_reader(|conn| global_schema::clip_ids_under_prefix(conn, prefix))?;
            let prefix_set: HashSet<i64> = ids.into_iter().collect();
            allowed = Some(match allowed {
                Some(existing) => existing.intersection(&prefix_set).copied().collect(),
                None => prefix_set,
            });
        }
        let allowed = Arc::new(allowed.unwrap_or_default());
        *self.allowed_cache.lock().expect("search engine poisoned") = Some((filter.clone(), allowed.clone()));
        Ok(Some(allowed))
    }

    /// Cheap synchronous keyword search: the parsed query's FTS projection
    /// unioned with the dictionary-translated projection, deduped by clip
    /// id keeping the best (lowest) rank.
    pub fn fts_search(&self, query_text: &str, filter: &SearchFilter) -> Result<Vec<SearchResult>> {
        let parsed = QueryParser::parse(query_text);
        let expanded = self.query_pipeline.expand_sync(&parsed);

        let primary_query = parsed.to_fts_query();
        let translated_query = expanded.to_fts_query();

        let mut best_rank: HashMap<i64, f64> = HashMap::new();
        self.global_pool.with_reader(|conn| {
            for q in [Some(primary_query.clone()), translated_query.clone()].into_iter().flatten() {
                let hits = global_schema::fts_search(
                    conn,
                    &q,
                    filter.folder_paths.as_deref(),
                    filter.path_prefix.as_deref(),
                    FTS_SEARCH_LIMIT,
                )?;
                for (id, rank) in hits {
                    best_rank
                        .entry(id)
                        .and_modify(|r| {
                            if rank < *r {
                                *r = rank;
                            }
                        })
                        .or_insert(rank);
                }
            }
            Ok(())
        })?;

        let mut ranked: Vec<(i64, f64)> = best_rank.into_iter().collect();
        ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let clip_ids: Vec<i64> = ranked.iter().map(|(id, _)| *id).collect();
        let scores: HashMap<i64, f64> = ranked.into_iter().collect();

        let hydrated = self.global_pool.with_reader(|conn| global_schema::hydrate_clips(conn, &clip_ids))?;
        Ok(hydrated
            .into_iter()
            .map(|(id, clip)| global_schema::to_search_result(&clip, -scores.get(&id).copied().unwrap_or(0.0) as f32))
            .collect())
    }

    fn ensure_text_store_loaded(&self) -> Result<()> {
        if !self.text_vector_store.is_empty() {
            return Ok(());
        }
        let entries = self
            .global_pool
            .with_reader(|conn| global_schema::clip_vectors_for_model(conn, &self.text_model_name))?;
        self.text_vector_store.load(&entries);
        Ok(())
    }

    /// The three-way hybrid search fired after the ~300ms debounce.
    pub async fn hybrid_search(
        &self,
        query_text: &str,
        filter: &SearchFilter,
        providers: &HybridSearchProviders,
    ) -> Result<Vec<SearchResult>> {
        let parsed = QueryParser::parse(query_text);
        let expanded = self.query_pipeline.expand_async(&parsed).await;
        let allowed = self.resolve_allowed(filter)?;

        let fts_query = parsed.to_fts_query();
        let translated_fts_query = expanded.to_fts_query();
        let folder_paths = filter.folder_paths.clone();
        let path_prefix = filter.path_prefix.clone();
        let fts_hits: Vec<(i64, f64)> = self.global_pool.with_reader(|conn| {
            let mut combined: HashMap<i64, f64> = HashMap::new();
            for q in [Some(fts_query.clone()), translated_fts_query.clone()].into_iter().flatten() {
                let hits = global_schema::fts_search(
                    conn,
                    &q,
                    folder_paths.as_deref(),
                    path_prefix.as_deref(),
                    HYBRID_CHANNEL_LIMIT,
                )?;
                for (id, rank) in hits {
                    combined
                        .entry(id)
                        .and_modify(|r| {
                            if rank < *r {
                                *r = rank;
                            }
                        })
                        .or_insert(rank);
                }
            }
            Ok(combined.into_iter().collect())
        })?;
        // bm25 is "more negative is better"; flip sign so normalization's
        // "higher is better" convention holds across all three channels.
        let fts_scores: Vec<(i64, f32)> = fts_hits.iter().map(|(id, rank)| (*id, -*rank as f32)).collect();

        let clip_scores = if let Some(provider) = &providers.clip_embedding {
            if provider.is_available() {
                match provider.encode_text(&parsed.positive_text).await {
                    Ok(query_vector) => {
                        let index = self.vector_manager.get_clip_index(&self.global_pool, &self.clip_model_name)?;
                        index.search(&query_vector, HYBRID_CHANNEL_LIMIT as usize)?
                    }
                    Err(err) => {
                        debug!(error = %err, "clip query embedding failed, skipping CLIP channel");
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };

        let text_scores = if let Some(provider) = &providers.text_embedding {
            if provider.is_available() {
                match provider.embed(&parsed.positive_text).await {
                    Ok(query_vector) => {
                        self.ensure_text_store_loaded()?;
                        self.text_vector_store.search(&query_vector, HYBRID_CHANNEL_LIMIT as usize, allowed.as_deref())
                    }
                    Err(err) => {
                        debug!(error = %err, "text query embedding failed, skipping text-embed channel");
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };

        let fts_scores: Vec<(i64, f32)> = match &allowed {
            Some(set) => fts_scores.into_iter().filter(|(id, _)| set.contains(id)).collect(),
            None => fts_scores,
        };
        let clip_scores: Vec<(i64, f32)> = match &allowed {
            Some(set) => clip_scores.into_iter().filter(|(id, _)| set.contains(id)).collect(),
            None => clip_scores,
        };

        let norm_fts = min_max_normalize(&fts_scores);
        let norm_text = min_max_normalize(&text_scores);
        let norm_clip = min_max_normalize(&clip_scores);

        let (w_fts, w_text, w_clip) = fusion_weights(&parsed.positive_text);

        let raw_rank: HashMap<i64, f64> = fts_hits.into_iter().collect();
        let mut all_ids: HashSet<i64> = HashSet::new();
        all_ids.extend(norm_fts.keys().copied());
        all_ids.extend(norm_text.keys().copied());
        all_ids.extend(norm_clip.keys().copied());

        let mut fused: Vec<(i64, f32)> = all_ids
            .into_iter()
            .map(|id| {
                let score = w_fts * norm_fts.get(&id).copied().unwrap_or(0.0)
                    + w_text * norm_text.get(&id).copied().unwrap_or(0.0)
                    + w_clip * norm_clip.get(&id).copied().unwrap_or(0.0);
                (id, score)
            })
            .collect();

        fused.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let ra = raw_rank.get(&a.0).copied().unwrap_or(f64::INFINITY);
                    let rb = raw_rank.get(&b.0).copied().unwrap_or(f64::INFINITY);
                    ra.partial_cmp(&rb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.0.cmp(&b.0))
        });
        fused.truncate(HYBRID_RESULT_LIMIT as usize);

        let clip_ids: Vec<i64> = fused.iter().map(|(id, _)| *id).collect();
        let scores: HashMap<i64, f32> = fused.into_iter().collect();
        let hydrated = self.global_pool.with_reader(|conn| global_schema::hydrate_clips(conn, &clip_ids))?;
        Ok(hydrated
            .into_iter()
            .map(|(id, clip)| global_schema::to_search_result(&clip, scores.get(&id).copied().unwrap_or(0.0)))
            .collect())
    }
}

#[cfg(test)]
mod scenarios;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_normalize_single_value_is_one() {
        let result = min_max_normalize(&[(1, 5.0)]);
        assert_eq!(result.get(&1), Some(&1.0));
    }

    #[test]
    fn min_max_normalize_spreads_range_to_unit_interval() {
        let result = min_max_normalize(&[(1, 0.0), (2, 5.0), (3, 10.0)]);
        assert_eq!(result.get(&1), Some(&0.0));
        assert_eq!(result.get(&2), Some(&0.5));
        assert_eq!(result.get(&3), Some(&1.0));
    }

    #[test]
    fn short_query_biases_fts_weight() {
        let (w_fts, _, _) = fusion_weights("beach");
        assert!(w_fts > 0.5);
    }

    #[test]
    fn visual_query_biases_clip_weight() {
        let (_, _, w_clip) = fusion_weights("orange sunset over the beach");
        assert!(w_clip > 0.5);
    }

    #[test]
    fn long_plain_query_biases_text_embed_weight() {
        let (_, w_text, _) = fusion_weights("the kids laughing together in the backyard after dinner");
        assert!(w_text > 0.5);
    }

    #[test]
    fn fusion_weights_always_sum_to_one_across_all_branches() {
        for text in [
            "beach",
            "orange sunset over the beach",
            "the kids laughing together in the backyard after dinner",
            "a plain query",
        ] {
            let (w_fts, w_text, w_clip) = fusion_weights(text);
            assert!((w_fts + w_text + w_clip - 1.0).abs() < f32::EPSILON);
        }
    }
}
