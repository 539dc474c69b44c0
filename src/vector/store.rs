// Brute-force vector store (spec §4.10): three parallel arrays searched with
// a single dot-product pass. Used for the dense text-embedding channel,
// which (unlike the CLIP channel) has no HNSW index of its own per model.
//
// Concurrency follows the spec's "single-writer, multi-reader" rule: reads
// (`search`) take a shared lock over the arrays, mutations (`load`/`append`/
// `remove`) take an exclusive one, mirroring `DbPool`'s writer/reader split.

use crate::pipeline::stages::bytes_to_vector;
use std::collections::HashSet;
use std::sync::RwLock;

struct Inner {
    vectors: Vec<f32>,
    clip_ids: Vec<i64>,
    norms: Vec<f32>,
}

impl Inner {
    fn len(&self) -> usize {
        self.clip_ids.len()
    }
}

pub struct VectorStore {
    dimensions: usize,
    model_name: String,
    inner: RwLock<Inner>,
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

impl VectorStore {
    pub fn new(dimensions: usize, model_name: impl Into<String>) -> Self {
        Self {
            dimensions,
            model_name: model_name.into(),
            inner: RwLock::new(Inner {
                vectors: Vec::new(),
                clip_ids: Vec::new(),
                norms: Vec::new(),
            }),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("vector store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces all state from `(clip_id, raw_bytes)` pairs. Entries whose
    /// decoded length doesn't match `dimensions`, or whose norm is zero, are
    /// skipped rather than poisoning the whole load.
    pub fn load(&self, entries: &[(i64, Vec<u8>)]) {
        let mut clip_ids = Vec::with_capacity(entries.len());
        let mut vectors = Vec::with_capacity(entries.len() * self.dimensions);
        let mut norms = Vec::with_capacity(entries.len());

        for (clip_id, raw) in entries {
            let vector = bytes_to_vector(raw);
            if vector.len() != self.dimensions {
                continue;
            }
            let norm = l2_norm(&vector);
            if norm == 0.0 {
                continue;
            }
            clip_ids.push(*clip_id);
            vectors.extend_from_slice(&vector);
            norms.push(norm);
        }

        let mut inner = self.inner.write().expect("vector store poisoned");
        inner.clip_ids = clip_ids;
        inner.vectors = vectors;
        inner.norms = norms;
    }

    /// Upsert: overwrites in place if `clip_id` already present, else appends.
    pub fn append(&self, clip_id: i64, vector: &[f32]) {
        if vector.len() != self.dimensions {
            return;
        }
        let norm = l2_norm(vector);
        if norm == 0.0 {
            return;
        }
        let mut inner = self.inner.write().expect("vector store poisoned");
        if let Some(idx) = inner.clip_ids.iter().position(|&id| id == clip_id) {
            let start = idx * self.dimensions;
            inner.vectors[start..start + self.dimensions].copy_from_slice(vector);
            inner.norms[idx] = norm;
        } else {
            inner.clip_ids.push(clip_id);
            inner.vectors.extend_from_slice(vector);
            inner.norms.push(norm);
        }
    }

    pub fn remove(&self, clip_id: i64) {
        let mut inner = self.inner.write().expect("vector store poisoned");
        if let Some(idx) = inner.clip_ids.iter().position(|&id| id == clip_id) {
            let start = idx * self.dimensions;
            inner.vectors.drain(start..start + self.dimensions);
            inner.clip_ids.remove(idx);
            inner.norms.remove(idx);
        }
    }

    /// Single matrix-vector multiply against every row, cosine-normalized,
    /// sorted descending with tie-break on smaller `clip_id`. When
    /// `allowed_clip_ids` is supplied only those rows participate.
    pub fn search(&self, query: &[f32], limit: usize, allowed_clip_ids: Option<&HashSet<i64>>) -> Vec<(i64, f32)> {
        if query.len() != self.dimensions {
            return Vec::new();
        }
        let query_norm = l2_norm(query);
        if query_norm == 0.0 {
            return Vec::new();
        }

        let inner = self.inner.read().expect("vector store poisoned");
        let mut scored: Vec<(i64, f32)> = Vec::with_capacity(inner.len());
        for i in 0..inner.len() {
            let clip_id = inner.clip_ids[i];
            if let Some(allowed) = allowed_clip_ids {
                if !allowed.contains(&clip_id) {
                    continue;
                }
            }
            let start = i * self.dimensions;
            let row = &inner.vectors[start..start + self.dimensions];
            let dot: f32 = row.iter().zip(query.iter()).map(|(a, b)| a * b).sum();
            let similarity = dot / (query_norm * inner.norms[i]);
            scored.push((clip_id, similarity));
        }

        scored.sort_by(|a, b| match b.1.partial_cmp(&a.1) {
            Some(std::cmp::Ordering::Equal) | None => a.0.cmp(&b.0),
            Some(ord) => ord,
        });
        scored.truncate(limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::vector_to_bytes;

    #[test]
    fn load_skips_dimension_mismatch_and_zero_norm() {
        let store = VectorStore::new(3, "test-model");
        let good = vector_to_bytes(&[1.0, 0.0, 0.0]);
        let wrong_dim = vector_to_bytes(&[1.0, 0.0]);
        let zero = vector_to_bytes(&[0.0, 0.0, 0.0]);
        store.load(&[(1, good), (2, wrong_dim), (3, zero)]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn search_orders_by_cosine_similarity_with_clip_id_tiebreak() {
        let store = VectorStore::new(2, "test-model");
        store.append(1, &[1.0, 0.0]);
        store.append(2, &[0.0, 1.0]);
        store.append(3, &[1.0, 0.0]); // identical similarity to clip 1; smaller id wins tie
        let results = store.search(&[1.0, 0.0], 10, None);
        assert_eq!(results[0].0, 1);
        assert_eq!(results[1].0, 3);
        assert_eq!(results[2].0, 2);
    }

    #[test]
    fn allowed_clip_ids_restricts_participants() {
        let store = VectorStore::new(2, "test-model");
        store.append(1, &[1.0, 0.0]);
        store.append(2, &[1.0, 0.0]);
        let allowed: HashSet<i64> = [2].into_iter().collect();
        let results = store.search(&[1.0, 0.0], 10, Some(&allowed));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 2);
    }

    #[test]
    fn append_overwrites_existing_clip_in_place() {
        let store = VectorStore::new(2, "test-model");
        store.append(1, &[1.0, 0.0]);
        store.append(1, &[0.0, 1.0]);
        assert_eq!(store.len(), 1);
        let results = store.search(&[0.0, 1.0], 1, None);
        assert_eq!(results[0].0, 1);
        assert!((results[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn remove_drops_the_row() {
        let store = VectorStore::new(2, "test-model");
        store.append(1, &[1.0, 0.0]);
        store.append(2, &[0.0, 1.0]);
        store.remove(1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.search(&[1.0, 0.0], 10, None)[0].0, 2);
    }
}
