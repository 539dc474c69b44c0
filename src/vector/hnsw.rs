// HNSW vector index (spec §4.11): disk-backed approximate nearest neighbor
// over a cross-modal embedding, using `usearch`'s cosine-metric HNSW the same
// way the pack's `patina` scry command drives it (`Index::new` +
// `IndexOptions{dimensions, metric, quantization}`, `load`/`view`/`search`).
//
// Keys are clips' signed 64-bit ids reinterpreted as unsigned (usearch keys
// are u64). `view()` opens memory-mapped and read-only; any `add`/`remove`
// on a view must fail with `ReadOnly` (P5's rebuild-then-view round trip
// relies on this never silently mutating a shared snapshot).

use crate::constants::HNSW_GROWTH_FACTOR;
use crate::error::{FindItError, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

pub fn clip_id_to_key(clip_id: i64) -> u64 {
    clip_id as u64
}

pub fn key_to_clip_id(key: u64) -> i64 {
    key as i64
}

pub struct VectorIndexEngine {
    index: Index,
    dimensions: usize,
    read_only: bool,
    reserved: AtomicUsize,
}

impl VectorIndexEngine {
    fn options(dimensions: usize) -> IndexOptions {
        let mut options = IndexOptions::default();
        options.dimensions = dimensions;
        options.metric = MetricKind::Cos;
        options.quantization = ScalarKind::F32;
        options
    }

    /// A fresh, empty, writable index with the default initial reservation.
    pub fn new(dimensions: usize) -> Result<Self> {
        let index = Index::new(&Self::options(dimensions))
            .map_err(|e| FindItError::Other(format!("failed to create HNSW index: {e}")))?;
        index
            .reserve(crate::constants::HNSW_INITIAL_CAPACITY)
            .map_err(|e| FindItError::Other(format!("failed to reserve HNSW capacity: {e}")))?;
        Ok(Self {
            index,
            dimensions,
            read_only: false,
            reserved: AtomicUsize::new(crate::constants::HNSW_INITIAL_CAPACITY),
        })
    }

    /// Reads the snapshot at `path` into a writable in-memory index.
    pub fn load(path: &Path, dimensions: usize) -> Result<Self> {
        let index = Index::new(&Self::options(dimensions))
            .map_err(|e| FindItError::Other(format!("failed to create HNSW index: {e}")))?;
        index
            .load(&path.to_string_lossy())
            .map_err(|e| FindItError::Other(format!("failed to load HNSW index {}: {e}", path.display())))?;
        let reserved = index.capacity();
        Ok(Self {
            index,
            dimensions,
            read_only: false,
            reserved: AtomicUsize::new(reserved),
        })
    }

    /// Attaches memory-mapped, read-only. `add`/`remove` fail with `ReadOnly`.
    pub fn view(path: &Path, dimensions: usize) -> Result<Self> {
        let index = Index::new(&Self::options(dimensions))
            .map_err(|e| FindItError::Other(format!("failed to create HNSW index: {e}")))?;
        index
            .view(&path.to_string_lossy())
            .map_err(|e| FindItError::Other(format!("failed to view HNSW index {}: {e}", path.display())))?;
        let reserved = index.capacity();
        Ok(Self {
            index,
            dimensions,
            read_only: true,
            reserved: AtomicUsize::new(reserved),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn count(&self) -> usize {
        self.index.size()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Grows reserved capacity by `HNSW_GROWTH_FACTOR` until it covers
    /// `count() + additional`.
    fn ensure_capacity(&self, additional: usize) -> Result<()> {
        let needed = self.count() + additional;
        let mut reserved = self.reserved.load(Ordering::SeqCst);
        if reserved >= needed {
            return Ok(());
        }
        while reserved < needed {
            reserved = (reserved.max(1)) * HNSW_GROWTH_FACTOR;
        }
        self.index
            .reserve(reserved)
            .map_err(|e| FindItError::Other(format!("failed to grow HNSW capacity: {e}")))?;
        self.reserved.store(reserved, Ordering::SeqCst);
        Ok(())
    }

    pub fn add(&self, clip_id: i64, vector: &[f32]) -> Result<()> {
        if self.read_only {
            return Err(FindItError::ReadOnly);
        }
        if vector.len() != self.dimensions {
            return Err(FindItError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        self.ensure_capacity(1)?;
        self.index
            .add(clip_id_to_key(clip_id), vector)
            .map_err(|e| FindItError::Other(format!("HNSW add failed: {e}")))
    }

    pub fn add_batch(&self, entries: &[(i64, Vec<f32>)]) -> Result<()> {
        if self.read_only {
            return Err(FindItError::ReadOnly);
        }
        self.ensure_capacity(entries.len())?;
        for (clip_id, vector) in entries {
            if vector.len() != self.dimensions {
                continue;
            }
            self.index
                .add(clip_id_to_key(*clip_id), vector)
                .map_err(|e| FindItError::Other(format!("HNSW add failed: {e}")))?;
        }
        Ok(())
    }

    pub fn remove(&self, clip_id: i64) -> Result<()> {
        if self.read_only {
            return Err(FindItError::ReadOnly);
        }
        self.index
            .remove(clip_id_to_key(clip_id))
            .map_err(|e| FindItError::Other(format!("HNSW remove failed: {e}")))?;
        Ok(())
    }

    pub fn contains(&self, clip_id: i64) -> bool {
        self.index.contains(clip_id_to_key(clip_id))
    }

    /// Cosine similarity search: usearch returns cosine *distance*, so this
    /// converts to `similarity = 1 - distance` before returning.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(i64, f32)>> {
        if query.len() != self.dimensions {
            return Err(FindItError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }
        let matches = self
            .index
            .search(query, limit)
            .map_err(|e| FindItError::Other(format!("HNSW search failed: {e}")))?;
        Ok(matches
            .keys
            .into_iter()
            .zip(matches.distances.into_iter())
            .map(|(key, distance)| (key_to_clip_id(key), 1.0 - distance))
            .collect())
    }

    /// Writes to a temp file under the parent directory, then atomically
    /// renames over `path` (spec §4.11).
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let tmp_path: PathBuf = parent.join(format!(
            ".{}.tmp",
            path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
        ));
        self.index
            .save(&tmp_path.to_string_lossy())
            .map_err(|e| FindItError::Other(format!("HNSW save failed: {e}")))?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn add_search_contains_round_trip() {
        let index = VectorIndexEngine::new(4).unwrap();
        index.add(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        index.add(2, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        assert!(index.contains(1));
        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn save_load_view_round_trip_preserves_membership() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.usearch");

        let index = VectorIndexEngine::new(4).unwrap();
        index.add(10, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        index.add(20, &[0.0, 0.0, 1.0, 0.0]).unwrap();
        index.save(&path).unwrap();

        let viewed = VectorIndexEngine::view(&path, 4).unwrap();
        assert!(viewed.is_read_only());
        assert_eq!(viewed.count(), 2);
        assert!(viewed.contains(10));

        let top = viewed.search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(top[0].0, 10);
    }

    #[test]
    fn view_rejects_mutation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.usearch");
        let index = VectorIndexEngine::new(4).unwrap();
        index.add(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
        index.save(&path).unwrap();

        let viewed = VectorIndexEngine::view(&path, 4).unwrap();
        let err = viewed.add(2, &[0.0, 1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, FindItError::ReadOnly));
    }
}
