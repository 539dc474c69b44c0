// Content hashing for dedup/rename detection (spec §4.7 stage 2).
//
// The hash is xxhash64 of the first 1MB, the last 1MB (when the file exceeds
// one chunk), and the file size — the same "first+last+size" fingerprint
// shape the pipeline's fast path uses, just with the algorithm the spec
// mandates for `content_hash` instead of a full-file digest.

use crate::constants::HASH_CHUNK_SIZE;
use crate::error::{FindItError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use xxhash_rust::xxh64::Xxh64;

pub const CONTENT_HASH_SEED: u64 = 0;

/// Compute the content hash used to detect unchanged/renamed/modified videos.
/// Format: `xxh64:<hex>`.
pub fn compute_content_hash(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).map_err(|e| FindItError::PermanentIo(format!("{}: {}", path.display(), e)))?;

    let file_size = file
        .metadata()
        .map_err(|e| FindItError::PermanentIo(e.to_string()))?
        .len();

    let mut hasher = Xxh64::new(CONTENT_HASH_SEED);

    let first_len = HASH_CHUNK_SIZE.min(file_size) as usize;
    let mut first_chunk = vec![0u8; first_len];
    file.read_exact(&mut first_chunk)
        .map_err(|e| FindItError::PermanentIo(e.to_string()))?;
    hasher.update(&first_chunk);

    if file_size > HASH_CHUNK_SIZE {
        let last_offset = file_size.saturating_sub(HASH_CHUNK_SIZE);
        file.seek(SeekFrom::Start(last_offset))
            .map_err(|e| FindItError::PermanentIo(e.to_string()))?;
        let mut last_chunk = vec![0u8; HASH_CHUNK_SIZE as usize];
        file.read_exact(&mut last_chunk)
            .map_err(|e| FindItError::PermanentIo(e.to_string()))?;
        hasher.update(&last_chunk);
    }

    hasher.update(&file_size.to_le_bytes());

    Ok(format!("xxh64:{:016x}", hasher.digest()))
}

/// `stat(size, mtime)` fingerprint comparison used for the fast unchanged-file
/// path (spec §4.7 stage 1) — no hashing involved.
pub fn fingerprint_matches(stored_size: i64, stored_mtime: i64, size: i64, mtime: i64) -> bool {
    stored_size == size && stored_mtime == mtime
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn small_file_hash_has_expected_prefix() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        let hash = compute_content_hash(file.path()).unwrap();
        assert!(hash.starts_with("xxh64:"));
    }

    #[test]
    fn identical_content_hashes_identically() {
        let mut a = NamedTempFile::new().unwrap();
        let mut b = NamedTempFile::new().unwrap();
        a.write_all(b"identical bytes").unwrap();
        b.write_all(b"identical bytes").unwrap();
        assert_eq!(
            compute_content_hash(a.path()).unwrap(),
            compute_content_hash(b.path()).unwrap()
        );
    }

    #[test]
    fn different_content_hashes_differently() {
        let mut a = NamedTempFile::new().unwrap();
        let mut b = NamedTempFile::new().unwrap();
        a.write_all(b"content one").unwrap();
        b.write_all(b"content two").unwrap();
        assert_ne!(
            compute_content_hash(a.path()).unwrap(),
            compute_content_hash(b.path()).unwrap()
        );
    }

    #[test]
    fn fingerprint_matches_on_equal_size_and_mtime() {
        assert!(fingerprint_matches(100, 1000, 100, 1000));
        assert!(!fingerprint_matches(100, 1000, 100, 1001));
        assert!(!fingerprint_matches(100, 1000, 101, 1000));
    }
}
