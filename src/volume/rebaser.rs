// Path rebaser (spec §4.2, P4): rewrite stored absolute paths when a folder's
// mount point moves. Prefix comparisons always use `prefix + "/"` so
// `/Users/alice` never matches `/Users/alice-2`.

use crate::db::{folder_schema, global_schema, pool::DbPool};
use crate::error::Result;

pub struct PathRebaser;

impl PathRebaser {
    /// Returns `true` if a rebase was performed. `old_path` is the folder's
    /// previously stored `folder_path`; `new_path` is where it now lives.
    pub fn rebase_if_needed(folder_pool: &DbPool, old_path: &str, new_path: &str) -> Result<bool> {
        if old_path == new_path {
            return Ok(false);
        }
        folder_pool.with_writer(|conn| {
            folder_schema::rebase_paths(conn, old_path, new_path)?;
            if let Some(mut folder) = folder_schema::get_watched_folder(conn)? {
                folder.folder_path = new_path.to_string();
                folder_schema::upsert_watched_folder(conn, &folder)?;
            }
            Ok(())
        })?;
        Ok(true)
    }
}

/// Mirror the rebase into the global DB's `sync_meta.folder_path` and
/// `source_folder` rows (spec §4.5 step b).
pub fn rebase_global(global_pool: &DbPool, old_path: &str, new_path: &str) -> Result<()> {
    global_pool.with_writer(|conn| global_schema::rebase_folder(conn, old_path, new_path))
}

/// `startswith(prefix + "/")` semantics used throughout the rebase/sync layer.
pub fn starts_with_folder_prefix(path: &str, prefix: &str) -> bool {
    path == prefix || path.starts_with(&format!("{}/", prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_collision_is_avoided() {
        assert!(!starts_with_folder_prefix("/Users/alice-2/x.mp4", "/Users/alice"));
        assert!(starts_with_folder_prefix("/Users/alice/x.mp4", "/Users/alice"));
        assert!(starts_with_folder_prefix("/Users/alice", "/Users/alice"));
    }

    #[test]
    fn rebase_if_needed_is_noop_for_same_path() {
        let pool = DbPool::open_in_memory(crate::db::migrations::run_folder_migrations).unwrap();
        assert!(!PathRebaser::rebase_if_needed(&pool, "/a", "/a").unwrap());
    }
}
