// Multi-step scenarios from the concrete-scenarios list: each test plays
// out one end-to-end sequence across the folder DB, the global DB, and
// (where relevant) the path rebaser, rather than exercising one function
// in isolation.

use super::*;
use crate::db::migrations::{run_folder_migrations, run_global_migrations};
use crate::db::{folder_schema, global_schema};
use crate::volume::rebaser::{rebase_global, PathRebaser};

fn setup() -> (DbPool, DbPool) {
    (
        DbPool::open_in_memory(run_folder_migrations).unwrap(),
        DbPool::open_in_memory(run_global_migrations).unwrap(),
    )
}

fn index_two_files(folder_pool: &DbPool) -> (i64, i64) {
    folder_pool
        .with_writer(|conn| {
            let a = folder_schema::insert_video(conn, "/f/a.mp4", 100, 1000)?;
            folder_schema::upsert_clip_segment(conn, a, 0.0, 5.0, None)?;
            folder_schema::update_video_state(conn, a, crate::model::VideoState::Indexed, None)?;
            let b = folder_schema::insert_video(conn, "/f/b.mp4", 200, 2000)?;
            folder_schema::upsert_clip_segment(conn, b, 0.0, 5.0, None)?;
            folder_schema::update_video_state(conn, b, crate::model::VideoState::Indexed, None)?;
            Ok((a, b))
        })
        .unwrap()
}

// 1. Unchanged rescan: two indexed files, no changes, syncing again moves nothing.
#[test]
fn scenario_unchanged_rescan_moves_nothing() {
    let (folder_pool, global_pool) = setup();
    index_two_files(&folder_pool);

    let first = SyncEngine::sync("/f", &folder_pool, &global_pool, false).unwrap();
    assert_eq!(first, SyncResult { synced_videos: 2, synced_clips: 2 });

    let second = SyncEngine::sync("/f", &folder_pool, &global_pool, false).unwrap();
    assert_eq!(second, SyncResult::default());

    let global_clip_count: i64 = global_pool
        .with_reader(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM clips", [], |r| r.get(0))?))
        .unwrap();
    assert_eq!(global_clip_count, 2);
}

// 2. Content modification: changing a file's bytes changes its content_hash
// and description; re-sync overwrites the global row in place rather than
// appending a second one for the same (folder, video_id) pair.
#[test]
fn scenario_content_modification_overwrites_not_appends() {
    let (folder_pool, global_pool) = setup();
    let (a, _b) = index_two_files(&folder_pool);

    folder_pool
        .with_writer(|conn| {
            folder_schema::update_video_content_hash(conn, a, "xxh64:original")?;
            let clips = folder_schema::clips_for_video(conn, a)?;
            conn.execute(
                "UPDATE clips SET description = ?1 WHERE id = ?2",
                rusqlite::params!["a quiet morning", clips[0].clip_id],
            )?;
            Ok(())
        })
        .unwrap();
    SyncEngine::sync("/f", &folder_pool, &global_pool, false).unwrap();

    // File changes: new mtime/size, new content, different description.
    folder_pool
        .with_writer(|conn| {
            folder_schema::update_video_fingerprint(conn, a, 150, 1500)?;
            folder_schema::update_video_content_hash(conn, a, "xxh64:modified")?;
            let clips = folder_schema::clips_for_video(conn, a)?;
            conn.execute(
                "UPDATE clips SET description = ?1 WHERE id = ?2",
                rusqlite::params!["a loud afternoon", clips[0].clip_id],
            )?;
            Ok(())
        })
        .unwrap();
    SyncEngine::sync("/f", &folder_pool, &global_pool, true).unwrap();

    let global_clip_count: i64 = global_pool
        .with_reader(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM clips", [], |r| r.get(0))?))
        .unwrap();
    assert_eq!(global_clip_count, 2, "resync must overwrite the existing row, not append a new one");

    let hits = global_pool
        .with_reader(|conn| Ok(global_schema::fts_search(conn, "loud", None, None, 10)?))
        .unwrap();
    assert_eq!(hits.len(), 1);
    let stale = global_pool
        .with_reader(|conn| Ok(global_schema::fts_search(conn, "quiet", None, None, 10)?))
        .unwrap();
    assert!(stale.is_empty(), "old description must not still be searchable after the overwrite");
}

// 3. Folder removal: global rows for the folder disappear, sync_meta is
// cleaned, the folder DB itself is untouched, and re-adding the folder
// resyncs from its existing cursor without needing to reindex anything.
#[test]
fn scenario_folder_removal_then_readd_resyncs_without_reindexing() {
    let (folder_pool, global_pool) = setup();
    index_two_files(&folder_pool);
    SyncEngine::sync("/f", &folder_pool, &global_pool, false).unwrap();

    SyncEngine::remove_folder_data("/f", &global_pool).unwrap();

    let remaining = global_pool
        .with_reader(|conn| Ok(global_schema::clip_ids_in_folders(conn, &[])?))
        .unwrap();
    assert!(remaining.is_empty());
    assert_eq!(
        global_pool
            .with_reader(|conn| Ok(global_schema::get_sync_cursor(conn, "/f", "clips")?))
            .unwrap(),
        0
    );

    let folder_clip_count: i64 = folder_pool
        .with_reader(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM clips", [], |r| r.get(0))?))
        .unwrap();
    assert_eq!(folder_clip_count, 2, "per-folder DB file is left intact on removal");

    // Re-adding without resetting the folder DB's own cursor syncs nothing
    // new, since the folder DB already recorded everything as synced.
    let resync = SyncEngine::sync("/f", &folder_pool, &global_pool, false).unwrap();
    assert_eq!(resync, SyncResult::default());

    // A forced resync (what add_folder does for a never-before-seen global
    // DB) repopulates the global projection without touching the folder DB.
    let forced = SyncEngine::sync("/f", &folder_pool, &global_pool, true).unwrap();
    assert_eq!(forced, SyncResult { synced_videos: 2, synced_clips: 2 });
}

// 4. Remount with new path: a folder's volume goes away and comes back
// mounted under a new prefix. The rebaser must update both the folder DB
// and the global DB so every stored path starts with the new prefix, and a
// search against the global DB then returns the new path.
#[test]
fn scenario_remount_rebases_both_databases() {
    let (folder_pool, global_pool) = setup();
    folder_pool
        .with_writer(|conn| {
            let vid = folder_schema::insert_video(conn, "/Volumes/DriveA/clips/a.mp4", 100, 1000)?;
            let clip_id = folder_schema::upsert_clip_segment(conn, vid, 0.0, 5.0, None)?;
            conn.execute(
                "UPDATE clips SET description = 'a quiet morning' WHERE id = ?1",
                rusqlite::params![clip_id],
            )?;
            folder_schema::update_video_state(conn, vid, crate::model::VideoState::Indexed, None)?;
            Ok(())
        })
        .unwrap();
    SyncEngine::sync("/Volumes/DriveA/clips", &folder_pool, &global_pool, false).unwrap();

    let rebased = PathRebaser::rebase_if_needed(
        &folder_pool,
        "/Volumes/DriveA/clips",
        "/Volumes/DriveA 1/clips",
    )
    .unwrap();
    assert!(rebased);
    rebase_global(&global_pool, "/Volumes/DriveA/clips", "/Volumes/DriveA 1/clips").unwrap();

    let folder_video = folder_pool
        .with_reader(|conn| folder_schema::find_video_by_fingerprint(conn, 100, 1000))
        .unwrap()
        .unwrap();
    assert_eq!(folder_video.file_path, "/Volumes/DriveA 1/clips/a.mp4");

    let hits = global_pool
        .with_reader(|conn| Ok(global_schema::fts_search(conn, "quiet", None, None, 10)?))
        .unwrap();
    assert_eq!(hits.len(), 1);
    let (id, _) = hits[0];
    let hydrated = global_pool.with_reader(|conn| global_schema::hydrate_clips(conn, &[id])).unwrap();
    assert_eq!(hydrated[0].1.file_path, "/Volumes/DriveA 1/clips/a.mp4");
}

// Two folders synced into the same global DB both start their folder-local
// video/clip ids at 1 — the global `videos`/`clips` tables use their own
// AUTOINCREMENT surrogate key, so a clip's denormalized `file_path` must be
// resolved from its *own* folder DB by folder-local `video_id`, never by
// treating that id as a global row id. This reproduces the second folder
// colliding with the first folder's global row ids.
#[test]
fn scenario_multi_folder_sync_resolves_clip_paths_from_own_folder() {
    let (folder_a, global_pool) = setup();
    index_two_files(&folder_a);
    SyncEngine::sync("/f", &folder_a, &global_pool, false).unwrap();

    let folder_b = DbPool::open_in_memory(run_folder_migrations).unwrap();
    folder_b
        .with_writer(|conn| {
            let vid = folder_schema::insert_video(conn, "/g/c.mp4", 300, 3000)?;
            folder_schema::upsert_clip_segment(conn, vid, 0.0, 5.0, None)?;
            folder_schema::update_video_state(conn, vid, crate::model::VideoState::Indexed, None)?;
            Ok(())
        })
        .unwrap();
    SyncEngine::sync("/g", &folder_b, &global_pool, false).unwrap();

    let ids = global_pool.with_reader(|conn| Ok(global_schema::clip_ids_in_folders(conn, &["/g".to_string()])?)).unwrap();
    assert_eq!(ids.len(), 1);
    let hydrated = global_pool.with_reader(|conn| global_schema::hydrate_clips(conn, &ids)).unwrap();
    assert_eq!(
        hydrated[0].1.file_path, "/g/c.mp4",
        "folder B's clip must resolve to folder B's own video path, not folder A's row that happens to share a global id"
    );
}
