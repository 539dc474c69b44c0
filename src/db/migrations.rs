// Database migrations for both schemas (spec §4.1).
// Migrations are forward-only ordered (version, up) steps. Never edit or
// delete a shipped migration; add a new one instead.

use crate::error::{FindItError, Result};
use rusqlite::Connection;

/// Per-folder schema: the source of truth for one watched directory.
pub const FOLDER_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE watched_folder (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        folder_path TEXT NOT NULL,
        volume_name TEXT,
        volume_uuid TEXT,
        is_available INTEGER NOT NULL DEFAULT 1,
        last_seen_at TEXT
    );

    CREATE TABLE videos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL UNIQUE,
        size INTEGER NOT NULL,
        mtime INTEGER NOT NULL,
        content_hash TEXT,
        duration_seconds REAL,
        has_audio INTEGER,
        srt_path TEXT,
        state TEXT NOT NULL DEFAULT 'pending'
            CHECK (state IN ('pending', 'indexed', 'failed', 'orphaned')),
        error_message TEXT,
        orphaned_at TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX idx_videos_content_hash ON videos(content_hash);
    CREATE INDEX idx_videos_state ON videos(state);

    CREATE TABLE clips (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id INTEGER NOT NULL REFERENCES videos(id),
        start_time REAL NOT NULL,
        end_time REAL NOT NULL,
        thumbnail_path TEXT,
        scene TEXT,
        description TEXT,
        subjects TEXT,
        actions TEXT,
        objects TEXT,
        mood TEXT,
        shot_type TEXT,
        lighting TEXT,
        colors TEXT,
        transcript TEXT,
        tags TEXT NOT NULL DEFAULT '[]',
        rating INTEGER NOT NULL DEFAULT 0 CHECK (rating BETWEEN 0 AND 5),
        color_label TEXT,
        embedding BLOB,
        embedding_model TEXT,
        embedding_dimensions INTEGER,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(video_id, start_time)
    );
    CREATE INDEX idx_clips_video_id ON clips(video_id);

    CREATE TABLE clip_vectors (
        clip_id INTEGER NOT NULL REFERENCES clips(id),
        model_name TEXT NOT NULL,
        vector BLOB NOT NULL,
        PRIMARY KEY (clip_id, model_name)
    );

    CREATE TABLE sync_meta (
        table_name TEXT PRIMARY KEY,
        cursor INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE search_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        query TEXT NOT NULL,
        result_count INTEGER NOT NULL,
        timestamp TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE VIRTUAL TABLE clips_fts USING fts5(
        description, scene, transcript, subjects, actions, objects, tags,
        content='clips', content_rowid='id', tokenize='unicode61 remove_diacritics 2'
    );

    CREATE TRIGGER clips_fts_insert AFTER INSERT ON clips BEGIN
        INSERT INTO clips_fts(rowid, description, scene, transcript, subjects, actions, objects, tags)
        VALUES (new.id, new.description, new.scene, new.transcript, new.subjects, new.actions, new.objects, new.tags);
    END;
    CREATE TRIGGER clips_fts_delete AFTER DELETE ON clips BEGIN
        INSERT INTO clips_fts(clips_fts, rowid, description, scene, transcript, subjects, actions, objects, tags)
        VALUES ('delete', old.id, old.description, old.scene, old.transcript, old.subjects, old.actions, old.objects, old.tags);
    END;
    CREATE TRIGGER clips_fts_update AFTER UPDATE ON clips BEGIN
        INSERT INTO clips_fts(clips_fts, rowid, description, scene, transcript, subjects, actions, objects, tags)
        VALUES ('delete', old.id, old.description, old.scene, old.transcript, old.subjects, old.actions, old.objects, old.tags);
        INSERT INTO clips_fts(rowid, description, scene, transcript, subjects, actions, objects, tags)
        VALUES (new.id, new.description, new.scene, new.transcript, new.subjects, new.actions, new.objects, new.tags);
    END;

    CREATE TABLE schema_info (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    INSERT INTO schema_info (key, value) VALUES ('fts_tokenizer', 'unicode61');
    "#,
];

/// Global schema: the denormalized cross-folder search projection.
pub const GLOBAL_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE videos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_folder TEXT NOT NULL,
        source_video_id INTEGER NOT NULL,
        file_path TEXT NOT NULL,
        size INTEGER NOT NULL,
        mtime INTEGER NOT NULL,
        content_hash TEXT,
        duration_seconds REAL,
        has_audio INTEGER,
        srt_path TEXT,
        state TEXT NOT NULL DEFAULT 'pending'
            CHECK (state IN ('pending', 'indexed', 'failed', 'orphaned')),
        UNIQUE(source_folder, source_video_id)
    );
    CREATE INDEX idx_g_videos_folder ON videos(source_folder);

    CREATE TABLE clips (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_folder TEXT NOT NULL,
        source_clip_id INTEGER NOT NULL,
        source_video_id INTEGER NOT NULL,
        start_time REAL NOT NULL,
        end_time REAL NOT NULL,
        thumbnail_path TEXT,
        scene TEXT,
        description TEXT,
        subjects TEXT,
        actions TEXT,
        objects TEXT,
        mood TEXT,
        shot_type TEXT,
        lighting TEXT,
        colors TEXT,
        transcript TEXT,
        tags TEXT NOT NULL DEFAULT '[]',
        rating INTEGER NOT NULL DEFAULT 0,
        color_label TEXT,
        embedding BLOB,
        embedding_model TEXT,
        embedding_dimensions INTEGER,
        file_path TEXT NOT NULL,
        UNIQUE(source_folder, source_clip_id)
    );
    CREATE INDEX idx_g_clips_folder ON clips(source_folder);
    CREATE INDEX idx_g_clips_file_path ON clips(file_path);

    CREATE VIRTUAL TABLE clips_fts USING fts5(
        description, scene, transcript, subjects, actions, objects, tags,
        content='clips', content_rowid='id', tokenize='unicode61 remove_diacritics 2'
    );

    CREATE TRIGGER clips_fts_insert AFTER INSERT ON clips BEGIN
        INSERT INTO clips_fts(rowid, description, scene, transcript, subjects, actions, objects, tags)
        VALUES (new.id, new.description, new.scene, new.transcript, new.subjects, new.actions, new.objects, new.tags);
    END;
    CREATE TRIGGER clips_fts_delete AFTER DELETE ON clips BEGIN
        INSERT INTO clips_fts(clips_fts, rowid, description, scene, transcript, subjects, actions, objects, tags)
        VALUES ('delete', old.id, old.description, old.scene, old.transcript, old.subjects, old.actions, old.objects, old.tags);
    END;
    CREATE TRIGGER clips_fts_update AFTER UPDATE ON clips BEGIN
        INSERT INTO clips_fts(clips_fts, rowid, description, scene, transcript, subjects, actions, objects, tags)
        VALUES ('delete', old.id, old.description, old.scene, old.transcript, old.subjects, old.actions, old.objects, old.tags);
        INSERT INTO clips_fts(rowid, description, scene, transcript, subjects, actions, objects, tags)
        VALUES (new.id, new.description, new.scene, new.transcript, new.subjects, new.actions, new.objects, new.tags);
    END;

    CREATE TABLE sync_meta (
        folder_path TEXT NOT NULL,
        table_name TEXT NOT NULL,
        cursor INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (folder_path, table_name)
    );

    CREATE TABLE watched_folders (
        folder_path TEXT PRIMARY KEY,
        volume_name TEXT,
        volume_uuid TEXT,
        is_available INTEGER NOT NULL DEFAULT 1,
        last_seen_at TEXT
    );

    CREATE TABLE schema_info (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    INSERT INTO schema_info (key, value) VALUES ('fts_tokenizer', 'unicode61');
    "#,
];

pub fn get_schema_version(conn: &Connection) -> Result<u32> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

fn run_migrations(conn: &Connection, migrations: &[&str]) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    let target_version = migrations.len() as u32;

    if current_version > target_version {
        return Err(FindItError::MigrationError(format!(
            "schema version {} is newer than this build supports (max {})",
            current_version, target_version
        )));
    }

    if current_version == target_version {
        return Ok(());
    }

    for (i, migration) in migrations.iter().enumerate() {
        let migration_version = (i + 1) as u32;
        if migration_version <= current_version {
            continue;
        }
        conn.execute_batch(migration)?;
        conn.execute_batch(&format!("PRAGMA user_version = {}", migration_version))?;
        tracing::info!(version = migration_version, "applied migration");
    }

    Ok(())
}

pub fn run_folder_migrations(conn: &Connection) -> Result<()> {
    run_migrations(conn, FOLDER_MIGRATIONS)
}

pub fn run_global_migrations(conn: &Connection) -> Result<()> {
    run_migrations(conn, GLOBAL_MIGRATIONS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_migrations_apply_cleanly() {
        let conn = Connection::open_in_memory().unwrap();
        run_folder_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), FOLDER_MIGRATIONS.len() as u32);
        // Idempotent: running again is a no-op.
        run_folder_migrations(&conn).unwrap();
    }

    #[test]
    fn global_migrations_apply_cleanly() {
        let conn = Connection::open_in_memory().unwrap();
        run_global_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), GLOBAL_MIGRATIONS.len() as u32);
    }

    #[test]
    fn refuses_newer_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!("PRAGMA user_version = {}", FOLDER_MIGRATIONS.len() + 5))
            .unwrap();
        let err = run_folder_migrations(&conn).unwrap_err();
        assert!(matches!(err, FindItError::MigrationError(_)));
    }
}
