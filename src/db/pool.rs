// Connection pool: one writer, N readers (spec §4.1, §5 "shared-resource policy").
//
// rusqlite::Connection is not Sync, so the pool hands out exclusive access to
// a single connection at a time via a mutex per slot rather than sharing one
// connection across threads. Readers are picked round-robin; the writer is
// always the same connection so transactions serialize naturally.

use crate::constants::SQLITE_BUSY_TIMEOUT_MS;
use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = {};",
        SQLITE_BUSY_TIMEOUT_MS
    ))?;
    Ok(())
}

pub struct DbPool {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl DbPool {
    pub fn open(path: &Path, reader_count: usize, migrate: impl Fn(&Connection) -> Result<()>) -> Result<Self> {
        let writer = Connection::open(path)?;
        apply_pragmas(&writer)?;
        migrate(&writer)?;

        let mut readers = Vec::with_capacity(reader_count.max(1));
        for _ in 0..reader_count.max(1) {
            let reader = Connection::open(path)?;
            apply_pragmas(&reader)?;
            readers.push(Mutex::new(reader));
        }

        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    pub fn open_in_memory(migrate: impl Fn(&Connection) -> Result<()>) -> Result<Self> {
        let writer = Connection::open_in_memory()?;
        conn_pragmas_in_memory(&writer)?;
        migrate(&writer)?;
        Ok(Self {
            writer: Mutex::new(writer),
            readers: Vec::new(),
            next_reader: AtomicUsize::new(0),
        })
    }

    /// Run `f` with exclusive access to the single writer connection.
    pub fn with_writer<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.writer.lock().expect("writer mutex poisoned");
        f(&conn)
    }

    /// Run `f` with a reader connection. Falls back to the writer when no
    /// reader pool was configured (in-memory test pools).
    pub fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        if self.readers.is_empty() {
            return self.with_writer(f);
        }
        let idx = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx].lock().expect("reader mutex poisoned");
        f(&conn)
    }
}

fn conn_pragmas_in_memory(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_folder_migrations;

    #[test]
    fn writer_and_reader_see_same_data() {
        let pool = DbPool::open_in_memory(run_folder_migrations).unwrap();
        pool.with_writer(|conn| {
            conn.execute(
                "INSERT INTO videos (file_path, size, mtime) VALUES (?1, ?2, ?3)",
                rusqlite::params!["/a/b.mp4", 100, 1000],
            )?;
            Ok(())
        })
        .unwrap();
        let count: i64 = pool
            .with_reader(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM videos", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }
}
