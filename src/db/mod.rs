// Database module: two schemas (per-folder, global), migrations, and pooling.

pub mod folder_schema;
pub mod global_schema;
pub mod migrations;
pub mod pool;

use crate::constants::{FINDIT_FOLDER, FOLDER_DB_FILENAME, GLOBAL_DB_FILENAME, THUMBNAILS_FOLDER};
use crate::error::Result;
use std::path::{Path, PathBuf};

/// `<folder_path>/.findit/folder.sqlite`
pub fn folder_db_path(folder_path: &Path) -> PathBuf {
    folder_path.join(FINDIT_FOLDER).join(FOLDER_DB_FILENAME)
}

/// `<folder_path>/.findit`
pub fn findit_dir(folder_path: &Path) -> PathBuf {
    folder_path.join(FINDIT_FOLDER)
}

/// `<folder_path>/.findit/thumbnails`
pub fn thumbnails_dir(folder_path: &Path) -> PathBuf {
    findit_dir(folder_path).join(THUMBNAILS_FOLDER)
}

/// `<data_dir>/global.sqlite`
pub fn global_db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(GLOBAL_DB_FILENAME)
}

pub fn init_folder_layout(folder_path: &Path) -> Result<()> {
    std::fs::create_dir_all(findit_dir(folder_path))?;
    std::fs::create_dir_all(thumbnails_dir(folder_path))?;
    Ok(())
}

pub fn open_folder_pool(folder_path: &Path, reader_count: usize) -> Result<pool::DbPool> {
    init_folder_layout(folder_path)?;
    pool::DbPool::open(&folder_db_path(folder_path), reader_count, migrations::run_folder_migrations)
}

pub fn open_global_pool(data_dir: &Path, reader_count: usize) -> Result<pool::DbPool> {
    std::fs::create_dir_all(data_dir)?;
    pool::DbPool::open(&global_db_path(data_dir), reader_count, migrations::run_global_migrations)
}
