// Volume monitor (spec §4.5): reacts to mount/unmount and runs a startup
// reconcile pass for folders whose volume was mounted before the process
// started.

use crate::db::folder_schema;
use crate::db::pool::DbPool;
use crate::error::Result;
use crate::volume::rebaser::{rebase_global, starts_with_folder_prefix, PathRebaser};
use crate::volume::resolver::{mount_point_for_uuid, VolumeResolver};
use std::collections::HashMap;
use std::sync::Arc;

/// One registered folder's state as the monitor understands it.
#[derive(Debug, Clone)]
pub struct TrackedFolder {
    pub folder_path: String,
    pub volume_uuid: Option<String>,
    pub is_available: bool,
}

pub enum VolumeEvent {
    Mounted { mount_point: String, volume_uuid: String },
    Unmounted { volume_uuid: String },
}

/// What the scheduler/engine needs to react to after the monitor processes
/// a mount/unmount/reconcile pass.
#[derive(Debug, Clone)]
pub struct VolumeOutcome {
    pub rebased_folders: Vec<(String, String)>, // (old_path, new_path)
    pub newly_unavailable: Vec<String>,
    pub newly_available: Vec<String>,
}

pub struct VolumeMonitor {
    resolver: VolumeResolver,
    folder_pools: Arc<std::sync::Mutex<HashMap<String, Arc<DbPool>>>>,
}

impl VolumeMonitor {
    pub fn new(folder_pools: Arc<std::sync::Mutex<HashMap<String, Arc<DbPool>>>>) -> Self {
        Self {
            resolver: VolumeResolver::new(),
            folder_pools,
        }
    }

    /// Handle a single mount/unmount event against the registry of tracked
    /// folders, returning what changed so the caller can re-enqueue indexing
    /// and fire `FolderAvailabilityChanged`.
    pub fn handle_event(
        &self,
        event: VolumeEvent,
        tracked: &[TrackedFolder],
        global_pool: &DbPool,
    ) -> Result<VolumeOutcome> {
        let mut outcome = VolumeOutcome {
            rebased_folders: Vec::new(),
            newly_unavailable: Vec::new(),
            newly_available: Vec::new(),
        };

        match event {
            VolumeEvent::Mounted { mount_point, volume_uuid } => {
                for folder in tracked {
                    let under_mount = starts_with_folder_prefix(&folder.folder_path, &mount_point);
                    let matches_uuid = folder.volume_uuid.as_deref() == Some(volume_uuid.as_str());
                    if !under_mount && !matches_uuid {
                        continue;
                    }
                    if folder.folder_path == mount_point || under_mount {
                        // Already at the right place; just mark available.
                        outcome.newly_available.push(folder.folder_path.clone());
                        continue;
                    }
                    let new_path = format!(
                        "{}/{}",
                        mount_point.trim_end_matches('/'),
                        folder_name_of(&folder.folder_path)
                    );
                    self.rebase_folder(folder, &new_path, global_pool)?;
                    outcome.rebased_folders.push((folder.folder_path.clone(), new_path.clone()));
                    outcome.newly_available.push(new_path);
                }
            }
            VolumeEvent::Unmounted { volume_uuid } => {
                for folder in tracked {
                    if folder.volume_uuid.as_deref() == Some(volume_uuid.as_str()) {
                        outcome.newly_unavailable.push(folder.folder_path.clone());
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Startup reconcile pass (spec §4.5 last paragraph): for every folder
    /// whose path is unreachable but whose volume is mounted elsewhere, rebase.
    pub fn reconcile_at_startup(&self, tracked: &[TrackedFolder], global_pool: &DbPool) -> Result<VolumeOutcome> {
        let mut outcome = VolumeOutcome {
            rebased_folders: Vec::new(),
            newly_unavailable: Vec::new(),
            newly_available: Vec::new(),
        };

        for folder in tracked {
            if std::path::Path::new(&folder.folder_path).exists() {
                continue;
            }
            let Some(uuid) = folder.volume_uuid.as_deref() else {
                outcome.newly_unavailable.push(folder.folder_path.clone());
                continue;
            };
            match mount_point_for_uuid(uuid) {
                Some(mount_point) if mount_point != folder.folder_path => {
                    let new_path = format!(
                        "{}/{}",
                        mount_point.trim_end_matches('/'),
                        folder_name_of(&folder.folder_path)
                    );
                    self.rebase_folder(folder, &new_path, global_pool)?;
                    outcome.rebased_folders.push((folder.folder_path.clone(), new_path.clone()));
                    outcome.newly_available.push(new_path);
                }
                _ => outcome.newly_unavailable.push(folder.folder_path.clone()),
            }
        }

        Ok(outcome)
    }

    fn rebase_folder(&self, folder: &TrackedFolder, new_path: &str, global_pool: &DbPool) -> Result<()> {
        let pools = self.folder_pools.lock().expect("folder pool map poisoned");
        if let Some(pool) = pools.get(&folder.folder_path) {
            PathRebaser::rebase_if_needed(pool, &folder.folder_path, new_path)?;
            let (volume_name, volume_uuid) = self.resolver.resolve(std::path::Path::new(new_path));
            pool.with_writer(|conn| {
                if let Some(mut watched) = folder_schema::get_watched_folder(conn)? {
                    watched.volume_name = volume_name.or(watched.volume_name);
                    watched.volume_uuid = volume_uuid.or(watched.volume_uuid);
                    watched.is_available = true;
                    folder_schema::upsert_watched_folder(conn, &watched)?;
                }
                Ok(())
            })?;
        }
        rebase_global(global_pool, &folder.folder_path, new_path)?;
        Ok(())
    }
}

fn folder_name_of(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Mark a folder offline/online in both the per-folder and global DBs.
pub fn set_folder_availability(folder_pool: &DbPool, global_pool: &DbPool, folder_path: &str, available: bool) -> Result<()> {
    folder_pool.with_writer(|conn| {
        if let Some(mut folder) = folder_schema::get_watched_folder(conn)? {
            folder.is_available = available;
            folder_schema::upsert_watched_folder(conn, &folder)?;
        }
        Ok(())
    })?;
    global_pool.with_writer(|conn| {
        conn.execute(
            "UPDATE watched_folders SET is_available = ?1 WHERE folder_path = ?2",
            rusqlite::params![available as i64, folder_path],
        )?;
        Ok::<_, crate::error::FindItError>(())
    })?;
    Ok(())
}
