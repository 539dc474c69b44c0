// Volume resolver (spec §4.2): map paths to volume UUIDs, and resolve a new
// path for a previously-known volume UUID after a remount.

use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeInfo {
    pub uuid: Option<String>,
    pub name: Option<String>,
    pub mount_point: Option<String>,
}

pub struct VolumeResolver;

impl VolumeResolver {
    pub fn new() -> Self {
        Self
    }

    /// `resolve(path) -> (volume_name?, volume_uuid?)`
    pub fn resolve(&self, path: &Path) -> (Option<String>, Option<String>) {
        let info = volume_info_for(path);
        (info.name, info.uuid)
    }

    /// `resolve_updated_path(old_path, volume_uuid) -> new_path?`: find the
    /// mount point currently hosting `volume_uuid` and rewrite `old_path`'s
    /// stored prefix to live under it.
    pub fn resolve_updated_path(&self, old_path: &Path, volume_uuid: &str) -> Option<PathBuf> {
        let mount_point = mount_point_for_uuid(volume_uuid)?;
        // Best-effort: assume the folder's relative position under its old
        // volume root is preserved; callers combine this with PathRebaser's
        // prefix comparison rather than relying on exact reconstruction here.
        let file_name = old_path.file_name()?;
        Some(PathBuf::from(mount_point).join(file_name))
    }
}

impl Default for VolumeResolver {
    fn default() -> Self {
        Self::new()
    }
}

pub fn volume_info_for(path: &Path) -> VolumeInfo {
    #[cfg(target_os = "macos")]
    {
        volume_info_macos(path)
    }
    #[cfg(target_os = "linux")]
    {
        volume_info_linux(path)
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = path;
        VolumeInfo::default()
    }
}

#[cfg(target_os = "macos")]
fn volume_info_macos(path: &Path) -> VolumeInfo {
    let mount_point = Command::new("df")
        .arg(path)
        .output()
        .ok()
        .and_then(|o| {
            String::from_utf8_lossy(&o.stdout)
                .lines()
                .nth(1)
                .and_then(|line| line.split_whitespace().last())
                .map(String::from)
        });

    let name = mount_point
        .as_ref()
        .and_then(|mp| Path::new(mp).file_name().map(|n| n.to_string_lossy().to_string()));

    let uuid = mount_point.as_ref().and_then(|mp| {
        Command::new("diskutil")
            .args(["info", mp])
            .output()
            .ok()
            .and_then(|o| {
                String::from_utf8_lossy(&o.stdout)
                    .lines()
                    .find(|line| line.contains("Volume UUID:"))
                    .and_then(|line| line.split(':').nth(1))
                    .map(|s| s.trim().to_string())
            })
    });

    VolumeInfo { uuid, name, mount_point }
}

#[cfg(target_os = "linux")]
fn volume_info_linux(path: &Path) -> VolumeInfo {
    let mount_point = Command::new("df")
        .arg(path)
        .output()
        .ok()
        .and_then(|o| {
            String::from_utf8_lossy(&o.stdout)
                .lines()
                .nth(1)
                .and_then(|line| line.split_whitespace().last())
                .map(String::from)
        });

    let name = mount_point
        .as_ref()
        .and_then(|mp| Path::new(mp).file_name().map(|n| n.to_string_lossy().to_string()));

    let uuid = mount_point.as_ref().and_then(|mp| {
        Command::new("findmnt")
            .args(["-n", "-o", "UUID", mp])
            .output()
            .ok()
            .and_then(|o| {
                let s = String::from_utf8_lossy(&o.stdout).trim().to_string();
                if s.is_empty() {
                    None
                } else {
                    Some(s)
                }
            })
    });

    VolumeInfo { uuid, name, mount_point }
}

/// Scan currently mounted volumes for one whose UUID matches; returns its
/// mount point if found. Used by `VolumeMonitor`'s reconcile pass.
pub fn mount_point_for_uuid(uuid: &str) -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        let output = Command::new("findmnt").args(["-n", "-o", "UUID,TARGET"]).output().ok()?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            let mut parts = line.split_whitespace();
            if let (Some(u), Some(target)) = (parts.next(), parts.next()) {
                if u == uuid {
                    return Some(target.to_string());
                }
            }
        }
        None
    }
    #[cfg(target_os = "macos")]
    {
        let output = Command::new("diskutil").args(["list"]).output().ok()?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            if let Some(disk) = line.split_whitespace().last() {
                if let Ok(info) = Command::new("diskutil").args(["info", disk]).output() {
                    let text = String::from_utf8_lossy(&info.stdout);
                    if text.contains(uuid) {
                        return text
                            .lines()
                            .find(|l| l.contains("Mount Point:"))
                            .and_then(|l| l.split(':').nth(1))
                            .map(|s| s.trim().to_string());
                    }
                }
            }
        }
        None
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = uuid;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_on_nonexistent_path_does_not_panic() {
        let resolver = VolumeResolver::new();
        let (_name, _uuid) = resolver.resolve(Path::new("/definitely/does/not/exist"));
    }
}
