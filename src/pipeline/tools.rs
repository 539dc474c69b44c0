// Bundled ffmpeg/ffprobe resolution, mirroring the teacher's sidecar-first
// lookup: env override, then next to the running executable, then PATH.

use std::env;
use std::path::PathBuf;

fn exe_dir() -> Option<PathBuf> {
    env::current_exe().ok().and_then(|p| p.parent().map(|d| d.to_path_buf()))
}

fn resolve_tool(env_key: &str, default_name: &str) -> PathBuf {
    if let Ok(v) = env::var(env_key) {
        let p = PathBuf::from(&v);
        if p.exists() {
            return p;
        }
    }

    let mut filename = default_name.to_string();
    if cfg!(windows) && !filename.to_lowercase().ends_with(".exe") {
        filename.push_str(".exe");
    }

    if let Some(dir) = exe_dir() {
        let candidate = dir.join(&filename);
        if candidate.exists() {
            return candidate;
        }
        let bin_candidate = dir.join("bin").join(&filename);
        if bin_candidate.exists() {
            return bin_candidate;
        }
    }

    PathBuf::from(default_name)
}

pub fn ffmpeg_path() -> PathBuf {
    resolve_tool("FINDIT_FFMPEG_PATH", "ffmpeg")
}

pub fn ffprobe_path() -> PathBuf {
    resolve_tool("FINDIT_FFPROBE_PATH", "ffprobe")
}

/// Best-effort auto-download of ffmpeg/ffprobe via `ffmpeg-sidecar` when
/// neither binary is reachable on PATH or as a sidecar. Never fatal: the
/// pipeline degrades to marking segmentation as failed per-video instead.
pub fn ensure_ffmpeg_available() {
    if which(&ffmpeg_path()).is_some() && which(&ffprobe_path()).is_some() {
        return;
    }
    if let Err(e) = ffmpeg_sidecar::download::auto_download() {
        tracing::warn!(error = %e, "ffmpeg auto-download failed; segmentation will report failures until resolved");
    }
}

fn which(candidate: &PathBuf) -> Option<PathBuf> {
    if candidate.is_absolute() && candidate.exists() {
        return Some(candidate.clone());
    }
    std::process::Command::new(candidate)
        .arg("-version")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|_| candidate.clone())
}
