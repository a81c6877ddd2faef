use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

use super::catalog::VideoRecord;

#[derive(Debug, Clone)]
pub(crate) struct PlayerOutcome {
    pub(crate) success: bool,
    /// None on a successful run means the player discarded its resume state,
    /// i.e. playback reached the end of the file.
    pub(crate) final_position: Option<f64>,
}

pub(crate) fn resolve_player_bin() -> PathBuf {
    resolve_player_bin_from_env(env::var_os("COURSETRACK_PLAYER"))
}

pub(crate) fn resolve_player_bin_from_env(env_value: Option<OsString>) -> PathBuf {
    match env_value {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => PathBuf::from("mpv"),
    }
}

/// Run the external player against a private watch-later directory and read
/// the final position back from it after exit.
pub(crate) fn run_player(video: &VideoRecord, start_at: f64) -> Result<PlayerOutcome> {
    let watch_dir = TempWatchDir::new()?;
    let player_bin = resolve_player_bin();
    let status = ProcessCommand::new(&player_bin)
        .arg(&video.path)
        .arg(format!("--start={start_at}"))
        .arg("--save-position-on-quit")
        .arg(format!("--watch-later-dir={}", watch_dir.path().display()))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("failed to launch {}", player_bin.display()))?;
    if !status.success() {
        return Ok(PlayerOutcome {
            success: false,
            final_position: None,
        });
    }
    Ok(PlayerOutcome {
        success: true,
        final_position: read_saved_position(watch_dir.path()),
    })
}

fn read_saved_position(dir: &Path) -> Option<f64> {
    for entry in fs::read_dir(dir).ok()?.flatten() {
        if !entry.file_type().is_ok_and(|kind| kind.is_file()) {
            continue;
        }
        if let Ok(raw) = fs::read_to_string(entry.path())
            && let Some(position) = parse_watch_later_position(&raw)
        {
            return Some(position);
        }
    }
    None
}

pub(crate) fn parse_watch_later_position(raw: &str) -> Option<f64> {
    for line in raw.lines() {
        if let Some(value) = line.trim().strip_prefix("start=")
            && let Ok(position) = value.trim().parse::<f64>()
        {
            return Some(position.max(0.0));
        }
    }
    None
}

#[derive(Debug)]
struct TempWatchDir {
    path: PathBuf,
}

impl TempWatchDir {
    fn new() -> Result<Self> {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let path = env::temp_dir().join(format!("coursetrack-watch-{}-{ts}", std::process::id()));
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create watch-later dir {}", path.display()))?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempWatchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}
