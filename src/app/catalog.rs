use std::cmp::Ordering;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use log::warn;
use walkdir::WalkDir;

/// Topic assigned to videos sitting directly under the scan root.
pub const FALLBACK_TOPIC: &str = "General";

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "avi", "mov"];

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRecord {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub topic: String,
    pub path: PathBuf,
}

/// Stable identity for a video across repeated imports: a reversible encoding
/// of `topic/filename`, so the same folder structure always maps to the same
/// ids without any server-side registry. Two files sharing topic and filename
/// intentionally share an id.
pub fn video_id(topic: &str, filename: &str) -> String {
    URL_SAFE_NO_PAD.encode(format!("{topic}/{filename}"))
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Scan a course folder into a flat, ordered playlist. The topic is the
/// immediate parent directory of each file. Errors when no recognizable video
/// file exists so a bad selection never disturbs existing state.
pub fn scan_course(root: &Path) -> Result<Vec<VideoRecord>> {
    let root = root
        .canonicalize()
        .with_context(|| format!("failed to open course folder {}", root.display()))?;

    let mut videos = Vec::new();
    for entry in WalkDir::new(&root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() || !is_video_file(entry.path()) {
            continue;
        }
        let Some(name) = entry.path().file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let topic = entry
            .path()
            .parent()
            .filter(|parent| *parent != root)
            .and_then(|parent| parent.file_name())
            .and_then(|name| name.to_str())
            .unwrap_or(FALLBACK_TOPIC)
            .to_string();
        let display_name = name
            .rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or_else(|| name.to_string());
        videos.push(VideoRecord {
            id: video_id(&topic, name),
            name: name.to_string(),
            display_name,
            topic,
            path: entry.path().to_path_buf(),
        });
    }

    if videos.is_empty() {
        bail!("no video files found under {}", root.display());
    }

    videos.sort_by(|a, b| natural_cmp(&a.topic, &b.topic).then_with(|| natural_cmp(&a.name, &b.name)));
    Ok(videos)
}

/// Group an ordered playlist into consecutive topic runs for display.
pub fn group_by_topic(videos: &[VideoRecord]) -> Vec<(&str, Vec<&VideoRecord>)> {
    let mut groups: Vec<(&str, Vec<&VideoRecord>)> = Vec::new();
    for video in videos {
        match groups.last_mut() {
            Some((topic, members)) if *topic == video.topic => members.push(video),
            _ => groups.push((video.topic.as_str(), vec![video])),
        }
    }
    groups
}

/// Case-insensitive ordering that compares digit runs numerically, so
/// "2. Intro" sorts before "10. Advanced".
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(lc), Some(rc)) if lc.is_ascii_digit() && rc.is_ascii_digit() => {
                let left_num = take_number(&mut left);
                let right_num = take_number(&mut right);
                match left_num.cmp(&right_num) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            (Some(lc), Some(rc)) => {
                let lfold = lc.to_lowercase().next().unwrap_or(lc);
                let rfold = rc.to_lowercase().next().unwrap_or(rc);
                match lfold.cmp(&rfold) {
                    Ordering::Equal => {
                        left.next();
                        right.next();
                    }
                    other => return other,
                }
            }
        }
    }
}

fn take_number(chars: &mut Peekable<Chars>) -> u64 {
    let mut value: u64 = 0;
    while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
        value = value.saturating_mul(10).saturating_add(u64::from(digit));
        chars.next();
    }
    value
}
