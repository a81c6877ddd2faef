use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::store::{Store, keys};

/// Positions within this many seconds of the end count as watched to the end.
pub const COMPLETION_THRESHOLD_SECS: f64 = 2.0;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub current_time: f64,
    pub duration: f64,
    pub completed: bool,
    /// Unix milliseconds of the last write.
    pub last_updated: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ProgressMap {
    version: u32,
    entries: HashMap<String, ProgressEntry>,
}

/// Per-video playback position and completion state, persisted as one map
/// keyed by video id. Every write is a full-map read-modify-write; concurrent
/// processes are last-write-wins, accepted for single-session use.
pub struct ProgressTracker<'a> {
    store: &'a Store,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn read_map(&self) -> ProgressMap {
        self.store.get_or_default(keys::PROGRESS)
    }

    fn write_map(&self, map: &mut ProgressMap) {
        map.version = SCHEMA_VERSION;
        self.store.set_logged(keys::PROGRESS, map);
    }

    /// Save the playback position for a video. Completion is sticky: once a
    /// stored entry is completed it stays completed regardless of the position
    /// being written. A non-positive duration keeps the previously known one,
    /// for callers that only learn the position.
    pub fn save(
        &self,
        id: &str,
        current_time: f64,
        duration: f64,
        completed_override: Option<bool>,
    ) -> ProgressEntry {
        let mut map = self.read_map();
        let prior = map.entries.get(id);
        let duration = if duration > 0.0 {
            duration
        } else {
            prior.map(|entry| entry.duration).unwrap_or(0.0)
        };
        let sticky = prior.is_some_and(|entry| entry.completed);
        let completed = sticky
            || completed_override
                .unwrap_or(duration > 0.0 && current_time >= duration - COMPLETION_THRESHOLD_SECS);
        let entry = ProgressEntry {
            current_time: current_time.max(0.0),
            duration,
            completed,
            last_updated: Utc::now().timestamp_millis(),
        };
        map.entries.insert(id.to_string(), entry.clone());
        self.write_map(&mut map);
        entry
    }

    pub fn load(&self, id: &str) -> Option<ProgressEntry> {
        self.read_map().entries.get(id).cloned()
    }

    /// Force the completed flag, initializing position and duration when the
    /// video has never been played.
    pub fn mark_completed(&self, id: &str) {
        let mut map = self.read_map();
        let now = Utc::now().timestamp_millis();
        map.entries
            .entry(id.to_string())
            .and_modify(|entry| {
                entry.completed = true;
                entry.last_updated = now;
            })
            .or_insert(ProgressEntry {
                current_time: 0.0,
                duration: 0.0,
                completed: true,
                last_updated: now,
            });
        self.write_map(&mut map);
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.load(id).is_some_and(|entry| entry.completed)
    }

    pub fn all(&self) -> HashMap<String, ProgressEntry> {
        self.read_map().entries
    }
}
