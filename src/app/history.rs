use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Store, keys};

/// Entries kept in the ledger; the oldest past the cap are dropped silently.
pub const HISTORY_CAP: usize = 50;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub video_id: String,
    pub name: String,
    pub topic: String,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub last_watched: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct HistoryRecord {
    version: u32,
    entries: Vec<HistoryItem>,
}

/// Bounded most-recent-first watch log, deduplicated by video id.
pub struct HistoryLedger<'a> {
    store: &'a Store,
}

impl<'a> HistoryLedger<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Record a watch event and return the updated ledger. Media that never
    /// reported a duration is skipped so unloaded sources don't pollute the
    /// history.
    pub fn record(
        &self,
        video_id: &str,
        name: &str,
        topic: &str,
        position_seconds: f64,
        duration_seconds: f64,
        watched_at: DateTime<Utc>,
    ) -> Vec<HistoryItem> {
        if duration_seconds <= 0.0 {
            return self.all();
        }
        let mut record: HistoryRecord = self.store.get_or_default(keys::HISTORY);
        record.entries.retain(|entry| entry.video_id != video_id);
        record.entries.insert(
            0,
            HistoryItem {
                video_id: video_id.to_string(),
                name: name.to_string(),
                topic: topic.to_string(),
                position_seconds,
                duration_seconds,
                last_watched: watched_at,
            },
        );
        record.entries.truncate(HISTORY_CAP);
        record.version = SCHEMA_VERSION;
        self.store.set_logged(keys::HISTORY, &record);
        record.entries
    }

    pub fn all(&self) -> Vec<HistoryItem> {
        let record: HistoryRecord = self.store.get_or_default(keys::HISTORY);
        record.entries
    }
}
