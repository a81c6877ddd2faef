use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::store::{Store, keys};

/// Persist cadence for the tick stream: every Nth tracked second, so a
/// continuous session writes once a minute instead of once a second.
pub const STATS_SAVE_INTERVAL_SECS: u64 = 60;

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsRecord {
    pub version: u32,
    pub total_seconds: u64,
    pub completed_videos: u32,
    /// Whole minutes of tracked playback per calendar day.
    pub daily_activity: BTreeMap<NaiveDate, u32>,
    pub last_tracked_date: Option<NaiveDate>,
    /// Sub-minute remainder for the tracked date, always in `[0, 60)`.
    pub daily_seconds_buffer: u32,
}

impl Default for StatsRecord {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            total_seconds: 0,
            completed_videos: 0,
            daily_activity: BTreeMap::new(),
            last_tracked_date: None,
            daily_seconds_buffer: 0,
        }
    }
}

/// Aggregates one-second playback samples into totals, day-bucketed minutes
/// and a consecutive-day streak.
pub struct StatsAggregator<'a> {
    store: &'a Store,
    record: StatsRecord,
}

impl<'a> StatsAggregator<'a> {
    pub fn load(store: &'a Store) -> Self {
        Self {
            store,
            record: store.get_or_default(keys::STATS),
        }
    }

    pub fn record(&self) -> &StatsRecord {
        &self.record
    }

    /// Account one elapsed playback second. The caller gates on "is playing";
    /// the aggregator only buckets. Crossing a date boundary discards the
    /// sub-minute buffer so no partial minute leaks into the new day.
    pub fn tick(&mut self, today: NaiveDate) {
        if self.record.last_tracked_date != Some(today) {
            self.record.daily_seconds_buffer = 0;
            self.record.last_tracked_date = Some(today);
        }
        self.record.total_seconds += 1;
        self.record.daily_seconds_buffer += 1;
        while self.record.daily_seconds_buffer >= 60 {
            *self.record.daily_activity.entry(today).or_insert(0) += 1;
            self.record.daily_seconds_buffer -= 60;
        }
        if self.record.total_seconds % STATS_SAVE_INTERVAL_SECS == 0 {
            self.flush();
        }
    }

    /// Batched catch-up for callers that learn about watched time after the
    /// fact, e.g. when an external player exits.
    pub fn tick_many(&mut self, today: NaiveDate, seconds: u64) {
        for _ in 0..seconds {
            self.tick(today);
        }
    }

    pub fn record_completion(&mut self) {
        self.record.completed_videos += 1;
        self.flush();
    }

    /// Consecutive days with recorded minutes, counted back from the most
    /// recent active day. Today having no minutes yet does not break the
    /// streak; activity older than yesterday means the streak is over.
    pub fn streak(&self, today: NaiveDate) -> u32 {
        let active: Vec<NaiveDate> = self
            .record
            .daily_activity
            .iter()
            .rev()
            .filter(|(_, minutes)| **minutes > 0)
            .map(|(date, _)| *date)
            .collect();
        let Some(latest) = active.first() else {
            return 0;
        };
        if (today - *latest).num_days() > 1 {
            return 0;
        }
        let mut streak = 1;
        for pair in active.windows(2) {
            if (pair[0] - pair[1]).num_days() == 1 {
                streak += 1;
            } else {
                break;
            }
        }
        streak
    }

    pub fn flush(&mut self) {
        self.record.version = SCHEMA_VERSION;
        self.store.set_logged(keys::STATS, &self.record);
    }
}
