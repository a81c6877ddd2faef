use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};

use super::catalog::VideoRecord;
use super::format_time;
use super::history::{HistoryItem, HistoryLedger};
use super::progress::{ProgressEntry, ProgressTracker};
use super::stats::{StatsAggregator, StatsRecord};
use crate::store::{Settings, Store};

/// Saved positions at or below this are treated as "barely started" and play
/// without a resume prompt.
pub const RESUME_THRESHOLD_SECS: f64 = 10.0;
pub const AUTO_ADVANCE_DELAY_MS: i64 = 3000;
pub const PROGRESS_FLUSH_INTERVAL_SECS: i64 = 10;
/// A start seek landing within this of the target counts as honored.
pub const SEEK_DRIFT_TOLERANCE_SECS: f64 = 1.0;
const SEEK_RETRY_DELAY_MS: i64 = 500;

/// Playback surface the controller drives. Event delivery order between
/// `LoadedMetadata` and `CanPlay` is not guaranteed by real engines and must
/// not be assumed.
pub trait MediaEngine {
    fn load(&mut self, video: &VideoRecord) -> Result<()>;
    fn play(&mut self);
    fn seek(&mut self, position: f64);
    fn set_speed(&mut self, speed: f64);
    fn current_time(&self) -> f64;
    /// Zero until metadata is known.
    fn duration(&self) -> f64;
    fn is_playing(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    LoadedMetadata,
    CanPlay,
    TimeUpdate,
    Pause,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeChoice {
    Resume,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionState {
    Idle,
    ResumePending { saved_position: f64 },
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartMode {
    Prompt { saved_position: f64 },
    From(f64),
}

/// Shared resume decision: completed videos restart from zero, a meaningful
/// saved position asks the user, anything else continues silently.
pub fn start_mode(entry: Option<&ProgressEntry>) -> StartMode {
    match entry {
        Some(entry) if entry.completed => StartMode::From(0.0),
        Some(entry) if entry.current_time > RESUME_THRESHOLD_SECS => StartMode::Prompt {
            saved_position: entry.current_time,
        },
        Some(entry) => StartMode::From(entry.current_time),
        None => StartMode::From(0.0),
    }
}

/// Fire-and-forget user-facing messages; the controller requests them, the UI
/// layer renders them.
pub trait NoticeSink {
    fn notice(&mut self, message: &str);
}

/// Observation hooks a UI layer can subscribe to for re-rendering.
pub trait SessionObserver {
    fn video_selected(&mut self, _video: &VideoRecord) {}
    fn progress_updated(&mut self, _video_id: &str, _entry: &ProgressEntry) {}
    fn statistics_updated(&mut self, _stats: &StatsRecord) {}
    fn history_updated(&mut self, _entries: &[HistoryItem]) {}
}

/// Orchestrates playlist position, resume prompts, auto-advance and the
/// periodic flush of progress, statistics and history while playing. All
/// timing flows through the `now` arguments, so the whole state machine runs
/// against a fake clock in tests.
pub struct PlaybackSession<'a, M: MediaEngine> {
    playlist: Vec<VideoRecord>,
    current_index: Option<usize>,
    state: SessionState,
    media: M,
    progress: ProgressTracker<'a>,
    stats: StatsAggregator<'a>,
    history: HistoryLedger<'a>,
    store: &'a Store,
    notices: Box<dyn NoticeSink + 'a>,
    observer: Box<dyn SessionObserver + 'a>,
    settings: Settings,
    auto_advance_at: Option<DateTime<Utc>>,
    pending_seek: Option<f64>,
    seek_check_at: Option<DateTime<Utc>>,
    seek_retried: bool,
    last_flush_at: Option<DateTime<Utc>>,
}

impl<'a, M: MediaEngine> PlaybackSession<'a, M> {
    pub fn new(
        playlist: Vec<VideoRecord>,
        media: M,
        store: &'a Store,
        notices: Box<dyn NoticeSink + 'a>,
        observer: Box<dyn SessionObserver + 'a>,
    ) -> Self {
        Self {
            playlist,
            current_index: None,
            state: SessionState::Idle,
            media,
            progress: ProgressTracker::new(store),
            stats: StatsAggregator::load(store),
            history: HistoryLedger::new(store),
            settings: store.settings(),
            store,
            notices,
            observer,
            auto_advance_at: None,
            pending_seek: None,
            seek_check_at: None,
            seek_retried: false,
            last_flush_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_video(&self) -> Option<&VideoRecord> {
        self.current_index.and_then(|index| self.playlist.get(index))
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn media_mut(&mut self) -> &mut M {
        &mut self.media
    }

    pub fn stats_record(&self) -> &StatsRecord {
        self.stats.record()
    }

    /// Select a playlist entry. Out-of-bounds indices are a no-op, not an
    /// error. A meaningful saved position leads to `ResumePending` with the
    /// choice surfaced through the notice sink.
    pub fn select_video(&mut self, index: usize, now: DateTime<Utc>) {
        self.select_inner(index, now, true);
    }

    fn select_inner(&mut self, index: usize, now: DateTime<Utc>, allow_prompt: bool) {
        self.cancel_auto_advance();
        let Some(video) = self.playlist.get(index).cloned() else {
            return;
        };
        if let Err(err) = self.media.load(&video) {
            warn!("media load failed for {}: {err}", video.name);
            self.notices
                .notice(&format!("Cannot play {}: {err}", video.display_name));
            self.state = SessionState::Idle;
            return;
        }
        self.current_index = Some(index);
        // Settings are read once per video start, not cached for the session.
        self.settings = self.store.settings();
        self.observer.video_selected(&video);

        let entry = self.progress.load(&video.id);
        match start_mode(entry.as_ref()) {
            StartMode::Prompt { saved_position } if allow_prompt => {
                self.state = SessionState::ResumePending { saved_position };
                self.notices.notice(&format!(
                    "Resume {} from {}?",
                    video.display_name,
                    format_time(saved_position)
                ));
            }
            StartMode::Prompt { saved_position } => self.start_playing(saved_position, now),
            StartMode::From(position) => self.start_playing(position, now),
        }
    }

    pub fn resolve_resume(&mut self, choice: ResumeChoice, now: DateTime<Utc>) {
        let SessionState::ResumePending { saved_position } = self.state else {
            return;
        };
        match choice {
            ResumeChoice::Resume => self.start_playing(saved_position, now),
            // A fresh start replays from zero but never clears the sticky
            // completed flag.
            ResumeChoice::Restart => self.start_playing(0.0, now),
        }
    }

    fn start_playing(&mut self, position: f64, now: DateTime<Utc>) {
        self.cancel_auto_advance();
        self.media.set_speed(self.settings.default_speed);
        self.seek_retried = false;
        self.seek_check_at = None;
        self.pending_seek = (position > 0.0).then_some(position);
        if let Some(target) = self.pending_seek {
            // Seeking before metadata stabilizes can be silently ignored by
            // the engine; the pending target is re-enforced on metadata
            // events and retried once from tick().
            self.media.seek(target);
            self.seek_check_at = Some(now + Duration::milliseconds(SEEK_RETRY_DELAY_MS));
        }
        self.media.play();
        self.state = SessionState::Playing;
        self.last_flush_at = Some(now);
    }

    pub fn handle_event(&mut self, event: MediaEvent, now: DateTime<Utc>) {
        match event {
            MediaEvent::LoadedMetadata | MediaEvent::CanPlay => {
                if let Some(target) = self.pending_seek {
                    if (self.media.current_time() - target).abs() > SEEK_DRIFT_TOLERANCE_SECS {
                        self.media.seek(target);
                    }
                    self.seek_check_at = Some(now + Duration::milliseconds(SEEK_RETRY_DELAY_MS));
                }
            }
            MediaEvent::TimeUpdate => {
                if let Some(target) = self.pending_seek
                    && (self.media.current_time() - target).abs() <= SEEK_DRIFT_TOLERANCE_SECS
                {
                    self.pending_seek = None;
                    self.seek_check_at = None;
                }
            }
            MediaEvent::Pause => {
                if matches!(self.state, SessionState::Playing) {
                    self.flush_position(now);
                    self.state = SessionState::Paused;
                }
            }
            MediaEvent::Ended => self.handle_ended(now),
        }
    }

    /// Drive the once-per-second duties: a due auto-advance, the statistics
    /// sample, the start-seek watchdog and the periodic position flush.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if let Some(due) = self.auto_advance_at
            && now >= due
        {
            self.auto_advance_at = None;
            if let Some(index) = self.current_index {
                self.select_inner(index + 1, now, false);
            }
            return;
        }
        if !matches!(self.state, SessionState::Playing) || !self.media.is_playing() {
            return;
        }
        self.stats.tick(now.date_naive());
        self.enforce_pending_seek(now);
        if let Some(last) = self.last_flush_at
            && (now - last).num_seconds() >= PROGRESS_FLUSH_INTERVAL_SECS
        {
            self.flush_position(now);
        }
    }

    fn enforce_pending_seek(&mut self, now: DateTime<Utc>) {
        let (Some(target), Some(check_at)) = (self.pending_seek, self.seek_check_at) else {
            return;
        };
        if now < check_at {
            return;
        }
        let drift = (self.media.current_time() - target).abs();
        if drift <= SEEK_DRIFT_TOLERANCE_SECS {
            self.pending_seek = None;
            self.seek_check_at = None;
        } else if !self.seek_retried {
            debug!("start seek drifted {drift:.1}s from {target:.1}s, retrying once");
            self.media.seek(target);
            self.seek_retried = true;
            self.seek_check_at = Some(now + Duration::milliseconds(SEEK_RETRY_DELAY_MS));
        } else {
            // Retried once already; continue from wherever the engine landed.
            self.pending_seek = None;
            self.seek_check_at = None;
        }
    }

    fn flush_position(&mut self, now: DateTime<Utc>) {
        let Some(video) = self.current_video().cloned() else {
            return;
        };
        let position = self.media.current_time();
        let duration = self.media.duration();
        let entry = self.progress.save(&video.id, position, duration, None);
        self.observer.progress_updated(&video.id, &entry);
        let entries = self
            .history
            .record(&video.id, &video.name, &video.topic, position, duration, now);
        self.observer.history_updated(&entries);
        self.last_flush_at = Some(now);
    }

    fn handle_ended(&mut self, now: DateTime<Utc>) {
        let Some(video) = self.current_video().cloned() else {
            return;
        };
        let duration = self.media.duration();
        let entry = self.progress.save(&video.id, duration, duration, Some(true));
        self.observer.progress_updated(&video.id, &entry);
        self.stats.record_completion();
        self.observer.statistics_updated(self.stats.record());
        let entries = self
            .history
            .record(&video.id, &video.name, &video.topic, duration, duration, now);
        self.observer.history_updated(&entries);

        self.state = SessionState::Paused;
        let index = self.current_index.unwrap_or(0);
        if self.settings.auto_play && index + 1 < self.playlist.len() {
            self.auto_advance_at = Some(now + Duration::milliseconds(AUTO_ADVANCE_DELAY_MS));
            self.notices.notice(&format!(
                "Next video in {}s...",
                AUTO_ADVANCE_DELAY_MS / 1000
            ));
        }
    }

    /// Manual advance; always honors the saved position silently, matching
    /// the auto-advance path.
    pub fn next(&mut self, now: DateTime<Utc>) {
        self.cancel_auto_advance();
        if let Some(index) = self.current_index {
            self.select_inner(index + 1, now, false);
        }
    }

    /// Manual step back; unlike `next`, a partially watched video prompts.
    pub fn previous(&mut self, now: DateTime<Utc>) {
        self.cancel_auto_advance();
        if let Some(index) = self.current_index
            && index > 0
        {
            self.select_inner(index - 1, now, true);
        }
    }

    /// Final flush on teardown or page-unload equivalents. Also cancels any
    /// scheduled auto-advance so no timer outlives the session.
    pub fn shutdown(&mut self, now: DateTime<Utc>) {
        self.cancel_auto_advance();
        if matches!(self.state, SessionState::Playing | SessionState::Paused) {
            self.flush_position(now);
        }
        self.stats.flush();
        self.observer.statistics_updated(self.stats.record());
    }

    fn cancel_auto_advance(&mut self) {
        self.auto_advance_at = None;
    }
}
