pub mod catalog;
pub mod history;
mod player;
pub mod progress;
pub mod session;
pub mod stats;


use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, Utc};

use crate::cli::{Cli, Command};
use crate::paths::store_file_path;
use crate::store::Store;

use self::catalog::{group_by_topic, scan_course};
use self::history::HistoryLedger;
use self::player::run_player;
use self::progress::ProgressTracker;
use self::session::{AUTO_ADVANCE_DELAY_MS, StartMode, start_mode};
use self::stats::StatsAggregator;

pub fn run(cli: Cli) -> Result<()> {
    let store = open_store()?;

    match cli.command {
        Command::Scan { dir } => run_scan(&store, &dir),
        Command::Play { dir, index } => run_play(&store, &dir, index),
        Command::Stats => run_stats(&store),
        Command::History => run_history(&store),
        Command::Done { dir, number } => run_done(&store, &dir, number),
    }
}

fn open_store() -> Result<Store> {
    let path = store_file_path()?;
    let store = Store::open(&path)?;
    store.migrate()?;
    Ok(store)
}

fn run_scan(store: &Store, dir: &Path) -> Result<()> {
    let videos = scan_course(dir)?;
    let entries = ProgressTracker::new(store).all();
    let groups = group_by_topic(&videos);

    for (topic, members) in &groups {
        println!("{topic} ({})", members.len());
        for video in members {
            match entries.get(&video.id) {
                Some(entry) if entry.completed => println!("  [x] {}", video.display_name),
                Some(entry) if entry.current_time > 0.0 => println!(
                    "  [>] {} ({} / {})",
                    video.display_name,
                    format_time(entry.current_time),
                    format_time(entry.duration)
                ),
                _ => println!("  [ ] {}", video.display_name),
            }
        }
    }
    println!("\n{} video(s) in {} topic(s)", videos.len(), groups.len());
    Ok(())
}

fn run_play(store: &Store, dir: &Path, index: Option<usize>) -> Result<()> {
    let videos = scan_course(dir)?;
    let mut index = index.unwrap_or(0);
    if index >= videos.len() {
        bail!(
            "video index {index} is out of range (playlist has {} entries)",
            videos.len()
        );
    }

    let progress = ProgressTracker::new(store);
    let history = HistoryLedger::new(store);
    let mut stats = StatsAggregator::load(store);
    let settings = store.settings();

    loop {
        let video = &videos[index];
        let entry = progress.load(&video.id);
        let start_at = match start_mode(entry.as_ref()) {
            StartMode::Prompt { saved_position } => {
                prompt_resume(&video.display_name, saved_position)?
            }
            StartMode::From(position) => position,
        };

        println!("Playing: {} [{}]", video.display_name, video.topic);
        let outcome = match run_player(video, start_at) {
            Ok(outcome) => outcome,
            Err(err) => {
                println!("Player launch failed: {err}");
                println!("Progress not updated.");
                return Ok(());
            }
        };
        if !outcome.success {
            println!("Playback failed or was interrupted. Progress not updated.");
            return Ok(());
        }

        let now = Utc::now();
        let known_duration = entry.as_ref().map(|entry| entry.duration).unwrap_or(0.0);
        let reached_end = outcome.final_position.is_none();
        let final_position = outcome.final_position.unwrap_or(known_duration);

        // The player only reports a position; elapsed playback is the
        // position delta, fed to the aggregator as batched ticks.
        let watched = (final_position - start_at).max(0.0) as u64;
        stats.tick_many(now.date_naive(), watched);

        if reached_end {
            progress.mark_completed(&video.id);
            stats.record_completion();
            if known_duration > 0.0 {
                history.record(
                    &video.id,
                    &video.name,
                    &video.topic,
                    known_duration,
                    known_duration,
                    now,
                );
            }
            println!("Completed: {}", video.display_name);
        } else {
            let saved = progress.save(&video.id, final_position, known_duration, None);
            history.record(
                &video.id,
                &video.name,
                &video.topic,
                final_position,
                saved.duration,
                now,
            );
            println!("Saved position: {}", format_time(final_position));
        }
        stats.flush();

        if !(reached_end && settings.auto_play && index + 1 < videos.len()) {
            break;
        }
        println!("Next video in {}s...", AUTO_ADVANCE_DELAY_MS / 1000);
        std::thread::sleep(std::time::Duration::from_millis(AUTO_ADVANCE_DELAY_MS as u64));
        index += 1;
    }
    Ok(())
}

fn prompt_resume(name: &str, saved_position: f64) -> Result<f64> {
    print!("Resume {name} from {}? [Y/n] ", format_time(saved_position));
    io::stdout().flush().context("failed to flush stdout")?;
    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .context("failed to read resume answer")?;
    let restart = matches!(answer.trim(), "n" | "N" | "no" | "No");
    Ok(if restart { 0.0 } else { saved_position })
}

fn run_stats(store: &Store) -> Result<()> {
    let stats = StatsAggregator::load(store);
    let record = stats.record();
    let hours = record.total_seconds / 3600;
    let minutes = (record.total_seconds % 3600) / 60;
    println!("Total study time:  {hours}h {minutes}m");
    println!("Completed videos:  {}", record.completed_videos);
    println!(
        "Current streak:    {} day(s)",
        stats.streak(Utc::now().date_naive())
    );

    if record.daily_activity.is_empty() {
        println!("\nNo daily activity recorded yet.");
        return Ok(());
    }
    println!("\n{:<12} {:>8}", "DATE", "MINUTES");
    for (date, minutes) in record.daily_activity.iter().rev().take(7) {
        println!("{:<12} {:>8}", date.to_string(), minutes);
    }
    Ok(())
}

fn run_history(store: &Store) -> Result<()> {
    let entries = HistoryLedger::new(store).all();
    if entries.is_empty() {
        println!("No watch history yet. Run `coursetrack play` first.");
        return Ok(());
    }

    println!(
        "{:<40} {:<20} {:<15} {:<17}",
        "VIDEO", "TOPIC", "POSITION", "LAST WATCHED"
    );
    for item in entries {
        let position = format!(
            "{} / {}",
            format_time(item.position_seconds),
            format_time(item.duration_seconds)
        );
        let watched = item
            .last_watched
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string();
        println!(
            "{:<40} {:<20} {:<15} {:<17}",
            truncate(&item.name, 40),
            truncate(&item.topic, 20),
            position,
            watched
        );
    }
    Ok(())
}

fn run_done(store: &Store, dir: &Path, number: usize) -> Result<()> {
    let videos = scan_course(dir)?;
    if number == 0 || number > videos.len() {
        bail!("video number {number} is out of range (1-{})", videos.len());
    }
    let video = &videos[number - 1];
    ProgressTracker::new(store).mark_completed(&video.id);
    println!("Marked completed: {} [{}]", video.display_name, video.topic);
    Ok(())
}

pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }
    let total = seconds as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let mut out = s.to_string();
    if out.chars().count() > max {
        out = out.chars().take(max.saturating_sub(3)).collect::<String>() + "...";
    }
    out
}
