use std::path::Path;

use anyhow::{Context, Result};
use log::warn;
use rusqlite::{Connection, OptionalExtension, params};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Keys for the persisted records. The version suffix is part of the key so a
/// breaking layout change can start from a clean slate.
pub mod keys {
    pub const PROGRESS: &str = "progress_v1";
    pub const STATS: &str = "stats_v1";
    pub const HISTORY: &str = "history_v1";
    pub const SETTINGS: &str = "settings_v1";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] rusqlite::Error),
    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// SQLite-backed key-value store holding one JSON document per record key.
/// Writes from concurrent processes are last-write-wins by design; the target
/// use is a single interactive session.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create store directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open store at {}", path.display()))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory store")?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT value FROM records WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.conn.execute(
            r#"
            INSERT INTO records (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, raw],
        )?;
        Ok(())
    }

    /// Fail-soft read: unreadable or missing records degrade to the default.
    /// Missing fields in older records fall back to serde defaults, which is
    /// the on-read migration path for layout additions.
    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.get(key) {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(err) => {
                warn!("failed to read record {key}: {err}; starting from defaults");
                T::default()
            }
        }
    }

    /// Fail-soft write: a failed persist is logged and skipped, the caller
    /// keeps working with its in-memory value.
    pub fn set_logged<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(err) = self.set(key, value) {
            warn!("failed to persist record {key}: {err}; keeping in-memory value");
        }
    }

    pub fn settings(&self) -> Settings {
        self.get_or_default(keys::SETTINGS)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: u32,
    pub auto_play: bool,
    pub default_speed: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            auto_play: true,
            default_speed: 1.0,
        }
    }
}
