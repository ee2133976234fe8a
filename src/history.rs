//! # Playback History
//!
//! Per-user anti-repetition memory: the most recently selected track ids and
//! a shorter log of their feature snapshots. Not a system of record.
//!
//! The selector only talks to the [`HistoryStore`] trait:
//!
//! - [`MemoryHistoryStore`] keeps everything in process and loses it on exit.
//! - [`SqliteHistoryStore`] keeps the same bounded lists in a SQLite file so
//!   short-lived processes (the CLI) still avoid repeats.
//!
//! Both keep ids unique: recording an id already present moves it to the
//! most recent end. Lists are returned oldest first.

use crate::config::SelectionConfig;
use crate::error::HistoryError;
use crate::track::FeatureSnapshot;
use anyhow::Context;
use log::debug;
use rusqlite::{params, Connection};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

/// How much history is retained per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub ids: usize,
    pub snapshots: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            ids: 50,
            snapshots: 20,
        }
    }
}

impl From<&SelectionConfig> for HistoryLimits {
    fn from(config: &SelectionConfig) -> Self {
        Self {
            ids: config.history_limit,
            snapshots: config.snapshot_limit,
        }
    }
}

/// Backing store for recent playback history.
pub trait HistoryStore: Send + Sync {
    /// Append selected tracks, trimming the oldest entries past the limits.
    fn record_played(&self, user_id: &str, played: &[FeatureSnapshot]) -> Result<(), HistoryError>;

    /// Recent track ids, oldest first.
    fn recent_ids(&self, user_id: &str) -> Result<Vec<String>, HistoryError>;

    /// Recent feature snapshots, oldest first.
    fn recent_snapshots(&self, user_id: &str) -> Result<Vec<FeatureSnapshot>, HistoryError>;

    /// Forget everything about a user.
    fn clear(&self, user_id: &str) -> Result<(), HistoryError>;
}

#[derive(Debug, Default)]
struct UserHistory {
    ids: VecDeque<String>,
    snapshots: VecDeque<FeatureSnapshot>,
}

/// In-process history, lost on restart.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    limits: HistoryLimits,
    users: Mutex<HashMap<String, UserHistory>>,
}

impl MemoryHistoryStore {
    pub fn new(limits: HistoryLimits) -> Self {
        Self {
            limits,
            users: Mutex::new(HashMap::new()),
        }
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn record_played(&self, user_id: &str, played: &[FeatureSnapshot]) -> Result<(), HistoryError> {
        let mut users = self.users.lock().map_err(|_| HistoryError::Poisoned)?;
        let history = users.entry(user_id.to_string()).or_default();

        for snapshot in played {
            history.ids.retain(|id| *id != snapshot.track_id);
            history.ids.push_back(snapshot.track_id.clone());
            history.snapshots.push_back(snapshot.clone());
        }

        while history.ids.len() > self.limits.ids {
            history.ids.pop_front();
        }
        while history.snapshots.len() > self.limits.snapshots {
            history.snapshots.pop_front();
        }

        debug!("Recent history for {user_id}: {} tracks", history.ids.len());
        Ok(())
    }

    fn recent_ids(&self, user_id: &str) -> Result<Vec<String>, HistoryError> {
        let users = self.users.lock().map_err(|_| HistoryError::Poisoned)?;
        Ok(users
            .get(user_id)
            .map(|h| h.ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn recent_snapshots(&self, user_id: &str) -> Result<Vec<FeatureSnapshot>, HistoryError> {
        let users = self.users.lock().map_err(|_| HistoryError::Poisoned)?;
        Ok(users
            .get(user_id)
            .map(|h| h.snapshots.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn clear(&self, user_id: &str) -> Result<(), HistoryError> {
        let mut users = self.users.lock().map_err(|_| HistoryError::Poisoned)?;
        users.remove(user_id);
        debug!("Cleared recent history for {user_id}");
        Ok(())
    }
}

/// History persisted in a SQLite database.
#[derive(Debug)]
pub struct SqliteHistoryStore {
    limits: HistoryLimits,
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Open (creating if needed) the history database at `path`.
    pub fn open(path: &Path, limits: HistoryLimits) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open history database at {}", path.display()))?;
        Self::with_connection(conn, limits)
    }

    /// Throwaway in-memory database.
    pub fn open_in_memory(limits: HistoryLimits) -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory history database")?;
        Self::with_connection(conn, limits)
    }

    fn with_connection(conn: Connection, limits: HistoryLimits) -> anyhow::Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS recent_tracks (
                user_id  TEXT    NOT NULL,
                track_id TEXT    NOT NULL,
                seq      INTEGER NOT NULL,
                PRIMARY KEY (user_id, track_id)
            );
            CREATE TABLE IF NOT EXISTS recent_snapshots (
                id       INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id  TEXT    NOT NULL,
                snapshot TEXT    NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_recent_tracks_user ON recent_tracks(user_id, seq);
            CREATE INDEX IF NOT EXISTS idx_recent_snapshots_user ON recent_snapshots(user_id, id);",
        )
        .context("Failed to create history tables")?;

        Ok(Self {
            limits,
            conn: Mutex::new(conn),
        })
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl HistoryStore for SqliteHistoryStore {
    fn record_played(&self, user_id: &str, played: &[FeatureSnapshot]) -> Result<(), HistoryError> {
        let mut conn = self.conn.lock().map_err(|_| HistoryError::Poisoned)?;
        let tx = conn.transaction()?;

        let mut seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM recent_tracks WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;

        for snapshot in played {
            seq += 1;
            tx.execute(
                "INSERT INTO recent_tracks (user_id, track_id, seq) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, track_id) DO UPDATE SET seq = excluded.seq",
                params![user_id, snapshot.track_id, seq],
            )?;
            tx.execute(
                "INSERT INTO recent_snapshots (user_id, snapshot) VALUES (?1, ?2)",
                params![user_id, serde_json::to_string(snapshot)?],
            )?;
        }

        tx.execute(
            "DELETE FROM recent_tracks WHERE user_id = ?1 AND seq NOT IN (
                SELECT seq FROM recent_tracks WHERE user_id = ?1 ORDER BY seq DESC LIMIT ?2
            )",
            params![user_id, sql_limit(self.limits.ids)],
        )?;
        tx.execute(
            "DELETE FROM recent_snapshots WHERE user_id = ?1 AND id NOT IN (
                SELECT id FROM recent_snapshots WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2
            )",
            params![user_id, sql_limit(self.limits.snapshots)],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn recent_ids(&self, user_id: &str) -> Result<Vec<String>, HistoryError> {
        let conn = self.conn.lock().map_err(|_| HistoryError::Poisoned)?;
        let mut stmt =
            conn.prepare("SELECT track_id FROM recent_tracks WHERE user_id = ?1 ORDER BY seq ASC")?;
        let ids = stmt
            .query_map([user_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn recent_snapshots(&self, user_id: &str) -> Result<Vec<FeatureSnapshot>, HistoryError> {
        let conn = self.conn.lock().map_err(|_| HistoryError::Poisoned)?;
        let mut stmt =
            conn.prepare("SELECT snapshot FROM recent_snapshots WHERE user_id = ?1 ORDER BY id ASC")?;
        let raw = stmt
            .query_map([user_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(HistoryError::from))
            .collect()
    }

    fn clear(&self, user_id: &str) -> Result<(), HistoryError> {
        let conn = self.conn.lock().map_err(|_| HistoryError::Poisoned)?;
        conn.execute("DELETE FROM recent_tracks WHERE user_id = ?1", [user_id])?;
        conn.execute("DELETE FROM recent_snapshots WHERE user_id = ?1", [user_id])?;
        debug!("Cleared persisted history for {user_id}");
        Ok(())
    }
}
