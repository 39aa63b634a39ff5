//! SQLite-backed snapshot cache.
//!
//! # Responsibility
//! - Persist one JSON list per `(table, owner)` pair.
//! - Replace a snapshot wholesale on every save.
//!
//! # Invariants
//! - Snapshots are keyed by owner; one user's rows are never returned for
//!   another user's key.
//! - An undecodable snapshot reads as absent instead of failing.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::UserId;
use crate::remote::Table;
use chrono::Utc;
use log::warn;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
pub enum CacheError {
    Db(DbError),
    Serde(serde_json::Error),
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "cache storage failed: {err}"),
            Self::Serde(err) => write!(f, "cache payload invalid: {err}"),
        }
    }
}

impl Error for CacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serde(err) => Some(err),
        }
    }
}

impl From<DbError> for CacheError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Cache slot of one table's list for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub table: Table,
    pub owner: UserId,
}

impl SnapshotKey {
    pub fn new(table: Table, owner: UserId) -> Self {
        Self { table, owner }
    }
}

impl Display for SnapshotKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.table, self.owner)
    }
}

pub struct SnapshotCache {
    conn: Mutex<Connection>,
}

impl SnapshotCache {
    /// Opens or creates the cache file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        Ok(Self {
            conn: Mutex::new(open_db(path)?),
        })
    }

    pub fn in_memory() -> Result<Self, CacheError> {
        Ok(Self {
            conn: Mutex::new(open_db_in_memory()?),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the snapshot stored under `key` with `items`.
    pub fn save<T: Serialize>(&self, key: &SnapshotKey, items: &[T]) -> Result<(), CacheError> {
        let payload = serde_json::to_string(items)?;
        self.conn().execute(
            "INSERT INTO snapshots (storage_key, table_name, owner_id, payload, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(storage_key) DO UPDATE SET
                payload = excluded.payload,
                saved_at = excluded.saved_at;",
            params![
                key.to_string(),
                key.table.as_str(),
                key.owner.to_string(),
                payload,
                Utc::now().timestamp_millis()
            ],
        )?;
        Ok(())
    }

    /// Last saved snapshot for `key`, or `None` when absent or unreadable.
    pub fn load<T: DeserializeOwned>(
        &self,
        key: &SnapshotKey,
    ) -> Result<Option<Vec<T>>, CacheError> {
        let payload: Option<String> = self
            .conn()
            .query_row(
                "SELECT payload FROM snapshots WHERE storage_key = ?1;",
                [key.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(items) => Ok(Some(items)),
            Err(err) => {
                warn!("event=cache_load module=cache status=skip key={key} error={err}");
                Ok(None)
            }
        }
    }

    /// Milliseconds since the epoch at which `key` was last saved.
    pub fn saved_at(&self, key: &SnapshotKey) -> Result<Option<i64>, CacheError> {
        let saved_at = self
            .conn()
            .query_row(
                "SELECT saved_at FROM snapshots WHERE storage_key = ?1;",
                [key.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(saved_at)
    }

    /// Drops every snapshot of `owner`; returns how many were removed.
    pub fn clear_owner(&self, owner: UserId) -> Result<usize, CacheError> {
        let removed = self.conn().execute(
            "DELETE FROM snapshots WHERE owner_id = ?1;",
            [owner.to_string()],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::{SnapshotCache, SnapshotKey};
    use crate::remote::Table;
    use uuid::Uuid;

    #[test]
    fn key_renders_table_and_owner() {
        let owner = Uuid::nil();
        assert_eq!(
            SnapshotKey::new(Table::Notes, owner).to_string(),
            format!("notes:{owner}")
        );
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let cache = SnapshotCache::in_memory().unwrap();
        let key = SnapshotKey::new(Table::Tasks, Uuid::new_v4());

        cache.save(&key, &["a", "b"]).unwrap();
        cache.save(&key, &["c"]).unwrap();

        let loaded: Vec<String> = cache.load(&key).unwrap().unwrap();
        assert_eq!(loaded, vec!["c".to_string()]);
        assert!(cache.saved_at(&key).unwrap().is_some());
    }

    #[test]
    fn undecodable_snapshot_reads_as_absent() {
        let cache = SnapshotCache::in_memory().unwrap();
        let key = SnapshotKey::new(Table::Events, Uuid::new_v4());
        cache.save(&key, &["not a number"]).unwrap();

        let loaded: Option<Vec<u32>> = cache.load(&key).unwrap();
        assert!(loaded.is_none());
    }
}
