//! Storage layer for growthlog.
//!
//! This module provides the `SQLite`-backed record store for plant entries.
//! The store is append-only: entries can be inserted and read back, never
//! updated or deleted.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::entry::{PlantEntry, PlantEntryDraft, DATE_FORMAT};
use crate::error::{Error, Result};

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_ENTRY_COLUMNS: &str = "SELECT id, name, photo, date, height, notes FROM plant_entries";

/// Record store for plant entries.
///
/// Each `Storage` owns one connection. Concurrent writers each open their own
/// store; `SQLite` serialises the transactions.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        debug!("Database ready at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a new entry and return it with its assigned id.
    ///
    /// The write happens in its own transaction, so a failure leaves no
    /// partial row behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert(&self, draft: &PlantEntryDraft) -> Result<PlantEntry> {
        let date = draft.date().format(DATE_FORMAT).to_string();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r"
            INSERT INTO plant_entries (name, photo, date, height, notes)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                draft.name(),
                draft.photo(),
                date,
                draft.height(),
                draft.notes()
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!("Recorded entry {} for '{}' on {}", id, draft.name(), date);
        Ok(PlantEntry::from_draft(id, draft.clone()))
    }

    /// Get an entry by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the row is corrupt.
    pub fn get(&self, id: i64) -> Result<Option<PlantEntry>> {
        let raw = self
            .conn
            .query_row(
                &format!("{SELECT_ENTRY_COLUMNS} WHERE id = ?1"),
                [id],
                RawEntry::from_row,
            )
            .optional()?;
        raw.map(RawEntry::into_entry).transpose()
    }

    /// Get every entry, oldest date first.
    ///
    /// Dates are stored as `YYYY-MM-DD` text, so text order is calendar
    /// order. Entries on the same date keep their insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or a row is corrupt.
    pub fn list_all_ordered_by_date(&self) -> Result<Vec<PlantEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_ENTRY_COLUMNS} ORDER BY date ASC, id ASC"))?;

        let raw = stmt
            .query_map([], RawEntry::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter().map(RawEntry::into_entry).collect()
    }

    /// Count stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM plant_entries", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (total_entries, plants, first, last): (i64, i64, Option<String>, Option<String>) =
            self.conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT name), MIN(date), MAX(date) FROM plant_entries",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let first_date = first.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok());
        let last_date = last.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok());

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_entries,
            plants,
            first_date,
            last_date,
            db_size_bytes,
        })
    }
}

/// A row as read from the database, before date decoding.
struct RawEntry {
    id: i64,
    name: String,
    photo: Option<String>,
    date: String,
    height: f64,
    notes: Option<String>,
}

impl RawEntry {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            photo: row.get(2)?,
            date: row.get(3)?,
            height: row.get(4)?,
            notes: row.get(5)?,
        })
    }

    fn into_entry(self) -> Result<PlantEntry> {
        let date =
            NaiveDate::parse_from_str(&self.date, DATE_FORMAT).map_err(|e| Error::CorruptRow {
                id: self.id,
                message: format!("bad date '{}': {e}", self.date),
            })?;

        Ok(PlantEntry {
            id: self.id,
            name: self.name,
            photo: self.photo,
            date,
            height: self.height,
            notes: self.notes,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Total number of entries stored.
    pub total_entries: i64,
    /// Number of distinct plant names.
    pub plants: i64,
    /// Date of the earliest entry.
    pub first_date: Option<NaiveDate>,
    /// Date of the latest entry.
    pub last_date: Option<NaiveDate>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
