//! Local journal of every message the ear has heard.
//!
//! The object store is the archive; the journal is the ear's own ledger of
//! what it heard and where each message went. It backs `gear status` and
//! `gear recent`, and lets the cache flush confirm that a cached file is the
//! payload that was heard.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::message::{HeardMessage, MessageFormat};

/// Where a heard message currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Put in the object store.
    Uploaded,
    /// Waiting in the local cache.
    Cached,
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uploaded => write!(f, "uploaded"),
            Self::Cached => write!(f, "cached"),
        }
    }
}

impl std::str::FromStr for Disposition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "uploaded" => Ok(Self::Uploaded),
            "cached" => Ok(Self::Cached),
            other => Err(Error::internal(format!("unknown disposition: {other}"))),
        }
    }
}

/// One journal row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    /// Row id.
    pub id: i64,
    /// When the message was heard.
    pub received_at: DateTime<Utc>,
    /// `<from>-<type>` of the message.
    pub kafka_topic: String,
    /// Archive file name.
    pub file_name: String,
    /// Payload encoding.
    pub format: MessageFormat,
    /// Payload size in bytes.
    pub size_bytes: u64,
    /// BLAKE3 digest of the payload.
    pub payload_hash: String,
    /// Where the message is now.
    pub status: Disposition,
    /// When the message reached the store, if it has.
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// SQLite-backed message journal.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    conn: Connection,
}

impl Journal {
    /// Open or create a journal at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
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

        debug!("Opening journal at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::JournalOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets `gear status` read while the daemon writes.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Journal opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::JournalOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Path of the journal database.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a heard message. A file name heard twice keeps its first row.
    ///
    /// `at` is when the message reached `status`; for uploads it becomes the
    /// upload time.
    ///
    /// Returns the row id, or `None` if the file name was already journaled.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn record(
        &self,
        message: &HeardMessage,
        file_name: &str,
        status: Disposition,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let uploaded_at = match status {
            Disposition::Uploaded => Some(at.timestamp_millis()),
            Disposition::Cached => None,
        };
        let size = i64::try_from(message.len()).unwrap_or(i64::MAX);

        let affected = self.conn.execute(
            r"
            INSERT OR IGNORE INTO messages
                (received_at_ms, kafka_topic, file_name, format, size_bytes,
                 payload_hash, status, uploaded_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            params![
                message.received_at.timestamp_millis(),
                message.kafka_topic(),
                file_name,
                message.format.to_string(),
                size,
                message.payload_hash(),
                status.to_string(),
                uploaded_at,
            ],
        )?;

        if affected == 0 {
            debug!("{} already journaled", file_name);
            return Ok(None);
        }
        Ok(Some(self.conn.last_insert_rowid()))
    }

    /// Mark a journaled message as uploaded.
    ///
    /// Returns `true` if a row changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_uploaded(&self, file_name: &str, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE messages SET status = ?1, uploaded_at_ms = ?2 WHERE file_name = ?3",
            params![
                Disposition::Uploaded.to_string(),
                at.timestamp_millis(),
                file_name
            ],
        )?;
        Ok(affected > 0)
    }

    /// Drop the row of a cached message whose file was discarded unsent.
    ///
    /// Uploaded rows are never forgotten. Returns `true` if a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn forget(&self, file_name: &str) -> Result<bool> {
        let affected = self.conn.execute(
            "DELETE FROM messages WHERE file_name = ?1 AND status = ?2",
            params![file_name, Disposition::Cached.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Look up a message by its archive file name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_by_file_name(&self, file_name: &str) -> Result<Option<JournalEntry>> {
        let entry = self
            .conn
            .query_row(
                r"
                SELECT id, received_at_ms, kafka_topic, file_name, format, size_bytes,
                       payload_hash, status, uploaded_at_ms
                FROM messages WHERE file_name = ?1
                ",
                [file_name],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// The most recently heard messages, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn recent(&self, limit: usize) -> Result<Vec<JournalEntry>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, received_at_ms, kafka_topic, file_name, format, size_bytes,
                   payload_hash, status, uploaded_at_ms
            FROM messages ORDER BY received_at_ms DESC, id DESC LIMIT ?1
            ",
        )?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = stmt
            .query_map([limit_i64], Self::row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Count messages with the given disposition.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_by_status(&self, status: Disposition) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE status = ?1",
            [status.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count all journaled messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete rows heard before `now - max_age`. Returns how many were deleted.
    ///
    /// Rows still waiting in the cache are kept regardless of age.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn prune_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = (now - max_age).timestamp_millis();
        let affected = self.conn.execute(
            "DELETE FROM messages WHERE received_at_ms < ?1 AND status = ?2",
            params![cutoff, Disposition::Uploaded.to_string()],
        )?;

        if affected > 0 {
            info!("Pruned {} old journal rows", affected);
        }
        Ok(affected)
    }

    /// Journal statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn stats(&self) -> Result<JournalStats> {
        let (oldest, newest, total_bytes): (Option<i64>, Option<i64>, Option<i64>) =
            self.conn.query_row(
                "SELECT MIN(received_at_ms), MAX(received_at_ms), SUM(size_bytes) FROM messages",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(JournalStats {
            total_messages: self.count()?,
            uploaded: self.count_by_status(Disposition::Uploaded)?,
            cached: self.count_by_status(Disposition::Cached)?,
            payload_bytes: u64::try_from(total_bytes.unwrap_or(0)).unwrap_or(0),
            oldest_message: oldest.and_then(from_millis),
            newest_message: newest.and_then(from_millis),
            db_size_bytes,
        })
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<JournalEntry> {
        let received_ms: i64 = row.get(1)?;
        let format_str: String = row.get(4)?;
        let size: i64 = row.get(5)?;
        let status_str: String = row.get(7)?;
        let uploaded_ms: Option<i64> = row.get(8)?;

        let format = format_str.parse().unwrap_or_else(|_| {
            warn!("Unknown message format: {}, defaulting to Json", format_str);
            MessageFormat::Json
        });
        let status = status_str.parse().unwrap_or_else(|_| {
            warn!("Unknown status: {}, treating as cached", status_str);
            Disposition::Cached
        });

        Ok(JournalEntry {
            id: row.get(0)?,
            received_at: from_millis(received_ms).unwrap_or_else(Utc::now),
            kafka_topic: row.get(2)?,
            file_name: row.get(3)?,
            format,
            size_bytes: u64::try_from(size).unwrap_or(0),
            payload_hash: row.get(6)?,
            status,
            uploaded_at: uploaded_ms.and_then(from_millis),
        })
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Statistics about the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalStats {
    /// Total messages journaled.
    pub total_messages: i64,
    /// Messages put in the store.
    pub uploaded: i64,
    /// Messages waiting in the cache.
    pub cached: i64,
    /// Sum of payload sizes.
    pub payload_bytes: u64,
    /// Arrival time of the oldest journaled message.
    pub oldest_message: Option<DateTime<Utc>>,
    /// Arrival time of the newest journaled message.
    pub newest_message: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
