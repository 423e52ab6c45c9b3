//! `SQLite` schema definitions for the message journal.
//!
//! These statements create the version 1 schema. Later columns are added by
//! the migrations in [`super::migrations`].

/// SQL statement to create the messages table.
pub const CREATE_MESSAGES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    received_at_ms INTEGER NOT NULL,
    kafka_topic TEXT NOT NULL,
    file_name TEXT NOT NULL UNIQUE,
    format TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    payload_hash TEXT NOT NULL,
    status TEXT NOT NULL
)
";

/// SQL statement to create an index on arrival time for recent/prune queries.
pub const CREATE_RECEIVED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_messages_received ON messages(received_at_ms DESC)
";

/// SQL statement to create an index on `kafka_topic` for per-sender queries.
pub const CREATE_TOPIC_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_messages_topic ON messages(kafka_topic)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_MESSAGES_TABLE,
    CREATE_RECEIVED_INDEX,
    CREATE_TOPIC_INDEX,
    CREATE_METADATA_TABLE,
];
