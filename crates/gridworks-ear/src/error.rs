//! Error types for the Ear.
//!
//! This module defines all error types used throughout the crate, providing
//! enough context to tell a misconfigured ear from a flaky bucket.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for Ear operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Universe Errors ===
    /// The universe type does not agree with the GNode alias.
    #[error("universe type {universe} inconsistent with {alias}. Fix settings!")]
    UniverseMismatch {
        /// The configured universe type.
        universe: String,
        /// The GNode alias whose root disagrees.
        alias: String,
    },

    /// The universe is recognized but the Ear does not run in it.
    #[error("the ear does not support the {0} universe")]
    UnsupportedUniverse(String),

    // === Message Errors ===
    /// An MQTT topic could not be decoded into a sender and a type.
    #[error("malformed topic '{topic}': {reason}")]
    MalformedTopic {
        /// The raw topic as received.
        topic: String,
        /// What was wrong with it.
        reason: String,
    },

    // === Storage Errors ===
    /// An object store operation failed.
    #[error("object store '{store}' failed on {key}: {message}")]
    ObjectStore {
        /// Name of the backend.
        store: &'static str,
        /// Key or prefix of the failing operation.
        key: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The local cache could not be read or written.
    #[error("local cache error at {path}: {source}")]
    Cache {
        /// Path of the file or directory involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to open or create the journal database.
    #[error("failed to open journal at {path}: {source}")]
    JournalOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A journal query failed.
    #[error("journal query failed: {0}")]
    JournalQuery(#[from] rusqlite::Error),

    /// Failed to run journal migrations.
    #[error("journal migration failed: {message}")]
    JournalMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Broker Errors ===
    /// The MQTT client could not be started or subscribed.
    #[error("mqtt error: {0}")]
    Mqtt(String),

    /// The message source is already running.
    #[error("message source already running")]
    SourceAlreadyRunning,

    // === Alert Errors ===
    /// Posting to the Slack webhook failed.
    #[error("slack webhook failed: {0}")]
    Alert(#[from] reqwest::Error),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for Ear operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new object store error.
    #[must_use]
    pub fn object_store(
        store: &'static str,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ObjectStore {
            store,
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a malformed topic error.
    #[must_use]
    pub fn topic(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedTopic {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create a cache error for the given path.
    #[must_use]
    pub fn cache(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Cache {
            path: path.into(),
            source,
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is worth retrying later (network or store trouble).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ObjectStore { .. } | Self::Mqtt(_) | Self::Alert(_)
        )
    }
}
