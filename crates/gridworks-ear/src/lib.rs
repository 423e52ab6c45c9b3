//! `gridworks-ear` - stores every message produced in a GridWorks universe
//!
//! The ear subscribes to a universe's MQTT broker and writes each message it
//! hears to an S3 bucket, one object per message, in daily folders. When the
//! bucket is unreachable messages wait in a local cache until uploads work
//! again. Periodic jobs send a heartbeat, flush the cache, roll folders over
//! and raise Slack alerts when the universe goes quiet.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod alert;
pub mod cache;
pub mod cli;
pub mod config;
pub mod cron;
pub mod daemon;
pub mod ear;
pub mod error;
pub mod journal;
pub mod logging;
pub mod message;
pub mod source;
pub mod store;
pub mod subscriptions;
pub mod universe;
pub mod watchdog;

pub use config::EarSettings;
pub use ear::Ear;
pub use error::{Error, Result};
pub use journal::{Disposition, Journal, JournalStats};
pub use logging::init_logging;
pub use message::HeardMessage;
pub use universe::UniverseType;
