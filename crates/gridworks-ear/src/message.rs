//! Messages heard on the broker.
//!
//! This module turns a raw MQTT publish into a [`HeardMessage`] that knows who
//! sent it, what type it is, and which file name it is archived under.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Type aliases carried in the GridWorks serial format rather than JSON.
pub const SERIAL_TYPE_ALIASES: &[&str] = &["gs.pwr.100"];

/// How a message payload is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageFormat {
    /// JSON payload, archived as `.json`.
    Json,
    /// GridWorks serial payload, archived as `.txt`.
    GwSerial,
}

impl MessageFormat {
    /// Format implied by a message type alias.
    #[must_use]
    pub fn for_type_alias(type_alias: &str) -> Self {
        if SERIAL_TYPE_ALIASES.contains(&type_alias) {
            Self::GwSerial
        } else {
            Self::Json
        }
    }

    /// File extension used for archived payloads, without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::GwSerial => "txt",
        }
    }
}

impl std::fmt::Display for MessageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "Json"),
            Self::GwSerial => write!(f, "GwSerial"),
        }
    }
}

impl std::str::FromStr for MessageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Json" => Ok(Self::Json),
            "GwSerial" => Ok(Self::GwSerial),
            other => Err(Error::internal(format!("unknown message format: {other}"))),
        }
    }
}

/// Encode a GridWorks topic for MQTT, where dots are not allowed in aliases.
#[must_use]
pub fn encode_topic(topic: &str) -> String {
    topic.replace('.', "-")
}

/// Reverse [`encode_topic`].
#[must_use]
pub fn decode_topic(topic: &str) -> String {
    topic.replace('-', ".")
}

/// A message the ear heard, ready to be archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeardMessage {
    /// Alias of the GNode (or sensor) that published the message.
    pub from_alias: String,
    /// Type alias of the payload.
    pub type_alias: String,
    /// Payload encoding.
    pub format: MessageFormat,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// When the ear received the message.
    pub received_at: DateTime<Utc>,
}

impl HeardMessage {
    /// Build a message from a raw MQTT topic and payload.
    ///
    /// Topics are either `gw/<from>/<type>` or `<from>/<type>` (local sensors),
    /// with dots encoded as dashes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedTopic`] when the topic does not have one of
    /// those shapes.
    pub fn from_mqtt(topic: &str, payload: Vec<u8>, received_at: DateTime<Utc>) -> Result<Self> {
        let decoded = decode_topic(topic);
        let words: Vec<&str> = decoded.split('/').collect();

        let (from_alias, type_alias) = match words.as_slice() {
            ["gw", from, kind] => (*from, *kind),
            [from, kind] if *from != "gw" => (*from, *kind),
            _ => {
                return Err(Error::topic(
                    topic,
                    "expected gw/<from>/<type> or <from>/<type>",
                ))
            }
        };

        if from_alias.is_empty() || type_alias.is_empty() {
            return Err(Error::topic(topic, "empty alias"));
        }

        Ok(Self {
            from_alias: from_alias.to_string(),
            type_alias: type_alias.to_string(),
            format: MessageFormat::for_type_alias(type_alias),
            payload,
            received_at,
        })
    }

    /// The `<from>-<type>` name used as the first part of archive file names.
    #[must_use]
    pub fn kafka_topic(&self) -> String {
        format!("{}-{}", self.from_alias, self.type_alias)
    }

    /// File name under which this message is archived.
    #[must_use]
    pub fn file_name(&self, fqdn: &str) -> String {
        format!(
            "{}-{}-{}.{}",
            self.kafka_topic(),
            self.received_at.timestamp_millis(),
            fqdn,
            self.format.extension()
        )
    }

    /// BLAKE3 hex digest of the payload.
    #[must_use]
    pub fn payload_hash(&self) -> String {
        compute_hash(&self.payload)
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Compute the BLAKE3 hex digest of some bytes.
#[must_use]
pub fn compute_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
